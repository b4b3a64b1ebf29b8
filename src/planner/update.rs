//! 写语句规划
//!
//! 写语句对其修改的每个候选索引产生一份维护计划：先以支撑查询
//! 取回语句未提供的索引字段，再执行删除、插入步骤。
//! 支撑查询与普通读语句一样构建计划树，交由优化器选择。

use std::sync::Arc;

use log::debug;

use crate::model::{Index, Query, UpdateKind, UpdateStatement};

use super::step::PlanStep;
use super::tree::{PlanTree, QueryPlanner};

/// 支撑查询及其计划树
#[derive(Debug, Clone)]
pub struct SupportQuery {
    query: Arc<Query>,
    tree: PlanTree,
}

impl SupportQuery {
    pub fn query(&self) -> &Arc<Query> {
        &self.query
    }

    pub fn tree(&self) -> &PlanTree {
        &self.tree
    }
}

/// 一条写语句对一个索引的维护
#[derive(Debug, Clone)]
pub struct IndexMaintenance {
    statement: Arc<UpdateStatement>,
    index: Arc<Index>,
    support: Option<Vec<SupportQuery>>,
    steps: Vec<PlanStep>,
}

impl IndexMaintenance {
    pub fn statement(&self) -> &Arc<UpdateStatement> {
        &self.statement
    }

    pub fn index(&self) -> &Arc<Index> {
        &self.index
    }

    /// 支撑查询；`None` 表示无法规划，索引不能被选中
    pub fn support(&self) -> Option<&[SupportQuery]> {
        self.support.as_deref()
    }

    pub fn is_supported(&self) -> bool {
        self.support.is_some()
    }

    /// 删除、插入步骤
    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    /// 维护步骤的代价（未乘权重）
    pub fn update_cost(&self) -> f64 {
        self.steps.iter().map(|s| s.cost()).sum()
    }

    pub fn weighted_update_cost(&self) -> f64 {
        self.update_cost() * self.statement.weight()
    }
}

/// 写语句规划器
#[derive(Debug, Clone, Copy)]
pub struct UpdatePlanner<'p, 'a> {
    planner: &'p QueryPlanner<'a>,
}

impl<'p, 'a> UpdatePlanner<'p, 'a> {
    pub fn new(planner: &'p QueryPlanner<'a>) -> Self {
        Self { planner }
    }

    /// 为写语句修改的每个候选索引生成维护计划
    pub fn plan(&self, statement: &Arc<UpdateStatement>) -> Vec<IndexMaintenance> {
        self.planner
            .indexes()
            .iter()
            .filter(|index| statement.modifies_index(index))
            .map(|index| self.plan_index(statement, index))
            .collect()
    }

    fn plan_index(&self, statement: &Arc<UpdateStatement>, index: &Arc<Index>) -> IndexMaintenance {
        let support = statement.support_queries(index).and_then(|queries| {
            let mut planned = Vec::with_capacity(queries.len());
            for query in queries {
                let query = Arc::new(query);
                match self.planner.plan(&query) {
                    Ok(tree) => planned.push(SupportQuery { query, tree }),
                    Err(err) => {
                        debug!("索引 {} 的支撑查询无法规划: {}", index.key(), err);
                        return None;
                    }
                }
            }
            Some(planned)
        });

        let rows = match (statement.kind(), support.as_deref()) {
            (UpdateKind::Insert, _) => 1.0,
            (_, Some([first, ..])) => first
                .tree
                .min_plan()
                .map(|p| p.cardinality())
                .unwrap_or(1.0)
                .max(1.0),
            _ => 1.0,
        };

        let cost_model = self.planner.cost_model();
        let steps = match statement.kind() {
            UpdateKind::Insert => vec![PlanStep::insert(Arc::clone(index), rows, cost_model)],
            UpdateKind::Delete => vec![PlanStep::delete(Arc::clone(index), rows, cost_model)],
            UpdateKind::Update => vec![
                PlanStep::delete(Arc::clone(index), rows, cost_model),
                PlanStep::insert(Arc::clone(index), rows, cost_model),
            ],
        };

        IndexMaintenance {
            statement: Arc::clone(statement),
            index: Arc::clone(index),
            support,
            steps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlannerConfig;
    use crate::cost::RequestCountCost;
    use crate::model::{Entity, FieldRef, Model, QueryGraph};

    fn model() -> Model {
        let tweet = Entity::builder("Tweet", 1000)
            .id("TweetId")
            .string("Body", 140)
            .integer("Timestamp")
            .build()
            .expect("Tweet");
        Model::new().with_entity(tweet)
    }

    fn field(model: &Model, name: &str) -> FieldRef {
        model.field(name).expect("field")
    }

    fn tweet_index(model: &Model, partition: &str, ordered: &[&str], extra: &[&str]) -> Arc<Index> {
        let graph = QueryGraph::single(model.entity("Tweet").expect("Tweet").clone());
        let index = Index::builder(graph)
            .fields(
                vec![field(model, partition)],
                ordered.iter().map(|f| field(model, f)).collect::<Vec<_>>(),
                extra.iter().map(|f| field(model, f)).collect::<Vec<_>>(),
            )
            .build()
            .expect("index");
        Arc::new(index)
    }

    #[test]
    fn test_update_needs_support_query() {
        let model = model();
        let pool = vec![
            tweet_index(&model, "Tweet.TweetId", &[], &["Tweet.Body", "Tweet.Timestamp"]),
            tweet_index(&model, "Tweet.Timestamp", &["Tweet.TweetId"], &["Tweet.Body"]),
        ];
        let planner = QueryPlanner::new(&pool, &RequestCountCost, PlannerConfig::default());
        let update = UpdateStatement::builder(&model, UpdateKind::Update, "Tweet")
            .path(&["Tweet"])
            .set("Tweet.Body")
            .eq("Tweet.TweetId")
            .build()
            .expect("update");
        let maintenance = UpdatePlanner::new(&planner).plan(&Arc::new(update));

        assert_eq!(maintenance.len(), 2);
        for m in &maintenance {
            assert_eq!(m.steps().len(), 2);
            assert!(m.update_cost() > 0.0);
        }
        let by_time = maintenance
            .iter()
            .find(|m| m.index().partition().contains(&field(&model, "Tweet.Timestamp")))
            .expect("maintenance");
        let support = by_time.support().expect("support");
        assert_eq!(support.len(), 1);
        assert!(support[0].query().select().contains(&field(&model, "Tweet.Timestamp")));
        assert!(!support[0].tree().is_empty());
    }

    #[test]
    fn test_insert_with_all_fields_needs_no_support() {
        let model = model();
        let pool = vec![tweet_index(&model, "Tweet.TweetId", &[], &["Tweet.Body"])];
        let planner = QueryPlanner::new(&pool, &RequestCountCost, PlannerConfig::default());
        let insert = UpdateStatement::builder(&model, UpdateKind::Insert, "Tweet")
            .path(&["Tweet"])
            .build()
            .expect("insert");
        let maintenance = UpdatePlanner::new(&planner).plan(&Arc::new(insert));

        assert_eq!(maintenance.len(), 1);
        assert_eq!(maintenance[0].support().map(|s| s.len()), Some(0));
        assert_eq!(maintenance[0].steps().len(), 1);
        assert_eq!(maintenance[0].update_cost(), 1.0);
    }
}
