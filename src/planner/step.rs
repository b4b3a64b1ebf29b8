//! 计划步骤
//!
//! 步骤种类是一个封闭的标签联合，每种步骤以纯函数
//! `apply(parent_state, candidate)` 的形式作用于计划状态，
//! 返回新的步骤与状态，或给出拒绝原因。索引查找的规则较多，
//! 放在 `lookup` 模块中。

use std::fmt;
use std::sync::Arc;

use crate::core::error::Rejection;
use crate::cost::{CostModel, SelectivityEstimator};
use crate::model::field::display_fields;
use crate::model::{AggregateField, FieldRef, Index};

use super::state::{AnswerChecks, PlanningState};

/// 步骤应用的结果：新步骤与其产生的状态
pub type Applied = (PlanStep, PlanningState);

/// 步骤种类
#[derive(Debug, Clone, PartialEq)]
pub enum StepKind {
    /// 搜索树的根，无代价
    Root,
    /// 索引查找，`lookups` 为分区查找次数
    IndexLookup { index: Arc<Index>, lookups: f64 },
    /// 内存过滤
    Filter {
        eq: Vec<FieldRef>,
        range: Vec<FieldRef>,
    },
    /// 内存排序
    Sort { fields: Vec<FieldRef> },
    /// 截断
    Limit { limit: u64 },
    /// 内存聚合
    Aggregate {
        aggregates: Vec<AggregateField>,
        group_by: Vec<FieldRef>,
    },
    /// 向索引插入条目（仅更新计划）
    Insert { index: Arc<Index> },
    /// 从索引删除条目（仅更新计划）
    Delete { index: Arc<Index> },
}

/// 计划步骤
#[derive(Debug, Clone, PartialEq)]
pub struct PlanStep {
    kind: StepKind,
    cost: f64,
    cardinality: f64,
}

impl PlanStep {
    pub(crate) fn new(kind: StepKind, cost: f64, cardinality: f64) -> Self {
        Self {
            kind,
            cost,
            cardinality,
        }
    }

    /// 根步骤
    pub fn root(state: &PlanningState) -> Self {
        Self::new(StepKind::Root, 0.0, state.cardinality())
    }

    pub fn kind(&self) -> &StepKind {
        &self.kind
    }

    /// 本步骤的代价（未乘权重）
    pub fn cost(&self) -> f64 {
        self.cost
    }

    /// 本步骤输出的估计行数
    pub fn cardinality(&self) -> f64 {
        self.cardinality
    }

    /// 本步骤绑定的索引
    pub fn index(&self) -> Option<&Arc<Index>> {
        match &self.kind {
            StepKind::IndexLookup { index, .. }
            | StepKind::Insert { index }
            | StepKind::Delete { index } => Some(index),
            _ => None,
        }
    }

    pub fn is_root(&self) -> bool {
        matches!(self.kind, StepKind::Root)
    }

    pub fn is_lookup(&self) -> bool {
        matches!(self.kind, StepKind::IndexLookup { .. })
    }

    pub fn is_filter(&self) -> bool {
        matches!(self.kind, StepKind::Filter { .. })
    }

    pub fn is_sort(&self) -> bool {
        matches!(self.kind, StepKind::Sort { .. })
    }

    /// 是否为聚合步骤或携带聚合的索引查找
    pub fn is_aggregating(&self) -> bool {
        match &self.kind {
            StepKind::Aggregate { .. } => true,
            StepKind::IndexLookup { index, .. } => index.is_aggregating(),
            _ => false,
        }
    }

    /// 过滤步骤：对已取回（或可经外键得到）的字段应用剩余等值与范围条件
    pub fn filter(state: &PlanningState, cost_model: &dyn CostModel) -> Result<Applied, Rejection> {
        if state.is_aggregated() {
            return Err(Rejection::AggregationIncompatible);
        }
        let eq: Vec<FieldRef> = state
            .eq()
            .iter()
            .filter(|f| state.is_fetched_or_reachable(f))
            .cloned()
            .collect();
        let range: Vec<FieldRef> = state
            .range()
            .iter()
            .filter(|f| state.is_fetched_or_reachable(f))
            .cloned()
            .collect();
        if eq.is_empty() && range.is_empty() {
            return Err(Rejection::NotApplicable);
        }

        let cost = cost_model.filter_cost(state.cardinality(), eq.len() + range.len());
        let mut next = state.clone();
        for field in eq.iter() {
            next.eq.remove(field);
        }
        for field in range.iter() {
            next.range.remove(field);
        }
        next.cardinality = SelectivityEstimator::apply(state.cardinality(), &eq, &range);
        next.settle_graph();

        let step = PlanStep::new(StepKind::Filter { eq, range }, cost, next.cardinality);
        Ok((step, next))
    }

    /// 排序步骤：其余工作完成后对已取回字段排序
    pub fn sort(state: &PlanningState, cost_model: &dyn CostModel) -> Result<Applied, Rejection> {
        if state.is_aggregated() {
            return Err(Rejection::AggregationIncompatible);
        }
        if state.order_by().is_empty()
            || !state.order_by().iter().all(|f| state.fetched().contains(f))
            || !state.is_answered_with(
                AnswerChecks::ALL
                    .without_order()
                    .without_limit()
                    .without_aggregate(),
            )
        {
            return Err(Rejection::NotApplicable);
        }

        let fields = state.order_by().to_vec();
        let cost = cost_model.sort_cost(state.cardinality(), fields.len());
        let mut next = state.clone();
        next.order_by.clear();

        let step = PlanStep::new(StepKind::Sort { fields }, cost, next.cardinality);
        Ok((step, next))
    }

    /// 截断步骤：仅剩 LIMIT 未满足时可用
    pub fn limit(state: &PlanningState, cost_model: &dyn CostModel) -> Result<Applied, Rejection> {
        if state.is_aggregated() {
            return Err(Rejection::AggregationIncompatible);
        }
        let limit = match state.query().limit() {
            Some(limit) => limit,
            None => return Err(Rejection::NotApplicable),
        };
        if state.cardinality() <= limit as f64
            || !state.is_answered_with(AnswerChecks::ALL.without_limit().without_aggregate())
        {
            return Err(Rejection::NotApplicable);
        }

        let cost = cost_model.limit_cost(state.cardinality(), limit);
        let mut next = state.clone();
        next.cardinality = limit as f64;

        let step = PlanStep::new(StepKind::Limit { limit }, cost, next.cardinality);
        Ok((step, next))
    }

    /// 聚合步骤：所有聚合与分组字段已取回，且其余工作均已完成
    pub fn aggregate(
        state: &PlanningState,
        cost_model: &dyn CostModel,
    ) -> Result<Applied, Rejection> {
        if state.is_aggregated() {
            return Err(Rejection::AggregationIncompatible);
        }
        if state.aggregates().is_empty() && state.group_by().is_empty() {
            return Err(Rejection::NotApplicable);
        }
        let fetched = state.aggregates().iter().all(|a| state.fetched().contains(&a.field))
            && state.group_by().iter().all(|f| state.fetched().contains(f));
        if !fetched || !state.is_answered_with(AnswerChecks::ALL.without_aggregate()) {
            return Err(Rejection::NotApplicable);
        }

        let aggregates: Vec<AggregateField> = state.aggregates().iter().cloned().collect();
        let group_by: Vec<FieldRef> = state.group_by().iter().cloned().collect();
        let cost = cost_model.aggregation_cost(state.cardinality(), aggregates.len(), group_by.len());

        let mut next = state.clone();
        next.aggregates.clear();
        next.group_by.clear();
        next.aggregated = true;
        next.cardinality = SelectivityEstimator::aggregate(state.cardinality(), &group_by);

        let step = PlanStep::new(
            StepKind::Aggregate {
                aggregates,
                group_by,
            },
            cost,
            next.cardinality,
        );
        Ok((step, next))
    }

    /// 插入步骤
    pub fn insert(index: Arc<Index>, rows: f64, cost_model: &dyn CostModel) -> Self {
        let cost = cost_model.insert_cost(&index, rows);
        Self::new(StepKind::Insert { index }, cost, rows)
    }

    /// 删除步骤
    pub fn delete(index: Arc<Index>, rows: f64, cost_model: &dyn CostModel) -> Self {
        let cost = cost_model.delete_cost(&index, rows);
        Self::new(StepKind::Delete { index }, cost, rows)
    }
}

impl fmt::Display for PlanStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            StepKind::Root => write!(f, "Root"),
            StepKind::IndexLookup { index, .. } => write!(f, "{}", index),
            StepKind::Filter { eq, range } => {
                let fields: Vec<&FieldRef> = eq.iter().chain(range.iter()).collect();
                write!(f, "filter{}", display_fields(fields))
            }
            StepKind::Sort { fields } => write!(f, "sort{}", display_fields(fields)),
            StepKind::Limit { limit } => write!(f, "limit {}", limit),
            StepKind::Aggregate {
                aggregates,
                group_by,
            } => {
                let names: Vec<String> = aggregates.iter().map(|a| a.to_string()).collect();
                write!(f, "aggregate[{}]", names.join(", "))?;
                if !group_by.is_empty() {
                    write!(f, " by {}", display_fields(group_by))?;
                }
                Ok(())
            }
            StepKind::Insert { index } => write!(f, "insert {}", index.key()),
            StepKind::Delete { index } => write!(f, "delete {}", index.key()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::{ConfiguredCostModel, RequestCountCost};
    use crate::model::{AggregateFunction, Entity, Model, Query, QueryGraph};

    fn model() -> Model {
        let tweet = Entity::builder("Tweet", 1000)
            .id("TweetId")
            .string("Body", 140)
            .integer("Retweets")
            .integer("Timestamp")
            .build()
            .expect("Tweet");
        Model::new().with_entity(tweet)
    }

    /// 模拟一次已经取回全部字段的索引查找
    fn fetched_state(query: Query, model: &Model) -> PlanningState {
        let mut state = PlanningState::new(Arc::new(query));
        let entity = model.entity("Tweet").expect("Tweet");
        state.fetched.extend(entity.fields().cloned());
        state.fields.clear();
        state.joins.clear();
        state.graph = QueryGraph::empty();
        state
    }

    #[test]
    fn test_filter_applies_fetched_conditions() {
        let model = model();
        let query = Query::builder(&model)
            .path(&["Tweet"])
            .select("Tweet.Body")
            .eq("Tweet.Timestamp")
            .range("Tweet.Retweets")
            .build()
            .expect("query");
        let state = fetched_state(query, &model);
        let (step, next) = PlanStep::filter(&state, &ConfiguredCostModel::default()).expect("filter");

        assert!(step.is_filter());
        assert!(step.cost() > 0.0);
        assert!(next.eq().is_empty());
        assert!(next.range().is_empty());
        assert!((next.cardinality() - 1000.0 / 1000.0 * 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_filter_requires_fetched_fields() {
        let model = model();
        let query = Query::builder(&model)
            .path(&["Tweet"])
            .select("Tweet.Body")
            .range("Tweet.Retweets")
            .build()
            .expect("query");
        let state = PlanningState::new(Arc::new(query));
        assert_eq!(
            PlanStep::filter(&state, &RequestCountCost).unwrap_err(),
            Rejection::NotApplicable
        );
    }

    #[test]
    fn test_sort_then_limit() {
        let model = model();
        let query = Query::builder(&model)
            .path(&["Tweet"])
            .select("Tweet.Body")
            .order_by("Tweet.Timestamp")
            .limit(10)
            .build()
            .expect("query");
        let state = fetched_state(query, &model);
        let cost_model = ConfiguredCostModel::default();

        assert!(PlanStep::limit(&state, &cost_model).is_err());
        let (sort, sorted) = PlanStep::sort(&state, &cost_model).expect("sort");
        assert!(sort.is_sort());
        assert!(sorted.order_by().is_empty());
        assert!(!sorted.is_answered());

        let (limit, limited) = PlanStep::limit(&sorted, &cost_model).expect("limit");
        assert_eq!(limit.cardinality(), 10.0);
        assert!(limited.is_answered());
    }

    #[test]
    fn test_aggregate_collapses_cardinality() {
        let model = model();
        let query = Query::builder(&model)
            .path(&["Tweet"])
            .aggregate(AggregateFunction::Sum, "Tweet.Retweets")
            .build()
            .expect("query");
        let state = fetched_state(query, &model);
        let cost_model = ConfiguredCostModel::default();
        let (step, next) = PlanStep::aggregate(&state, &cost_model).expect("aggregate");

        assert!(step.is_aggregating());
        assert_eq!(next.cardinality(), 1.0);
        assert!(next.is_answered());
        assert_eq!(
            PlanStep::filter(&next, &cost_model).unwrap_err(),
            Rejection::AggregationIncompatible
        );
        assert_eq!(
            PlanStep::aggregate(&next, &cost_model).unwrap_err(),
            Rejection::AggregationIncompatible
        );
    }
}
