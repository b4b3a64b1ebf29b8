//! 计划状态模块
//!
//! 记录某条分支上尚未完成的工作：待取字段、剩余的等值/范围/排序/
//! 分组/聚合谓词、收缩中的查询图与连接顺序，以及基数估计。
//! 状态是不可变值，每个步骤的应用都返回新的状态。

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::model::field::display_fields;
use crate::model::{AggregateField, FieldRef, Query, QueryGraph};

/// 判定“已回答”时启用的检查项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerChecks {
    pub limit: bool,
    pub order: bool,
    pub aggregate: bool,
}

impl AnswerChecks {
    /// 全部检查
    pub const ALL: AnswerChecks = AnswerChecks {
        limit: true,
        order: true,
        aggregate: true,
    };

    pub fn without_limit(mut self) -> Self {
        self.limit = false;
        self
    }

    pub fn without_order(mut self) -> Self {
        self.order = false;
        self
    }

    pub fn without_aggregate(mut self) -> Self {
        self.aggregate = false;
        self
    }
}

impl Default for AnswerChecks {
    fn default() -> Self {
        Self::ALL
    }
}

/// 计划状态
#[derive(Debug, Clone)]
pub struct PlanningState {
    query: Arc<Query>,
    pub(crate) fields: BTreeSet<FieldRef>,
    pub(crate) eq: BTreeSet<FieldRef>,
    pub(crate) range: BTreeSet<FieldRef>,
    pub(crate) order_by: Vec<FieldRef>,
    pub(crate) group_by: BTreeSet<FieldRef>,
    pub(crate) aggregates: BTreeSet<AggregateField>,
    pub(crate) graph: QueryGraph,
    pub(crate) joins: Vec<String>,
    pub(crate) fetched: BTreeSet<FieldRef>,
    pub(crate) aggregated: bool,
    pub(crate) cardinality: f64,
    pub(crate) hash_cardinality: f64,
}

impl PlanningState {
    /// 由语句创建初始状态
    pub fn new(query: Arc<Query>) -> Self {
        let cardinality = query
            .join_order()
            .first()
            .and_then(|name| query.graph().entity(name))
            .map(|e| e.count() as f64)
            .unwrap_or(1.0);

        Self {
            fields: query.required_fields(),
            eq: query.eq().clone(),
            range: query.range().clone(),
            order_by: query.order_by().to_vec(),
            group_by: query.group_by().clone(),
            aggregates: query.aggregates().clone(),
            graph: query.graph().clone(),
            joins: query.join_order().to_vec(),
            fetched: BTreeSet::new(),
            aggregated: false,
            cardinality,
            hash_cardinality: 1.0,
            query,
        }
    }

    pub fn query(&self) -> &Arc<Query> {
        &self.query
    }

    /// 尚待取回的字段
    pub fn fields(&self) -> &BTreeSet<FieldRef> {
        &self.fields
    }

    pub fn eq(&self) -> &BTreeSet<FieldRef> {
        &self.eq
    }

    pub fn range(&self) -> &BTreeSet<FieldRef> {
        &self.range
    }

    pub fn order_by(&self) -> &[FieldRef] {
        &self.order_by
    }

    pub fn group_by(&self) -> &BTreeSet<FieldRef> {
        &self.group_by
    }

    pub fn aggregates(&self) -> &BTreeSet<AggregateField> {
        &self.aggregates
    }

    pub fn graph(&self) -> &QueryGraph {
        &self.graph
    }

    /// 剩余连接顺序
    pub fn joins(&self) -> &[String] {
        &self.joins
    }

    /// 本分支已取回的字段
    pub fn fetched(&self) -> &BTreeSet<FieldRef> {
        &self.fetched
    }

    /// 本分支是否已经执行过聚合
    pub fn is_aggregated(&self) -> bool {
        self.aggregated
    }

    /// 估计的结果行数
    pub fn cardinality(&self) -> f64 {
        self.cardinality
    }

    /// 最近一次索引查找的分区查找次数
    pub fn hash_cardinality(&self) -> f64 {
        self.hash_cardinality
    }

    /// 语句给定取值的字段
    pub fn given_fields(&self) -> &BTreeSet<FieldRef> {
        self.query.eq()
    }

    /// 字段是否已绑定：已取回、语句给定，或可经外键得到的标识符
    pub fn is_bound(&self, field: &FieldRef) -> bool {
        self.given_fields().contains(field) || self.is_fetched_or_reachable(field)
    }

    /// 字段已取回，或为某实体标识符且已取回指向该实体的外键
    pub fn is_fetched_or_reachable(&self, field: &FieldRef) -> bool {
        if self.fetched.contains(field) {
            return true;
        }
        field.is_id()
            && self
                .fetched
                .iter()
                .any(|f| f.foreign_target() == Some(field.entity()))
    }

    /// 全部检查下是否已回答
    pub fn is_answered(&self) -> bool {
        self.is_answered_with(AnswerChecks::ALL)
    }

    /// 按给定检查项判断是否已回答
    pub fn is_answered_with(&self, checks: AnswerChecks) -> bool {
        let mut done = self.fields.is_empty()
            && self.eq.is_empty()
            && self.range.is_empty()
            && self.joins.is_empty()
            && self.graph.is_empty();
        if checks.order {
            done = done && self.order_by.is_empty();
        }
        if checks.aggregate {
            done = done && self.aggregates.is_empty() && self.group_by.is_empty();
        }
        if checks.limit {
            if let Some(limit) = self.query.limit() {
                done = done && self.cardinality <= limit as f64;
            }
        }
        done
    }

    /// 实体是否仍需要一次索引查找
    pub(crate) fn entity_needed(&self, entity: &str) -> bool {
        self.fields.iter().any(|f| f.entity() == entity)
            || self
                .eq
                .iter()
                .chain(self.range.iter())
                .chain(self.order_by.iter())
                .any(|f| f.entity() == entity && !self.is_fetched_or_reachable(f))
    }

    /// 若剩余连接只剩一个且其上已无待办工作，清空图与连接顺序
    pub(crate) fn settle_graph(&mut self) {
        if self.joins.len() == 1 && !self.entity_needed(&self.joins[0]) {
            self.joins.clear();
            self.graph = QueryGraph::empty();
        }
    }

    /// 若仅剩 LIMIT 未满足，按 LIMIT 截断基数
    pub(crate) fn settle_limit(&mut self) {
        if let Some(limit) = self.query.limit() {
            if self.is_answered_with(AnswerChecks::ALL.without_limit()) {
                self.cardinality = self.cardinality.min(limit as f64);
            }
        }
    }
}

impl fmt::Display for PlanningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "语句: {}", self.query.text())?;
        writeln!(f, "  待取字段: {}", display_fields(&self.fields))?;
        writeln!(f, "  等值条件: {}", display_fields(&self.eq))?;
        writeln!(f, "  范围条件: {}", display_fields(&self.range))?;
        writeln!(f, "  排序字段: {}", display_fields(&self.order_by))?;
        writeln!(f, "  分组字段: {}", display_fields(&self.group_by))?;
        let aggregates: Vec<String> = self.aggregates.iter().map(|a| a.to_string()).collect();
        writeln!(f, "  聚合: [{}]", aggregates.join(", "))?;
        writeln!(f, "  连接顺序: [{}]", self.joins.join(", "))?;
        write!(
            f,
            "  基数: {:.2} (分区查找 {:.2})",
            self.cardinality, self.hash_cardinality
        )
    }
}
