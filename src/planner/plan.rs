//! 计划
//!
//! 计划树的一个叶子：从根到已回答状态的步骤序列

use std::fmt;
use std::sync::Arc;

use crate::model::{Index, Query};

use super::state::PlanningState;
use super::step::PlanStep;

/// 一条完整回答语句的计划
#[derive(Debug, Clone)]
pub struct Plan {
    query: Arc<Query>,
    steps: Vec<PlanStep>,
    state: PlanningState,
    cost: f64,
}

impl Plan {
    pub(crate) fn new(query: Arc<Query>, steps: Vec<PlanStep>, state: PlanningState) -> Self {
        let cost = steps.iter().map(|s| s.cost()).sum();
        Self {
            query,
            steps,
            state,
            cost,
        }
    }

    pub fn query(&self) -> &Arc<Query> {
        &self.query
    }

    /// 根之后的步骤
    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    /// 最后一步之后的状态
    pub fn final_state(&self) -> &PlanningState {
        &self.state
    }

    /// 总代价（未乘权重）
    pub fn cost(&self) -> f64 {
        self.cost
    }

    /// 乘以语句权重后的代价
    pub fn weighted_cost(&self) -> f64 {
        self.cost * self.query.weight()
    }

    /// 按出现顺序使用的索引
    pub fn indexes(&self) -> Vec<&Arc<Index>> {
        self.steps.iter().filter_map(|s| s.index()).collect()
    }

    pub fn uses_index(&self, index: &Index) -> bool {
        self.steps.iter().any(|s| s.index().map(|i| i.as_ref() == index).unwrap_or(false))
    }

    pub fn has_filter(&self) -> bool {
        self.steps.iter().any(|s| s.is_filter())
    }

    /// 估计的结果行数
    pub fn cardinality(&self) -> f64 {
        self.state.cardinality()
    }

    /// 步骤序列与代价均相同
    pub fn same_as(&self, other: &Plan) -> bool {
        self.steps == other.steps && (self.cost - other.cost).abs() < f64::EPSILON
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let steps: Vec<String> = self.steps.iter().map(|s| s.to_string()).collect();
        write!(f, "{}", steps.join(" -> "))
    }
}
