//! 优化器错误类型
//!
//! 定义全局索引选择相关的错误类型，包括：
//! - 预算下无可行解
//! - 求解器搜索上限
//! - 规划阶段传递上来的错误

use thiserror::Error;

use super::planning::PlanningError;

/// 优化器错误类型
#[derive(Error, Debug, Clone)]
pub enum OptimizeError {
    /// 预算约束下整数规划不可行
    #[error("空间预算 {} 下无可行解", display_budget(.budget))]
    NoSolution { budget: Option<f64> },

    /// 求解器超过节点上限且未找到可行解
    #[error("求解器在 {nodes} 个节点内未找到可行解")]
    SolverLimit { nodes: usize },

    /// 规划错误
    #[error("{0}")]
    Planning(#[from] PlanningError),

    /// 内部优化错误
    #[error("内部优化错误: {0}")]
    InternalError(String),
}

/// 优化器结果类型
pub type OptimizeResult<T> = Result<T, OptimizeError>;

/// 求解器错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    /// 不可行
    #[error("问题不可行")]
    Infeasible,

    /// 节点上限
    #[error("超过节点上限: {nodes}")]
    NodeLimit { nodes: usize },
}

fn display_budget(budget: &Option<f64>) -> String {
    match budget {
        Some(b) => format!("{}", b),
        None => "无限制".to_string(),
    }
}
