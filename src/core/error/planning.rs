//! 计划搜索错误类型
//!
//! - `Rejection`：候选步骤不满足某条有效性规则，只裁剪当前分支
//! - `PlanningError`：整条语句的规划失败或代价表不一致

use thiserror::Error;

/// 候选步骤被拒绝的原因
///
/// 在搜索中频繁出现，仅用于日志与测试断言
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Rejection {
    #[error("索引图未覆盖连接顺序的首个实体")]
    JoinHeadMissing,

    #[error("索引图的边不在剩余连接顺序中")]
    JoinEdgesNotImplied,

    #[error("单实体索引只能作为首步或剩余图仅含一个实体时使用")]
    BackwardLookup,

    #[error("连续两次对同一实体进行标识符查找")]
    RepeatedIdentityLookup,

    #[error("未使用上一步产生的标识符")]
    ParentIdUnused,

    #[error("分区字段尚未绑定")]
    PartitionUnbound,

    #[error("索引缺少过滤或排序所需字段")]
    MissingLocalFields,

    #[error("叶子实体既无标识符也无全部所需字段")]
    LeafIncomplete,

    #[error("聚合索引与剩余分组或父步骤不兼容")]
    AggregationIncompatible,

    #[error("同一分支已使用该索引")]
    IndexReused,

    #[error("索引查找次数超过上限")]
    LookupLimit,

    #[error("步骤不适用于当前状态")]
    NotApplicable,
}

/// 计划搜索错误
#[derive(Error, Debug, Clone)]
pub enum PlanningError {
    /// 候选索引池无法回答该语句
    #[error("语句无可用计划: {statement}\n最终搜索树:\n{tree}")]
    NoPlanFound { statement: String, tree: String },

    /// 两个均无过滤步骤的计划对同一 (语句, 索引) 给出不同代价
    #[error("代价不一致: 语句 {statement} 在索引 {index} 上的代价 {existing} 与 {found} 不符")]
    InconsistentCost {
        statement: String,
        index: String,
        existing: f64,
        found: f64,
    },

    /// 计划违反全局不变式
    #[error("计划验证失败: {0}")]
    InvalidPlan(String),
}

/// 计划结果类型
pub type PlanningResult<T> = Result<T, PlanningError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_plan_found_contains_statement() {
        let err = PlanningError::NoPlanFound {
            statement: "SELECT Tweet.Body FROM Tweet WHERE Tweet.TweetId = ?".to_string(),
            tree: "Root".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("Tweet.TweetId"));
        assert!(message.contains("Root"));
    }

    #[test]
    fn test_rejection_display() {
        assert!(Rejection::PartitionUnbound.to_string().contains("分区字段"));
    }
}
