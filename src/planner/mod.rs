//! 查询规划器
//!
//! 对单条语句在候选索引池上做状态空间搜索，枚举所有能完整回答
//! 语句的步骤序列，并估计其代价。
//!
//! ## 模块结构
//!
//! - `state` - 计划状态，记录尚未完成的工作
//! - `step` - 步骤种类与非索引步骤的应用规则
//! - `lookup` - 索引查找步骤的有效性检查与状态推进
//! - `rules` - 父步骤兼容性规则表
//! - `tree` - 计划树与深度优先搜索
//! - `plan` - 叶子计划
//! - `validate` - 构建后的全局不变式检查
//! - `update` - 写语句的索引维护规划

pub mod lookup;
pub mod plan;
pub mod rules;
pub mod state;
pub mod step;
pub mod tree;
pub mod update;
pub mod validate;

pub use lookup::LookupContext;
pub use plan::Plan;
pub use rules::{ParentRule, Verdict, PARENT_RULES};
pub use state::{AnswerChecks, PlanningState};
pub use step::{PlanStep, StepKind};
pub use tree::{PlanTree, QueryPlanner, SearchStats, StepId, StepNode};
pub use update::{IndexMaintenance, SupportQuery, UpdatePlanner};
pub use validate::PlanValidator;
