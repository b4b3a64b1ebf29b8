//! 全局优化器
//!
//! 把各语句的计划树归约为代价表，组装 0-1 整数规划，
//! 在空间预算下选择索引集合与每条语句的计划。
//!
//! ## 模块结构
//!
//! - `aggregate` - 计划分段与 (语句, 索引) 代价表
//! - `milp` - 整数规划模型、求解器接口与分支定界后端
//! - `problem` - 优化问题的组装、预处理与结果提取
//! - `result` - 搜索结果与维护计划
//! - `search` - 工作负载级别的编排

pub mod aggregate;
pub mod milp;
pub mod problem;
pub mod result;
pub mod search;

pub use aggregate::{aggregate_costs, plan_runs, CostEntry, CostedPlan, PlanRun, StatementCosts};
pub use milp::{Assignment, BranchAndBoundSolver, Constraint, MilpProblem, MilpSolver, Sense, VarId, Variable};
pub use problem::{MaintenanceCosts, OptimizationProblem};
pub use result::{SearchResult, UpdatePlan};
pub use search::SchemaSearch;
