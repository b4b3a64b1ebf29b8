//! Schema Advisor - 面向 NoSQL 列族存储的代价驱动物理模式设计器
//!
//! 给定带权重的读写语句工作负载与候选索引池，为每条语句搜索全部
//! 有效的执行计划，再在空间预算下通过 0-1 整数规划同时选出要物化
//! 的索引集合与每条语句使用的计划。
//!
//! ## 模块结构
//!
//! - `model` - 实体、字段、查询图、索引与语句
//! - `cost` - 可插拔代价模型
//! - `planner` - 计划状态、计划步骤与计划树搜索
//! - `optimizer` - 代价聚合、整数规划与结果
//! - `config` - TOML 配置
//! - `utils` - 日志

pub mod config;
pub mod core;
pub mod cost;
pub mod model;
pub mod optimizer;
pub mod planner;
pub mod utils;

pub use crate::config::AdvisorConfig;
pub use crate::core::error::{AdvisorError, AdvisorResult};
pub use crate::optimizer::{SchemaSearch, SearchResult};
pub use crate::planner::{Plan, PlanTree, QueryPlanner};
