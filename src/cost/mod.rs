//! 代价模型模块
//!
//! 提供计划步骤代价估算的可插拔接口
//!
//! ## 模块结构
//!
//! - `config` - 代价模型配置
//! - `calculator` - 内置代价模型
//! - `selectivity` - 选择性估计常量与规则

pub mod calculator;
pub mod config;
pub mod selectivity;

pub use calculator::{ConfiguredCostModel, RequestCountCost};
pub use config::CostModelConfig;
pub use selectivity::SelectivityEstimator;

use std::fmt::Debug;

use crate::model::Index;

/// 代价模型接口
///
/// 每类计划步骤向代价模型询问自身代价，所需的基数信息由计划状态携带。
/// 实现必须是纯函数且线程安全，多条语句会并行规划。
pub trait CostModel: Send + Sync + Debug {
    /// 索引查找代价
    ///
    /// `lookups` 为分区查找次数，`rows` 为取回的条目数
    fn index_lookup_cost(&self, index: &Index, lookups: f64, rows: f64) -> f64;

    /// 内存过滤代价
    fn filter_cost(&self, rows: f64, conditions: usize) -> f64;

    /// 内存排序代价
    fn sort_cost(&self, rows: f64, keys: usize) -> f64;

    /// 截断代价
    fn limit_cost(&self, rows: f64, limit: u64) -> f64;

    /// 内存聚合代价
    fn aggregation_cost(&self, rows: f64, aggregates: usize, groups: usize) -> f64;

    /// 向索引插入条目的代价
    fn insert_cost(&self, index: &Index, rows: f64) -> f64;

    /// 从索引删除条目的代价
    fn delete_cost(&self, index: &Index, rows: f64) -> f64;

    /// 首次构建索引的代价
    fn load_cost(&self, index: &Index) -> f64;

    /// 模型名称
    fn name(&self) -> &str {
        "custom"
    }
}
