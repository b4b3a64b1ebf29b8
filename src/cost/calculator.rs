//! 代价计算器模块
//!
//! 内置两种代价模型：
//! - `RequestCountCost`：只统计存储请求次数
//! - `ConfiguredCostModel`：按请求、行、字节与 CPU 参数计算

use super::config::CostModelConfig;
use super::CostModel;
use crate::model::Index;

/// 请求计数代价模型
///
/// 每次分区查找计一次请求，内存操作不计代价
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestCountCost;

impl CostModel for RequestCountCost {
    fn index_lookup_cost(&self, _index: &Index, lookups: f64, _rows: f64) -> f64 {
        lookups.max(1.0)
    }

    fn filter_cost(&self, _rows: f64, _conditions: usize) -> f64 {
        0.0
    }

    fn sort_cost(&self, _rows: f64, _keys: usize) -> f64 {
        0.0
    }

    fn limit_cost(&self, _rows: f64, _limit: u64) -> f64 {
        0.0
    }

    fn aggregation_cost(&self, _rows: f64, _aggregates: usize, _groups: usize) -> f64 {
        0.0
    }

    fn insert_cost(&self, _index: &Index, rows: f64) -> f64 {
        rows.max(1.0)
    }

    fn delete_cost(&self, _index: &Index, rows: f64) -> f64 {
        rows.max(1.0)
    }

    fn load_cost(&self, index: &Index) -> f64 {
        index.partition_count()
    }

    fn name(&self) -> &str {
        "request_count"
    }
}

/// 参数化代价模型
#[derive(Debug, Clone, Default)]
pub struct ConfiguredCostModel {
    config: CostModelConfig,
}

impl ConfiguredCostModel {
    /// 创建新的代价模型
    pub fn new(config: CostModelConfig) -> Self {
        Self { config }
    }

    /// 获取配置
    pub fn config(&self) -> &CostModelConfig {
        &self.config
    }

    fn read_cost(&self, index: &Index, rows: f64) -> f64 {
        rows * (self.config.row_cost + index.entry_size() as f64 * self.config.byte_cost)
    }
}

impl CostModel for ConfiguredCostModel {
    fn index_lookup_cost(&self, index: &Index, lookups: f64, rows: f64) -> f64 {
        lookups.max(1.0) * self.config.request_cost + self.read_cost(index, rows)
    }

    fn filter_cost(&self, rows: f64, conditions: usize) -> f64 {
        rows * conditions.max(1) as f64 * self.config.cpu_row_cost
    }

    fn sort_cost(&self, rows: f64, keys: usize) -> f64 {
        let n = rows.max(2.0);
        n * n.log2() * keys.max(1) as f64 * self.config.sort_comparison_cost
    }

    fn limit_cost(&self, rows: f64, limit: u64) -> f64 {
        rows.min(limit as f64) * self.config.cpu_row_cost
    }

    fn aggregation_cost(&self, rows: f64, aggregates: usize, groups: usize) -> f64 {
        rows * (aggregates + groups).max(1) as f64 * self.config.aggregate_row_cost
    }

    fn insert_cost(&self, index: &Index, rows: f64) -> f64 {
        rows.max(1.0)
            * (self.config.write_request_cost + index.entry_size() as f64 * self.config.byte_cost)
    }

    fn delete_cost(&self, _index: &Index, rows: f64) -> f64 {
        rows.max(1.0) * self.config.write_request_cost
    }

    fn load_cost(&self, index: &Index) -> f64 {
        index.partition_count() * self.config.write_request_cost + self.read_cost(index, index.entries())
    }

    fn name(&self) -> &str {
        "configured"
    }
}
