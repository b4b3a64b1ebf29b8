//! 单位代价参数
//!
//! 分区存储上的读取按请求、条目、字节三级计价，写入按条目计价，
//! 内存中的排序、过滤与聚合按行计价。
//!
//! ```rust
//! use schema_advisor::cost::CostModelConfig;
//!
//! let ssd = CostModelConfig::for_ssd().with_byte_cost(0.0002);
//! assert!(ssd.request_cost < CostModelConfig::default().request_cost);
//! assert!(ssd.first_negative().is_none());
//! ```

use serde::{Deserialize, Serialize};

/// 各类操作的单位代价，缺省字段在反序列化时取默认值
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostModelConfig {
    /// 每次分区请求
    pub request_cost: f64,
    /// 每取回一个条目
    pub row_cost: f64,
    /// 每取回一个字节
    pub byte_cost: f64,
    /// 过滤、截断时每行
    pub cpu_row_cost: f64,
    /// 排序时每次比较
    pub sort_comparison_cost: f64,
    /// 每行每个聚合表达式
    pub aggregate_row_cost: f64,
    /// 每写入或删除一个条目
    pub write_request_cost: f64,
}

impl Default for CostModelConfig {
    fn default() -> Self {
        Self {
            request_cost: 1.0,
            row_cost: 0.01,
            byte_cost: 0.0001,
            cpu_row_cost: 0.001,
            sort_comparison_cost: 0.002,
            aggregate_row_cost: 0.002,
            write_request_cost: 2.0,
        }
    }
}

impl CostModelConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// 随机访问便宜的存储，请求与写入的固定成本约为默认的三成
    pub fn for_ssd() -> Self {
        Self::default()
            .with_request_cost(0.3)
            .with_write_request_cost(0.6)
    }

    /// 数据常驻内存，字节传输不计价
    pub fn for_in_memory() -> Self {
        Self::default()
            .with_request_cost(0.05)
            .with_row_cost(0.001)
            .with_byte_cost(0.0)
            .with_write_request_cost(0.1)
    }

    pub fn with_request_cost(self, request_cost: f64) -> Self {
        Self { request_cost, ..self }
    }

    pub fn with_row_cost(self, row_cost: f64) -> Self {
        Self { row_cost, ..self }
    }

    pub fn with_byte_cost(self, byte_cost: f64) -> Self {
        Self { byte_cost, ..self }
    }

    pub fn with_cpu_row_cost(self, cpu_row_cost: f64) -> Self {
        Self { cpu_row_cost, ..self }
    }

    pub fn with_write_request_cost(self, write_request_cost: f64) -> Self {
        Self {
            write_request_cost,
            ..self
        }
    }

    fn named_costs(&self) -> [(&'static str, f64); 7] {
        [
            ("request_cost", self.request_cost),
            ("row_cost", self.row_cost),
            ("byte_cost", self.byte_cost),
            ("cpu_row_cost", self.cpu_row_cost),
            ("sort_comparison_cost", self.sort_comparison_cost),
            ("aggregate_row_cost", self.aggregate_row_cost),
            ("write_request_cost", self.write_request_cost),
        ]
    }

    /// 第一个为负或非数的单位代价
    pub fn first_negative(&self) -> Option<(&'static str, f64)> {
        self.named_costs()
            .into_iter()
            .find(|(_, value)| !(*value >= 0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_only_touch_storage_costs() {
        let base = CostModelConfig::default();
        let ssd = CostModelConfig::for_ssd();
        let memory = CostModelConfig::for_in_memory();

        assert_eq!(base.request_cost, 1.0);
        assert_eq!(ssd.request_cost, 0.3);
        assert_eq!(ssd.row_cost, base.row_cost);
        assert_eq!(memory.byte_cost, 0.0);
        assert_eq!(memory.sort_comparison_cost, base.sort_comparison_cost);
    }

    #[test]
    fn test_setters_chain() {
        let config = CostModelConfig::new()
            .with_request_cost(0.5)
            .with_row_cost(0.02)
            .with_cpu_row_cost(0.01);

        assert_eq!(config.request_cost, 0.5);
        assert_eq!(config.row_cost, 0.02);
        assert_eq!(config.cpu_row_cost, 0.01);
        assert_eq!(config.byte_cost, 0.0001);
    }

    #[test]
    fn test_first_negative() {
        assert!(CostModelConfig::default().first_negative().is_none());
        let bad = CostModelConfig::default().with_byte_cost(-1.0);
        assert_eq!(bad.first_negative(), Some(("byte_cost", -1.0)));
        let nan = CostModelConfig::default().with_row_cost(f64::NAN);
        assert_eq!(nan.first_negative().map(|(name, _)| name), Some("row_cost"));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: CostModelConfig = toml::from_str("request_cost = 3.0").expect("解析失败");
        assert_eq!(config.request_cost, 3.0);
        assert_eq!(config.row_cost, 0.01);
    }
}
