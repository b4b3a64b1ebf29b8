//! 顾问配置
//!
//! 以 TOML 文件加载与保存，各关注点一个小节：
//! `planner`、`optimizer`、`cost`、`log`

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::core::error::{AdvisorError, AdvisorResult};
use crate::cost::CostModelConfig;

/// 查询规划配置
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct PlannerConfig {
    /// 每条计划允许的索引查找次数上限
    pub max_index_lookups: Option<usize>,
    /// 仅保留代价不超过最小计划该倍数的计划
    pub cost_ratio: Option<f64>,
    /// 同一节点候选索引数达到该值时并行验证
    pub parallel_threshold: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_index_lookups: None,
            cost_ratio: None,
            parallel_threshold: 64,
        }
    }
}

/// 全局优化配置
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct OptimizerConfig {
    /// 索引总大小上限（字节），未设置时不限
    pub space_budget: Option<f64>,
    /// 同一 (语句, 索引) 代价的容差
    pub cost_tolerance: f64,
    /// 分支定界的节点上限
    pub max_nodes: usize,
    /// 求解前移除单个就超出预算的索引
    pub prune_oversized: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            space_budget: None,
            cost_tolerance: 0.001,
            max_nodes: 1_000_000,
            prune_oversized: true,
        }
    }
}

/// 日志配置
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub dir: String,
    pub file: String,
    pub max_file_size: u64,
    pub max_files: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: "logs".to_string(),
            file: "schema_advisor".to_string(),
            max_file_size: 100 * 1024 * 1024, // 100MB
            max_files: 5,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AdvisorConfig {
    pub planner: PlannerConfig,
    pub optimizer: OptimizerConfig,
    pub cost: CostModelConfig,
    pub log: LogConfig,
}

impl AdvisorConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> AdvisorResult<Self> {
        let content = fs::read_to_string(path)?;
        let config: AdvisorConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> AdvisorResult<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// 以给定的空间预算复制配置
    pub fn with_space_budget(mut self, budget: f64) -> Self {
        self.optimizer.space_budget = Some(budget);
        self
    }

    pub fn with_cost_ratio(mut self, ratio: f64) -> Self {
        self.planner.cost_ratio = Some(ratio);
        self
    }

    pub fn with_max_index_lookups(mut self, max: usize) -> Self {
        self.planner.max_index_lookups = Some(max);
        self
    }

    /// 检查取值范围
    pub fn validate(&self) -> AdvisorResult<()> {
        if let Some(budget) = self.optimizer.space_budget {
            if !(budget >= 0.0) {
                return Err(AdvisorError::Config(format!("空间预算非法: {}", budget)));
            }
        }
        if let Some(ratio) = self.planner.cost_ratio {
            if !(ratio >= 1.0) {
                return Err(AdvisorError::Config(format!("代价比必须不小于 1: {}", ratio)));
            }
        }
        if let Some((name, value)) = self.cost.first_negative() {
            return Err(AdvisorError::Config(format!("单位代价 {} 非法: {}", name, value)));
        }
        if !(self.optimizer.cost_tolerance >= 0.0) {
            return Err(AdvisorError::Config(format!(
                "代价容差非法: {}",
                self.optimizer.cost_tolerance
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_default() {
        let config = AdvisorConfig::default();
        assert_eq!(config.optimizer.space_budget, None);
        assert_eq!(config.optimizer.cost_tolerance, 0.001);
        assert_eq!(config.log.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_load_save() {
        let config = AdvisorConfig::default()
            .with_space_budget(1024.0)
            .with_cost_ratio(2.0);
        let temp_file = NamedTempFile::new().expect("Failed to create temporary file");
        config.save(temp_file.path()).expect("Failed to save config");

        let loaded = AdvisorConfig::load(temp_file.path()).expect("Failed to load config");
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_config_partial_sections() {
        let mut temp_file = NamedTempFile::new().expect("Failed to create temporary file");
        temp_file
            .write_all(b"[optimizer]\nspace_budget = 500.0\n\n[planner]\nmax_index_lookups = 2\n")
            .expect("Failed to write TOML content to temporary file");

        let loaded = AdvisorConfig::load(temp_file.path()).expect("Failed to load config");
        assert_eq!(loaded.optimizer.space_budget, Some(500.0));
        assert_eq!(loaded.optimizer.max_nodes, 1_000_000);
        assert_eq!(loaded.planner.max_index_lookups, Some(2));
        assert_eq!(loaded.planner.parallel_threshold, 64);
    }

    #[test]
    fn test_config_rejects_invalid_ratio() {
        let mut temp_file = NamedTempFile::new().expect("Failed to create temporary file");
        temp_file
            .write_all(b"[planner]\ncost_ratio = 0.5\n")
            .expect("Failed to write TOML content to temporary file");
        assert!(matches!(
            AdvisorConfig::load(temp_file.path()),
            Err(AdvisorError::Config(_))
        ));
    }

    #[test]
    fn test_config_rejects_negative_unit_cost() {
        let mut config = AdvisorConfig::default();
        config.cost = config.cost.with_row_cost(-0.5);
        match config.validate() {
            Err(AdvisorError::Config(message)) => assert!(message.contains("row_cost")),
            other => panic!("期望配置错误，实际 {:?}", other),
        }
    }
}
