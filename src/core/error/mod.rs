//! 统一错误处理系统
//!
//! ## 设计理念
//!
//! 1. **按领域拆分**：模型构建、计划搜索、全局优化各自拥有错误枚举
//! 2. **分层转换**：子错误使用 `#[from]` 注解自动转换为 `AdvisorError`
//! 3. **统一接口**：`AdvisorResult<T>` 提供统一的返回类型，简化错误传播
//!
//! 候选索引在某一步骤上失效（`Rejection`）属于搜索的正常分支裁剪，
//! 不会转换为 `AdvisorError`。

use thiserror::Error;

pub mod model;
pub mod optimize;
pub mod planning;

pub use model::{ModelError, ModelResult};
pub use optimize::{OptimizeError, OptimizeResult, SolverError};
pub use planning::{PlanningError, PlanningResult, Rejection};

/// 统一的顾问错误类型
#[derive(Error, Debug, Clone)]
pub enum AdvisorError {
    #[error("模型错误: {0}")]
    Model(#[from] ModelError),

    #[error("计划错误: {0}")]
    Planning(#[from] PlanningError),

    #[error("优化错误: {0}")]
    Optimize(#[from] OptimizeError),

    #[error("配置错误: {0}")]
    Config(String),

    #[error("IO错误: {0}")]
    Io(String),
}

/// 统一的结果类型
pub type AdvisorResult<T> = Result<T, AdvisorError>;

impl From<std::io::Error> for AdvisorError {
    fn from(err: std::io::Error) -> Self {
        AdvisorError::Io(err.to_string())
    }
}

impl From<toml::de::Error> for AdvisorError {
    fn from(err: toml::de::Error) -> Self {
        AdvisorError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for AdvisorError {
    fn from(err: toml::ser::Error) -> Self {
        AdvisorError::Config(err.to_string())
    }
}
