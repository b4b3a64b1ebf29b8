//! 模型错误类型
//!
//! 实体、字段、查询图、索引与语句在构建时的校验失败。
//! 此类错误在构建阶段即刻报告，不会进入计划搜索。

use thiserror::Error;

/// 模型构建错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    /// 未知实体
    #[error("未知实体: {0}")]
    UnknownEntity(String),

    /// 未知字段
    #[error("未知字段: {0}")]
    UnknownField(String),

    /// 索引定义非法（分区字段为空、跨实体、聚合字段越界等）
    #[error("索引定义非法: {0}")]
    MalformedIndex(String),

    /// 语句定义非法
    #[error("语句定义非法: {0}")]
    InvalidStatement(String),

    /// 查询图不连通或缺少外键
    #[error("查询图不连通: {0}")]
    DisconnectedGraph(String),

    /// 实体定义非法
    #[error("实体定义非法: {0}")]
    InvalidEntity(String),
}

/// 模型结果类型
pub type ModelResult<T> = Result<T, ModelError>;
