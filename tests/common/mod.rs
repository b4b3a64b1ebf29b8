//! 集成测试共享工具模块
//!
//! 提供测试基础设施和辅助函数，供所有集成测试使用

pub mod assertions;
pub mod data_fixtures;

use std::sync::Arc;

use schema_advisor::cost::{ConfiguredCostModel, CostModelConfig};
use schema_advisor::model::{FieldRef, Index, Model, QueryGraph};

/// 默认配置的代价模型
pub fn cost_model() -> ConfiguredCostModel {
    ConfiguredCostModel::new(CostModelConfig::default())
}

/// 按 `Entity.Field` 取字段
pub fn field(model: &Model, name: &str) -> FieldRef {
    model
        .field(name)
        .unwrap_or_else(|e| panic!("字段 {} 不存在: {}", name, e))
}

/// 沿实体路径构建索引
pub fn index(
    model: &Model,
    path: &[&str],
    partition: &[&str],
    ordered: &[&str],
    extra: &[&str],
) -> Arc<Index> {
    let graph = QueryGraph::from_path(model, path).expect("索引路径应有效");
    let index = Index::builder(graph)
        .fields(
            partition.iter().map(|f| field(model, f)).collect::<Vec<_>>(),
            ordered.iter().map(|f| field(model, f)).collect::<Vec<_>>(),
            extra.iter().map(|f| field(model, f)).collect::<Vec<_>>(),
        )
        .build()
        .expect("索引应构建成功");
    Arc::new(index)
}
