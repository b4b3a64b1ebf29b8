//! 数据模型模块
//!
//! 实体、字段、查询图、索引与语句均为构建后不可变的值对象
//!
//! ## 模块结构
//!
//! - `field` - 字段及其语义类型
//! - `entity` - 实体与模型注册表
//! - `graph` - 查询图
//! - `index` - 候选索引
//! - `statement` - 读写语句
//! - `workload` - 工作负载

pub mod entity;
pub mod field;
pub mod graph;
pub mod index;
pub mod statement;
pub mod workload;

pub use entity::{Entity, EntityBuilder, Model};
pub use field::{Field, FieldRef, FieldType};
pub use graph::{GraphEdge, QueryGraph};
pub use index::{AggregateField, AggregateFunction, Index, IndexBuilder};
pub use statement::{Query, QueryBuilder, Statement, UpdateBuilder, UpdateKind, UpdateStatement};
pub use workload::Workload;
