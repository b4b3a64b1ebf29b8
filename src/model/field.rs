//! 字段模块
//!
//! 字段隶属于唯一的实体，携带语义类型、基数估计与字节大小

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// 共享字段引用
///
/// 字段在模型构建后不可变，计划状态与索引之间通过 `Arc` 共享
pub type FieldRef = Arc<Field>;

/// 字段语义类型
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// 实体标识符
    Id,
    Integer,
    Float,
    /// 字符串，携带平均长度
    String { length: u64 },
    Date,
    /// 外键，指向目标实体
    ForeignKey { target: String },
}

impl FieldType {
    /// 该类型的默认字节大小
    pub fn default_size(&self) -> u64 {
        match self {
            FieldType::Id | FieldType::ForeignKey { .. } => 16,
            FieldType::Integer | FieldType::Float | FieldType::Date => 8,
            FieldType::String { length } => *length,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FieldType::Id => "id",
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::String { .. } => "string",
            FieldType::Date => "date",
            FieldType::ForeignKey { .. } => "foreign_key",
        }
    }
}

/// 字段定义
///
/// 相等性与排序仅由 `(实体名, 字段名)` 决定，统计信息不参与比较
#[derive(Debug, Clone)]
pub struct Field {
    name: String,
    entity: String,
    field_type: FieldType,
    cardinality: u64,
    size: u64,
    /// 组合主键的伙伴字段（仅标识符字段使用）
    composite: Vec<String>,
}

impl Field {
    pub fn new(entity: impl Into<String>, name: impl Into<String>, field_type: FieldType) -> Self {
        let size = field_type.default_size();
        Self {
            name: name.into(),
            entity: entity.into(),
            field_type,
            cardinality: 1,
            size,
            composite: Vec::new(),
        }
    }

    /// 设置基数估计（至少为 1）
    pub fn with_cardinality(mut self, cardinality: u64) -> Self {
        self.cardinality = cardinality.max(1);
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    /// 设置组合主键伙伴字段
    pub fn with_composite(mut self, partners: Vec<String>) -> Self {
        self.composite = partners;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn field_type(&self) -> &FieldType {
        &self.field_type
    }

    pub fn cardinality(&self) -> u64 {
        self.cardinality
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn composite(&self) -> &[String] {
        &self.composite
    }

    pub fn is_id(&self) -> bool {
        matches!(self.field_type, FieldType::Id)
    }

    pub fn is_composite_id(&self) -> bool {
        self.is_id() && !self.composite.is_empty()
    }

    /// 外键指向的实体
    pub fn foreign_target(&self) -> Option<&str> {
        match &self.field_type {
            FieldType::ForeignKey { target } => Some(target),
            _ => None,
        }
    }

    /// 完整名称，形如 `Tweet.Body`
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.entity, self.name)
    }
}

impl PartialEq for Field {
    fn eq(&self, other: &Self) -> bool {
        self.entity == other.entity && self.name == other.name
    }
}

impl Eq for Field {}

impl Hash for Field {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.entity.hash(state);
        self.name.hash(state);
    }
}

impl PartialOrd for Field {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Field {
    fn cmp(&self, other: &Self) -> Ordering {
        self.entity
            .cmp(&other.entity)
            .then_with(|| self.name.cmp(&other.name))
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.entity, self.name)
    }
}

/// 字段集合的显示辅助，输出 `[A.x, B.y]`
pub(crate) fn display_fields<'a>(fields: impl IntoIterator<Item = &'a FieldRef>) -> String {
    let names: Vec<String> = fields.into_iter().map(|f| f.qualified_name()).collect();
    format!("[{}]", names.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_identity_ignores_statistics() {
        let a = Field::new("Tweet", "Body", FieldType::String { length: 140 }).with_cardinality(10);
        let b = Field::new("Tweet", "Body", FieldType::String { length: 20 }).with_cardinality(99);
        assert_eq!(a, b);
        assert_eq!(a.size(), 140);
        assert_eq!(b.size(), 20);
    }

    #[test]
    fn test_field_ordering_by_entity_then_name() {
        let a = Field::new("A", "z", FieldType::Integer);
        let b = Field::new("B", "a", FieldType::Integer);
        assert!(a < b);
    }

    #[test]
    fn test_cardinality_at_least_one() {
        let f = Field::new("A", "x", FieldType::Date).with_cardinality(0);
        assert_eq!(f.cardinality(), 1);
    }

    #[test]
    fn test_foreign_target() {
        let f = Field::new("Tweet", "User", FieldType::ForeignKey { target: "User".into() });
        assert_eq!(f.foreign_target(), Some("User"));
        assert!(!f.is_id());
    }
}
