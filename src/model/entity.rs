//! 实体与模型模块
//!
//! 实体是具名的字段集合，附带行数估计；模型是全部实体的注册表

use std::collections::BTreeMap;
use std::sync::Arc;

use super::field::{Field, FieldRef, FieldType};
use crate::core::error::{ModelError, ModelResult};

/// 实体定义
#[derive(Debug, Clone)]
pub struct Entity {
    name: String,
    count: u64,
    id: FieldRef,
    fields: BTreeMap<String, FieldRef>,
}

impl Entity {
    /// 创建实体构建器
    pub fn builder(name: impl Into<String>, count: u64) -> EntityBuilder {
        EntityBuilder::new(name, count)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 估计行数
    pub fn count(&self) -> u64 {
        self.count
    }

    /// 标识符字段
    pub fn id_field(&self) -> &FieldRef {
        &self.id
    }

    pub fn field(&self, name: &str) -> ModelResult<FieldRef> {
        self.fields
            .get(name)
            .cloned()
            .ok_or_else(|| ModelError::UnknownField(format!("{}.{}", self.name, name)))
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldRef> {
        self.fields.values()
    }

    /// 指向目标实体的外键字段
    pub fn foreign_keys_to<'a>(&'a self, target: &'a str) -> impl Iterator<Item = &'a FieldRef> + 'a {
        self.fields
            .values()
            .filter(move |f| f.foreign_target() == Some(target))
    }
}

/// 实体构建器
///
/// 字段基数未显式给出时默认等于实体行数
#[derive(Debug)]
pub struct EntityBuilder {
    name: String,
    count: u64,
    id: Option<String>,
    fields: Vec<Field>,
}

impl EntityBuilder {
    pub fn new(name: impl Into<String>, count: u64) -> Self {
        Self {
            name: name.into(),
            count: count.max(1),
            id: None,
            fields: Vec::new(),
        }
    }

    /// 声明标识符字段
    pub fn id(self, name: &str) -> Self {
        self.composite_id(name, &[])
    }

    /// 声明组合标识符，伙伴字段需随标识符一起出现
    pub fn composite_id(mut self, name: &str, partners: &[&str]) -> Self {
        let field = Field::new(&self.name, name, FieldType::Id)
            .with_cardinality(self.count)
            .with_composite(partners.iter().map(|p| p.to_string()).collect());
        self.id = Some(name.to_string());
        self.fields.push(field);
        self
    }

    pub fn integer(self, name: &str) -> Self {
        let cardinality = self.count;
        self.field_with(name, FieldType::Integer, cardinality)
    }

    pub fn float(self, name: &str) -> Self {
        let cardinality = self.count;
        self.field_with(name, FieldType::Float, cardinality)
    }

    pub fn date(self, name: &str) -> Self {
        let cardinality = self.count;
        self.field_with(name, FieldType::Date, cardinality)
    }

    pub fn string(self, name: &str, length: u64) -> Self {
        let cardinality = self.count;
        self.field_with(name, FieldType::String { length }, cardinality)
    }

    /// 外键字段，基数取目标实体的行数
    pub fn foreign_key(self, name: &str, target: &str, target_count: u64) -> Self {
        self.field_with(
            name,
            FieldType::ForeignKey {
                target: target.to_string(),
            },
            target_count,
        )
    }

    /// 任意类型字段并指定基数
    pub fn field_with(mut self, name: &str, field_type: FieldType, cardinality: u64) -> Self {
        let field = Field::new(&self.name, name, field_type).with_cardinality(cardinality);
        self.fields.push(field);
        self
    }

    /// 覆盖已声明字段的基数
    pub fn cardinality(mut self, name: &str, cardinality: u64) -> Self {
        if let Some(pos) = self.fields.iter().position(|f| f.name() == name) {
            let field = self.fields.remove(pos).with_cardinality(cardinality);
            self.fields.insert(pos, field);
        }
        self
    }

    pub fn build(self) -> ModelResult<Entity> {
        let id_name = self
            .id
            .ok_or_else(|| ModelError::InvalidEntity(format!("{} 缺少标识符字段", self.name)))?;

        let mut fields = BTreeMap::new();
        for field in self.fields {
            let name = field.name().to_string();
            if fields.insert(name.clone(), Arc::new(field)).is_some() {
                return Err(ModelError::InvalidEntity(format!(
                    "{} 中字段 {} 重复",
                    self.name, name
                )));
            }
        }

        let id = fields
            .get(&id_name)
            .cloned()
            .ok_or_else(|| ModelError::UnknownField(format!("{}.{}", self.name, id_name)))?;
        for partner in id.composite() {
            if !fields.contains_key(partner) {
                return Err(ModelError::UnknownField(format!("{}.{}", self.name, partner)));
            }
        }

        Ok(Entity {
            name: self.name,
            count: self.count,
            id,
            fields,
        })
    }
}

/// 实体注册表
#[derive(Debug, Clone, Default)]
pub struct Model {
    entities: BTreeMap<String, Arc<Entity>>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册实体，外键目标必须已存在或随后注册
    pub fn add_entity(&mut self, entity: Entity) -> Arc<Entity> {
        let entity = Arc::new(entity);
        self.entities.insert(entity.name().to_string(), entity.clone());
        entity
    }

    pub fn with_entity(mut self, entity: Entity) -> Self {
        self.add_entity(entity);
        self
    }

    pub fn entity(&self, name: &str) -> ModelResult<&Arc<Entity>> {
        self.entities
            .get(name)
            .ok_or_else(|| ModelError::UnknownEntity(name.to_string()))
    }

    pub fn entities(&self) -> impl Iterator<Item = &Arc<Entity>> {
        self.entities.values()
    }

    /// 按 `Entity.Field` 查找字段
    pub fn field(&self, qualified: &str) -> ModelResult<FieldRef> {
        let (entity, field) = qualified
            .split_once('.')
            .ok_or_else(|| ModelError::UnknownField(qualified.to_string()))?;
        self.entity(entity)?.field(field)
    }

    /// 校验所有外键的目标实体均已注册
    pub fn validate(&self) -> ModelResult<()> {
        for entity in self.entities.values() {
            for field in entity.fields() {
                if let Some(target) = field.foreign_target() {
                    if !self.entities.contains_key(target) {
                        return Err(ModelError::UnknownEntity(format!(
                            "{} 引用的实体 {}",
                            field, target
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}
