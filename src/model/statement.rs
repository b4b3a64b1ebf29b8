//! 语句模块
//!
//! - `Query`：读语句，声明选择字段、等值/范围/排序/分组/聚合谓词、
//!   可选 LIMIT 与查询图，可推导出自身的物化视图索引
//! - `UpdateStatement`：写语句（插入、更新、删除），推导受影响索引
//!   以及维护索引所需的支撑查询

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use super::entity::{Entity, Model};
use super::field::{display_fields, FieldRef};
use super::graph::QueryGraph;
use super::index::{AggregateField, AggregateFunction, Index};
use crate::core::error::{ModelError, ModelResult};

/// 读语句
#[derive(Debug, Clone)]
pub struct Query {
    text: String,
    select: BTreeSet<FieldRef>,
    eq: BTreeSet<FieldRef>,
    range: BTreeSet<FieldRef>,
    order_by: Vec<FieldRef>,
    group_by: BTreeSet<FieldRef>,
    aggregates: BTreeSet<AggregateField>,
    limit: Option<u64>,
    graph: QueryGraph,
    join_order: Vec<String>,
    weight: f64,
}

impl Query {
    pub fn builder(model: &Model) -> QueryBuilder<'_> {
        QueryBuilder::new(model)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn select(&self) -> &BTreeSet<FieldRef> {
        &self.select
    }

    pub fn eq(&self) -> &BTreeSet<FieldRef> {
        &self.eq
    }

    pub fn range(&self) -> &BTreeSet<FieldRef> {
        &self.range
    }

    pub fn order_by(&self) -> &[FieldRef] {
        &self.order_by
    }

    pub fn group_by(&self) -> &BTreeSet<FieldRef> {
        &self.group_by
    }

    pub fn aggregates(&self) -> &BTreeSet<AggregateField> {
        &self.aggregates
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn graph(&self) -> &QueryGraph {
        &self.graph
    }

    /// 连接顺序，首个实体为起始实体
    pub fn join_order(&self) -> &[String] {
        &self.join_order
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn is_aggregating(&self) -> bool {
        !self.aggregates.is_empty() || !self.group_by.is_empty()
    }

    /// 需要取回的全部字段：选择 ∪ 聚合 ∪ 分组
    pub fn required_fields(&self) -> BTreeSet<FieldRef> {
        let mut fields = self.select.clone();
        fields.extend(self.aggregates.iter().map(|a| a.field.clone()));
        fields.extend(self.group_by.iter().cloned());
        fields
    }

    /// 以新的权重复制语句
    pub fn with_weight(&self, weight: f64) -> Query {
        Query {
            weight,
            ..self.clone()
        }
    }

    /// 推导该语句的物化视图索引
    ///
    /// 分区字段取起始实体上的等值字段（没有时取其标识符），
    /// 有序字段依次为其余等值字段、范围字段、分组字段、排序字段
    /// 以及沿连接顺序的各实体标识符，其余所需字段作为附加字段
    pub fn materialize_view(&self) -> ModelResult<Index> {
        let head = self
            .join_order
            .first()
            .and_then(|name| self.graph.entity(name))
            .ok_or_else(|| ModelError::InvalidStatement(format!("{} 没有连接顺序", self.text)))?;

        let mut partition: Vec<FieldRef> = self
            .eq
            .iter()
            .filter(|f| f.entity() == head.name())
            .cloned()
            .collect();
        if partition.is_empty() {
            partition.push(head.id_field().clone());
        }

        let mut ordered: Vec<FieldRef> = Vec::new();
        let candidates = self
            .eq
            .iter()
            .chain(self.range.iter())
            .chain(self.group_by.iter())
            .chain(self.order_by.iter())
            .cloned()
            .chain(
                self.join_order
                    .iter()
                    .filter_map(|name| self.graph.entity(name))
                    .map(|e| e.id_field().clone()),
            );
        for field in candidates {
            if !partition.contains(&field) && !ordered.contains(&field) {
                ordered.push(field);
            }
        }

        let mut builder = Index::builder(self.graph.clone()).fields(
            partition,
            ordered,
            self.required_fields(),
        );
        for aggregate in &self.aggregates {
            builder = builder.aggregate(aggregate.function, aggregate.field.clone());
        }
        for field in &self.group_by {
            builder = builder.group_by(field.clone());
        }
        builder.build()
    }

    fn render(&self) -> String {
        let mut projections: Vec<String> = self.select.iter().map(|f| f.qualified_name()).collect();
        projections.extend(self.aggregates.iter().map(|a| a.to_string()));
        let mut text = format!(
            "SELECT {} FROM {}",
            projections.join(", "),
            self.join_order.join(".")
        );

        let mut conditions: Vec<String> = self.eq.iter().map(|f| format!("{} = ?", f)).collect();
        conditions.extend(self.range.iter().map(|f| format!("{} > ?", f)));
        if !conditions.is_empty() {
            text.push_str(&format!(" WHERE {}", conditions.join(" AND ")));
        }
        if !self.group_by.is_empty() {
            let fields: Vec<String> = self.group_by.iter().map(|f| f.qualified_name()).collect();
            text.push_str(&format!(" GROUP BY {}", fields.join(", ")));
        }
        if !self.order_by.is_empty() {
            let fields: Vec<String> = self.order_by.iter().map(|f| f.qualified_name()).collect();
            text.push_str(&format!(" ORDER BY {}", fields.join(", ")));
        }
        if let Some(limit) = self.limit {
            text.push_str(&format!(" LIMIT {}", limit));
        }
        text
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

/// 读语句构建器
///
/// 字段以 `Entity.Field` 形式给出，首个错误在 `build` 时返回
pub struct QueryBuilder<'a> {
    model: &'a Model,
    text: Option<String>,
    path: Vec<String>,
    select: Vec<String>,
    eq: Vec<String>,
    range: Vec<String>,
    order_by: Vec<String>,
    group_by: Vec<String>,
    aggregates: Vec<(AggregateFunction, String)>,
    limit: Option<u64>,
    weight: f64,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(model: &'a Model) -> Self {
        Self {
            model,
            text: None,
            path: Vec::new(),
            select: Vec::new(),
            eq: Vec::new(),
            range: Vec::new(),
            order_by: Vec::new(),
            group_by: Vec::new(),
            aggregates: Vec::new(),
            limit: None,
            weight: 1.0,
        }
    }

    /// 语句文本；未给出时自动生成
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// 实体路径
    pub fn path(mut self, path: &[&str]) -> Self {
        self.path = path.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn select(mut self, field: &str) -> Self {
        self.select.push(field.to_string());
        self
    }

    pub fn eq(mut self, field: &str) -> Self {
        self.eq.push(field.to_string());
        self
    }

    pub fn range(mut self, field: &str) -> Self {
        self.range.push(field.to_string());
        self
    }

    pub fn order_by(mut self, field: &str) -> Self {
        self.order_by.push(field.to_string());
        self
    }

    pub fn group_by(mut self, field: &str) -> Self {
        self.group_by.push(field.to_string());
        self
    }

    pub fn aggregate(mut self, function: AggregateFunction, field: &str) -> Self {
        self.aggregates.push((function, field.to_string()));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn build(self) -> ModelResult<Query> {
        let path: Vec<&str> = self.path.iter().map(String::as_str).collect();
        let graph = QueryGraph::from_path(self.model, &path)?;

        let resolve = |names: &[String]| -> ModelResult<Vec<FieldRef>> {
            names
                .iter()
                .map(|name| {
                    let field = self.model.field(name)?;
                    if graph.covers_field(&field) {
                        Ok(field)
                    } else {
                        Err(ModelError::InvalidStatement(format!("字段 {} 不在查询路径上", name)))
                    }
                })
                .collect()
        };

        let select: BTreeSet<FieldRef> = resolve(&self.select)?.into_iter().collect();
        let eq: BTreeSet<FieldRef> = resolve(&self.eq)?.into_iter().collect();
        let range: BTreeSet<FieldRef> = resolve(&self.range)?.into_iter().collect();
        let order_by = resolve(&self.order_by)?;
        let group_by: BTreeSet<FieldRef> = resolve(&self.group_by)?.into_iter().collect();
        let mut aggregates = BTreeSet::new();
        for (function, name) in &self.aggregates {
            let field = resolve(std::slice::from_ref(name))?;
            aggregates.extend(field.into_iter().map(|f| AggregateField::new(*function, f)));
        }

        if select.is_empty() && aggregates.is_empty() {
            return Err(ModelError::InvalidStatement("没有选择任何字段".to_string()));
        }
        if !(self.weight >= 0.0) {
            return Err(ModelError::InvalidStatement(format!("权重非法: {}", self.weight)));
        }
        if let Some(both) = eq.intersection(&range).next() {
            return Err(ModelError::InvalidStatement(format!(
                "字段 {} 同时出现在等值与范围条件中",
                both
            )));
        }

        let join_order = graph.join_order(&eq);
        let mut query = Query {
            text: String::new(),
            select,
            eq,
            range,
            order_by,
            group_by,
            aggregates,
            limit: self.limit,
            graph,
            join_order,
            weight: self.weight,
        };
        query.text = match self.text {
            Some(text) => text,
            None => query.render(),
        };
        Ok(query)
    }
}

/// 写语句类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateKind {
    Insert,
    Update,
    Delete,
}

impl UpdateKind {
    pub fn name(&self) -> &'static str {
        match self {
            UpdateKind::Insert => "INSERT",
            UpdateKind::Update => "UPDATE",
            UpdateKind::Delete => "DELETE",
        }
    }
}

/// 写语句
#[derive(Debug, Clone)]
pub struct UpdateStatement {
    text: String,
    kind: UpdateKind,
    entity: Arc<Entity>,
    settings: BTreeSet<FieldRef>,
    eq: BTreeSet<FieldRef>,
    graph: QueryGraph,
    weight: f64,
}

impl UpdateStatement {
    pub fn builder<'a>(model: &'a Model, kind: UpdateKind, entity: &str) -> UpdateBuilder<'a> {
        UpdateBuilder::new(model, kind, entity)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn kind(&self) -> UpdateKind {
        self.kind
    }

    pub fn entity(&self) -> &Arc<Entity> {
        &self.entity
    }

    /// 被写入的字段
    pub fn settings(&self) -> &BTreeSet<FieldRef> {
        &self.settings
    }

    /// 定位被修改行的等值条件
    pub fn eq(&self) -> &BTreeSet<FieldRef> {
        &self.eq
    }

    pub fn graph(&self) -> &QueryGraph {
        &self.graph
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// 语句自身提供取值的字段
    pub fn given_fields(&self) -> BTreeSet<FieldRef> {
        self.settings.union(&self.eq).cloned().collect()
    }

    /// 该语句是否需要维护给定索引
    pub fn modifies_index(&self, index: &Index) -> bool {
        match self.kind {
            UpdateKind::Insert | UpdateKind::Delete => index.graph().contains(self.entity.name()),
            UpdateKind::Update => self.settings.iter().any(|f| index.contains_field(f)),
        }
    }

    /// 维护索引前需要执行的支撑查询
    ///
    /// 返回 `None` 表示缺少定位条件，无法推导支撑查询；
    /// 返回空列表表示语句已提供索引的全部字段
    pub fn support_queries(&self, index: &Index) -> Option<Vec<Query>> {
        let mut given = self.given_fields();
        // 外键取值同时给出了目标实体的标识符
        given.extend(
            self.settings
                .iter()
                .filter_map(|f| f.foreign_target())
                .filter_map(|target| index.graph().entity(target))
                .map(|e| e.id_field().clone()),
        );
        let needed: BTreeSet<FieldRef> = index
            .all_fields()
            .iter()
            .filter(|f| !given.contains(*f))
            .cloned()
            .collect();
        if needed.is_empty() {
            return Some(Vec::new());
        }

        match self.kind {
            UpdateKind::Insert => {
                // 新行尚不存在，只能从外键指向的其他实体取值
                let mut queries = Vec::new();
                for part in index.graph().split(self.entity.name(), false) {
                    let select: BTreeSet<FieldRef> =
                        needed.iter().filter(|f| part.covers_field(f)).cloned().collect();
                    if select.is_empty() {
                        continue;
                    }
                    let eq: BTreeSet<FieldRef> = self
                        .settings
                        .iter()
                        .filter_map(|f| f.foreign_target())
                        .filter_map(|target| part.entity(target))
                        .map(|e| e.id_field().clone())
                        .collect();
                    if eq.is_empty() {
                        return None;
                    }
                    queries.push(self.support_query(part, select, eq, index));
                }
                Some(queries)
            }
            UpdateKind::Update | UpdateKind::Delete => {
                if self.eq.is_empty() {
                    return None;
                }
                let graph = index.graph().union(&self.graph);
                Some(vec![self.support_query(graph, needed, self.eq.clone(), index)])
            }
        }
    }

    fn support_query(
        &self,
        graph: QueryGraph,
        select: BTreeSet<FieldRef>,
        eq: BTreeSet<FieldRef>,
        index: &Index,
    ) -> Query {
        let join_order = graph.join_order(&eq);
        let mut query = Query {
            text: String::new(),
            select,
            eq,
            range: BTreeSet::new(),
            order_by: Vec::new(),
            group_by: BTreeSet::new(),
            aggregates: BTreeSet::new(),
            limit: None,
            graph,
            join_order,
            weight: self.weight,
        };
        query.text = format!("{} -- 维护 {} 的 {}", query.render(), index.key(), self.kind.name());
        query
    }

    fn render(&self) -> String {
        match self.kind {
            UpdateKind::Insert => format!(
                "INSERT INTO {} SET {}",
                self.entity.name(),
                display_fields(&self.settings)
            ),
            UpdateKind::Update => format!(
                "UPDATE {} SET {} WHERE {}",
                self.entity.name(),
                display_fields(&self.settings),
                display_fields(&self.eq)
            ),
            UpdateKind::Delete => format!(
                "DELETE FROM {} WHERE {}",
                self.entity.name(),
                display_fields(&self.eq)
            ),
        }
    }
}

impl fmt::Display for UpdateStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

/// 写语句构建器
pub struct UpdateBuilder<'a> {
    model: &'a Model,
    kind: UpdateKind,
    entity: String,
    text: Option<String>,
    path: Vec<String>,
    settings: Vec<String>,
    eq: Vec<String>,
    weight: f64,
}

impl<'a> UpdateBuilder<'a> {
    pub fn new(model: &'a Model, kind: UpdateKind, entity: &str) -> Self {
        Self {
            model,
            kind,
            entity: entity.to_string(),
            text: None,
            path: Vec::new(),
            settings: Vec::new(),
            eq: Vec::new(),
            weight: 1.0,
        }
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// 条件所在的实体路径，首个实体须为被修改实体
    pub fn path(mut self, path: &[&str]) -> Self {
        self.path = path.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn set(mut self, field: &str) -> Self {
        self.settings.push(field.to_string());
        self
    }

    pub fn eq(mut self, field: &str) -> Self {
        self.eq.push(field.to_string());
        self
    }

    pub fn weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn build(self) -> ModelResult<UpdateStatement> {
        let entity = self.model.entity(&self.entity)?.clone();
        let graph = if self.path.is_empty() {
            QueryGraph::single(entity.clone())
        } else {
            let path: Vec<&str> = self.path.iter().map(String::as_str).collect();
            QueryGraph::from_path(self.model, &path)?
        };
        if !graph.contains(entity.name()) {
            return Err(ModelError::InvalidStatement(format!(
                "路径不包含被修改实体 {}",
                entity.name()
            )));
        }

        let mut settings = BTreeSet::new();
        for name in &self.settings {
            let field = self.model.field(name)?;
            if field.entity() != entity.name() {
                return Err(ModelError::InvalidStatement(format!(
                    "只能写入 {} 的字段，而非 {}",
                    entity.name(),
                    name
                )));
            }
            settings.insert(field);
        }
        if self.kind == UpdateKind::Insert && settings.is_empty() {
            settings.extend(entity.fields().cloned());
        }
        if self.kind == UpdateKind::Update && settings.is_empty() {
            return Err(ModelError::InvalidStatement("UPDATE 没有写入字段".to_string()));
        }

        let mut eq = BTreeSet::new();
        for name in &self.eq {
            let field = self.model.field(name)?;
            if !graph.covers_field(&field) {
                return Err(ModelError::InvalidStatement(format!("字段 {} 不在语句路径上", name)));
            }
            eq.insert(field);
        }
        if self.kind != UpdateKind::Insert && eq.is_empty() {
            return Err(ModelError::InvalidStatement(format!(
                "{} 需要等值条件",
                self.kind.name()
            )));
        }

        let mut statement = UpdateStatement {
            text: String::new(),
            kind: self.kind,
            entity,
            settings,
            eq,
            graph,
            weight: self.weight,
        };
        statement.text = match self.text {
            Some(text) => text,
            None => statement.render(),
        };
        Ok(statement)
    }
}

/// 工作负载中的语句
#[derive(Debug, Clone)]
pub enum Statement {
    Query(Arc<Query>),
    Update(Arc<UpdateStatement>),
}

impl Statement {
    pub fn text(&self) -> &str {
        match self {
            Statement::Query(q) => q.text(),
            Statement::Update(u) => u.text(),
        }
    }

    pub fn weight(&self) -> f64 {
        match self {
            Statement::Query(q) => q.weight(),
            Statement::Update(u) => u.weight(),
        }
    }

    pub fn is_query(&self) -> bool {
        matches!(self, Statement::Query(_))
    }
}

impl From<Query> for Statement {
    fn from(query: Query) -> Self {
        Statement::Query(Arc::new(query))
    }
}

impl From<UpdateStatement> for Statement {
    fn from(update: UpdateStatement) -> Self {
        Statement::Update(Arc::new(update))
    }
}
