//! 索引模块
//!
//! 候选物理结构：由分区字段、聚簇（有序）字段、附加字段、
//! 聚合字段、分组字段以及关联的查询图组成。构建后不可变，
//! 大小与基数在构建时推导。

use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

use super::field::{display_fields, FieldRef};
use super::graph::QueryGraph;
use crate::core::error::{ModelError, ModelResult};

/// 聚合函数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunction {
    pub fn name(&self) -> &'static str {
        match self {
            AggregateFunction::Count => "count",
            AggregateFunction::Sum => "sum",
            AggregateFunction::Avg => "avg",
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
        }
    }
}

/// 聚合字段：聚合函数作用于某个字段
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AggregateField {
    pub function: AggregateFunction,
    pub field: FieldRef,
}

impl AggregateField {
    pub fn new(function: AggregateFunction, field: FieldRef) -> Self {
        Self { function, field }
    }
}

impl fmt::Display for AggregateField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.function.name(), self.field)
    }
}

/// 候选索引
#[derive(Debug, Clone)]
pub struct Index {
    partition: BTreeSet<FieldRef>,
    ordered: Vec<FieldRef>,
    extra: BTreeSet<FieldRef>,
    aggregates: BTreeSet<AggregateField>,
    group_by: BTreeSet<FieldRef>,
    graph: QueryGraph,
    all_fields: BTreeSet<FieldRef>,
    entries: f64,
    partition_count: f64,
    entry_size: u64,
    descriptor: String,
    key: String,
}

impl Index {
    /// 创建索引构建器
    pub fn builder(graph: QueryGraph) -> IndexBuilder {
        IndexBuilder::new(graph)
    }

    /// 分区字段
    pub fn partition(&self) -> &BTreeSet<FieldRef> {
        &self.partition
    }

    /// 聚簇（有序）字段
    pub fn ordered(&self) -> &[FieldRef] {
        &self.ordered
    }

    pub fn extra(&self) -> &BTreeSet<FieldRef> {
        &self.extra
    }

    pub fn aggregates(&self) -> &BTreeSet<AggregateField> {
        &self.aggregates
    }

    pub fn group_by(&self) -> &BTreeSet<FieldRef> {
        &self.group_by
    }

    pub fn graph(&self) -> &QueryGraph {
        &self.graph
    }

    /// 全部字段：分区 ∪ 有序 ∪ 附加 ∪ 聚合 ∪ 分组
    pub fn all_fields(&self) -> &BTreeSet<FieldRef> {
        &self.all_fields
    }

    pub fn contains_field(&self, field: &FieldRef) -> bool {
        self.all_fields.contains(field)
    }

    /// 索引条目数
    pub fn entries(&self) -> f64 {
        self.entries
    }

    /// 分区数
    pub fn partition_count(&self) -> f64 {
        self.partition_count
    }

    /// 每个分区的平均条目数
    pub fn per_partition_count(&self) -> f64 {
        self.entries / self.partition_count
    }

    /// 单个条目的字节数
    pub fn entry_size(&self) -> u64 {
        self.entry_size
    }

    /// 索引总大小（字节）
    pub fn size(&self) -> f64 {
        self.entries * self.entry_size as f64
    }

    /// 稳定键，由字段集合与查询图推导
    pub fn key(&self) -> &str {
        &self.key
    }

    /// 是否携带聚合
    pub fn is_aggregating(&self) -> bool {
        !self.aggregates.is_empty() || !self.group_by.is_empty()
    }

    /// 单实体且以标识符为唯一分区字段的索引（标识符到行）
    pub fn is_identity(&self) -> bool {
        if self.graph.size() != 1 || self.partition.len() != 1 {
            return false;
        }
        match (self.partition.iter().next(), self.graph.entities().next()) {
            (Some(field), Some(entity)) => field == entity.id_field(),
            _ => false,
        }
    }

    /// 分区字段所属的实体
    pub fn partition_entity(&self) -> Option<&str> {
        self.partition.iter().next().map(|f| f.entity())
    }

    /// 有序字段前缀中属于给定集合的最长长度
    pub fn ordered_prefix_len(&self, fields: &BTreeSet<FieldRef>) -> usize {
        self.ordered
            .iter()
            .take_while(|f| fields.contains(*f))
            .count()
    }
}

impl PartialEq for Index {
    fn eq(&self, other: &Self) -> bool {
        self.descriptor == other.descriptor
    }
}

impl Eq for Index {}

impl Hash for Index {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.descriptor.hash(state);
    }
}

impl PartialOrd for Index {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Index {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key
            .cmp(&other.key)
            .then_with(|| self.descriptor.cmp(&other.descriptor))
    }
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.descriptor)
    }
}

/// 索引构建器
#[derive(Debug)]
pub struct IndexBuilder {
    graph: QueryGraph,
    partition: Vec<FieldRef>,
    ordered: Vec<FieldRef>,
    extra: Vec<FieldRef>,
    aggregates: Vec<AggregateField>,
    group_by: Vec<FieldRef>,
}

impl IndexBuilder {
    pub fn new(graph: QueryGraph) -> Self {
        Self {
            graph,
            partition: Vec::new(),
            ordered: Vec::new(),
            extra: Vec::new(),
            aggregates: Vec::new(),
            group_by: Vec::new(),
        }
    }

    pub fn partition(mut self, field: FieldRef) -> Self {
        self.partition.push(field);
        self
    }

    pub fn ordered(mut self, field: FieldRef) -> Self {
        self.ordered.push(field);
        self
    }

    pub fn extra(mut self, field: FieldRef) -> Self {
        self.extra.push(field);
        self
    }

    pub fn aggregate(mut self, function: AggregateFunction, field: FieldRef) -> Self {
        self.aggregates.push(AggregateField::new(function, field));
        self
    }

    pub fn group_by(mut self, field: FieldRef) -> Self {
        self.group_by.push(field);
        self
    }

    /// 批量设置字段
    pub fn fields(
        mut self,
        partition: impl IntoIterator<Item = FieldRef>,
        ordered: impl IntoIterator<Item = FieldRef>,
        extra: impl IntoIterator<Item = FieldRef>,
    ) -> Self {
        self.partition.extend(partition);
        self.ordered.extend(ordered);
        self.extra.extend(extra);
        self
    }

    pub fn build(self) -> ModelResult<Index> {
        let partition: BTreeSet<FieldRef> = self.partition.into_iter().collect();

        let mut ordered: Vec<FieldRef> = Vec::new();
        for field in self.ordered {
            if !partition.contains(&field) && !ordered.contains(&field) {
                ordered.push(field);
            }
        }

        let extra: BTreeSet<FieldRef> = self
            .extra
            .into_iter()
            .filter(|f| !partition.contains(f) && !ordered.contains(f))
            .collect();
        let aggregates: BTreeSet<AggregateField> = self.aggregates.into_iter().collect();
        let group_by: BTreeSet<FieldRef> = self.group_by.into_iter().collect();

        let stored: BTreeSet<FieldRef> = partition
            .iter()
            .chain(ordered.iter())
            .chain(extra.iter())
            .cloned()
            .collect();

        validate(&self.graph, &partition, &ordered, &stored, &aggregates, &group_by)?;

        let mut all_fields = stored;
        all_fields.extend(group_by.iter().cloned());
        all_fields.extend(aggregates.iter().map(|a| a.field.clone()));

        let mut entries = self
            .graph
            .entities()
            .map(|e| e.count() as f64)
            .fold(1.0_f64, f64::max);
        if !aggregates.is_empty() || !group_by.is_empty() {
            let groups: f64 = partition
                .iter()
                .chain(group_by.iter())
                .map(|f| f.cardinality() as f64)
                .product();
            entries = entries.min(groups.max(1.0));
        }
        let partition_count = partition
            .iter()
            .map(|f| f.cardinality() as f64)
            .product::<f64>()
            .clamp(1.0, entries);
        let entry_size = all_fields.iter().map(|f| f.size()).sum();

        let descriptor = describe(&partition, &ordered, &extra, &aggregates, &group_by, &self.graph);
        let key = format!("i{:016x}", fnv1a(descriptor.as_bytes()));

        Ok(Index {
            partition,
            ordered,
            extra,
            aggregates,
            group_by,
            graph: self.graph,
            all_fields,
            entries,
            partition_count,
            entry_size,
            descriptor,
            key,
        })
    }
}

fn validate(
    graph: &QueryGraph,
    partition: &BTreeSet<FieldRef>,
    ordered: &[FieldRef],
    stored: &BTreeSet<FieldRef>,
    aggregates: &BTreeSet<AggregateField>,
    group_by: &BTreeSet<FieldRef>,
) -> ModelResult<()> {
    if partition.is_empty() {
        return Err(ModelError::MalformedIndex("分区字段为空".to_string()));
    }
    let entities: BTreeSet<&str> = partition.iter().map(|f| f.entity()).collect();
    if entities.len() > 1 {
        return Err(ModelError::MalformedIndex(format!(
            "分区字段跨越多个实体: {}",
            display_fields(partition)
        )));
    }
    if graph.is_empty() || !graph.is_connected() {
        return Err(ModelError::MalformedIndex(format!("查询图为空或不连通: {}", graph)));
    }

    let referenced = stored
        .iter()
        .chain(group_by.iter())
        .chain(aggregates.iter().map(|a| &a.field));
    for field in referenced {
        if !graph.covers_field(field) {
            return Err(ModelError::MalformedIndex(format!(
                "字段 {} 不在查询图 {} 中",
                field, graph
            )));
        }
    }

    for entity in graph.entities() {
        let id = entity.id_field();
        if !partition.contains(id) && !ordered.contains(id) {
            return Err(ModelError::MalformedIndex(format!(
                "实体 {} 的标识符未出现在分区或有序字段中",
                entity.name()
            )));
        }
    }

    if let Some(aggregate) = aggregates.iter().find(|a| !stored.contains(&a.field)) {
        return Err(ModelError::MalformedIndex(format!("聚合字段 {} 不在索引字段中", aggregate)));
    }
    if let Some(field) = group_by.iter().find(|f| !stored.contains(*f)) {
        return Err(ModelError::MalformedIndex(format!("分组字段 {} 不在索引字段中", field)));
    }

    Ok(())
}

fn describe(
    partition: &BTreeSet<FieldRef>,
    ordered: &[FieldRef],
    extra: &BTreeSet<FieldRef>,
    aggregates: &BTreeSet<AggregateField>,
    group_by: &BTreeSet<FieldRef>,
    graph: &QueryGraph,
) -> String {
    let mut descriptor = format!(
        "{}{}{}",
        display_fields(partition),
        display_fields(ordered),
        display_fields(extra)
    );
    if !aggregates.is_empty() || !group_by.is_empty() {
        let aggregates: Vec<String> = aggregates.iter().map(|a| a.to_string()).collect();
        descriptor.push_str(&format!(
            " agg[{}] by{}",
            aggregates.join(", "),
            display_fields(group_by)
        ));
    }
    descriptor.push_str(&format!(" $ {}", graph));
    descriptor
}

/// FNV-1a 64 位哈希，保证跨进程稳定
fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |hash, byte| (hash ^ u64::from(*byte)).wrapping_mul(PRIME))
}
