//! 查询图模块
//!
//! 语句可达实体之间的连接图。边由外键字段确定，
//! 支持最长路径、叶子实体查询、连接顺序推导以及子图分解。

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use super::entity::{Entity, Model};
use super::field::FieldRef;
use crate::core::error::{ModelError, ModelResult};

/// 图中的一条边
///
/// `from` 为持有外键的实体，`to` 为外键指向的实体
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
    pub key: FieldRef,
}

impl GraphEdge {
    /// 边是否连接给定实体
    pub fn touches(&self, entity: &str) -> bool {
        self.from == entity || self.to == entity
    }

    /// 给定一端，返回另一端
    pub fn other(&self, entity: &str) -> Option<&str> {
        if self.from == entity {
            Some(&self.to)
        } else if self.to == entity {
            Some(&self.from)
        } else {
            None
        }
    }
}

/// 查询图
#[derive(Debug, Clone, Default)]
pub struct QueryGraph {
    entities: BTreeMap<String, Arc<Entity>>,
    edges: BTreeSet<GraphEdge>,
}

impl QueryGraph {
    /// 空图
    pub fn empty() -> Self {
        Self::default()
    }

    /// 单实体图
    pub fn single(entity: Arc<Entity>) -> Self {
        let mut entities = BTreeMap::new();
        entities.insert(entity.name().to_string(), entity);
        Self {
            entities,
            edges: BTreeSet::new(),
        }
    }

    /// 由实体路径构建图，相邻实体必须由外键相连（任一方向）
    pub fn from_path(model: &Model, path: &[&str]) -> ModelResult<Self> {
        let first = path
            .first()
            .ok_or_else(|| ModelError::DisconnectedGraph("空路径".to_string()))?;
        let mut graph = Self::single(model.entity(first)?.clone());

        for pair in path.windows(2) {
            let left = model.entity(pair[0])?;
            let right = model.entity(pair[1])?;
            let edge = if let Some(key) = left.foreign_keys_to(right.name()).next() {
                GraphEdge {
                    from: left.name().to_string(),
                    to: right.name().to_string(),
                    key: key.clone(),
                }
            } else if let Some(key) = right.foreign_keys_to(left.name()).next() {
                GraphEdge {
                    from: right.name().to_string(),
                    to: left.name().to_string(),
                    key: key.clone(),
                }
            } else {
                return Err(ModelError::DisconnectedGraph(format!(
                    "{} 与 {} 之间没有外键",
                    pair[0], pair[1]
                )));
            };
            graph
                .entities
                .insert(right.name().to_string(), right.clone());
            graph.edges.insert(edge);
        }

        Ok(graph)
    }

    /// 添加实体与连接边
    pub fn with_edge(mut self, edge: GraphEdge, from: Arc<Entity>, to: Arc<Entity>) -> Self {
        self.entities.insert(from.name().to_string(), from);
        self.entities.insert(to.name().to_string(), to);
        self.edges.insert(edge);
        self
    }

    pub fn size(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn contains(&self, entity: &str) -> bool {
        self.entities.contains_key(entity)
    }

    pub fn entity(&self, name: &str) -> Option<&Arc<Entity>> {
        self.entities.get(name)
    }

    /// 实体名称（有序）
    pub fn entity_names(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    pub fn entities(&self) -> impl Iterator<Item = &Arc<Entity>> {
        self.entities.values()
    }

    pub fn edges(&self) -> &BTreeSet<GraphEdge> {
        &self.edges
    }

    /// 字段所属实体是否在图中
    pub fn covers_field(&self, field: &FieldRef) -> bool {
        self.contains(field.entity())
    }

    /// 相邻实体（按名称排序）
    pub fn neighbors(&self, entity: &str) -> Vec<&str> {
        let neighbors: BTreeSet<&str> = self
            .edges
            .iter()
            .filter_map(|edge| edge.other(entity))
            .collect();
        neighbors.into_iter().collect()
    }

    /// 叶子实体：度数不超过 1 的实体
    pub fn leaf_entities(&self) -> BTreeSet<String> {
        self.entities
            .keys()
            .filter(|name| self.neighbors(name).len() <= 1)
            .cloned()
            .collect()
    }

    pub fn is_leaf(&self, entity: &str) -> bool {
        self.contains(entity) && self.neighbors(entity).len() <= 1
    }

    pub fn is_connected(&self) -> bool {
        match self.entities.keys().next() {
            Some(start) => self.reachable_from(start, &BTreeSet::new()).len() == self.size(),
            None => true,
        }
    }

    /// 判断另一图是否为本图的子图
    pub fn contains_graph(&self, other: &QueryGraph) -> bool {
        other.entities.keys().all(|e| self.contains(e)) && other.edges.is_subset(&self.edges)
    }

    /// 只保留给定实体及其之间的边
    pub fn subgraph<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> QueryGraph {
        let keep: BTreeSet<&str> = names.into_iter().collect();
        QueryGraph {
            entities: self
                .entities
                .iter()
                .filter(|(name, _)| keep.contains(name.as_str()))
                .map(|(name, entity)| (name.clone(), entity.clone()))
                .collect(),
            edges: self
                .edges
                .iter()
                .filter(|edge| keep.contains(edge.from.as_str()) && keep.contains(edge.to.as_str()))
                .cloned()
                .collect(),
        }
    }

    /// 移除给定实体后的子图
    pub fn without<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> QueryGraph {
        let drop: BTreeSet<&str> = names.into_iter().collect();
        let keep: Vec<&str> = self
            .entity_names()
            .filter(|name| !drop.contains(name))
            .collect();
        self.subgraph(keep)
    }

    /// 图的并集
    pub fn union(&self, other: &QueryGraph) -> QueryGraph {
        let mut merged = self.clone();
        for (name, entity) in &other.entities {
            merged.entities.insert(name.clone(), entity.clone());
        }
        merged.edges.extend(other.edges.iter().cloned());
        merged
    }

    /// 以给定实体为界拆分为若干连通子图
    ///
    /// `keep` 为真时每个子图都保留该实体及其连接边
    pub fn split(&self, entity: &str, keep: bool) -> Vec<QueryGraph> {
        let mut excluded = BTreeSet::new();
        excluded.insert(entity.to_string());

        let mut seen: BTreeSet<String> = BTreeSet::new();
        let mut parts = Vec::new();
        for start in self.entities.keys() {
            if start == entity || seen.contains(start) {
                continue;
            }
            let component = self.reachable_from(start, &excluded);
            seen.extend(component.iter().cloned());

            let mut names: Vec<&str> = component.iter().map(String::as_str).collect();
            if keep && self.contains(entity) {
                names.push(entity);
            }
            parts.push(self.subgraph(names));
        }
        parts
    }

    /// 最长简单路径；长度相同时取字典序最小者
    pub fn longest_path(&self) -> Vec<String> {
        let mut best: Vec<String> = Vec::new();
        for leaf in self.leaf_entities() {
            let mut path = vec![leaf.clone()];
            self.extend_longest(&mut path, &mut best);
        }
        best
    }

    fn extend_longest(&self, path: &mut Vec<String>, best: &mut Vec<String>) {
        let last = path.last().cloned().unwrap_or_default();
        let mut extended = false;
        for next in self.neighbors(&last) {
            if path.iter().any(|e| e == next) {
                continue;
            }
            extended = true;
            path.push(next.to_string());
            self.extend_longest(path, best);
            path.pop();
        }
        if !extended && (path.len() > best.len() || (path.len() == best.len() && *path < *best)) {
            *best = path.clone();
        }
    }

    /// 连接顺序
    ///
    /// 从带等值条件、行数最少的叶子实体出发做深度优先遍历；
    /// 没有等值条件时从行数最少的叶子实体出发
    pub fn join_order(&self, eq_fields: &BTreeSet<FieldRef>) -> Vec<String> {
        if self.size() <= 1 {
            return self.entities.keys().cloned().collect();
        }

        let leaves = self.leaf_entities();
        let by_count = |names: &mut Vec<&String>| {
            names.sort_by(|a, b| {
                let ca = self.entities.get(*a).map(|e| e.count()).unwrap_or(0);
                let cb = self.entities.get(*b).map(|e| e.count()).unwrap_or(0);
                ca.cmp(&cb).then_with(|| a.cmp(b))
            });
        };

        let mut with_eq: Vec<&String> = leaves
            .iter()
            .filter(|leaf| eq_fields.iter().any(|f| f.entity() == leaf.as_str()))
            .collect();
        by_count(&mut with_eq);
        let mut all_leaves: Vec<&String> = leaves.iter().collect();
        by_count(&mut all_leaves);

        let start = match with_eq.first().or_else(|| all_leaves.first()) {
            Some(start) => (*start).clone(),
            None => return Vec::new(),
        };

        let mut order = Vec::with_capacity(self.size());
        let mut stack = vec![start];
        let mut visited = BTreeSet::new();
        while let Some(current) = stack.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            let mut next: Vec<&str> = self
                .neighbors(&current)
                .into_iter()
                .filter(|n| !visited.contains(*n))
                .collect();
            next.reverse();
            stack.extend(next.into_iter().map(str::to_string));
            order.push(current);
        }
        order
    }

    fn reachable_from(&self, start: &str, excluded: &BTreeSet<String>) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(start.to_string());
        while let Some(current) = queue.pop_front() {
            if excluded.contains(&current) || !seen.insert(current.clone()) {
                continue;
            }
            for next in self.neighbors(&current) {
                queue.push_back(next.to_string());
            }
        }
        seen
    }
}

impl PartialEq for QueryGraph {
    fn eq(&self, other: &Self) -> bool {
        self.entities.keys().eq(other.entities.keys()) && self.edges == other.edges
    }
}

impl Eq for QueryGraph {}

impl Hash for QueryGraph {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for name in self.entities.keys() {
            name.hash(state);
        }
        self.edges.hash(state);
    }
}

impl PartialOrd for QueryGraph {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueryGraph {
    fn cmp(&self, other: &Self) -> Ordering {
        self.entities
            .keys()
            .cmp(other.entities.keys())
            .then_with(|| self.edges.cmp(&other.edges))
    }
}

impl fmt::Display for QueryGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.edges.is_empty() {
            let names: Vec<&str> = self.entity_names().collect();
            return write!(f, "{}", names.join(", "));
        }
        let edges: Vec<String> = self
            .edges
            .iter()
            .map(|e| format!("{}-{}", e.from, e.to))
            .collect();
        write!(f, "{}", edges.join(", "))
    }
}
