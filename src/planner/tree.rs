//! 计划树与深度优先搜索
//!
//! 步骤存放在以下标寻址的数组中，每个节点记录父节点下标。
//! 搜索从根开始深度优先展开：先尝试过滤、排序、截断、聚合，
//! 再尝试索引查找；无有效子节点且未回答的节点被裁剪，
//! 裁剪沿祖先链向上传递。

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::sync::Arc;

use log::{debug, warn};
use rayon::prelude::*;

use crate::config::PlannerConfig;
use crate::core::error::{PlanningError, PlanningResult, Rejection};
use crate::cost::CostModel;
use crate::model::{Index, Query};

use super::lookup::LookupContext;
use super::plan::Plan;
use super::state::PlanningState;
use super::step::{Applied, PlanStep};
use super::validate::PlanValidator;

/// 节点在计划树中的下标
pub type StepId = usize;

/// 计划树节点
#[derive(Debug, Clone)]
pub struct StepNode {
    step: PlanStep,
    state: PlanningState,
    parent: Option<StepId>,
    children: Vec<StepId>,
}

impl StepNode {
    pub fn step(&self) -> &PlanStep {
        &self.step
    }

    /// 应用本步骤之后的状态
    pub fn state(&self) -> &PlanningState {
        &self.state
    }

    pub fn parent(&self) -> Option<StepId> {
        self.parent
    }

    pub fn children(&self) -> &[StepId] {
        &self.children
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// 搜索统计
#[derive(Debug, Clone, Default)]
pub struct SearchStats {
    /// 展开的节点数
    pub expanded: usize,
    /// 各拒绝原因出现的次数
    pub rejections: BTreeMap<Rejection, usize>,
}

impl SearchStats {
    fn reject(&mut self, reason: Rejection) {
        *self.rejections.entry(reason).or_insert(0) += 1;
    }
}

/// 一条语句的计划树，构建后不可变
#[derive(Debug, Clone)]
pub struct PlanTree {
    query: Arc<Query>,
    nodes: Vec<StepNode>,
    stats: SearchStats,
}

impl PlanTree {
    pub fn query(&self) -> &Arc<Query> {
        &self.query
    }

    pub fn root(&self) -> &StepNode {
        &self.nodes[0]
    }

    pub fn node(&self, id: StepId) -> Option<&StepNode> {
        self.nodes.get(id)
    }

    /// 全部步骤节点（含根），按深度优先顺序
    pub fn steps(&self) -> impl Iterator<Item = &StepNode> {
        self.nodes.iter()
    }

    /// 根之外的步骤数
    pub fn len(&self) -> usize {
        self.nodes.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.root().is_leaf()
    }

    pub fn stats(&self) -> &SearchStats {
        &self.stats
    }

    /// 叶子节点下标，按深度优先顺序
    pub fn leaves(&self) -> Vec<StepId> {
        if self.is_empty() {
            return Vec::new();
        }
        (1..self.nodes.len())
            .filter(|&id| self.nodes[id].is_leaf())
            .collect()
    }

    /// 从根到某个叶子的计划
    pub fn plan_at(&self, leaf: StepId) -> Plan {
        let mut steps = Vec::new();
        let mut current = Some(leaf);
        while let Some(id) = current {
            let node = &self.nodes[id];
            if node.parent.is_some() {
                steps.push(node.step.clone());
            }
            current = node.parent;
        }
        steps.reverse();
        Plan::new(
            Arc::clone(&self.query),
            steps,
            self.nodes[leaf].state.clone(),
        )
    }

    /// 全部叶子计划
    pub fn plans(&self) -> Vec<Plan> {
        self.leaves().into_iter().map(|id| self.plan_at(id)).collect()
    }

    /// 代价最小的计划，代价相同时取先出现者
    pub fn min_plan(&self) -> Option<Plan> {
        let mut best: Option<Plan> = None;
        for plan in self.plans() {
            match &best {
                Some(current) if current.cost() <= plan.cost() => {}
                _ => best = Some(plan),
            }
        }
        best
    }

    /// 仅保留满足条件的叶子计划，其余分支被移除
    pub fn retain_plans(&self, keep: impl Fn(&Plan) -> bool) -> PlanTree {
        let mut alive = vec![false; self.nodes.len()];
        alive[0] = true;
        for leaf in self.leaves() {
            if keep(&self.plan_at(leaf)) {
                let mut current = Some(leaf);
                while let Some(id) = current {
                    alive[id] = true;
                    current = self.nodes[id].parent;
                }
            }
        }

        let mut remap: Vec<Option<StepId>> = vec![None; self.nodes.len()];
        let mut nodes: Vec<StepNode> = Vec::new();
        for (id, node) in self.nodes.iter().enumerate() {
            if !alive[id] {
                continue;
            }
            remap[id] = Some(nodes.len());
            nodes.push(StepNode {
                step: node.step.clone(),
                state: node.state.clone(),
                parent: node.parent.and_then(|p| remap[p]),
                children: Vec::new(),
            });
        }
        for id in 1..nodes.len() {
            if let Some(parent) = nodes[id].parent {
                nodes[parent].children.push(id);
            }
        }

        PlanTree {
            query: Arc::clone(&self.query),
            nodes,
            stats: self.stats.clone(),
        }
    }

    /// 移除代价超过最小计划 `ratio` 倍的计划
    pub fn pruned_by_cost_ratio(&self, ratio: f64) -> PlanTree {
        let min_cost = match self.min_plan() {
            Some(plan) => plan.cost(),
            None => return self.clone(),
        };
        let limit = min_cost * ratio;
        let pruned = self.retain_plans(|plan| plan.cost() <= limit);
        debug!(
            "语句 {} 按代价比 {} 裁剪后保留 {} 个计划",
            self.query.text(),
            ratio,
            pruned.leaves().len()
        );
        pruned
    }

    /// 树的文本形式，用于诊断
    pub fn dump(&self) -> String {
        let mut out = String::new();
        self.dump_node(0, 0, &mut out);
        if self.is_empty() {
            let _ = writeln!(out, "{}", self.root().state);
            let _ = write!(out, "展开节点 {} 个", self.stats.expanded);
            for (reason, count) in &self.stats.rejections {
                let _ = write!(out, "\n  拒绝 {:?}: {} 次", reason, count);
            }
        }
        out
    }

    fn dump_node(&self, id: StepId, depth: usize, out: &mut String) {
        let node = &self.nodes[id];
        let _ = writeln!(
            out,
            "{}{} (代价 {:.4}, 基数 {:.2})",
            "  ".repeat(depth),
            node.step,
            node.step.cost(),
            node.step.cardinality()
        );
        for &child in &node.children {
            self.dump_node(child, depth + 1, out);
        }
    }
}

/// 查询规划器
///
/// 持有只读的候选索引池与代价模型，可在多个线程间共享
#[derive(Debug, Clone)]
pub struct QueryPlanner<'a> {
    indexes: Vec<Arc<Index>>,
    cost_model: &'a dyn CostModel,
    config: PlannerConfig,
}

impl<'a> QueryPlanner<'a> {
    pub fn new(indexes: &[Arc<Index>], cost_model: &'a dyn CostModel, config: PlannerConfig) -> Self {
        let mut indexes: Vec<Arc<Index>> = indexes.to_vec();
        indexes.sort();
        indexes.dedup();
        Self {
            indexes,
            cost_model,
            config,
        }
    }

    pub fn indexes(&self) -> &[Arc<Index>] {
        &self.indexes
    }

    pub fn cost_model(&self) -> &'a dyn CostModel {
        self.cost_model
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// 为语句构建计划树
    pub fn plan(&self, query: &Arc<Query>) -> PlanningResult<PlanTree> {
        let state = PlanningState::new(Arc::clone(query));
        let root = StepNode {
            step: PlanStep::root(&state),
            state,
            parent: None,
            children: Vec::new(),
        };
        let mut search = Search {
            planner: self,
            nodes: vec![root],
            stats: SearchStats::default(),
        };
        let mut used = BTreeSet::new();
        search.expand(0, &mut used, 0);

        let tree = PlanTree {
            query: Arc::clone(query),
            nodes: search.nodes,
            stats: search.stats,
        };
        if tree.is_empty() {
            return Err(PlanningError::NoPlanFound {
                statement: query.text().to_string(),
                tree: tree.dump(),
            });
        }

        let tree = tree.retain_plans(|plan| match PlanValidator::validate_plan(plan) {
            Ok(()) => true,
            Err(err) => {
                warn!("移除无效计划: {}", err);
                false
            }
        });
        let tree = match self.config.cost_ratio {
            Some(ratio) => tree.pruned_by_cost_ratio(ratio),
            None => tree,
        };
        if tree.is_empty() {
            return Err(PlanningError::NoPlanFound {
                statement: query.text().to_string(),
                tree: tree.dump(),
            });
        }

        debug!(
            "语句 {} 的计划树含 {} 个步骤、{} 个计划",
            query.text(),
            tree.len(),
            tree.leaves().len()
        );
        Ok(tree)
    }
}

/// 单条语句的搜索过程
struct Search<'p, 'a> {
    planner: &'p QueryPlanner<'a>,
    nodes: Vec<StepNode>,
    stats: SearchStats,
}

impl Search<'_, '_> {
    /// 展开节点，返回其下是否存在已回答的叶子
    fn expand(&mut self, id: StepId, used: &mut BTreeSet<String>, lookups: usize) -> bool {
        if self.nodes[id].state.is_answered() {
            return true;
        }
        self.stats.expanded += 1;

        for (step, state) in self.candidates(id, used, lookups) {
            let child = self.nodes.len();
            let key = step.index().filter(|_| step.is_lookup()).map(|i| i.key().to_string());
            self.nodes.push(StepNode {
                step,
                state,
                parent: Some(id),
                children: Vec::new(),
            });

            let alive = match key {
                Some(key) => {
                    used.insert(key.clone());
                    let alive = self.expand(child, used, lookups + 1);
                    used.remove(&key);
                    alive
                }
                None => self.expand(child, used, lookups),
            };
            if alive {
                self.nodes[id].children.push(child);
            } else {
                self.nodes.truncate(child);
            }
        }
        !self.nodes[id].children.is_empty()
    }

    /// 节点的全部有效子步骤：先非索引步骤，再按键顺序的索引查找
    fn candidates(&mut self, id: StepId, used: &BTreeSet<String>, lookups: usize) -> Vec<Applied> {
        let planner = self.planner;
        let cost_model = planner.cost_model;
        let node = &self.nodes[id];
        let state = &node.state;

        let mut results: Vec<Result<Applied, Rejection>> = vec![
            PlanStep::filter(state, cost_model),
            PlanStep::sort(state, cost_model),
            PlanStep::limit(state, cost_model),
            PlanStep::aggregate(state, cost_model),
        ];

        let limited = planner
            .config
            .max_index_lookups
            .map(|max| lookups >= max)
            .unwrap_or(false);
        if limited {
            self.stats.reject(Rejection::LookupLimit);
        } else {
            let last_lookup = self.last_lookup(id);
            let context = LookupContext {
                last_lookup: last_lookup.as_deref(),
                parent_aggregating: node.step.is_aggregating(),
            };
            let head = state.joins().first();
            let pool: Vec<&Arc<Index>> = planner
                .indexes
                .iter()
                .filter(|index| head.map(|h| index.graph().contains(h)).unwrap_or(false))
                .collect();
            let (reused, fresh): (Vec<&Arc<Index>>, Vec<&Arc<Index>>) =
                pool.into_iter().partition(|index| used.contains(index.key()));
            for _ in reused {
                self.stats.reject(Rejection::IndexReused);
            }

            let apply = |index: &&Arc<Index>| PlanStep::index_lookup(state, context, index, cost_model);
            if fresh.len() >= planner.config.parallel_threshold {
                results.extend(fresh.par_iter().map(apply).collect::<Vec<_>>());
            } else {
                results.extend(fresh.iter().map(apply));
            }
        }

        let mut applied = Vec::new();
        for result in results {
            match result {
                Ok(step) => applied.push(step),
                Err(Rejection::NotApplicable) => {}
                Err(reason) => self.stats.reject(reason),
            }
        }
        applied
    }

    /// 分支上最近一次索引查找的索引
    fn last_lookup(&self, id: StepId) -> Option<Arc<Index>> {
        let mut current = Some(id);
        while let Some(id) = current {
            let node = &self.nodes[id];
            if node.step.is_lookup() {
                return node.step.index().cloned();
            }
            current = node.parent;
        }
        None
    }
}
