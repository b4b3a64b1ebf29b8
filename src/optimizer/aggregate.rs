//! 代价聚合
//!
//! 把一条语句的计划树归约为 (语句, 索引) 代价表：每个计划在
//! 索引查找处切分成若干段，段代价（不含末尾排序）乘以语句权重后
//! 归属段首的索引。两个计划对同一索引给出不同代价时保留较便宜的计划。

use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;

use log::warn;

use crate::core::error::{PlanningError, PlanningResult};
use crate::model::{Index, Query};
use crate::planner::{Plan, PlanTree};

/// 计划中以一次索引查找开头的连续步骤
#[derive(Debug, Clone)]
pub struct PlanRun {
    pub index: Arc<Index>,
    /// 步骤下标范围
    pub steps: Range<usize>,
    /// 段代价（未乘权重）
    pub cost: f64,
}

/// 把计划切分为段
pub fn plan_runs(plan: &Plan) -> Vec<PlanRun> {
    let steps = plan.steps();
    let starts: Vec<usize> = steps
        .iter()
        .enumerate()
        .filter(|(_, s)| s.is_lookup())
        .map(|(i, _)| i)
        .collect();

    let mut runs = Vec::with_capacity(starts.len());
    for (n, &start) in starts.iter().enumerate() {
        let end = starts.get(n + 1).copied().unwrap_or(steps.len());
        // 首个查找之前的步骤归入第一段
        let first = if n == 0 { 0 } else { start };
        let index = match steps[start].index() {
            Some(index) => Arc::clone(index),
            None => continue,
        };
        let mut cost_end = end;
        if cost_end > start + 1 && steps[cost_end - 1].is_sort() {
            cost_end -= 1;
        }
        let cost = steps[first..cost_end].iter().map(|s| s.cost()).sum();
        runs.push(PlanRun {
            index,
            steps: first..end,
            cost,
        });
    }
    runs
}

/// 代价表中的一项
#[derive(Debug, Clone)]
pub struct CostEntry {
    pub index: Arc<Index>,
    /// 已乘权重的代价
    pub cost: f64,
    /// 首次给出该代价的计划
    plan: usize,
}

/// 存活计划及其归属代价之和
#[derive(Debug, Clone)]
pub struct CostedPlan {
    plan: Plan,
    runs: Vec<PlanRun>,
    cost: f64,
}

impl CostedPlan {
    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub fn runs(&self) -> &[PlanRun] {
        &self.runs
    }

    /// 归属到各索引的代价之和（已乘权重）
    pub fn cost(&self) -> f64 {
        self.cost
    }
}

/// 一条语句的代价表与存活计划
#[derive(Debug, Clone)]
pub struct StatementCosts {
    query: Arc<Query>,
    plans: Vec<CostedPlan>,
    table: BTreeMap<String, CostEntry>,
    pruned: usize,
}

impl StatementCosts {
    pub fn query(&self) -> &Arc<Query> {
        &self.query
    }

    pub fn plans(&self) -> &[CostedPlan] {
        &self.plans
    }

    /// 按索引键排列的代价表
    pub fn table(&self) -> &BTreeMap<String, CostEntry> {
        &self.table
    }

    pub fn cost_for(&self, index: &Index) -> Option<f64> {
        self.table.get(index.key()).map(|e| e.cost)
    }

    /// 因代价冲突被移除的计划数
    pub fn pruned(&self) -> usize {
        self.pruned
    }

    /// 只保留满足条件的计划，代价表随之重建
    pub fn retain_plans(&mut self, keep: impl Fn(&CostedPlan) -> bool) {
        self.plans.retain(|p| keep(p));
        let mut table = BTreeMap::new();
        for (id, costed) in self.plans.iter().enumerate() {
            for run in &costed.runs {
                table.entry(run.index.key().to_string()).or_insert_with(|| CostEntry {
                    index: Arc::clone(&run.index),
                    cost: run.cost * self.query.weight(),
                    plan: id,
                });
            }
        }
        self.table = table;
    }
}

/// 归约计划树
pub fn aggregate_costs(tree: &PlanTree, tolerance: f64) -> PlanningResult<StatementCosts> {
    aggregate_plans(Arc::clone(tree.query()), tree.plans(), tolerance)
}

fn aggregate_plans(
    query: Arc<Query>,
    mut plans: Vec<Plan>,
    tolerance: f64,
) -> PlanningResult<StatementCosts> {
    let weight = query.weight();
    plans.sort_by(|a, b| a.cost().total_cmp(&b.cost()));

    let mut costs = StatementCosts {
        query,
        plans: Vec::new(),
        table: BTreeMap::new(),
        pruned: 0,
    };

    'plans: for plan in plans {
        let runs = plan_runs(&plan);
        for run in &runs {
            let attributed = run.cost * weight;
            let entry = match costs.table.get(run.index.key()) {
                Some(entry) => entry,
                None => continue,
            };
            if (entry.cost - attributed).abs() <= tolerance * entry.cost.abs().max(1.0) {
                continue;
            }

            let existing = &costs.plans[entry.plan];
            if escalates(existing, &plan, run) {
                return Err(PlanningError::InconsistentCost {
                    statement: costs.query.text().to_string(),
                    index: run.index.key().to_string(),
                    existing: entry.cost,
                    found: attributed,
                });
            }
            warn!(
                "语句 {} 在索引 {} 上的代价 {:.4} 与 {:.4} 不一致，移除计划 {}",
                costs.query.text(),
                run.index.key(),
                entry.cost,
                attributed,
                plan
            );
            costs.pruned += 1;
            continue 'plans;
        }

        let id = costs.plans.len();
        for run in &runs {
            costs
                .table
                .entry(run.index.key().to_string())
                .or_insert_with(|| CostEntry {
                    index: Arc::clone(&run.index),
                    cost: run.cost * weight,
                    plan: id,
                });
        }
        let cost = runs.iter().map(|r| r.cost).sum::<f64>() * weight;
        costs.plans.push(CostedPlan { plan, runs, cost });
    }
    Ok(costs)
}

/// 两个计划均无过滤步骤且冲突段之前的步骤完全相同时才视为代价模型缺陷
fn escalates(existing: &CostedPlan, plan: &Plan, conflict: &PlanRun) -> bool {
    if existing.plan.has_filter() || plan.has_filter() {
        return false;
    }
    let other = match existing
        .runs
        .iter()
        .find(|r| r.index.key() == conflict.index.key())
    {
        Some(run) => run,
        None => return false,
    };
    existing.plan.steps()[..other.steps.start] == plan.steps()[..conflict.steps.start]
}
