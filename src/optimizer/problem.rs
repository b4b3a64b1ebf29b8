//! 优化问题
//!
//! 由全部语句的代价表组装 0-1 整数规划：
//!
//! - 每个候选索引一个变量，每个 (语句, 计划) 一个变量
//! - 每条读语句恰好选中一个计划
//! - 选中计划迫使其索引被选中
//! - 被写语句修改的索引选中时，其支撑查询恰好选中一个计划，
//!   维护代价记在索引变量上；支撑查询无法规划时该索引不可选
//! - 选中索引的总大小不超过空间预算

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use log::{debug, info, warn};

use crate::config::OptimizerConfig;
use crate::core::error::{OptimizeError, OptimizeResult, SolverError};
use crate::model::Index;
use crate::planner::{IndexMaintenance, Plan};

use super::aggregate::StatementCosts;
use super::milp::{MilpProblem, MilpSolver, Sense, VarId};
use super::result::{SearchResult, UpdatePlan};

/// 写语句对一个索引的维护及其支撑查询的代价表
#[derive(Debug, Clone)]
pub struct MaintenanceCosts {
    maintenance: IndexMaintenance,
    support: Option<Vec<StatementCosts>>,
}

impl MaintenanceCosts {
    pub fn new(maintenance: IndexMaintenance, support: Option<Vec<StatementCosts>>) -> Self {
        Self {
            maintenance,
            support,
        }
    }

    pub fn maintenance(&self) -> &IndexMaintenance {
        &self.maintenance
    }

    pub fn support(&self) -> Option<&[StatementCosts]> {
        self.support.as_deref()
    }
}

#[derive(Debug, Clone)]
struct StatementVars {
    costs: StatementCosts,
    plan_vars: Vec<VarId>,
}

#[derive(Debug, Clone)]
struct MaintenanceVars {
    maintenance: IndexMaintenance,
    support: Option<Vec<StatementVars>>,
}

fn plan_index_keys<'a>(costs: &'a [StatementCosts]) -> impl Iterator<Item = &'a str> + 'a {
    costs
        .iter()
        .flat_map(|c| c.plans().iter())
        .flat_map(|p| p.runs().iter().map(|r| r.index.key()))
}

/// 读计划用到的索引，加上被维护时其支撑计划用到的索引，直到不再增长
fn reachable_indexes(
    candidates: &[Arc<Index>],
    queries: &[StatementCosts],
    maintenance: &[MaintenanceCosts],
) -> BTreeSet<String> {
    let allowed: BTreeSet<&str> = candidates.iter().map(|i| i.key()).collect();
    let mut used: BTreeSet<String> = plan_index_keys(queries)
        .filter(|key| allowed.contains(key))
        .map(str::to_string)
        .collect();
    loop {
        let grown: Vec<String> = maintenance
            .iter()
            .filter(|entry| used.contains(entry.maintenance.index().key()))
            .filter_map(|entry| entry.support())
            .flat_map(|supports| plan_index_keys(supports))
            .filter(|key| allowed.contains(key) && !used.contains(*key))
            .map(str::to_string)
            .collect();
        if grown.is_empty() {
            return used;
        }
        used.extend(grown);
    }
}

/// 全局索引选择问题
#[derive(Debug, Clone)]
pub struct OptimizationProblem {
    indexes: Vec<Arc<Index>>,
    index_vars: BTreeMap<String, VarId>,
    queries: Vec<StatementVars>,
    maintenance: Vec<MaintenanceVars>,
    budget: Option<f64>,
    milp: MilpProblem,
}

impl OptimizationProblem {
    /// 预处理并组装整数规划
    pub fn new(
        indexes: &[Arc<Index>],
        queries: Vec<StatementCosts>,
        maintenance: Vec<MaintenanceCosts>,
        config: &OptimizerConfig,
    ) -> OptimizeResult<Self> {
        let budget = config.space_budget;
        let mut candidates: Vec<Arc<Index>> = indexes.to_vec();
        candidates.sort();
        candidates.dedup();

        let mut queries = queries;
        if let (Some(budget), true) = (budget, config.prune_oversized) {
            let (kept, oversized): (Vec<_>, Vec<_>) =
                candidates.into_iter().partition(|i| i.size() <= budget);
            if !oversized.is_empty() {
                info!("移除 {} 个超出预算 {} 的索引", oversized.len(), budget);
            }
            candidates = kept;
            let allowed: BTreeSet<String> = candidates.iter().map(|i| i.key().to_string()).collect();
            for costs in queries.iter_mut() {
                restrict(costs, &allowed);
                if costs.plans().is_empty() {
                    warn!("语句 {} 的所有计划都超出预算 {}", costs.query().text(), budget);
                    return Err(OptimizeError::NoSolution {
                        budget: Some(budget),
                    });
                }
            }
        }

        let used = reachable_indexes(&candidates, &queries, &maintenance);
        let before = candidates.len();
        candidates.retain(|i| used.contains(i.key()));
        if candidates.len() < before {
            info!("移除 {} 个未被任何计划使用的索引", before - candidates.len());
        }

        let mut milp = MilpProblem::new();
        let mut index_vars = BTreeMap::new();
        for index in &candidates {
            let var = milp.add_variable(format!("index_{}", index.key()), 0.0);
            index_vars.insert(index.key().to_string(), var);
        }

        let mut query_vars = Vec::with_capacity(queries.len());
        for (n, costs) in queries.into_iter().enumerate() {
            let vars = add_statement(&mut milp, &index_vars, costs, &format!("q{}", n));
            milp.add_constraint(
                format!("q{}_one_plan", n),
                vars.plan_vars.iter().map(|&v| (v, 1.0)),
                Sense::Eq,
                1.0,
            );
            query_vars.push(vars);
        }

        let mut maintenance_vars = Vec::new();
        for (n, entry) in maintenance.into_iter().enumerate() {
            let index_var = match index_vars.get(entry.maintenance.index().key()) {
                Some(&var) => var,
                None => continue,
            };
            let objective = milp.variables()[index_var].objective
                + entry.maintenance.weighted_update_cost();
            milp.set_objective(index_var, objective);

            let allowed: BTreeSet<String> = index_vars.keys().cloned().collect();
            let support = entry.support.and_then(|supports| {
                let mut restricted = Vec::with_capacity(supports.len());
                for mut costs in supports {
                    restrict(&mut costs, &allowed);
                    if costs.plans().is_empty() {
                        return None;
                    }
                    restricted.push(costs);
                }
                Some(restricted)
            });

            let support = match support {
                Some(supports) => {
                    let mut vars = Vec::with_capacity(supports.len());
                    for (s, costs) in supports.into_iter().enumerate() {
                        let prefix = format!("u{}_s{}", n, s);
                        let statement = add_statement(&mut milp, &index_vars, costs, &prefix);
                        let mut terms: Vec<(VarId, f64)> =
                            statement.plan_vars.iter().map(|&v| (v, 1.0)).collect();
                        terms.push((index_var, -1.0));
                        milp.add_constraint(format!("{}_iff_index", prefix), terms, Sense::Eq, 0.0);
                        vars.push(statement);
                    }
                    Some(vars)
                }
                None => {
                    debug!(
                        "{} 无法维护索引 {}，禁止选中",
                        entry.maintenance.statement().text(),
                        entry.maintenance.index().key()
                    );
                    milp.add_constraint(
                        format!("u{}_unsupported", n),
                        [(index_var, 1.0)],
                        Sense::Le,
                        0.0,
                    );
                    None
                }
            };
            maintenance_vars.push(MaintenanceVars {
                maintenance: entry.maintenance,
                support,
            });
        }

        if let Some(budget) = budget {
            milp.add_constraint(
                "space_budget",
                candidates
                    .iter()
                    .filter_map(|i| index_vars.get(i.key()).map(|&v| (v, i.size()))),
                Sense::Le,
                budget,
            );
        }

        info!(
            "整数规划含 {} 个变量、{} 条约束",
            milp.variables().len(),
            milp.constraints().len()
        );
        Ok(Self {
            indexes: candidates,
            index_vars,
            queries: query_vars,
            maintenance: maintenance_vars,
            budget,
            milp,
        })
    }

    /// 预处理后保留的候选索引
    pub fn indexes(&self) -> &[Arc<Index>] {
        &self.indexes
    }

    pub fn milp(&self) -> &MilpProblem {
        &self.milp
    }

    pub fn budget(&self) -> Option<f64> {
        self.budget
    }

    /// 调用求解后端并提取结果
    pub fn solve(&self, solver: &dyn MilpSolver) -> OptimizeResult<SearchResult> {
        let assignment = solver.solve(&self.milp).map_err(|err| match err {
            SolverError::Infeasible => {
                warn!("空间预算 {:?} 下整数规划不可行", self.budget);
                OptimizeError::NoSolution {
                    budget: self.budget,
                }
            }
            SolverError::NodeLimit { nodes } => OptimizeError::SolverLimit { nodes },
        })?;
        info!(
            "求解器 {} 完成，目标值 {:.4}",
            solver.name(),
            assignment.objective()
        );

        let indexes: Vec<Arc<Index>> = self
            .indexes
            .iter()
            .filter(|i| {
                self.index_vars
                    .get(i.key())
                    .map(|&v| assignment.value(v))
                    .unwrap_or(false)
            })
            .cloned()
            .collect();

        let mut plans = Vec::with_capacity(self.queries.len());
        for statement in &self.queries {
            let plan = statement
                .selected(|v| assignment.value(v))
                .ok_or_else(|| {
                    OptimizeError::InternalError(format!(
                        "语句 {} 没有选中计划",
                        statement.costs.query().text()
                    ))
                })?;
            plans.push(plan);
        }

        let mut update_plans = Vec::new();
        for entry in &self.maintenance {
            let selected = self
                .index_vars
                .get(entry.maintenance.index().key())
                .map(|&v| assignment.value(v))
                .unwrap_or(false);
            if !selected {
                continue;
            }
            let mut support_plans = Vec::new();
            for statement in entry.support.iter().flatten() {
                if let Some(plan) = statement.selected(|v| assignment.value(v)) {
                    support_plans.push(plan);
                }
            }
            update_plans.push(UpdatePlan::new(
                Arc::clone(entry.maintenance.statement()),
                Arc::clone(entry.maintenance.index()),
                support_plans,
                entry.maintenance.steps().to_vec(),
            ));
        }

        let result = SearchResult::new(
            indexes,
            plans,
            update_plans,
            self.budget,
            assignment.objective(),
        );
        result.validate()?;
        Ok(result)
    }
}

impl StatementVars {
    fn selected(&self, value: impl Fn(VarId) -> bool) -> Option<Plan> {
        self.plan_vars
            .iter()
            .position(|&v| value(v))
            .map(|i| self.costs.plans()[i].plan().clone())
    }
}

/// 为语句的每个计划增加变量与“计划蕴含索引”约束
fn add_statement(
    milp: &mut MilpProblem,
    index_vars: &BTreeMap<String, VarId>,
    costs: StatementCosts,
    prefix: &str,
) -> StatementVars {
    let mut plan_vars = Vec::with_capacity(costs.plans().len());
    for (p, costed) in costs.plans().iter().enumerate() {
        let var = milp.add_variable(format!("{}_p{}", prefix, p), costed.cost());
        let keys: BTreeSet<&str> = costed.runs().iter().map(|r| r.index.key()).collect();
        for key in keys {
            if let Some(&index_var) = index_vars.get(key) {
                milp.add_constraint(
                    format!("{}_p{}_uses_{}", prefix, p, key),
                    [(var, 1.0), (index_var, -1.0)],
                    Sense::Le,
                    0.0,
                );
            }
        }
        plan_vars.push(var);
    }
    StatementVars { costs, plan_vars }
}

/// 只保留所用索引都在允许集合中的计划
fn restrict(costs: &mut StatementCosts, allowed: &BTreeSet<String>) {
    costs.retain_plans(|p| p.runs().iter().all(|r| allowed.contains(r.index.key())));
}
