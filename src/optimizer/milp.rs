//! 0-1 整数规划模型与求解器
//!
//! 优化问题只负责组装变量、约束与目标，求解通过 `MilpSolver`
//! 接口调用任意后端。内置后端 `BranchAndBoundSolver` 是精确的
//! 深度优先分支定界：节点上做活动界传播，下界由固定部分加上
//! 互不相交的集合划分约束各自的最小代价构成。

use std::fmt;

use log::{debug, warn};

use crate::core::error::SolverError;

/// 变量下标
pub type VarId = usize;

const EPSILON: f64 = 1e-9;

/// 约束方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    Le,
    Eq,
    Ge,
}

impl fmt::Display for Sense {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Sense::Le => "<=",
            Sense::Eq => "=",
            Sense::Ge => ">=",
        };
        write!(f, "{}", symbol)
    }
}

/// 0-1 变量
#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub objective: f64,
}

/// 线性约束 Σ coef·x (sense) rhs
#[derive(Debug, Clone)]
pub struct Constraint {
    pub name: String,
    pub terms: Vec<(VarId, f64)>,
    pub sense: Sense,
    pub rhs: f64,
}

impl Constraint {
    fn activity(&self, values: &[bool]) -> f64 {
        self.terms
            .iter()
            .filter(|(var, _)| values[*var])
            .map(|(_, coef)| coef)
            .sum()
    }

    fn is_satisfied_by(&self, values: &[bool]) -> bool {
        let activity = self.activity(values);
        match self.sense {
            Sense::Le => activity <= self.rhs + EPSILON,
            Sense::Ge => activity >= self.rhs - EPSILON,
            Sense::Eq => (activity - self.rhs).abs() <= EPSILON,
        }
    }

    /// Σx = 1 且系数全为 1
    fn is_set_partition(&self) -> bool {
        self.sense == Sense::Eq
            && (self.rhs - 1.0).abs() <= EPSILON
            && !self.terms.is_empty()
            && self.terms.iter().all(|(_, coef)| (coef - 1.0).abs() <= EPSILON)
    }
}

/// 0-1 整数规划问题，目标为最小化
#[derive(Debug, Clone, Default)]
pub struct MilpProblem {
    variables: Vec<Variable>,
    constraints: Vec<Constraint>,
}

impl MilpProblem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_variable(&mut self, name: impl Into<String>, objective: f64) -> VarId {
        self.variables.push(Variable {
            name: name.into(),
            objective,
        });
        self.variables.len() - 1
    }

    pub fn set_objective(&mut self, var: VarId, objective: f64) {
        if let Some(variable) = self.variables.get_mut(var) {
            variable.objective = objective;
        }
    }

    /// 增加约束，同一变量的多项会合并
    pub fn add_constraint(
        &mut self,
        name: impl Into<String>,
        terms: impl IntoIterator<Item = (VarId, f64)>,
        sense: Sense,
        rhs: f64,
    ) {
        let mut merged: Vec<(VarId, f64)> = Vec::new();
        for (var, coef) in terms {
            match merged.iter_mut().find(|(v, _)| *v == var) {
                Some((_, existing)) => *existing += coef,
                None => merged.push((var, coef)),
            }
        }
        merged.retain(|(_, coef)| coef.abs() > EPSILON);
        self.constraints.push(Constraint {
            name: name.into(),
            terms: merged,
            sense,
            rhs,
        });
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn objective_value(&self, values: &[bool]) -> f64 {
        self.variables
            .iter()
            .zip(values)
            .filter(|(_, &value)| value)
            .map(|(var, _)| var.objective)
            .sum()
    }

    pub fn is_feasible(&self, values: &[bool]) -> bool {
        values.len() == self.variables.len()
            && self.constraints.iter().all(|c| c.is_satisfied_by(values))
    }
}

/// 求解结果
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    values: Vec<bool>,
    objective: f64,
}

impl Assignment {
    pub fn new(values: Vec<bool>, objective: f64) -> Self {
        Self { values, objective }
    }

    pub fn value(&self, var: VarId) -> bool {
        self.values.get(var).copied().unwrap_or(false)
    }

    pub fn values(&self) -> &[bool] {
        &self.values
    }

    pub fn objective(&self) -> f64 {
        self.objective
    }
}

/// 整数规划求解后端
pub trait MilpSolver: Send + Sync + fmt::Debug {
    fn solve(&self, problem: &MilpProblem) -> Result<Assignment, SolverError>;

    fn name(&self) -> &str {
        "custom"
    }
}

/// 内置分支定界求解器
#[derive(Debug, Clone)]
pub struct BranchAndBoundSolver {
    max_nodes: usize,
}

impl BranchAndBoundSolver {
    pub fn new(max_nodes: usize) -> Self {
        Self {
            max_nodes: max_nodes.max(1),
        }
    }

    pub fn max_nodes(&self) -> usize {
        self.max_nodes
    }
}

impl Default for BranchAndBoundSolver {
    fn default() -> Self {
        Self::new(1_000_000)
    }
}

type Partial = Vec<Option<bool>>;

impl MilpSolver for BranchAndBoundSolver {
    fn solve(&self, problem: &MilpProblem) -> Result<Assignment, SolverError> {
        let partitions = disjoint_partitions(problem);
        let mut stack: Vec<Partial> = vec![vec![None; problem.variables.len()]];
        let mut best: Option<Assignment> = None;
        let mut nodes = 0usize;

        while let Some(mut values) = stack.pop() {
            nodes += 1;
            if nodes > self.max_nodes {
                return match best {
                    Some(assignment) => {
                        warn!(
                            "分支定界达到节点上限 {}，返回当前最优解 {:.4}",
                            self.max_nodes, assignment.objective
                        );
                        Ok(assignment)
                    }
                    None => Err(SolverError::NodeLimit {
                        nodes: self.max_nodes,
                    }),
                };
            }

            if !propagate(problem, &mut values) {
                continue;
            }
            let bound = lower_bound(problem, &values, &partitions);
            if let Some(incumbent) = &best {
                if bound >= incumbent.objective - EPSILON {
                    continue;
                }
            }

            match choose_branch(problem, &values, &partitions) {
                Some((var, first)) => {
                    let mut second = values.clone();
                    second[var] = Some(!first);
                    values[var] = Some(first);
                    stack.push(second);
                    stack.push(values);
                }
                None => {
                    let assigned: Vec<bool> = values.iter().map(|v| v.unwrap_or(false)).collect();
                    if !problem.is_feasible(&assigned) {
                        continue;
                    }
                    let objective = problem.objective_value(&assigned);
                    let improves = best
                        .as_ref()
                        .map(|b| objective < b.objective - EPSILON)
                        .unwrap_or(true);
                    if improves {
                        best = Some(Assignment::new(assigned, objective));
                    }
                }
            }
        }

        debug!("分支定界共展开 {} 个节点", nodes);
        best.ok_or(SolverError::Infeasible)
    }

    fn name(&self) -> &str {
        "branch-and-bound"
    }
}

/// 贪心选出的互不相交的集合划分约束
fn disjoint_partitions(problem: &MilpProblem) -> Vec<usize> {
    let mut seen = vec![false; problem.variables.len()];
    let mut chosen = Vec::new();
    for (id, constraint) in problem.constraints.iter().enumerate() {
        if !constraint.is_set_partition() {
            continue;
        }
        if constraint.terms.iter().any(|(var, _)| seen[*var]) {
            continue;
        }
        for (var, _) in &constraint.terms {
            seen[*var] = true;
        }
        chosen.push(id);
    }
    chosen
}

/// 活动界传播，发现不可行时返回 false
fn propagate(problem: &MilpProblem, values: &mut Partial) -> bool {
    loop {
        let mut changed = false;
        for constraint in &problem.constraints {
            let mut min_activity = 0.0;
            let mut max_activity = 0.0;
            for (var, coef) in &constraint.terms {
                match values[*var] {
                    Some(true) => {
                        min_activity += coef;
                        max_activity += coef;
                    }
                    Some(false) => {}
                    None => {
                        min_activity += coef.min(0.0);
                        max_activity += coef.max(0.0);
                    }
                }
            }

            let upper = matches!(constraint.sense, Sense::Le | Sense::Eq);
            let lower = matches!(constraint.sense, Sense::Ge | Sense::Eq);
            if upper && min_activity > constraint.rhs + EPSILON {
                return false;
            }
            if lower && max_activity < constraint.rhs - EPSILON {
                return false;
            }

            for (var, coef) in &constraint.terms {
                if values[*var].is_some() {
                    continue;
                }
                let coef = *coef;
                // 取 1 时最小活动增加 max(coef, 0)，取 0 时增加 max(-coef, 0)
                if upper {
                    if coef > 0.0 && min_activity + coef > constraint.rhs + EPSILON {
                        values[*var] = Some(false);
                        changed = true;
                        continue;
                    }
                    if coef < 0.0 && min_activity - coef > constraint.rhs + EPSILON {
                        values[*var] = Some(true);
                        changed = true;
                        continue;
                    }
                }
                if lower {
                    if coef > 0.0 && max_activity - coef < constraint.rhs - EPSILON {
                        values[*var] = Some(true);
                        changed = true;
                        continue;
                    }
                    if coef < 0.0 && max_activity + coef < constraint.rhs - EPSILON {
                        values[*var] = Some(false);
                        changed = true;
                    }
                }
            }
        }
        if !changed {
            return true;
        }
    }
}

/// 目标下界
fn lower_bound(problem: &MilpProblem, values: &Partial, partitions: &[usize]) -> f64 {
    let mut bound: f64 = problem
        .variables
        .iter()
        .zip(values.iter())
        .map(|(var, value)| match value {
            Some(true) => var.objective,
            Some(false) => 0.0,
            None => var.objective.min(0.0),
        })
        .sum();

    for &id in partitions {
        let constraint = &problem.constraints[id];
        let satisfied = constraint
            .terms
            .iter()
            .any(|(var, _)| values[*var] == Some(true));
        if satisfied {
            continue;
        }
        let cheapest = constraint
            .terms
            .iter()
            .filter(|(var, _)| values[*var].is_none())
            .map(|(var, _)| problem.variables[*var].objective)
            .fold(f64::INFINITY, f64::min);
        if cheapest.is_finite() && cheapest > 0.0 {
            bound += cheapest;
        }
    }
    bound
}

/// 选择分支变量与先尝试的取值
///
/// 优先在尚未满足的集合划分约束中选代价最小的自由变量并先取 1，
/// 否则取第一个自由变量，先试代价更低的取值
fn choose_branch(problem: &MilpProblem, values: &Partial, partitions: &[usize]) -> Option<(VarId, bool)> {
    for &id in partitions {
        let constraint = &problem.constraints[id];
        if constraint
            .terms
            .iter()
            .any(|(var, _)| values[*var] == Some(true))
        {
            continue;
        }
        let cheapest = constraint
            .terms
            .iter()
            .filter(|(var, _)| values[*var].is_none())
            .min_by(|a, b| {
                problem.variables[a.0]
                    .objective
                    .total_cmp(&problem.variables[b.0].objective)
            });
        if let Some((var, _)) = cheapest {
            return Some((*var, true));
        }
    }

    values
        .iter()
        .position(Option::is_none)
        .map(|var| (var, problem.variables[var].objective < 0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_choose_cheapest_plan() {
        let mut problem = MilpProblem::new();
        let a = problem.add_variable("plan_a", 5.0);
        let b = problem.add_variable("plan_b", 3.0);
        problem.add_constraint("one_plan", [(a, 1.0), (b, 1.0)], Sense::Eq, 1.0);

        let assignment = BranchAndBoundSolver::default().solve(&problem).expect("solution");
        assert!(!assignment.value(a));
        assert!(assignment.value(b));
        assert_eq!(assignment.objective(), 3.0);
    }

    #[test]
    fn test_budget_forces_expensive_plan() {
        let mut problem = MilpProblem::new();
        let small = problem.add_variable("index_small", 0.0);
        let large = problem.add_variable("index_large", 0.0);
        let slow = problem.add_variable("plan_slow", 10.0);
        let fast = problem.add_variable("plan_fast", 1.0);
        problem.add_constraint("one_plan", [(slow, 1.0), (fast, 1.0)], Sense::Eq, 1.0);
        problem.add_constraint("slow_uses_small", [(slow, 1.0), (small, -1.0)], Sense::Le, 0.0);
        problem.add_constraint("fast_uses_large", [(fast, 1.0), (large, -1.0)], Sense::Le, 0.0);
        problem.add_constraint("budget", [(small, 10.0), (large, 100.0)], Sense::Le, 50.0);

        let assignment = BranchAndBoundSolver::default().solve(&problem).expect("solution");
        assert!(assignment.value(slow));
        assert!(assignment.value(small));
        assert!(!assignment.value(large));
        assert!(problem.is_feasible(assignment.values()));
    }

    #[test]
    fn test_infeasible() {
        let mut problem = MilpProblem::new();
        let x = problem.add_variable("x", 1.0);
        problem.add_constraint("need", [(x, 1.0)], Sense::Ge, 1.0);
        problem.add_constraint("forbid", [(x, 1.0)], Sense::Le, 0.0);
        assert_eq!(
            BranchAndBoundSolver::default().solve(&problem),
            Err(SolverError::Infeasible)
        );
    }

    #[test]
    fn test_merged_terms_and_negative_objective() {
        let mut problem = MilpProblem::new();
        let x = problem.add_variable("x", -2.0);
        let y = problem.add_variable("y", 1.0);
        problem.add_constraint("pair", [(x, 1.0), (y, -0.5), (y, -0.5)], Sense::Le, 0.0);
        assert_eq!(problem.constraints()[0].terms.len(), 2);

        let assignment = BranchAndBoundSolver::default().solve(&problem).expect("solution");
        assert!(assignment.value(x));
        assert!(assignment.value(y));
        assert_eq!(assignment.objective(), -1.0);
    }

    #[test]
    fn test_node_limit_without_incumbent() {
        let mut problem = MilpProblem::new();
        let vars: Vec<VarId> = (0..6).map(|i| problem.add_variable(format!("x{}", i), 1.0)).collect();
        problem.add_constraint(
            "parity",
            vars.iter().map(|&v| (v, 2.0)),
            Sense::Eq,
            5.0,
        );
        assert_eq!(
            BranchAndBoundSolver::new(3).solve(&problem),
            Err(SolverError::NodeLimit { nodes: 3 })
        );
    }
}
