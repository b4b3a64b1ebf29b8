//! 模式搜索
//!
//! 每条语句独立构建计划树（以语句为单位并行），随后单线程合并代价表，
//! 组装整数规划并求解

use std::sync::Arc;

use log::{error, info};
use rayon::prelude::*;

use crate::config::AdvisorConfig;
use crate::core::error::{AdvisorResult, PlanningResult};
use crate::cost::CostModel;
use crate::model::{Index, Query, Workload};
use crate::planner::{IndexMaintenance, PlanTree, QueryPlanner, UpdatePlanner};

use super::aggregate::{aggregate_costs, StatementCosts};
use super::milp::{BranchAndBoundSolver, MilpSolver};
use super::problem::{MaintenanceCosts, OptimizationProblem};
use super::result::SearchResult;

/// 工作负载级别的模式搜索
#[derive(Debug)]
pub struct SchemaSearch<'a> {
    workload: &'a Workload,
    planner: QueryPlanner<'a>,
    config: AdvisorConfig,
}

impl<'a> SchemaSearch<'a> {
    pub fn new(
        workload: &'a Workload,
        indexes: &[Arc<Index>],
        cost_model: &'a dyn CostModel,
        config: AdvisorConfig,
    ) -> Self {
        let planner = QueryPlanner::new(indexes, cost_model, config.planner.clone());
        Self {
            workload,
            planner,
            config,
        }
    }

    /// 以工作负载的物化视图作为候选索引池
    pub fn with_materialized_views(
        workload: &'a Workload,
        cost_model: &'a dyn CostModel,
        config: AdvisorConfig,
    ) -> AdvisorResult<Self> {
        let views = workload.materialized_views()?;
        Ok(Self::new(workload, &views, cost_model, config))
    }

    pub fn planner(&self) -> &QueryPlanner<'a> {
        &self.planner
    }

    pub fn config(&self) -> &AdvisorConfig {
        &self.config
    }

    /// 并行规划全部读语句，结果按工作负载顺序排列
    pub fn plan_queries(&self) -> Vec<(Arc<Query>, PlanningResult<PlanTree>)> {
        let queries: Vec<&Arc<Query>> = self.workload.queries().collect();
        queries
            .par_iter()
            .map(|query| (Arc::clone(query), self.planner.plan(query)))
            .collect()
    }

    /// 并行规划全部写语句的索引维护
    pub fn plan_updates(&self) -> Vec<IndexMaintenance> {
        let updates: Vec<_> = self.workload.updates().collect();
        let planner = UpdatePlanner::new(&self.planner);
        let planned: Vec<Vec<IndexMaintenance>> =
            updates.par_iter().map(|update| planner.plan(update)).collect();
        planned.into_iter().flatten().collect()
    }

    /// 规划并聚合代价，组装优化问题
    pub fn build_problem(&self) -> AdvisorResult<OptimizationProblem> {
        let tolerance = self.config.optimizer.cost_tolerance;

        let mut queries: Vec<StatementCosts> = Vec::new();
        for (query, tree) in self.plan_queries() {
            let tree = tree.map_err(|err| {
                error!("语句 {} 规划失败", query.text());
                err
            })?;
            queries.push(aggregate_costs(&tree, tolerance)?);
        }

        let mut maintenance = Vec::new();
        for entry in self.plan_updates() {
            let support = match entry.support() {
                Some(supports) => {
                    let mut costs = Vec::with_capacity(supports.len());
                    for support in supports {
                        costs.push(aggregate_costs(support.tree(), tolerance)?);
                    }
                    Some(costs)
                }
                None => None,
            };
            maintenance.push(MaintenanceCosts::new(entry, support));
        }

        info!(
            "{} 条读语句、{} 项索引维护进入优化",
            queries.len(),
            maintenance.len()
        );
        let problem = OptimizationProblem::new(
            self.planner.indexes(),
            queries,
            maintenance,
            &self.config.optimizer,
        )?;
        Ok(problem)
    }

    /// 以内置分支定界求解
    pub fn search(&self) -> AdvisorResult<SearchResult> {
        let solver = BranchAndBoundSolver::new(self.config.optimizer.max_nodes);
        self.search_with(&solver)
    }

    /// 以给定的求解后端求解
    pub fn search_with(&self, solver: &dyn MilpSolver) -> AdvisorResult<SearchResult> {
        let problem = self.build_problem()?;
        let result = problem.solve(solver)?;
        info!(
            "选中 {} 个索引，总大小 {:.0}，总代价 {:.4}",
            result.indexes().len(),
            result.total_size(),
            result.total_cost()
        );
        Ok(result)
    }
}
