//! 搜索结果
//!
//! 选中的索引、每条读语句的计划、写语句的维护计划，
//! 以及重新计算的总代价与总大小

use std::fmt;
use std::sync::Arc;

use crate::core::error::{OptimizeError, OptimizeResult};
use crate::cost::CostModel;
use crate::model::{Index, Query, UpdateStatement};
use crate::planner::{Plan, PlanStep};

/// 写语句对一个选中索引的维护计划
#[derive(Debug, Clone)]
pub struct UpdatePlan {
    statement: Arc<UpdateStatement>,
    index: Arc<Index>,
    support_plans: Vec<Plan>,
    steps: Vec<PlanStep>,
}

impl UpdatePlan {
    pub(crate) fn new(
        statement: Arc<UpdateStatement>,
        index: Arc<Index>,
        support_plans: Vec<Plan>,
        steps: Vec<PlanStep>,
    ) -> Self {
        Self {
            statement,
            index,
            support_plans,
            steps,
        }
    }

    pub fn statement(&self) -> &Arc<UpdateStatement> {
        &self.statement
    }

    pub fn index(&self) -> &Arc<Index> {
        &self.index
    }

    /// 每个支撑查询选中的计划
    pub fn support_plans(&self) -> &[Plan] {
        &self.support_plans
    }

    /// 删除、插入步骤
    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    /// 乘以权重后的总代价：支撑查询加维护步骤
    pub fn cost(&self) -> f64 {
        let steps: f64 = self.steps.iter().map(|s| s.cost()).sum();
        steps * self.statement.weight()
            + self
                .support_plans
                .iter()
                .map(|p| p.weighted_cost())
                .sum::<f64>()
    }
}

impl fmt::Display for UpdatePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = self.support_plans.iter().map(|p| p.to_string()).collect();
        parts.extend(self.steps.iter().map(|s| s.to_string()));
        write!(f, "{}", parts.join(" -> "))
    }
}

/// 全局优化的结果，构建后不可变
#[derive(Debug, Clone)]
pub struct SearchResult {
    indexes: Vec<Arc<Index>>,
    plans: Vec<Plan>,
    update_plans: Vec<UpdatePlan>,
    budget: Option<f64>,
    objective: f64,
}

impl SearchResult {
    pub(crate) fn new(
        indexes: Vec<Arc<Index>>,
        plans: Vec<Plan>,
        update_plans: Vec<UpdatePlan>,
        budget: Option<f64>,
        objective: f64,
    ) -> Self {
        Self {
            indexes,
            plans,
            update_plans,
            budget,
            objective,
        }
    }

    /// 选中的索引，按键排序
    pub fn indexes(&self) -> &[Arc<Index>] {
        &self.indexes
    }

    pub fn is_selected(&self, index: &Index) -> bool {
        self.indexes.iter().any(|i| i.as_ref() == index)
    }

    /// 每条读语句选中的计划，按工作负载顺序
    pub fn plans(&self) -> &[Plan] {
        &self.plans
    }

    pub fn plan_for(&self, query: &Query) -> Option<&Plan> {
        self.plans
            .iter()
            .find(|p| std::ptr::eq(p.query().as_ref(), query) || p.query().text() == query.text())
    }

    pub fn update_plans(&self) -> &[UpdatePlan] {
        &self.update_plans
    }

    /// 重新计算的总代价（已乘权重）
    pub fn total_cost(&self) -> f64 {
        self.plans.iter().map(|p| p.weighted_cost()).sum::<f64>()
            + self.update_plans.iter().map(|u| u.cost()).sum::<f64>()
    }

    /// 选中索引的总大小
    pub fn total_size(&self) -> f64 {
        self.indexes.iter().map(|i| i.size()).sum()
    }

    pub fn budget(&self) -> Option<f64> {
        self.budget
    }

    /// 求解器报告的目标值
    pub fn objective(&self) -> f64 {
        self.objective
    }

    /// 构建全部选中索引的一次性代价
    pub fn load_cost(&self, cost_model: &dyn CostModel) -> f64 {
        self.indexes.iter().map(|i| cost_model.load_cost(i)).sum()
    }

    /// 重新检查预算、每条语句一个计划以及计划所用索引均已选中
    pub fn validate(&self) -> OptimizeResult<()> {
        if let Some(budget) = self.budget {
            if self.total_size() > budget * (1.0 + 1e-9) {
                return Err(OptimizeError::InternalError(format!(
                    "选中索引总大小 {} 超出预算 {}",
                    self.total_size(),
                    budget
                )));
            }
        }

        for (i, plan) in self.plans.iter().enumerate() {
            if self.plans[..i]
                .iter()
                .any(|p| Arc::ptr_eq(p.query(), plan.query()))
            {
                return Err(OptimizeError::InternalError(format!(
                    "语句 {} 选中了多个计划",
                    plan.query().text()
                )));
            }
            self.check_indexes(plan)?;
        }

        for update in &self.update_plans {
            if !self.is_selected(update.index()) {
                return Err(OptimizeError::InternalError(format!(
                    "维护计划 {} 针对未选中的索引 {}",
                    update.statement().text(),
                    update.index().key()
                )));
            }
            for plan in update.support_plans() {
                self.check_indexes(plan)?;
            }
        }
        Ok(())
    }

    fn check_indexes(&self, plan: &Plan) -> OptimizeResult<()> {
        match plan.indexes().into_iter().find(|i| !self.is_selected(i)) {
            Some(missing) => Err(OptimizeError::InternalError(format!(
                "计划 {} 使用了未选中的索引 {}",
                plan,
                missing.key()
            ))),
            None => Ok(()),
        }
    }
}

impl fmt::Display for SearchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "选中索引 {} 个，总大小 {:.0}，总代价 {:.4}",
            self.indexes.len(),
            self.total_size(),
            self.total_cost()
        )?;
        for index in &self.indexes {
            writeln!(f, "  {} {}", index.key(), index)?;
        }
        for plan in &self.plans {
            writeln!(f, "{}\n  {}", plan.query().text(), plan)?;
        }
        for update in &self.update_plans {
            writeln!(f, "{}\n  {}", update.statement().text(), update)?;
        }
        Ok(())
    }
}
