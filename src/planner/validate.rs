//! 计划验证器
//!
//! 在计划树构建完成后，对每个存活的叶子计划检查全局不变式：
//! 计划不暴露多余的分组字段，聚合之后不再出现过滤、排序或截断，
//! 最终状态已回答

use crate::core::error::{PlanningError, PlanningResult};

use super::plan::Plan;
use super::step::StepKind;

/// 计划验证器
#[derive(Debug)]
pub struct PlanValidator;

impl PlanValidator {
    /// 验证计划
    pub fn validate_plan(plan: &Plan) -> PlanningResult<()> {
        Self::validate_group_by(plan)?;
        Self::validate_aggregation_order(plan)?;
        Self::validate_answered(plan)?;
        Ok(())
    }

    /// 聚合索引的分组字段不得超出语句要求
    fn validate_group_by(plan: &Plan) -> PlanningResult<()> {
        let required = plan.query().group_by();
        for step in plan.steps() {
            if let StepKind::IndexLookup { index, .. } = step.kind() {
                if !index.group_by().is_subset(required) {
                    return Err(PlanningError::InvalidPlan(format!(
                        "计划 {} 中的索引 {} 暴露了多余的分组字段",
                        plan,
                        index.key()
                    )));
                }
            }
        }
        Ok(())
    }

    /// 聚合步骤之后不允许过滤、排序与截断
    fn validate_aggregation_order(plan: &Plan) -> PlanningResult<()> {
        let mut aggregated = false;
        for step in plan.steps() {
            let in_memory = matches!(
                step.kind(),
                StepKind::Filter { .. } | StepKind::Sort { .. } | StepKind::Limit { .. }
            );
            if aggregated && in_memory {
                return Err(PlanningError::InvalidPlan(format!(
                    "计划 {} 在聚合之后执行了 {}",
                    plan, step
                )));
            }
            aggregated = aggregated || step.is_aggregating();
        }
        Ok(())
    }

    fn validate_answered(plan: &Plan) -> PlanningResult<()> {
        if plan.final_state().is_answered() {
            Ok(())
        } else {
            Err(PlanningError::InvalidPlan(format!(
                "计划 {} 未完整回答语句:\n{}",
                plan,
                plan.final_state()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::cost::RequestCountCost;
    use crate::model::{Entity, Model, Query};
    use crate::planner::state::PlanningState;
    use crate::planner::step::PlanStep;

    fn query() -> Arc<Query> {
        let tweet = Entity::builder("Tweet", 1000)
            .id("TweetId")
            .integer("Retweets")
            .build()
            .expect("Tweet");
        let model = Model::new().with_entity(tweet);
        let query = Query::builder(&model)
            .path(&["Tweet"])
            .select("Tweet.TweetId")
            .build()
            .expect("query");
        Arc::new(query)
    }

    #[test]
    fn test_filter_after_aggregate_rejected() {
        let query = query();
        let state = PlanningState::new(Arc::clone(&query));
        let steps = vec![
            PlanStep::new(
                StepKind::Aggregate {
                    aggregates: Vec::new(),
                    group_by: Vec::new(),
                },
                0.0,
                1.0,
            ),
            PlanStep::new(
                StepKind::Filter {
                    eq: Vec::new(),
                    range: Vec::new(),
                },
                0.0,
                1.0,
            ),
        ];
        let plan = Plan::new(query, steps, state);
        let err = PlanValidator::validate_plan(&plan).unwrap_err();
        assert!(err.to_string().contains("聚合之后"));
    }

    #[test]
    fn test_unanswered_plan_rejected() {
        let query = query();
        let state = PlanningState::new(Arc::clone(&query));
        let plan = Plan::new(query, vec![PlanStep::root(&state)], state.clone());
        assert!(PlanValidator::validate_plan(&plan).is_err());
        assert!(PlanStep::sort(&state, &RequestCountCost).is_err());
    }
}
