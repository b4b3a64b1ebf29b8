//! 索引查找步骤
//!
//! 候选索引依次通过连接、单向查找、父步骤兼容、分区绑定、
//! 局部充分性、叶子实体完整性与聚合兼容性检查，
//! 通过后据索引的物理布局推进计划状态。

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::core::error::Rejection;
use crate::cost::{CostModel, SelectivityEstimator};
use crate::model::{FieldRef, Index};

use super::rules::{self, RuleInput};
use super::state::PlanningState;
use super::step::{Applied, PlanStep, StepKind};

/// 索引查找的父步骤上下文
#[derive(Debug, Clone, Copy)]
pub struct LookupContext<'a> {
    /// 分支上最近一次索引查找的索引
    pub last_lookup: Option<&'a Index>,
    /// 父步骤是否为聚合步骤或聚合索引查找
    pub parent_aggregating: bool,
}

impl<'a> LookupContext<'a> {
    pub fn root() -> Self {
        Self {
            last_lookup: None,
            parent_aggregating: false,
        }
    }
}

impl PlanStep {
    /// 以候选索引执行一次查找
    pub fn index_lookup(
        state: &PlanningState,
        context: LookupContext<'_>,
        index: &Arc<Index>,
        cost_model: &dyn CostModel,
    ) -> Result<Applied, Rejection> {
        let covered = check_joins(state, index)?;
        check_forward_only(state, context, index)?;

        let input = RuleInput {
            state,
            parent: context.last_lookup,
            candidate: index,
        };
        rules::evaluate(&input).1?;

        check_partition_bound(state, index)?;
        check_local_fields(state, index, &covered)?;
        check_leaves(state, index, &covered)?;
        check_aggregation(state, context, index)?;

        Ok(advance(state, index, &covered, cost_model))
    }
}

/// 连接有效性：索引图须包含剩余连接顺序的首个实体，
/// 其实体恰为连接顺序的前缀，边均已在剩余图中。返回覆盖的实体序列。
fn check_joins(state: &PlanningState, index: &Index) -> Result<Vec<String>, Rejection> {
    let head = state.joins().first().ok_or(Rejection::NotApplicable)?;
    if !index.graph().contains(head) {
        return Err(Rejection::JoinHeadMissing);
    }

    let size = index.graph().size();
    if size > state.joins().len() {
        return Err(Rejection::JoinEdgesNotImplied);
    }
    let covered: Vec<String> = state.joins()[..size].to_vec();
    let covers_prefix = covered.iter().all(|e| index.graph().contains(e));
    let edges_implied = index.graph().edges().is_subset(state.graph().edges());
    if !covers_prefix || !edges_implied {
        return Err(Rejection::JoinEdgesNotImplied);
    }
    Ok(covered)
}

/// 单向查找：单实体索引只能作为首个查找，或剩余图只剩一个实体
fn check_forward_only(
    state: &PlanningState,
    context: LookupContext<'_>,
    index: &Index,
) -> Result<(), Rejection> {
    if index.graph().size() == 1 && context.last_lookup.is_some() && state.graph().size() > 1 {
        return Err(Rejection::BackwardLookup);
    }
    Ok(())
}

/// 分区字段须由给定条件或已取回字段绑定
fn check_partition_bound(state: &PlanningState, index: &Index) -> Result<(), Rejection> {
    if index.partition().iter().all(|f| state.is_bound(f)) {
        Ok(())
    } else {
        Err(Rejection::PartitionUnbound)
    }
}

/// 覆盖实体上的过滤、排序字段必须在索引中；
/// 末端实体的选择字段在其标识符存在时可推迟到后续查找
fn check_local_fields(
    state: &PlanningState,
    index: &Index,
    covered: &[String],
) -> Result<(), Rejection> {
    let boundary = covered.last().map(String::as_str);
    let deferrable = boundary
        .and_then(|name| state.graph().entity(name))
        .map(|e| index.contains_field(e.id_field()))
        .unwrap_or(false);
    let on_covered = |f: &FieldRef| covered.iter().any(|e| e == f.entity());

    let predicates = state
        .eq()
        .iter()
        .chain(state.range().iter())
        .chain(state.order_by().iter())
        .filter(|f| on_covered(f) && !state.is_fetched_or_reachable(f));
    for field in predicates {
        if !index.contains_field(field) {
            return Err(Rejection::MissingLocalFields);
        }
    }

    for field in state.fields().iter().filter(|f| on_covered(f)) {
        let deferred = deferrable && Some(field.entity()) == boundary;
        if !deferred && !index.contains_field(field) {
            return Err(Rejection::MissingLocalFields);
        }
    }
    Ok(())
}

/// 索引覆盖的原图叶子实体须带有标识符或全部所需字段
fn check_leaves(state: &PlanningState, index: &Index, covered: &[String]) -> Result<(), Rejection> {
    let leaves = state.query().graph().leaf_entities();
    for leaf in covered.iter().filter(|e| leaves.contains(*e)) {
        let entity = match state.graph().entity(leaf) {
            Some(entity) => entity,
            None => continue,
        };
        if index.contains_field(entity.id_field()) {
            continue;
        }
        let complete = state
            .fields()
            .iter()
            .filter(|f| f.entity() == leaf.as_str())
            .all(|f| index.contains_field(f));
        if !complete {
            return Err(Rejection::LeafIncomplete);
        }
    }
    Ok(())
}

/// 聚合索引的分组与聚合须是剩余需求的子集，且父步骤不带聚合
fn check_aggregation(
    state: &PlanningState,
    context: LookupContext<'_>,
    index: &Index,
) -> Result<(), Rejection> {
    if !index.is_aggregating() {
        return Ok(());
    }
    let compatible = !context.parent_aggregating
        && !state.is_aggregated()
        && index.group_by().is_subset(state.group_by())
        && index.aggregates().is_subset(state.aggregates());
    if compatible {
        Ok(())
    } else {
        Err(Rejection::AggregationIncompatible)
    }
}

/// 推进状态并计算查找代价
fn advance(
    state: &PlanningState,
    index: &Arc<Index>,
    covered: &[String],
    cost_model: &dyn CostModel,
) -> Applied {
    let mut next = state.clone();

    // 分区查找次数：分区全部由给定条件绑定时只需一次
    let given_only = index
        .partition()
        .iter()
        .all(|f| state.given_fields().contains(f));
    let lookups = if given_only { 1.0 } else { state.cardinality().max(1.0) };

    // 分区与有序前缀上解决的等值条件，其后紧随的范围条件
    let resolved_eq: Vec<FieldRef> = state
        .eq()
        .iter()
        .filter(|f| index.partition().contains(*f))
        .cloned()
        .collect();
    let prefix_len = index.ordered_prefix_len(state.eq());
    let prefix_eq: Vec<FieldRef> = index.ordered()[..prefix_len].to_vec();
    let resolved_range: Vec<FieldRef> = index
        .ordered()
        .get(prefix_len)
        .filter(|f| state.range().contains(*f))
        .cloned()
        .into_iter()
        .collect();

    let mut rows = lookups * index.per_partition_count();
    rows = SelectivityEstimator::apply(rows, &prefix_eq, &resolved_range);

    // 排序：去掉已解决等值前缀后的有序字段以剩余排序字段开头，且只查找一个分区
    let order_resolved = !state.order_by().is_empty()
        && given_only
        && state
            .order_by()
            .iter()
            .all(|f| covered.iter().any(|e| e == f.entity()))
        && index.ordered()[prefix_len..].starts_with(state.order_by());

    for field in resolved_eq.iter().chain(prefix_eq.iter()) {
        next.eq.remove(field);
    }
    for field in resolved_range.iter() {
        next.range.remove(field);
    }
    if order_resolved {
        next.order_by.clear();
    }
    for field in index.all_fields() {
        next.fields.remove(field);
    }
    next.fetched.extend(index.all_fields().iter().cloned());

    if index.is_aggregating() {
        for aggregate in index.aggregates() {
            next.aggregates.remove(aggregate);
        }
        for field in index.group_by() {
            next.group_by.remove(field);
        }
        next.aggregated = true;
    }

    // 保留末端实体作为新的连接起点
    let interior: BTreeSet<&str> = covered[..covered.len().saturating_sub(1)]
        .iter()
        .map(String::as_str)
        .collect();
    next.graph = state.graph().without(interior.iter().copied());
    next.joins = state.joins()[covered.len().saturating_sub(1)..].to_vec();

    next.hash_cardinality = lookups;
    next.cardinality = rows;
    next.settle_graph();
    next.settle_limit();

    let cost = cost_model.index_lookup_cost(index, lookups, next.cardinality);
    let step = PlanStep::new(
        StepKind::IndexLookup {
            index: Arc::clone(index),
            lookups,
        },
        cost,
        next.cardinality,
    );
    (step, next)
}
