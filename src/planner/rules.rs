//! 父步骤兼容性规则表
//!
//! 候选索引查找与其最近一次父索引查找之间的兼容关系由若干条
//! 特例规则组成（重复标识符查找、复合键拆分、包含型父索引等），
//! 这里按固定顺序列为一张表，逐条求值，首个给出结论的规则生效。

use std::collections::BTreeSet;

use crate::core::error::Rejection;
use crate::model::{FieldRef, Index};

use super::state::PlanningState;

/// 规则名称
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentRule {
    /// 分支上尚无索引查找
    FirstLookup,
    /// 连续两次对同一实体集合的标识符查找
    RepeatedIdentityLookup,
    /// 父步骤未产生下一个连接实体的标识符
    NoParentId,
    /// 候选以该标识符作为分区字段
    ConsumesParentId,
    /// 候选以该标识符作为有序前缀字段
    OrderedPrefixId,
    /// 复合键的组成部分分布在分区与有序前缀中
    CompositeKeySplit,
    /// 候选完全覆盖父索引的结果，且无需父索引即可定位
    SubsumingParent,
    /// 兜底：标识符未被使用
    ParentIdUnused,
}

/// 规则结论
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject(Rejection),
    /// 规则不适用，继续下一条
    Continue,
}

/// 规则求值的输入
#[derive(Debug, Clone, Copy)]
pub struct RuleInput<'a> {
    pub state: &'a PlanningState,
    pub parent: Option<&'a Index>,
    pub candidate: &'a Index,
}

impl RuleInput<'_> {
    /// 下一个连接实体的标识符
    fn head_id(&self) -> Option<&FieldRef> {
        let head = self.state.joins().first()?;
        self.state.graph().entity(head).map(|e| e.id_field())
    }

    /// 已绑定的字段：给定的等值字段与已取回的字段
    fn available(&self) -> BTreeSet<FieldRef> {
        let mut available: BTreeSet<FieldRef> = self.state.given_fields().clone();
        available.extend(self.state.fetched().iter().cloned());
        if let Some(id) = self.head_id() {
            if self.state.is_fetched_or_reachable(id) {
                available.insert(id.clone());
            }
        }
        available
    }

    /// 候选有序字段中由已绑定字段组成的前缀，分区未绑定时为空
    fn bound_prefix(&self) -> &[FieldRef] {
        let available = self.available();
        if !self.candidate.partition().is_subset(&available) {
            return &[];
        }
        let len = self.candidate.ordered_prefix_len(&available);
        &self.candidate.ordered()[..len]
    }
}

type RuleFn = fn(&RuleInput<'_>) -> Verdict;

/// 按求值顺序排列的规则表
pub const PARENT_RULES: &[(ParentRule, RuleFn)] = &[
    (ParentRule::FirstLookup, first_lookup),
    (ParentRule::RepeatedIdentityLookup, repeated_identity_lookup),
    (ParentRule::NoParentId, no_parent_id),
    (ParentRule::ConsumesParentId, consumes_parent_id),
    (ParentRule::OrderedPrefixId, ordered_prefix_id),
    (ParentRule::CompositeKeySplit, composite_key_split),
    (ParentRule::SubsumingParent, subsuming_parent),
    (ParentRule::ParentIdUnused, parent_id_unused),
];

/// 依次求值规则表，返回生效的规则与结论
pub fn evaluate(input: &RuleInput<'_>) -> (ParentRule, Result<(), Rejection>) {
    for (rule, check) in PARENT_RULES {
        match check(input) {
            Verdict::Accept => return (*rule, Ok(())),
            Verdict::Reject(reason) => return (*rule, Err(reason)),
            Verdict::Continue => {}
        }
    }
    (ParentRule::ParentIdUnused, Err(Rejection::ParentIdUnused))
}

fn first_lookup(input: &RuleInput<'_>) -> Verdict {
    match input.parent {
        None => Verdict::Accept,
        Some(_) => Verdict::Continue,
    }
}

fn repeated_identity_lookup(input: &RuleInput<'_>) -> Verdict {
    match input.parent {
        Some(parent)
            if parent.is_identity()
                && input.candidate.is_identity()
                && parent.graph() == input.candidate.graph() =>
        {
            Verdict::Reject(Rejection::RepeatedIdentityLookup)
        }
        _ => Verdict::Continue,
    }
}

fn no_parent_id(input: &RuleInput<'_>) -> Verdict {
    match input.head_id() {
        Some(id) if input.state.is_fetched_or_reachable(id) => Verdict::Continue,
        _ => Verdict::Accept,
    }
}

fn consumes_parent_id(input: &RuleInput<'_>) -> Verdict {
    match input.head_id() {
        Some(id) if input.candidate.partition().contains(id) => Verdict::Accept,
        _ => Verdict::Continue,
    }
}

fn ordered_prefix_id(input: &RuleInput<'_>) -> Verdict {
    match input.head_id() {
        Some(id) if input.bound_prefix().contains(id) => Verdict::Accept,
        _ => Verdict::Continue,
    }
}

fn composite_key_split(input: &RuleInput<'_>) -> Verdict {
    let id = match input.head_id() {
        Some(id) if id.is_composite_id() => id,
        _ => return Verdict::Continue,
    };
    let entity = match input.state.graph().entity(id.entity()) {
        Some(entity) => entity,
        None => return Verdict::Continue,
    };
    let components: Vec<FieldRef> = id
        .composite()
        .iter()
        .filter_map(|name| entity.field(name).ok())
        .collect();
    if components.len() != id.composite().len() {
        return Verdict::Continue;
    }

    let prefix = input.bound_prefix();
    let partition = input.candidate.partition();
    let split = components
        .iter()
        .all(|c| partition.contains(c) || prefix.contains(c))
        && components.iter().any(|c| partition.contains(c));
    if split {
        Verdict::Accept
    } else {
        Verdict::Continue
    }
}

fn subsuming_parent(input: &RuleInput<'_>) -> Verdict {
    let parent = match input.parent {
        Some(parent) => parent,
        None => return Verdict::Continue,
    };
    let candidate = input.candidate;
    let covers = parent.all_fields().is_subset(candidate.all_fields())
        && parent.graph().entity_names().all(|e| candidate.graph().contains(e));
    let independent = candidate
        .partition()
        .iter()
        .all(|f| input.state.given_fields().contains(f));
    if covers && independent && parent.size() <= candidate.size() {
        Verdict::Accept
    } else {
        Verdict::Continue
    }
}

fn parent_id_unused(_input: &RuleInput<'_>) -> Verdict {
    Verdict::Reject(Rejection::ParentIdUnused)
}
