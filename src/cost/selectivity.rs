//! 选择性估计器模块
//!
//! 用于估算谓词与聚合对基数的影响

use crate::model::FieldRef;

/// 范围条件的固定选择性
pub const RANGE_SELECTIVITY: f64 = 0.1;

/// 选择性估计器
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectivityEstimator;

impl SelectivityEstimator {
    /// 估计等值条件选择性
    pub fn equality(field: &FieldRef) -> f64 {
        1.0 / field.cardinality().max(1) as f64
    }

    /// 估计范围条件选择性
    pub fn range(_field: &FieldRef) -> f64 {
        RANGE_SELECTIVITY
    }

    /// 依次应用等值与范围条件后的基数
    pub fn apply<'a>(
        cardinality: f64,
        eq: impl IntoIterator<Item = &'a FieldRef>,
        range: impl IntoIterator<Item = &'a FieldRef>,
    ) -> f64 {
        let eq_factor: f64 = eq.into_iter().map(Self::equality).product();
        let range_factor: f64 = range.into_iter().map(Self::range).product();
        cardinality * eq_factor * range_factor
    }

    /// 聚合后的基数
    ///
    /// 无分组时折叠为 1，有分组时为分组字段基数之积（不超过输入基数）
    ///
    /// 有分组时有意不折叠为 1，每个分组产出一行
    pub fn aggregate<'a>(cardinality: f64, group_by: impl IntoIterator<Item = &'a FieldRef>) -> f64 {
        let mut grouped = false;
        let groups: f64 = group_by
            .into_iter()
            .map(|f| {
                grouped = true;
                f.cardinality() as f64
            })
            .product();
        if grouped {
            groups.min(cardinality).max(1.0)
        } else {
            1.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Field, FieldType};
    use std::sync::Arc;

    fn field(cardinality: u64) -> FieldRef {
        Arc::new(Field::new("Tweet", format!("f{}", cardinality), FieldType::Integer).with_cardinality(cardinality))
    }

    #[test]
    fn test_equality_selectivity() {
        assert_eq!(SelectivityEstimator::equality(&field(4)), 0.25);
    }

    #[test]
    fn test_apply_eq_and_range() {
        let eq = vec![field(10)];
        let range = vec![field(3)];
        let result = SelectivityEstimator::apply(1000.0, &eq, &range);
        assert!((result - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_aggregate_collapses() {
        let none: Vec<FieldRef> = Vec::new();
        assert_eq!(SelectivityEstimator::aggregate(500.0, &none), 1.0);
        let groups = vec![field(20)];
        assert_eq!(SelectivityEstimator::aggregate(500.0, &groups), 20.0);
        assert_eq!(SelectivityEstimator::aggregate(5.0, &groups), 5.0);
    }
}
