//! 自定义断言辅助模块
//!
//! 提供测试中的常用断言函数

use schema_advisor::planner::{Plan, PlanTree};

/// 断言结果成功，返回内部值
pub fn assert_ok<T, E: std::fmt::Debug>(result: Result<T, E>) -> T {
    result.expect("操作应该成功")
}

/// 断言结果失败并匹配错误消息
pub fn assert_err_with<T: std::fmt::Debug, E: std::fmt::Display>(result: Result<T, E>, expected_msg: &str) {
    let err = result.expect_err("操作应该失败");
    let err_str = err.to_string();
    assert!(
        err_str.contains(expected_msg),
        "错误消息应包含 '{}', 实际是 '{}'",
        expected_msg,
        err_str
    );
}

/// 断言集合包含指定数量的元素
pub fn assert_count<T>(collection: &[T], expected: usize, item_name: &str) {
    assert_eq!(
        collection.len(),
        expected,
        "{}数量不匹配: 期望 {}, 实际 {}",
        item_name,
        expected,
        collection.len()
    );
}

/// 断言两个浮点数在相对误差内相等
pub fn assert_close(actual: f64, expected: f64) {
    let tolerance = 1e-9 * expected.abs().max(1.0);
    assert!(
        (actual - expected).abs() <= tolerance,
        "数值不匹配: 期望 {}, 实际 {}",
        expected,
        actual
    );
}

/// 断言计划树的每个叶子都完整回答了语句
pub fn assert_all_answered(tree: &PlanTree) {
    for plan in tree.plans() {
        assert!(
            plan.final_state().is_answered(),
            "计划 {} 未完整回答语句:\n{}",
            plan,
            plan.final_state()
        );
    }
}

/// 断言 `plans` 中能找到与 `plan` 相同的计划
pub fn assert_contains_plan(plans: &[Plan], plan: &Plan) {
    assert!(
        plans.iter().any(|p| p.same_as(plan)),
        "计划 {} 应该存在",
        plan
    );
}
