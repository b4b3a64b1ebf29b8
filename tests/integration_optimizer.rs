//! 全局优化器集成测试
//!
//! 测试范围：
//! - 无预算时选择代价最低的索引
//! - 空间预算下的取舍与无解
//! - 写语句的索引维护与支撑查询
//! - 以物化视图为候选池的端到端搜索

mod common;

use common::{
    assertions::{assert_close, assert_count, assert_err_with, assert_ok},
    cost_model,
    data_fixtures::{body_by_id, edit_body, timeline, timestamp_by_id, twitter_model},
    index,
};
use schema_advisor::config::AdvisorConfig;
use schema_advisor::core::error::OptimizeError;
use schema_advisor::model::{Index, Query, Statement, UpdateKind, UpdateStatement, Workload};
use schema_advisor::optimizer::{BranchAndBoundSolver, SchemaSearch};
use schema_advisor::planner::StepKind;
use schema_advisor::AdvisorError;
use std::sync::Arc;

// ==================== 无预算 ====================

#[test]
fn test_picks_cheaper_of_two_indexes() {
    let model = twitter_model();
    let cost_model = cost_model();
    let narrow = index(&model, &["Tweet"], &["Tweet.TweetId"], &[], &["Tweet.Body"]);
    let wide = index(
        &model,
        &["Tweet"],
        &["Tweet.TweetId"],
        &[],
        &["Tweet.Body", "Tweet.Timestamp", "Tweet.Retweets"],
    );
    let query = body_by_id(&model);
    let workload = Workload::new(model.clone()).with_statement(Statement::Query(query.clone()));

    let search = SchemaSearch::new(&workload, &[narrow.clone(), wide.clone()], &cost_model, AdvisorConfig::default());
    let result = assert_ok(search.search());

    assert_count(result.indexes(), 1, "选中索引");
    assert!(result.is_selected(&narrow));
    assert!(!result.is_selected(&wide));
    let plan = result.plan_for(&query).expect("语句应有计划");
    assert!(plan.uses_index(&narrow));
    assert_close(result.total_cost(), result.objective());
    assert!(result.load_cost(&cost_model) > 0.0);
    assert_ok(result.validate());
}

#[test]
fn test_unused_indexes_dropped_before_solving() {
    let model = twitter_model();
    let cost_model = cost_model();
    let tweets = index(&model, &["Tweet"], &["Tweet.TweetId"], &[], &["Tweet.Body"]);
    let users = index(&model, &["User"], &["User.UserId"], &[], &["User.Name"]);
    let workload = Workload::new(model.clone()).with_statement(Statement::Query(body_by_id(&model)));

    let search = SchemaSearch::new(&workload, &[tweets.clone(), users], &cost_model, AdvisorConfig::default());
    let problem = assert_ok(search.build_problem());
    assert_count(problem.indexes(), 1, "候选索引");
    assert_eq!(problem.indexes()[0].key(), tweets.key());
}

#[test]
fn test_weight_scales_cost() {
    let model = twitter_model();
    let cost_model = cost_model();
    let pool = vec![index(&model, &["Tweet"], &["Tweet.TweetId"], &[], &["Tweet.Body"])];
    let light = body_by_id(&model);
    let heavy = Arc::new(light.with_weight(3.0));

    let single = Workload::new(model.clone()).with_statement(Statement::Query(light));
    let tripled = Workload::new(model.clone()).with_statement(Statement::Query(heavy));
    let base = assert_ok(SchemaSearch::new(&single, &pool, &cost_model, AdvisorConfig::default()).search());
    let scaled = assert_ok(SchemaSearch::new(&tripled, &pool, &cost_model, AdvisorConfig::default()).search());

    assert_close(scaled.total_cost(), base.total_cost() * 3.0);
    assert_close(scaled.plans()[0].cost(), base.plans()[0].cost());
}

// ==================== 空间预算 ====================

/// 两条读语句、三个候选索引：
/// 分开的两个窄索引最便宜，合并的索引更省空间
fn budget_workload() -> (Workload, Vec<Arc<Index>>) {
    let model = twitter_model();
    let bodies = index(&model, &["Tweet"], &["Tweet.TweetId"], &[], &["Tweet.Body"]);
    let stamps = index(&model, &["Tweet"], &["Tweet.TweetId"], &[], &["Tweet.Timestamp"]);
    let both = index(
        &model,
        &["Tweet"],
        &["Tweet.TweetId"],
        &[],
        &["Tweet.Body", "Tweet.Timestamp"],
    );
    let workload = Workload::new(model.clone())
        .with_statement(Statement::Query(body_by_id(&model)))
        .with_statement(Statement::Query(timestamp_by_id(&model)));
    (workload, vec![bodies, stamps, both])
}

#[test]
fn test_unbounded_prefers_separate_indexes() {
    let (workload, pool) = budget_workload();
    let cost_model = cost_model();
    let search = SchemaSearch::new(&workload, &pool, &cost_model, AdvisorConfig::default());
    let result = assert_ok(search.search());

    assert_count(result.indexes(), 2, "选中索引");
    assert!(result.is_selected(&pool[0]));
    assert!(result.is_selected(&pool[1]));
    assert_count(result.plans(), 2, "计划");
    assert_close(result.total_size(), 156_000.0 + 24_000.0);
}

#[test]
fn test_budget_forces_shared_index() {
    let (workload, pool) = budget_workload();
    let cost_model = cost_model();
    let config = AdvisorConfig::default().with_space_budget(170_000.0);
    let search = SchemaSearch::new(&workload, &pool, &cost_model, config);
    let result = assert_ok(search.search());

    assert_count(result.indexes(), 1, "选中索引");
    assert!(result.is_selected(&pool[2]));
    assert!(result.total_size() <= 170_000.0);
    assert_eq!(result.budget(), Some(170_000.0));
    for plan in result.plans() {
        assert!(plan.uses_index(&pool[2]));
    }
    assert_ok(result.validate());
}

#[test]
fn test_budget_too_small_has_no_solution() {
    let (workload, pool) = budget_workload();
    let cost_model = cost_model();
    let config = AdvisorConfig::default().with_space_budget(100_000.0);
    let search = SchemaSearch::new(&workload, &pool, &cost_model, config);

    match search.search() {
        Err(AdvisorError::Optimize(OptimizeError::NoSolution { budget })) => {
            assert_eq!(budget, Some(100_000.0));
        }
        other => panic!("期望 NoSolution，实际 {:?}", other.map(|r| r.indexes().len())),
    }
}

#[test]
fn test_infeasible_budget_without_pruning() {
    let (workload, pool) = budget_workload();
    let cost_model = cost_model();
    let mut config = AdvisorConfig::default().with_space_budget(30_000.0);
    config.optimizer.prune_oversized = false;
    let search = SchemaSearch::new(&workload, &pool, &cost_model, config);

    assert_err_with(search.search(), "30000");
}

#[test]
fn test_custom_solver_backend() {
    let (workload, pool) = budget_workload();
    let cost_model = cost_model();
    let search = SchemaSearch::new(&workload, &pool, &cost_model, AdvisorConfig::default());
    let solver = BranchAndBoundSolver::new(10_000);

    let result = assert_ok(search.search_with(&solver));
    let default = assert_ok(search.search());
    assert_close(result.objective(), default.objective());
}

// ==================== 写语句 ====================

#[test]
fn test_update_maintains_selected_index() {
    let model = twitter_model();
    let cost_model = cost_model();
    let pool = vec![index(&model, &["Tweet"], &["Tweet.TweetId"], &[], &["Tweet.Body"])];
    let query = body_by_id(&model);
    let workload = Workload::new(model.clone())
        .with_statement(Statement::Query(query.clone()))
        .with_statement(edit_body(&model, 2.0));

    let search = SchemaSearch::new(&workload, &pool, &cost_model, AdvisorConfig::default());
    let result = assert_ok(search.search());

    let updates = result.update_plans();
    assert_count(updates, 1, "维护计划");
    assert_eq!(updates[0].index().key(), pool[0].key());
    // 语句给出了索引的全部字段，无需支撑查询
    assert!(updates[0].support_plans().is_empty());
    let steps = updates[0].steps();
    assert_count(steps, 2, "维护步骤");
    assert!(matches!(steps[0].kind(), StepKind::Delete { .. }));
    assert!(matches!(steps[1].kind(), StepKind::Insert { .. }));

    let read_cost = result.plan_for(&query).expect("语句应有计划").weighted_cost();
    assert!(result.total_cost() > read_cost);
    assert_close(result.total_cost(), result.objective());
}

#[test]
fn test_update_with_support_query() {
    let model = twitter_model();
    let cost_model = cost_model();
    let wide = index(
        &model,
        &["Tweet"],
        &["Tweet.TweetId"],
        &[],
        &["Tweet.Body", "Tweet.Timestamp"],
    );
    let workload = Workload::new(model.clone())
        .with_statement(Statement::Query(body_by_id(&model)))
        .with_statement(edit_body(&model, 1.0));

    let search = SchemaSearch::new(&workload, &[wide.clone()], &cost_model, AdvisorConfig::default());
    let result = assert_ok(search.search());

    let updates = result.update_plans();
    assert_count(updates, 1, "维护计划");
    // 更新 Body 前需要读出 Timestamp
    assert_count(updates[0].support_plans(), 1, "支撑计划");
    assert!(updates[0].support_plans()[0].uses_index(&wide));
    assert!(updates[0].cost() > 0.0);
    assert_close(result.total_cost(), result.objective());
    assert_ok(result.validate());
}

#[test]
fn test_index_needed_only_by_support_query_is_kept() {
    let model = twitter_model();
    let cost_model = cost_model();
    let bodies = index(&model, &["Tweet"], &["Tweet.User"], &["Tweet.TweetId"], &["Tweet.Body"]);
    let authors = index(&model, &["Tweet"], &["Tweet.TweetId"], &[], &["Tweet.User"]);
    let query = Arc::new(
        Query::builder(&model)
            .path(&["Tweet"])
            .select("Tweet.Body")
            .eq("Tweet.User")
            .build()
            .expect("语句应构建成功"),
    );
    let workload = Workload::new(model.clone())
        .with_statement(Statement::Query(query.clone()))
        .with_statement(edit_body(&model, 1.0));

    let search = SchemaSearch::new(
        &workload,
        &[bodies.clone(), authors.clone()],
        &cost_model,
        AdvisorConfig::default(),
    );
    // authors 不回答任何读语句，但维护 bodies 时要靠它查出 Tweet.User
    let problem = assert_ok(search.build_problem());
    assert_count(problem.indexes(), 2, "候选索引");

    let result = assert_ok(search.search());
    assert_count(result.indexes(), 2, "选中索引");
    assert!(result.is_selected(&bodies));
    assert!(result.is_selected(&authors));
    assert!(result.plan_for(&query).expect("语句应有计划").uses_index(&bodies));

    let updates = result.update_plans();
    assert_count(updates, 1, "维护计划");
    assert_eq!(updates[0].index().key(), bodies.key());
    assert_count(updates[0].support_plans(), 1, "支撑计划");
    assert!(updates[0].support_plans()[0].uses_index(&authors));
    assert_ok(result.validate());
}

#[test]
fn test_insert_maintains_every_touched_index() {
    let model = twitter_model();
    let cost_model = cost_model();
    let (workload, pool) = budget_workload();
    let insert = UpdateStatement::builder(&model, UpdateKind::Insert, "Tweet")
        .build()
        .expect("写语句应构建成功");
    let workload = workload.with_statement(insert);

    let search = SchemaSearch::new(&workload, &pool, &cost_model, AdvisorConfig::default());
    let result = assert_ok(search.search());

    // 插入代价使合并索引胜过两个窄索引
    assert_count(result.indexes(), 1, "选中索引");
    assert!(result.is_selected(&pool[2]));
    assert_eq!(result.update_plans().len(), result.indexes().len());
    for update in result.update_plans() {
        assert!(result.is_selected(update.index()));
        assert_count(update.steps(), 1, "维护步骤");
    }
}

// ==================== 物化视图 ====================

#[test]
fn test_materialized_views_answer_each_query() {
    let model = twitter_model();
    let cost_model = cost_model();
    let body = body_by_id(&model);
    let line = timeline(&model);
    let workload = Workload::new(model.clone())
        .with_statement(Statement::Query(body.clone()))
        .with_statement(Statement::Query(line.clone()));

    let search = assert_ok(SchemaSearch::with_materialized_views(
        &workload,
        &cost_model,
        AdvisorConfig::default(),
    ));
    assert_count(search.planner().indexes(), 2, "候选索引");

    let result = assert_ok(search.search());
    assert_count(result.indexes(), 2, "选中索引");
    for query in [&body, &line] {
        let plan = result.plan_for(query).expect("语句应有计划");
        assert_count(plan.steps(), 1, "步骤");
    }
    assert_close(result.plan_for(&line).expect("计划").cardinality(), 10.0);
    assert!(!result.to_string().is_empty());
}
