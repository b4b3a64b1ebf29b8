//! 规划与优化基准
//!
//! - `plan_tree`：单条语句在不同规模候选池上的计划树搜索
//! - `schema_search`：以物化视图为候选池的端到端搜索

use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use schema_advisor::config::{AdvisorConfig, PlannerConfig};
use schema_advisor::cost::{ConfiguredCostModel, CostModelConfig};
use schema_advisor::model::{Entity, Index, Model, Query, QueryGraph, Statement, UpdateKind, UpdateStatement, Workload};
use schema_advisor::optimizer::SchemaSearch;
use schema_advisor::planner::QueryPlanner;

const EXTRA_FIELDS: usize = 32;

fn model() -> Model {
    let user = Entity::builder("User", 10_000)
        .id("UserId")
        .string("Name", 20)
        .string("City", 20)
        .cardinality("City", 500)
        .build()
        .expect("User");
    let mut tweet = Entity::builder("Tweet", 1_000_000)
        .id("TweetId")
        .string("Body", 140)
        .date("Timestamp")
        .foreign_key("User", "User", 10_000);
    for i in 0..EXTRA_FIELDS {
        tweet = tweet.integer(&format!("Metric{}", i));
    }
    Model::new()
        .with_entity(user)
        .with_entity(tweet.build().expect("Tweet"))
}

/// 以 TweetId 为分区、附加字段各不相同的候选池
fn identity_pool(model: &Model, size: usize) -> Vec<Arc<Index>> {
    let tweet = model.entity("Tweet").expect("Tweet");
    let id = model.field("Tweet.TweetId").expect("TweetId");
    let body = model.field("Tweet.Body").expect("Body");
    (0..size)
        .map(|i| {
            let metric = model
                .field(&format!("Tweet.Metric{}", i % EXTRA_FIELDS))
                .expect("Metric");
            let mut extra = vec![body.clone(), metric];
            if i >= EXTRA_FIELDS {
                let second = model
                    .field(&format!("Tweet.Metric{}", (i / EXTRA_FIELDS + i) % EXTRA_FIELDS))
                    .expect("Metric");
                extra.push(second);
            }
            let index = Index::builder(QueryGraph::single(tweet.clone()))
                .fields(vec![id.clone()], Vec::new(), extra)
                .build()
                .expect("index");
            Arc::new(index)
        })
        .collect()
}

fn bench_plan_tree(c: &mut Criterion) {
    let model = model();
    let cost_model = ConfiguredCostModel::new(CostModelConfig::default());
    let query = Arc::new(
        Query::builder(&model)
            .path(&["Tweet"])
            .select("Tweet.Body")
            .eq("Tweet.TweetId")
            .build()
            .expect("query"),
    );

    let mut group = c.benchmark_group("plan_tree");
    for size in [8usize, 32, 128] {
        let pool = identity_pool(&model, size);
        let planner = QueryPlanner::new(&pool, &cost_model, PlannerConfig::default());
        group.bench_with_input(BenchmarkId::from_parameter(size), &planner, |b, planner| {
            b.iter(|| black_box(planner.plan(&query).expect("plan")));
        });
    }
    group.finish();
}

fn bench_schema_search(c: &mut Criterion) {
    let model = model();
    let cost_model = ConfiguredCostModel::new(CostModelConfig::default());

    let mut workload = Workload::new(model.clone());
    workload.add_statement(
        Query::builder(&model)
            .path(&["Tweet"])
            .select("Tweet.Body")
            .eq("Tweet.TweetId")
            .build()
            .expect("query"),
    );
    workload.add_statement(
        Query::builder(&model)
            .path(&["Tweet"])
            .select("Tweet.Timestamp")
            .select("Tweet.Metric0")
            .eq("Tweet.TweetId")
            .build()
            .expect("query"),
    );
    workload.add_statement(
        Query::builder(&model)
            .path(&["User", "Tweet"])
            .select("Tweet.Body")
            .eq("User.UserId")
            .order_by("Tweet.Timestamp")
            .limit(20)
            .weight(2.0)
            .build()
            .expect("query"),
    );
    workload.add_statement(Statement::from(
        UpdateStatement::builder(&model, UpdateKind::Insert, "Tweet")
            .weight(0.5)
            .build()
            .expect("insert"),
    ));

    c.bench_function("schema_search", |b| {
        b.iter(|| {
            let search =
                SchemaSearch::with_materialized_views(&workload, &cost_model, AdvisorConfig::default())
                    .expect("search");
            black_box(search.search().expect("result"))
        });
    });
}

criterion_group!(benches, bench_plan_tree, bench_schema_search);
criterion_main!(benches);
