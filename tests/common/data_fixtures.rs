//! 测试数据固定装置
//!
//! 一个小型社交网络模型：用户发布推文，推文按时间排序

use std::sync::Arc;

use schema_advisor::model::{Entity, Model, Query, UpdateKind, UpdateStatement};

/// 用户 100 人、推文 1000 条的模型
pub fn twitter_model() -> Model {
    let user = Entity::builder("User", 100)
        .id("UserId")
        .string("Name", 20)
        .string("City", 20)
        .cardinality("City", 10)
        .build()
        .expect("User 实体应构建成功");
    let tweet = Entity::builder("Tweet", 1000)
        .id("TweetId")
        .string("Body", 140)
        .date("Timestamp")
        .integer("Retweets")
        .foreign_key("User", "User", 100)
        .build()
        .expect("Tweet 实体应构建成功");
    let model = Model::new().with_entity(user).with_entity(tweet);
    model.validate().expect("模型外键应完整");
    model
}

/// `SELECT Tweet.Body FROM Tweet WHERE Tweet.TweetId = ?`
pub fn body_by_id(model: &Model) -> Arc<Query> {
    let query = Query::builder(model)
        .path(&["Tweet"])
        .select("Tweet.Body")
        .eq("Tweet.TweetId")
        .build()
        .expect("语句应构建成功");
    Arc::new(query)
}

/// `SELECT Tweet.Timestamp FROM Tweet WHERE Tweet.TweetId = ?`
pub fn timestamp_by_id(model: &Model) -> Arc<Query> {
    let query = Query::builder(model)
        .path(&["Tweet"])
        .select("Tweet.Timestamp")
        .eq("Tweet.TweetId")
        .build()
        .expect("语句应构建成功");
    Arc::new(query)
}

/// 某用户的推文按时间排序
pub fn tweets_by_author(model: &Model, limit: Option<u64>) -> Arc<Query> {
    let mut builder = Query::builder(model)
        .path(&["Tweet"])
        .select("Tweet.Body")
        .eq("Tweet.User")
        .order_by("Tweet.Timestamp");
    if let Some(limit) = limit {
        builder = builder.limit(limit);
    }
    Arc::new(builder.build().expect("语句应构建成功"))
}

/// 经由用户的时间线：`User -> Tweet`
pub fn timeline(model: &Model) -> Arc<Query> {
    let query = Query::builder(model)
        .path(&["User", "Tweet"])
        .select("Tweet.Body")
        .eq("User.UserId")
        .order_by("Tweet.Timestamp")
        .limit(10)
        .build()
        .expect("语句应构建成功");
    Arc::new(query)
}

/// `UPDATE Tweet SET Body WHERE TweetId = ?`
pub fn edit_body(model: &Model, weight: f64) -> UpdateStatement {
    UpdateStatement::builder(model, UpdateKind::Update, "Tweet")
        .set("Tweet.Body")
        .eq("Tweet.TweetId")
        .weight(weight)
        .build()
        .expect("写语句应构建成功")
}
