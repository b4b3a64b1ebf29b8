//! 工作负载模块
//!
//! 模型加上带权重的读写语句集合

use std::collections::BTreeSet;
use std::sync::Arc;

use super::entity::Model;
use super::index::Index;
use super::statement::{Query, Statement, UpdateStatement};
use crate::core::error::ModelResult;

/// 工作负载
#[derive(Debug, Clone)]
pub struct Workload {
    model: Model,
    statements: Vec<Statement>,
}

impl Workload {
    pub fn new(model: Model) -> Self {
        Self {
            model,
            statements: Vec::new(),
        }
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn add_statement(&mut self, statement: impl Into<Statement>) {
        self.statements.push(statement.into());
    }

    pub fn with_statement(mut self, statement: impl Into<Statement>) -> Self {
        self.add_statement(statement);
        self
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    pub fn queries(&self) -> impl Iterator<Item = &Arc<Query>> {
        self.statements.iter().filter_map(|s| match s {
            Statement::Query(q) => Some(q),
            Statement::Update(_) => None,
        })
    }

    pub fn updates(&self) -> impl Iterator<Item = &Arc<UpdateStatement>> {
        self.statements.iter().filter_map(|s| match s {
            Statement::Update(u) => Some(u),
            Statement::Query(_) => None,
        })
    }

    /// 每条读语句的物化视图，去重后按键排序
    pub fn materialized_views(&self) -> ModelResult<Vec<Arc<Index>>> {
        let mut views = BTreeSet::new();
        for query in self.queries() {
            views.insert(query.materialize_view()?);
        }
        Ok(views.into_iter().map(Arc::new).collect())
    }
}
