//! Storage engine abstraction
//!
//! One [`StorageEngine::execute`] call is one transaction: acquire a
//! connection, pin the namespace, run the statement, commit (or roll back),
//! release. There is no transaction spanning several calls.

use crate::error::StorageError;
use crate::sql::statement::Statement;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Rows returned by a statement, positional as the driver hands them back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        QueryResult { columns, rows }
    }

    pub fn empty() -> Self {
        QueryResult::default()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first(&self) -> Option<&[Value]> {
        self.rows.first().map(Vec::as_slice)
    }

    /// Rows keyed by column name.
    pub fn records(&self) -> impl Iterator<Item = Map<String, Value>> + '_ {
        self.rows.iter().map(move |row| {
            self.columns
                .iter()
                .cloned()
                .zip(row.iter().cloned())
                .collect()
        })
    }
}

#[async_trait]
pub trait StorageEngine: Send + Sync {
    /// Execute one statement in its own transaction.
    ///
    /// Read-bearing verbs return every result row; `Write` returns an empty
    /// result.
    async fn execute(&self, statement: &Statement) -> Result<QueryResult, StorageError>;

    /// Run a multi-statement script (DDL) in its own transaction.
    async fn apply_script(&self, script: &str) -> Result<(), StorageError>;
}
