//! Test doubles shared by the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use registry_melt::error::{FetchError, StorageError};
use registry_melt::melt::TablePlan;
use registry_melt::sql::{QueryResult, Statement, StorageEngine, Verb};
use registry_melt::{Fetch, SchemaConfig};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;

pub type Row = Map<String, Value>;

#[derive(Default)]
struct Store {
    tables: BTreeMap<String, Vec<Row>>,
    serials: HashMap<(String, String), i64>,
    cascades: HashMap<String, Vec<String>>,
}

/// In-memory stand-in for PostgreSQL.
///
/// Understands the statement shapes the unpacker emits: delete by column
/// values (cascading to registered child tables), insert returning the key
/// (allocating serials for key columns that were not supplied), upsert on the
/// key, insert-or-skip and bulk insert.
#[derive(Default)]
pub struct MemoryEngine {
    store: Mutex<Store>,
    log: Mutex<Vec<Statement>>,
    scripts: Mutex<Vec<String>>,
    fail_on: Mutex<Option<String>>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine whose root deletes cascade to every table of `configs`.
    pub fn with_resources(configs: &[SchemaConfig]) -> Self {
        let engine = Self::new();
        for config in configs {
            engine.cascade_from(config);
        }
        engine
    }

    pub fn cascade_from(&self, config: &SchemaConfig) {
        let tables = TablePlan::all_tables(config);
        let mut store = self.store.lock().unwrap();
        store
            .cascades
            .insert(config.name.clone(), tables.into_iter().skip(1).collect());
    }

    /// Reject every statement against `table`.
    pub fn fail_on(&self, table: &str) {
        *self.fail_on.lock().unwrap() = Some(table.to_string());
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.store
            .lock()
            .unwrap()
            .tables
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn count(&self, table: &str) -> usize {
        self.rows(table).len()
    }

    pub fn statements(&self) -> Vec<Statement> {
        self.log.lock().unwrap().clone()
    }

    pub fn scripts(&self) -> Vec<String> {
        self.scripts.lock().unwrap().clone()
    }

    /// Number of statements that wrote to `table`.
    pub fn writes_to(&self, table: &str) -> usize {
        self.statements()
            .iter()
            .filter(|s| s.table() == Some(table) && s.sql().starts_with("INSERT"))
            .count()
    }
}

fn matches(row: &Row, columns: &[String], values: &[Value]) -> bool {
    columns
        .iter()
        .zip(values)
        .all(|(c, v)| row.get(c).map(|stored| same(stored, v)).unwrap_or(false))
}

/// Compare as text, the way parameters reach the server.
fn same(a: &Value, b: &Value) -> bool {
    let text = |v: &Value| match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    text(a) == text(b)
}

fn rows_of(statement: &Statement) -> Vec<Row> {
    let fields = statement.fields();
    if fields.is_empty() {
        return Vec::new();
    }
    statement
        .params()
        .chunks(fields.len())
        .map(|chunk| fields.iter().cloned().zip(chunk.iter().cloned()).collect())
        .collect()
}

impl Store {
    fn position(&self, table: &str, key: &[String], row: &Row) -> Option<usize> {
        let values: Vec<Value> = key
            .iter()
            .map(|c| row.get(c).cloned().unwrap_or(Value::Null))
            .collect();
        self.tables
            .get(table)?
            .iter()
            .position(|existing| matches(existing, key, &values))
    }

    fn delete(&mut self, table: &str, columns: &[String], values: &[Value]) {
        if let Some(rows) = self.tables.get_mut(table) {
            rows.retain(|row| !matches(row, columns, values));
        }
        let children = self.cascades.get(table).cloned().unwrap_or_default();
        for child in children {
            if let Some(rows) = self.tables.get_mut(&child) {
                rows.retain(|row| !matches(row, columns, values));
            }
        }
    }

    fn insert_returning(&mut self, table: &str, key: &[String], mut row: Row) -> Result<Vec<Value>, StorageError> {
        for column in key {
            if !row.contains_key(column) {
                let next = self
                    .serials
                    .entry((table.to_string(), column.clone()))
                    .or_insert(0);
                *next += 1;
                row.insert(column.clone(), Value::from(*next));
            }
        }
        if self.position(table, key, &row).is_some() {
            return Err(StorageError::Rejected(format!(
                "duplicate key value violates unique constraint on {}",
                table
            )));
        }
        let returned = key.iter().map(|c| row[c].clone()).collect();
        self.tables.entry(table.to_string()).or_default().push(row);
        Ok(returned)
    }

    fn upsert(&mut self, table: &str, key: &[String], row: Row, overwrite: bool) {
        match self.position(table, key, &row) {
            Some(i) if overwrite => {
                if let Some(existing) = self.tables.get_mut(table).and_then(|t| t.get_mut(i)) {
                    existing.extend(row);
                }
            }
            Some(_) => {}
            None => self.tables.entry(table.to_string()).or_default().push(row),
        }
    }

    fn bulk_insert(&mut self, table: &str, rows: Vec<Row>) {
        let stored = self.tables.entry(table.to_string()).or_default();
        for row in rows {
            if !stored.contains(&row) {
                stored.push(row);
            }
        }
    }

    fn select(&self, table: &str) -> QueryResult {
        let rows = self.tables.get(table).cloned().unwrap_or_default();
        let columns: Vec<String> = rows
            .iter()
            .flat_map(|r| r.keys().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let values = rows
            .iter()
            .map(|r| {
                columns
                    .iter()
                    .map(|c| r.get(c).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect();
        QueryResult::new(columns, values)
    }
}

#[async_trait]
impl StorageEngine for MemoryEngine {
    async fn execute(&self, statement: &Statement) -> Result<QueryResult, StorageError> {
        self.log.lock().unwrap().push(statement.clone());

        let table = statement.table().unwrap_or_default().to_string();
        if self.fail_on.lock().unwrap().as_deref() == Some(table.as_str()) {
            return Err(StorageError::Rejected(format!("writes to {} are disabled", table)));
        }

        let sql = statement.sql();
        let key: Vec<String> = statement.identifier("p_key").unwrap_or_default().to_vec();
        let mut store = self.store.lock().unwrap();

        if statement.verb() == Verb::Read {
            return Ok(store.select(&table));
        }
        if sql.starts_with("DELETE") {
            store.delete(&table, statement.fields(), statement.params());
            return Ok(QueryResult::empty());
        }

        let rows = rows_of(statement);
        if sql.contains("RETURNING") {
            let mut returned = Vec::new();
            for row in rows {
                returned.push(store.insert_returning(&table, &key, row)?);
            }
            return Ok(QueryResult::new(key, returned));
        }
        if sql.contains("DO UPDATE") {
            for row in rows {
                store.upsert(&table, &key, row, true);
            }
        } else if key.is_empty() {
            store.bulk_insert(&table, rows);
        } else {
            for row in rows {
                store.upsert(&table, &key, row, false);
            }
        }
        Ok(QueryResult::empty())
    }

    async fn apply_script(&self, script: &str) -> Result<(), StorageError> {
        self.scripts.lock().unwrap().push(script.to_string());
        Ok(())
    }
}

/// Answers from a fixed url → document table and records every call.
#[derive(Default)]
pub struct ScriptedFetch {
    responses: HashMap<String, Value>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedFetch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, url: impl Into<String>, doc: Value) -> Self {
        self.responses.insert(url.into(), doc);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetch for ScriptedFetch {
    async fn fetch(&self, url: &str) -> Result<Value, FetchError> {
        self.calls.lock().unwrap().push(url.to_string());
        self.responses
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::RetriesExhausted {
                url: url.to_string(),
                attempts: 1,
                cause: "no scripted response".to_string(),
            })
    }
}
