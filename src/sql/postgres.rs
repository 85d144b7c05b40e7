//! PostgreSQL storage engine
//!
//! Opens a fresh connection per call. Values travel in text format so the
//! server coerces each JSON scalar to the target column type.

use crate::config::DatabaseSettings;
use crate::error::StorageError;
use crate::sql::engine::{QueryResult, StorageEngine};
use crate::sql::statement::{quote_ident, Statement};
use async_trait::async_trait;
use bytes::BytesMut;
use serde_json::Value;
use tokio_postgres::types::{to_sql_checked, Format, IsNull, ToSql, Type};
use tokio_postgres::{Client, NoTls, Row};
use tracing::{debug, error, warn};

pub struct PostgresEngine {
    config: tokio_postgres::Config,
    schema: Option<String>,
}

impl PostgresEngine {
    pub fn new(settings: &DatabaseSettings) -> Self {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&settings.host)
            .port(settings.port)
            .dbname(&settings.dbname)
            .user(&settings.user)
            .password(settings.password.as_bytes());

        PostgresEngine {
            config,
            schema: settings.schema.clone(),
        }
    }

    async fn connect(&self) -> Result<Client, StorageError> {
        let (client, connection) = self
            .config
            .connect(NoTls)
            .await
            .map_err(StorageError::Connect)?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("PostgreSQL connection error: {}", e);
            }
        });

        if let Some(schema) = &self.schema {
            let ident = quote_ident(schema)
                .map_err(|e| StorageError::Rejected(e.to_string()))?;
            client
                .batch_execute(&format!(
                    "CREATE SCHEMA IF NOT EXISTS {ident}; SET search_path TO {ident}, public;"
                ))
                .await
                .map_err(|source| StorageError::Namespace {
                    schema: schema.clone(),
                    source,
                })?;
        }

        Ok(client)
    }

    fn row_to_values(row: &Row) -> Vec<Value> {
        (0..row.len()).map(|i| Self::get_column_value(row, i)).collect()
    }

    /// Get a column value as JSON
    fn get_column_value(row: &Row, idx: usize) -> Value {
        if let Ok(v) = row.try_get::<_, Option<String>>(idx) {
            return v.map(Value::String).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<_, Option<i32>>(idx) {
            return v.map(|n| Value::Number(n.into())).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<_, Option<i64>>(idx) {
            return v.map(|n| Value::Number(n.into())).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<_, Option<i16>>(idx) {
            return v.map(|n| Value::Number(n.into())).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<_, Option<bool>>(idx) {
            return v.map(Value::Bool).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<_, Option<f64>>(idx) {
            return v
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<_, Option<chrono::NaiveDate>>(idx) {
            return v
                .map(|d| Value::String(d.to_string()))
                .unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<_, Option<chrono::NaiveDateTime>>(idx) {
            return v
                .map(|d| Value::String(d.to_string()))
                .unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<_, Option<Value>>(idx) {
            return v.unwrap_or(Value::Null);
        }

        warn!(
            "unsupported column type {} at index {}",
            row.columns()[idx].type_(),
            idx
        );
        Value::Null
    }
}

#[async_trait]
impl StorageEngine for PostgresEngine {
    async fn execute(&self, statement: &Statement) -> Result<QueryResult, StorageError> {
        let mut client = self.connect().await?;
        let txn = client.transaction().await.map_err(StorageError::Connect)?;

        let params: Vec<TextParam<'_>> = statement.params().iter().map(TextParam).collect();
        let refs: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        debug!(verb = %statement.verb(), sql = statement.sql(), params = refs.len(), "executing");

        let rows = match txn.query(statement.sql(), &refs).await {
            Ok(rows) => rows,
            Err(source) => {
                if let Err(e) = txn.rollback().await {
                    warn!("rollback failed: {}", e);
                }
                return Err(StorageError::Execute {
                    sql: statement.sql().to_string(),
                    source,
                });
            }
        };
        txn.commit().await.map_err(StorageError::Commit)?;

        if !statement.verb().returns_rows() {
            return Ok(QueryResult::empty());
        }

        let columns = rows
            .first()
            .map(|r| r.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();
        let rows = rows.iter().map(Self::row_to_values).collect();
        Ok(QueryResult::new(columns, rows))
    }

    async fn apply_script(&self, script: &str) -> Result<(), StorageError> {
        let mut client = self.connect().await?;
        let txn = client.transaction().await.map_err(StorageError::Connect)?;

        if let Err(source) = txn.batch_execute(script).await {
            if let Err(e) = txn.rollback().await {
                warn!("rollback failed: {}", e);
            }
            return Err(StorageError::Execute {
                sql: script.lines().next().unwrap_or_default().to_string(),
                source,
            });
        }
        txn.commit().await.map_err(StorageError::Commit)
    }
}

/// A JSON scalar sent in its textual form.
#[derive(Debug)]
struct TextParam<'a>(&'a Value);

impl ToSql for TextParam<'_> {
    fn to_sql(
        &self,
        _ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self.0 {
            Value::Null => Ok(IsNull::Yes),
            Value::String(s) => {
                out.extend_from_slice(s.as_bytes());
                Ok(IsNull::No)
            }
            other => {
                out.extend_from_slice(other.to_string().as_bytes());
                Ok(IsNull::No)
            }
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    fn encode_format(&self, _ty: &Type) -> Format {
        Format::Text
    }

    to_sql_checked!();
}
