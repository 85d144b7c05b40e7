//! Relational unpacking
//!
//! Walks one JSON document against its [`SchemaConfig`] and writes it into
//! root, leaf and array tables through a [`StorageEngine`]:
//!
//! 1. derive the level's key (from the caller's id, or from the document)
//! 2. route error and empty documents to their sentinel tables and stop
//! 3. flatten the level, leaving out leaves, arrays and dropped keys
//! 4. at the root, delete the previous row (descendants go by cascade);
//!    then insert and read back the key, serial components included
//! 5. upsert each leaf under the returned key
//! 6. recurse into arrays of objects; bulk insert arrays of atoms
//!
//! Each level finishes its leaves before any array, and each array before the
//! next, so an interrupted document leaves a prefix of this order behind.

use crate::error::{ConfigError, Error, Result};
use crate::melt::flatten::{make_row, nullify_blank};
use crate::melt::plan::{owning_columns, ArrayType, TablePlan};
use crate::melt::types::{IdValue, KeyTuple, SchemaConfig};
use crate::sql::{QueryResult, Statement, StatementBuilder, StorageEngine, Verb};
use serde_json::{Map, Value};
use std::future::Future;
use std::iter;
use std::pin::Pin;
use tracing::{debug, warn};

/// Sentinel tables are keyed on this column whatever the resource's own key.
pub const QUERIED_COLUMN: &str = "id_item_queried";

const DELETE: &str = "DELETE FROM {table} WHERE ({fields}) = ({placeholders})";
const INSERT_RETURNING: &str =
    "INSERT INTO {table} ({fields}) VALUES ({placeholders}) RETURNING {p_key}";
const UPSERT: &str = "INSERT INTO {table} ({fields}) VALUES ({placeholders}) \
                      ON CONFLICT ({p_key}) DO UPDATE SET {updates}";
const INSERT_OR_SKIP: &str =
    "INSERT INTO {table} ({fields}) VALUES ({placeholders}) ON CONFLICT ({p_key}) DO NOTHING";
const BULK_INSERT: &str = "INSERT INTO {table} ({fields}) VALUES {rows} ON CONFLICT DO NOTHING";

/// Kind of sentinel document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentinelKind {
    /// The API answered with `{"error": ...}`
    HttpError,
    /// The resource declared `total_results == 0`
    Empty,
}

impl SentinelKind {
    pub fn detect(doc: &Map<String, Value>) -> Option<SentinelKind> {
        if doc.contains_key("error") {
            return Some(SentinelKind::HttpError);
        }
        match doc.get("total_results").and_then(Value::as_f64) {
            Some(total) if total == 0.0 => Some(SentinelKind::Empty),
            _ => None,
        }
    }
}

/// Outcome of unpacking one document
#[derive(Debug, Clone, PartialEq)]
pub enum Unpacked {
    /// Stored in the normal schema; carries the root row's key
    Stored(KeyTuple),
    /// Routed to a sentinel table
    Sentinel(SentinelKind),
}

type LevelFuture<'a> = Pin<Box<dyn Future<Output = Result<KeyTuple>> + Send + 'a>>;

/// Everything one recursion level needs. Built fresh for every level.
struct Level<'a> {
    doc: &'a Map<String, Value>,
    config: &'a SchemaConfig,
    id: Option<IdValue>,
    root_key: Option<KeyTuple>,
    plan: TablePlan,
    path: String,
}

/// Normalizes JSON documents into relational tables
pub struct RelationalUnpacker<'e, E: StorageEngine + ?Sized> {
    engine: &'e E,
}

impl<'e, E: StorageEngine + ?Sized> RelationalUnpacker<'e, E> {
    pub fn new(engine: &'e E) -> Self {
        RelationalUnpacker { engine }
    }

    /// Unpack one document.
    ///
    /// `id` is the identifier the document was fetched with. It fills the key
    /// when the document does not carry its own and keys sentinel rows.
    pub async fn unpack(
        &self,
        document: &Value,
        config: &SchemaConfig,
        id: Option<IdValue>,
    ) -> Result<Unpacked> {
        let doc = document.as_object().ok_or_else(|| Error::UnsupportedShape {
            path: config.name.clone(),
            reason: "document is not a JSON object".to_string(),
        })?;

        if config.primary_key.is_empty() {
            return Err(ConfigError::MissingPrimaryKey {
                table: config.name.clone(),
            }
            .into());
        }

        if config.root {
            if let Some(kind) = SentinelKind::detect(doc) {
                self.store_sentinel(doc, config, id.as_ref(), kind).await?;
                return Ok(Unpacked::Sentinel(kind));
            }
        }

        let level = Level {
            doc,
            config,
            id,
            root_key: None,
            plan: TablePlan::for_level(config, None),
            path: config.name.clone(),
        };
        let key = self.unpack_level(level).await?;
        Ok(Unpacked::Stored(key))
    }

    fn unpack_level<'a>(&'a self, level: Level<'a>) -> LevelFuture<'a> {
        Box::pin(async move {
            let Level {
                doc,
                config,
                id,
                root_key,
                plan,
                path,
            } = level;

            if config.primary_key.is_empty() {
                return Err(ConfigError::MissingPrimaryKey { table: plan.table }.into());
            }

            let key = KeyTuple::derive(&config.primary_key, id.as_ref(), doc);
            let root_key = if config.root { Some(key.clone()) } else { root_key };
            debug!(table = %plan.table, path = %path, root = ?root_key, "unpacking level");

            let drop: Vec<String> = config
                .array_names()
                .chain(config.leaf_names())
                .map(String::from)
                .chain(config.drop_from_root.iter().cloned())
                .collect();
            let row = make_row(doc, &key, &drop);

            if config.root {
                if key.is_empty() {
                    return Err(Error::MissingKey {
                        table: plan.table,
                        columns: config.primary_key.clone(),
                    });
                }
                self.delete_matching(&plan.table, &key.columns(), key.values())
                    .await?;
            }

            let returned = self
                .insert_returning(&plan.table, &config.primary_key, row)
                .await?;

            for leaf in &config.leaves {
                match doc.get(&leaf.name) {
                    None | Some(Value::Null) => {}
                    Some(Value::Object(obj)) => {
                        let row = make_row(obj, &returned, &leaf.drop);
                        self.upsert(&plan.child_table(&leaf.name), &config.primary_key, row)
                            .await?;
                    }
                    Some(_) => {
                        return Err(Error::UnsupportedShape {
                            path: format!("{}.{}", path, leaf.name),
                            reason: "leaf field is not an object".to_string(),
                        })
                    }
                }
            }

            for child in &config.arrays {
                let items = match doc.get(&child.name) {
                    None | Some(Value::Null) => continue,
                    Some(Value::Array(items)) => items,
                    Some(_) => {
                        return Err(Error::UnsupportedShape {
                            path: format!("{}.{}", path, child.name),
                            reason: "array field is not an array".to_string(),
                        })
                    }
                };
                let child_path = format!("{}.{}", path, child.name);
                let table = plan.child_table(&child.name);

                match ArrayType::classify(&child_path, items)? {
                    ArrayType::Empty => {}
                    ArrayType::Objects => {
                        let owner = returned.values();
                        for (idx, element) in items.iter().filter_map(Value::as_object).enumerate() {
                            let level = Level {
                                doc: element,
                                config: child,
                                id: Some(IdValue::Composite(owner.clone())),
                                root_key: root_key.clone(),
                                plan: TablePlan::for_level(child, Some(&table)),
                                path: format!("{}[{}]", child_path, idx),
                            };
                            self.unpack_level(level).await?;
                        }
                    }
                    ArrayType::Scalars => {
                        self.store_atoms(child, &table, &returned, items).await?;
                    }
                }
            }

            Ok(returned)
        })
    }

    /// Replace the atoms owned by `owner` with one bulk insert.
    async fn store_atoms(
        &self,
        child: &SchemaConfig,
        table: &str,
        owner: &KeyTuple,
        items: &[Value],
    ) -> Result<()> {
        let owning = owning_columns(child, table, owner.len())?;
        let owner_values = owner.values();

        self.delete_matching(table, &owning, owner_values.clone())
            .await?;

        let fields: Vec<String> = owning
            .into_iter()
            .chain(iter::once(child.name.clone()))
            .collect();
        let data: Vec<Value> = items
            .iter()
            .flat_map(|atom| {
                owner_values
                    .iter()
                    .cloned()
                    .chain(iter::once(nullify_blank(atom.clone())))
            })
            .collect();

        let statement = StatementBuilder::new(Verb::Write, BULK_INSERT)
            .ident("table", table)
            .fields(fields)
            .sequence(data)
            .build()?;
        self.run(&statement).await?;
        Ok(())
    }

    async fn store_sentinel(
        &self,
        doc: &Map<String, Value>,
        config: &SchemaConfig,
        id: Option<&IdValue>,
        kind: SentinelKind,
    ) -> Result<()> {
        let (table, drop) = match kind {
            SentinelKind::HttpError => (config.http_errors_table(), &[][..]),
            SentinelKind::Empty => (config.empty_table(), &config.drop_if_empty[..]),
        };
        let queried = id.map(IdValue::as_queried).unwrap_or(Value::Null);
        warn!(table = %table, id = %queried, "routing sentinel document");

        let key_column = vec![QUERIED_COLUMN.to_string()];
        let key = KeyTuple::from_row(&key_column, &[queried]);
        let row = make_row(doc, &key, drop);
        self.upsert(&table, &key_column, row).await
    }

    async fn delete_matching(&self, table: &str, columns: &[String], values: Vec<Value>) -> Result<()> {
        let statement = StatementBuilder::new(Verb::Write, DELETE)
            .ident("table", table)
            .fields(columns.iter().cloned())
            .sequence(values)
            .build()?;
        self.run(&statement).await?;
        Ok(())
    }

    async fn insert_returning(
        &self,
        table: &str,
        primary_key: &[String],
        row: Map<String, Value>,
    ) -> Result<KeyTuple> {
        let statement = StatementBuilder::new(Verb::WriteRead, INSERT_RETURNING)
            .ident("table", table)
            .idents("p_key", primary_key.iter().cloned())
            .mapping(row)
            .build()?;
        let result = self.run(&statement).await?;
        let returned = result.first().ok_or_else(|| Error::NoKeyReturned {
            table: table.to_string(),
        })?;
        Ok(KeyTuple::from_row(primary_key, returned))
    }

    /// Insert, or overwrite every non-key column on key conflict.
    async fn upsert(&self, table: &str, key: &[String], row: Map<String, Value>) -> Result<()> {
        let template = if row.keys().all(|k| key.contains(k)) {
            INSERT_OR_SKIP
        } else {
            UPSERT
        };
        let statement = StatementBuilder::new(Verb::Write, template)
            .ident("table", table)
            .idents("p_key", key.iter().cloned())
            .mapping(row)
            .build()?;
        self.run(&statement).await?;
        Ok(())
    }

    async fn run(&self, statement: &Statement) -> Result<QueryResult> {
        debug!(
            table = statement.table().unwrap_or_default(),
            verb = %statement.verb(),
            params = statement.params().len(),
            "{}",
            statement.sql()
        );
        Ok(self.engine.execute(statement).await?)
    }
}
