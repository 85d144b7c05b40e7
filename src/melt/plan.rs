//! Per-level table plans and array classification
//!
//! A `TablePlan` fixes, for one level of the recursion, the table the level
//! writes to and the prefix its leaf and array children are named with.

use crate::error::{ConfigError, Error, Result};
use crate::melt::types::SchemaConfig;
use serde_json::Value;

/// Type of array elements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayType {
    /// Array of objects, each unpacked recursively
    Objects,
    /// Array of atoms, bulk inserted in one statement
    Scalars,
    /// Empty array, nothing to write
    Empty,
}

impl ArrayType {
    /// Classify an array, rejecting nested arrays and mixed element kinds.
    pub fn classify(path: &str, items: &[Value]) -> Result<ArrayType> {
        let mut kind = ArrayType::Empty;

        for (idx, item) in items.iter().enumerate() {
            let item_kind = match item {
                Value::Object(_) => ArrayType::Objects,
                Value::Array(_) => {
                    return Err(Error::UnsupportedShape {
                        path: format!("{}[{}]", path, idx),
                        reason: "arrays of arrays are not supported".to_string(),
                    })
                }
                _ => ArrayType::Scalars,
            };

            kind = match kind {
                ArrayType::Empty => item_kind,
                k if k == item_kind => k,
                _ => {
                    return Err(Error::UnsupportedShape {
                        path: format!("{}[{}]", path, idx),
                        reason: "array mixes objects with atomic values".to_string(),
                    })
                }
            };
        }

        Ok(kind)
    }
}

/// Table naming for one recursion level
#[derive(Debug, Clone, PartialEq)]
pub struct TablePlan {
    pub table: String,
    pub child_prefix: String,
}

impl TablePlan {
    /// Plan a level. `branch_table` is the table the parent named for this
    /// level, absent at the top of the recursion.
    pub fn for_level(config: &SchemaConfig, branch_table: Option<&str>) -> Self {
        match branch_table {
            None => {
                let prefix = config.abbreviation.as_deref().unwrap_or(&config.name);
                TablePlan {
                    table: config.name.clone(),
                    child_prefix: format!("{}_", prefix),
                }
            }
            Some(table) => TablePlan {
                table: table.to_string(),
                child_prefix: format!("{}_", table),
            },
        }
    }

    pub fn child_table(&self, field: &str) -> String {
        format!("{}{}", self.child_prefix, field)
    }

    /// Every table a resource writes to, parents before children.
    pub fn all_tables(config: &SchemaConfig) -> Vec<String> {
        let mut tables = Vec::new();
        Self::collect(config, None, &mut tables);
        tables
    }

    fn collect(config: &SchemaConfig, branch_table: Option<&str>, tables: &mut Vec<String>) {
        let plan = Self::for_level(config, branch_table);
        tables.push(plan.table.clone());
        for leaf in config.leaf_names() {
            tables.push(plan.child_table(leaf));
        }
        for child in &config.arrays {
            Self::collect(child, Some(&plan.child_table(&child.name)), tables);
        }
    }
}

/// Columns of an atomic-array table that carry the owning row's key.
///
/// These are the child key minus the array's own field name, in declared
/// order; they pair positionally with the owner's returned key. The atom
/// itself always goes in a column named after the array.
pub fn owning_columns(
    child: &SchemaConfig,
    table: &str,
    owner_width: usize,
) -> std::result::Result<Vec<String>, ConfigError> {
    let owning: Vec<String> = child
        .primary_key
        .iter()
        .filter(|c| **c != child.name)
        .cloned()
        .collect();

    for (i, column) in child.primary_key.iter().enumerate() {
        if child.primary_key[..i].contains(column) {
            return Err(ConfigError::ColumnCollision {
                table: table.to_string(),
                column: column.clone(),
            });
        }
    }

    if owning.len() != owner_width {
        return Err(ConfigError::KeyWidthMismatch {
            table: table.to_string(),
            expected: owning.len(),
            actual: owner_width,
        });
    }
    Ok(owning)
}
