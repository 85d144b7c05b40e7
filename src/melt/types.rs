use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How one JSON resource type maps onto relational tables.
///
/// Array children carry their own `SchemaConfig`; a child's `name` is the
/// field name of the array in its parent document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaConfig {
    /// Top-level resource: controls delete-before-insert and sentinel routing
    #[serde(default)]
    pub root: bool,

    /// Root table name, or the array field name for a child config
    pub name: String,

    /// Prefix for the root's descendant tables, e.g. "cp" gives "cp_links"
    #[serde(default)]
    pub abbreviation: Option<String>,

    /// Ordered primary-key columns. Never empty.
    pub primary_key: Vec<String>,

    /// Sub-objects flattened 1:1 into their own table
    #[serde(default)]
    pub leaves: Vec<LeafField>,

    /// Sub-arrays expanded 1:many into child tables
    #[serde(default)]
    pub arrays: Vec<SchemaConfig>,

    #[serde(default)]
    pub drop_from_root: Vec<String>,

    /// Keys removed from an empty-result document before it is stored
    #[serde(default)]
    pub drop_if_empty: Vec<String>,

    #[serde(default)]
    pub items_per_page: Option<u32>,

    /// Never request a page whose start index reaches this value
    #[serde(default)]
    pub pagination_cap: Option<u32>,
}

/// A 1:1 sub-object and the keys to leave out of its table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafField {
    pub name: String,
    #[serde(default)]
    pub drop: Vec<String>,
}

impl SchemaConfig {
    fn new(root: bool, name: &str, primary_key: &[&str]) -> Self {
        SchemaConfig {
            root,
            name: name.to_string(),
            abbreviation: None,
            primary_key: primary_key.iter().map(|s| s.to_string()).collect(),
            leaves: Vec::new(),
            arrays: Vec::new(),
            drop_from_root: Vec::new(),
            drop_if_empty: Vec::new(),
            items_per_page: None,
            pagination_cap: None,
        }
    }

    /// A top-level resource mapping.
    pub fn root(name: &str, primary_key: &[&str]) -> Self {
        Self::new(true, name, primary_key)
    }

    /// A mapping for the elements of the array field `name`.
    pub fn branch(name: &str, primary_key: &[&str]) -> Self {
        Self::new(false, name, primary_key)
    }

    pub fn abbreviation(mut self, abbreviation: &str) -> Self {
        self.abbreviation = Some(abbreviation.to_string());
        self
    }

    pub fn leaf(self, name: &str) -> Self {
        self.leaf_dropping(name, &[])
    }

    pub fn leaf_dropping(mut self, name: &str, drop: &[&str]) -> Self {
        self.leaves.push(LeafField {
            name: name.to_string(),
            drop: drop.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    pub fn array(mut self, config: SchemaConfig) -> Self {
        self.arrays.push(config);
        self
    }

    pub fn drop_from_root(mut self, keys: &[&str]) -> Self {
        self.drop_from_root = keys.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn drop_if_empty(mut self, keys: &[&str]) -> Self {
        self.drop_if_empty = keys.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn items_per_page(mut self, n: u32) -> Self {
        self.items_per_page = Some(n);
        self
    }

    pub fn pagination_cap(mut self, cap: u32) -> Self {
        self.pagination_cap = Some(cap);
        self
    }

    pub fn leaf_names(&self) -> impl Iterator<Item = &str> {
        self.leaves.iter().map(|l| l.name.as_str())
    }

    pub fn array_names(&self) -> impl Iterator<Item = &str> {
        self.arrays.iter().map(|a| a.name.as_str())
    }

    /// Table receiving error documents for this resource.
    pub fn http_errors_table(&self) -> String {
        format!("{}_http_errors", self.name)
    }

    /// Table receiving empty-result documents for this resource.
    pub fn empty_table(&self) -> String {
        format!("{}_empty", self.name)
    }

    /// Check every level has a primary key with no repeated column.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.primary_key.is_empty() {
            return Err(ConfigError::MissingPrimaryKey {
                table: self.name.clone(),
            });
        }
        for (i, column) in self.primary_key.iter().enumerate() {
            if self.primary_key[..i].contains(column) {
                return Err(ConfigError::ColumnCollision {
                    table: self.name.clone(),
                    column: column.clone(),
                });
            }
        }
        self.arrays.iter().try_for_each(SchemaConfig::validate)
    }
}

/// Identifier supplied by the caller for one unpack.
#[derive(Debug, Clone, PartialEq)]
pub enum IdValue {
    Scalar(Value),
    Composite(Vec<Value>),
}

impl IdValue {
    /// Value stored in the `id_item_queried` column of a sentinel table.
    pub fn as_queried(&self) -> Value {
        match self {
            IdValue::Scalar(v) => v.clone(),
            IdValue::Composite(values) if values.len() == 1 => values[0].clone(),
            IdValue::Composite(values) => Value::Array(values.clone()),
        }
    }
}

impl From<&str> for IdValue {
    fn from(id: &str) -> Self {
        IdValue::Scalar(Value::String(id.to_string()))
    }
}

impl From<String> for IdValue {
    fn from(id: String) -> Self {
        IdValue::Scalar(Value::String(id))
    }
}

impl From<Vec<Value>> for IdValue {
    fn from(values: Vec<Value>) -> Self {
        IdValue::Composite(values)
    }
}

/// Ordered (column, value) pairs identifying the row that owns a subtree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyTuple(Vec<(String, Value)>);

impl KeyTuple {
    /// Build a level's key from the caller's id, or from the document itself.
    ///
    /// A composite id shorter than the key leaves the trailing columns to the
    /// database (serial components).
    pub fn derive(key: &[String], id: Option<&IdValue>, doc: &Map<String, Value>) -> Self {
        let pairs = match id {
            Some(IdValue::Scalar(v)) => key
                .iter()
                .take(1)
                .map(|column| (column.clone(), v.clone()))
                .collect(),
            Some(IdValue::Composite(values)) => key
                .iter()
                .cloned()
                .zip(values.iter().cloned())
                .collect(),
            None => key
                .iter()
                .filter_map(|column| doc.get(column).map(|v| (column.clone(), v.clone())))
                .collect(),
        };
        KeyTuple(pairs)
    }

    /// Pair a returned key row with its column names.
    pub fn from_row(columns: &[String], row: &[Value]) -> Self {
        KeyTuple(
            columns
                .iter()
                .cloned()
                .zip(row.iter().cloned())
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn columns(&self) -> Vec<String> {
        self.0.iter().map(|(c, _)| c.clone()).collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.0.iter().map(|(_, v)| v.clone()).collect()
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.iter().find(|(c, _)| c == column).map(|(_, v)| v)
    }

    /// Write every pair into `row`, overriding existing values.
    pub fn merge_into(&self, row: &mut Map<String, Value>) {
        for (column, value) in &self.0 {
            row.insert(column.clone(), value.clone());
        }
    }
}
