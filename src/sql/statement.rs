//! Parameterized statement construction
//!
//! Templates name their identifier and value positions with `{name}`
//! placeholders. Identifiers only ever enter the SQL text through
//! [`quote_ident`]; values never enter it at all and are bound positionally
//! as `$1, $2, ...`.
//!
//! Reserved placeholders:
//!
//! - `{fields}`: the resolved field list (mapping keys minus drop keys, or the
//!   explicit field list for sequence data)
//! - `{placeholders}`: one `$n` per resolved field
//! - `{rows}`: `($1, $2), ($3, $4), ...`, one group per `fields.len()` values
//! - `{updates}`: `"col" = EXCLUDED."col"` for every resolved field that is
//!   not bound under `p_key`
//!
//! Any other placeholder must be bound with [`StatementBuilder::ident`] or
//! [`StatementBuilder::idents`].

use crate::error::StatementError;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// What the caller expects back from a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Read,
    Write,
    WriteRead,
}

impl Verb {
    pub fn returns_rows(self) -> bool {
        matches!(self, Verb::Read | Verb::WriteRead)
    }
}

impl FromStr for Verb {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_whitespace().collect::<String>().as_str() {
            "read" => Ok(Verb::Read),
            "write" => Ok(Verb::Write),
            "write+read" => Ok(Verb::WriteRead),
            _ => Err(format!(
                "unknown verb `{}`: use \"read\", \"write\" or \"write+read\"",
                s
            )),
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verb::Read => write!(f, "read"),
            Verb::Write => write!(f, "write"),
            Verb::WriteRead => write!(f, "write+read"),
        }
    }
}

/// Quote an identifier for PostgreSQL, doubling embedded quotes.
pub fn quote_ident(name: &str) -> Result<String, StatementError> {
    if name.is_empty() || name.contains('\0') {
        return Err(StatementError::InvalidIdentifier(name.to_string()));
    }
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

fn quote_list(names: &[String]) -> Result<String, StatementError> {
    if names.is_empty() {
        return Err(StatementError::EmptyFields);
    }
    let quoted = names
        .iter()
        .map(|n| quote_ident(n))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(quoted.join(", "))
}

/// Statement data: labelled (mapping) or positional (sequence).
#[derive(Debug, Clone)]
pub enum Data {
    Mapping(Map<String, Value>),
    Sequence(Vec<Value>),
}

impl TryFrom<Value> for Data {
    type Error = StatementError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Data::Mapping(map)),
            Value::Array(values) => Ok(Data::Sequence(values)),
            _ => Err(StatementError::ScalarData),
        }
    }
}

/// A ready-to-execute statement and its positional parameters.
#[derive(Debug, Clone)]
pub struct Statement {
    verb: Verb,
    sql: String,
    params: Vec<Value>,
    fields: Vec<String>,
    identifiers: BTreeMap<String, Vec<String>>,
}

impl Statement {
    pub fn verb(&self) -> Verb {
        self.verb
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// Resolved field list, unquoted.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Unquoted names bound to an identifier placeholder.
    pub fn identifier(&self, name: &str) -> Option<&[String]> {
        self.identifiers.get(name).map(Vec::as_slice)
    }

    pub fn table(&self) -> Option<&str> {
        self.identifier("table")
            .and_then(|names| names.first())
            .map(String::as_str)
    }
}

/// Builder for [`Statement`].
#[derive(Debug, Clone)]
pub struct StatementBuilder {
    verb: Verb,
    template: String,
    identifiers: BTreeMap<String, Vec<String>>,
    fields: Option<Vec<String>>,
    data: Option<Data>,
    drop_keys: Vec<String>,
}

impl StatementBuilder {
    pub fn new(verb: Verb, template: impl Into<String>) -> Self {
        StatementBuilder {
            verb,
            template: template.into(),
            identifiers: BTreeMap::new(),
            fields: None,
            data: None,
            drop_keys: Vec::new(),
        }
    }

    /// Bind a single identifier placeholder.
    pub fn ident(mut self, placeholder: &str, name: impl Into<String>) -> Self {
        self.identifiers
            .insert(placeholder.to_string(), vec![name.into()]);
        self
    }

    /// Bind a placeholder to a comma-separated identifier list.
    pub fn idents<I, S>(mut self, placeholder: &str, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.identifiers.insert(
            placeholder.to_string(),
            names.into_iter().map(Into::into).collect(),
        );
        self
    }

    /// Explicit field list. Required with sequence data, refused with mapping data.
    pub fn fields<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn mapping(mut self, data: Map<String, Value>) -> Self {
        self.data = Some(Data::Mapping(data));
        self
    }

    pub fn sequence(mut self, data: Vec<Value>) -> Self {
        self.data = Some(Data::Sequence(data));
        self
    }

    /// Untyped data; scalars are rejected.
    pub fn data(mut self, data: Value) -> Result<Self, StatementError> {
        self.data = Some(Data::try_from(data)?);
        Ok(self)
    }

    /// Mapping keys to leave out of the resolved field list.
    pub fn drop_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.drop_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn build(self) -> Result<Statement, StatementError> {
        let (fields, params) = self.resolve_data()?;
        let field_count = fields.as_ref().map_or(0, Vec::len);

        let mut sql = String::with_capacity(self.template.len() + 64);
        let mut group_used = false;

        for piece in scan(&self.template) {
            match piece {
                Piece::Text(text) => sql.push_str(text),
                Piece::Placeholder(name) => match name {
                    "fields" => {
                        let fields = self.bound_or_resolved(name, fields.as_ref())?;
                        sql.push_str(&quote_list(fields)?);
                    }
                    "placeholders" => {
                        if field_count == 0 {
                            return Err(StatementError::UnboundPlaceholder(name.to_string()));
                        }
                        if params.len() != field_count {
                            return Err(StatementError::ShapeMismatch {
                                fields: field_count,
                                values: params.len(),
                            });
                        }
                        sql.push_str(&numbered(1, field_count));
                        group_used = true;
                    }
                    "rows" => {
                        if field_count == 0 {
                            return Err(StatementError::UnboundPlaceholder(name.to_string()));
                        }
                        if params.is_empty() || params.len() % field_count != 0 {
                            return Err(StatementError::ShapeMismatch {
                                fields: field_count,
                                values: params.len(),
                            });
                        }
                        let groups = (0..params.len() / field_count)
                            .map(|g| format!("({})", numbered(g * field_count + 1, field_count)))
                            .collect::<Vec<_>>();
                        sql.push_str(&groups.join(", "));
                        group_used = true;
                    }
                    "updates" => {
                        let fields = fields
                            .as_ref()
                            .ok_or_else(|| StatementError::UnboundPlaceholder(name.to_string()))?;
                        let keys = self.identifiers.get("p_key");
                        let assignments = fields
                            .iter()
                            .filter(|f| keys.map_or(true, |k| !k.contains(*f)))
                            .map(|f| {
                                let col = quote_ident(f)?;
                                Ok(format!("{} = EXCLUDED.{}", col, col))
                            })
                            .collect::<Result<Vec<_>, StatementError>>()?;
                        if assignments.is_empty() {
                            return Err(StatementError::NothingToUpdate);
                        }
                        sql.push_str(&assignments.join(", "));
                    }
                    other => {
                        let names = self
                            .identifiers
                            .get(other)
                            .ok_or_else(|| StatementError::UnboundPlaceholder(other.to_string()))?;
                        sql.push_str(&quote_list(names)?);
                    }
                },
            }
        }

        if !params.is_empty() && !group_used {
            return Err(StatementError::UnplacedData);
        }

        let mut identifiers = self.identifiers;
        if let Some(fields) = &fields {
            identifiers
                .entry("fields".to_string())
                .or_insert_with(|| fields.clone());
        }

        Ok(Statement {
            verb: self.verb,
            sql,
            params,
            fields: fields.unwrap_or_default(),
            identifiers,
        })
    }

    fn bound_or_resolved<'a>(
        &'a self,
        name: &str,
        resolved: Option<&'a Vec<String>>,
    ) -> Result<&'a [String], StatementError> {
        resolved
            .map(Vec::as_slice)
            .or_else(|| self.identifiers.get(name).map(Vec::as_slice))
            .ok_or_else(|| StatementError::UnboundPlaceholder(name.to_string()))
    }

    /// Resolve the field list and flatten data into positional parameters.
    fn resolve_data(&self) -> Result<(Option<Vec<String>>, Vec<Value>), StatementError> {
        match &self.data {
            None => Ok((self.fields.clone(), Vec::new())),
            Some(Data::Mapping(map)) => {
                if self.fields.is_some() {
                    return Err(StatementError::FieldsWithMapping);
                }
                let (fields, params): (Vec<String>, Vec<Value>) = map
                    .iter()
                    .filter(|(k, _)| !self.drop_keys.contains(k))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .unzip();
                if fields.is_empty() {
                    return Err(StatementError::EmptyFields);
                }
                Ok((Some(fields), params))
            }
            Some(Data::Sequence(values)) => {
                let fields = self.fields.clone().ok_or(StatementError::MissingFields)?;
                if fields.is_empty() {
                    return Err(StatementError::EmptyFields);
                }
                Ok((Some(fields), values.clone()))
            }
        }
    }
}

fn numbered(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("${}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

enum Piece<'t> {
    Text(&'t str),
    Placeholder(&'t str),
}

/// Split a template into literal text and `{name}` placeholders.
/// Braces that do not enclose a plain name are kept as text.
fn scan(template: &str) -> Vec<Piece<'_>> {
    let mut pieces = Vec::new();
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close)
                if close > 0
                    && after[..close]
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '_') =>
            {
                if open > 0 {
                    pieces.push(Piece::Text(&rest[..open]));
                }
                pieces.push(Piece::Placeholder(&after[..close]));
                rest = &after[close + 1..];
            }
            _ => {
                pieces.push(Piece::Text(&rest[..open + 1]));
                rest = after;
            }
        }
    }
    if !rest.is_empty() {
        pieces.push(Piece::Text(rest));
    }
    pieces
}
