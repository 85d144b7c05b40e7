//! Error taxonomy for fetching, statement building, storage and unpacking.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration defects. These are never retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("table `{table}` has no primary key; every table needs one")]
    MissingPrimaryKey { table: String },

    #[error("array branch `{table}` expects {expected} owning key column(s) but the parent key has {actual}")]
    KeyWidthMismatch {
        table: String,
        expected: usize,
        actual: usize,
    },

    #[error("column `{column}` appears more than once in the key of `{table}`")]
    ColumnCollision { table: String, column: String },

    #[error("unknown resource `{0}`")]
    UnknownResource(String),

    #[error("identifier file `{}` must be a .csv or .txt file", .0.display())]
    UnsupportedIdFile(PathBuf),

    #[error("registry API key missing: set `api_key`, `api_key_file` or REGISTRY_API_KEY")]
    MissingApiKey,

    #[error("failed to read `{}`: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("invalid resource selection: {0}")]
    Selection(String),
}

/// Statement construction errors. Raised before anything reaches the driver.
#[derive(Debug, Error)]
pub enum StatementError {
    #[error("data must be a mapping or a sequence, not a scalar")]
    ScalarData,

    #[error("`fields` must not be passed with mapping data; they are taken from the mapping keys (use drop keys to exclude some)")]
    FieldsWithMapping,

    #[error("`fields` must be passed explicitly with sequence data")]
    MissingFields,

    #[error("field list is empty")]
    EmptyFields,

    #[error("invalid identifier {0:?}")]
    InvalidIdentifier(String),

    #[error("placeholder `{{{0}}}` has no binding")]
    UnboundPlaceholder(String),

    #[error("{values} value(s) cannot be laid out over {fields} field(s)")]
    ShapeMismatch { fields: usize, values: usize },

    #[error("data was supplied but the template has no value placeholders")]
    UnplacedData,

    #[error("every field is a key column; there is nothing to update")]
    NothingToUpdate,
}

/// Storage failures. The transaction has been rolled back and the connection released.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to connect: {0}")]
    Connect(#[source] tokio_postgres::Error),

    #[error("failed to pin schema `{schema}`: {source}")]
    Namespace {
        schema: String,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("statement failed: {sql}: {source}")]
    Execute {
        sql: String,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("commit failed: {0}")]
    Commit(#[source] tokio_postgres::Error),

    #[error("statement rejected: {0}")]
    Rejected(String),
}

/// Fetch failures for a single request.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("giving up on {url} after {attempts} attempt(s): {cause}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        cause: String,
    },

    #[error("response from {url} is not valid JSON: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("page {url} has no `items` array")]
    MissingItems { url: String },

    #[error("cannot build url from `{input}`: {cause}")]
    InvalidUrl { input: String, cause: String },

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Crate-level error.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Statement(#[from] StatementError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("unsupported input at `{path}`: {reason}")]
    UnsupportedShape { path: String, reason: String },

    #[error("no key values for `{table}`: pass an id or include {columns:?} in the document")]
    MissingKey { table: String, columns: Vec<String> },

    #[error("insert into `{table}` returned no key row")]
    NoKeyReturned { table: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
