//! Parameterized SQL and its execution
//!
//! Statements are built injection-safe by [`StatementBuilder`] and run one
//! transaction at a time by a [`StorageEngine`].

pub mod engine;
pub mod postgres;
pub mod statement;

pub use engine::{QueryResult, StorageEngine};
pub use postgres::PostgresEngine;
pub use statement::{quote_ident, Data, Statement, StatementBuilder, Verb};
