//! JSON melting - normalize registry documents into relational tables
//!
//! A [`SchemaConfig`] describes how one resource type splits into a root
//! table, 1:1 leaf tables and 1:many array tables. The
//! [`RelationalUnpacker`] walks a document against it and writes every row
//! through a storage engine, threading primary keys down as foreign keys.

pub mod catalog;
pub mod flatten;
pub mod plan;
pub mod types;
pub mod unpacker;
pub mod writer;

pub use plan::{ArrayType, TablePlan};
pub use types::{IdValue, KeyTuple, LeafField, SchemaConfig};
pub use unpacker::{RelationalUnpacker, SentinelKind, Unpacked, QUERIED_COLUMN};
pub use writer::{dump_tables, TableWriter};
