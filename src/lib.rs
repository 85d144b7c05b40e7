//! # registry-melt
//!
//! Fetches nested JSON resources from the Companies House registry API and
//! normalizes them into PostgreSQL tables linked by primary and foreign keys.
//!
//! ## Modules
//!
//! - **fetch**: quota-limited, retrying registry client and pagination
//! - **melt**: resource mappings and the relational unpacker
//! - **sql**: statement builder and storage engines
//! - **batch**: identifier files, resource selection and batch ingestion
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use registry_melt::{catalog, ingest_resource, PaginatingRetriever, PostgresEngine,
//!     RateLimitedFetcher, Settings};
//!
//! # async fn run() -> registry_melt::Result<()> {
//! let settings = Settings::load(None)?;
//! let engine = PostgresEngine::new(&settings.database);
//! let fetcher = RateLimitedFetcher::new(
//!     settings.registry.api_key()?,
//!     settings.registry.limiter(),
//!     settings.registry.retry_policy(),
//!     settings.registry.timeout(),
//! )?;
//! let retriever = PaginatingRetriever::new(fetcher, settings.registry.base_url.clone());
//!
//! let outcome = ingest_resource(&retriever, &engine, &catalog::psc(), "OC418979").await?;
//! println!("{:?}", outcome);
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod config;
pub mod error;
pub mod fetch;
pub mod melt;
pub mod sql;

// Re-export commonly used types for convenience
pub use batch::{BatchReport, Ingestor, Outcome, ResourceSelection};
pub use config::Settings;
pub use error::{Error, Result};
pub use fetch::{Fetch, PaginatingRetriever, QuotaLimiter, RateLimitedFetcher, RetryPolicy};
pub use melt::{catalog, IdValue, RelationalUnpacker, SchemaConfig, Unpacked};
pub use sql::{PostgresEngine, StorageEngine};

/// Main entry point: fetch one resource for one identifier and store it
pub async fn ingest_resource<F, E>(
    retriever: &PaginatingRetriever<F>,
    engine: &E,
    config: &SchemaConfig,
    id: &str,
) -> Result<Unpacked>
where
    F: Fetch,
    E: StorageEngine + ?Sized,
{
    let document = retriever.retrieve(config, id).await?;
    RelationalUnpacker::new(engine)
        .unpack(&document, config, Some(IdValue::from(id)))
        .await
}
