//! Registry fetching
//!
//! [`RateLimitedFetcher`] makes single authenticated calls under a call
//! quota; [`PaginatingRetriever`] turns "resource X for id Y" into one
//! complete document on top of any [`Fetch`] implementation.

pub mod client;
pub mod limiter;
pub mod paginate;
pub mod resource;

use crate::error::FetchError;
use async_trait::async_trait;
use serde_json::Value;

pub use client::{classify, RateLimitedFetcher, RetryPolicy, StatusClass};
pub use limiter::QuotaLimiter;
pub use paginate::{page_starts, page_window, PaginatingRetriever};
pub use resource::ResourceKind;

/// One GET against the registry.
///
/// 404, 401 and 400 come back as `{"error": ...}` documents; other failures
/// are errors.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Value, FetchError>;
}
