//! Multi-page retrieval
//!
//! Page 0 is fetched unconditionally. If it declares more `total_results`
//! than `items_per_page`, the remaining pages are fetched in order and their
//! `items` appended to page 0's. Every other top-level field comes from
//! page 0.

use crate::error::{FetchError, Result};
use crate::fetch::resource::ResourceKind;
use crate::fetch::Fetch;
use crate::melt::SchemaConfig;
use serde_json::Value;
use tracing::debug;

/// `(total_results, items_per_page)` when the document needs more pages
pub fn page_window(doc: &Value) -> Option<(u64, u64)> {
    if doc.get("error").is_some() {
        return None;
    }
    let total = doc.get("total_results")?.as_u64()?;
    let per_page = doc.get("items_per_page")?.as_u64()?;
    (per_page > 0 && total > per_page).then_some((total, per_page))
}

/// Start indexes of the pages after page 0, stopping before `cap`.
pub fn page_starts(total: u64, per_page: u64, cap: Option<u32>) -> Vec<u64> {
    if per_page == 0 {
        return Vec::new();
    }
    let pages = total.div_ceil(per_page);
    (1..pages)
        .map(|page| page * per_page)
        .take_while(|start| cap.map_or(true, |cap| *start < u64::from(cap)))
        .collect()
}

/// Fetches whole resources, however many pages they span
pub struct PaginatingRetriever<F: Fetch> {
    fetcher: F,
    base_url: String,
}

impl<F: Fetch> PaginatingRetriever<F> {
    pub fn new(fetcher: F, base_url: impl Into<String>) -> Self {
        PaginatingRetriever {
            fetcher,
            base_url: base_url.into(),
        }
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Retrieve the resource `config` describes for one identifier.
    pub async fn retrieve(&self, config: &SchemaConfig, id: &str) -> Result<Value> {
        let kind = ResourceKind::from_name(&config.name)?;
        let first_url = kind.url(&self.base_url, id, config.items_per_page, 0)?;
        let mut doc = self.fetcher.fetch(first_url.as_str()).await?;

        let Some((total, per_page)) = page_window(&doc) else {
            return Ok(doc);
        };
        let starts = page_starts(total, per_page, config.pagination_cap);
        debug!(
            resource = %config.name,
            id,
            total,
            pages = starts.len() + 1,
            "paginating"
        );

        let mut rest = Vec::new();
        for start in starts {
            let url = kind.url(&self.base_url, id, Some(per_page as u32), start)?;
            let page = self.fetcher.fetch(url.as_str()).await?;
            match page {
                Value::Object(mut obj) => match obj.remove("items") {
                    Some(Value::Array(items)) => rest.extend(items),
                    _ => return Err(FetchError::MissingItems { url: url.to_string() }.into()),
                },
                _ => return Err(FetchError::MissingItems { url: url.to_string() }.into()),
            }
        }

        match doc.get_mut("items") {
            Some(Value::Array(items)) => items.extend(rest),
            _ => {
                return Err(FetchError::MissingItems {
                    url: first_url.to_string(),
                }
                .into())
            }
        }
        Ok(doc)
    }
}
