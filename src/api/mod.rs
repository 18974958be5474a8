//! Directory REST API access
//!
//! - `client`: reqwest-backed HTTP client
//! - `params`: query parameters and cache keys
//! - `error`: fetch error taxonomy

mod client;
mod error;
#[cfg(test)]
pub mod fake;
mod params;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;

pub use client::{ApiClient, join_segments, parse_base_url};
pub use error::FetchError;
#[cfg(test)]
pub use params::ParamValue;
pub use params::{CacheKey, QueryParams};

use crate::records::Resource;

/// One page of a list endpoint: `{data: [...], meta: {total}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    #[serde(default)]
    pub meta: PageMeta,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMeta {
    /// Total matching records across all pages for the current filter
    #[serde(default)]
    pub total: u64,
}

impl Page<serde_json::Value> {
    /// Decode raw records into typed ones, failing on the first malformed record.
    pub fn decode<R: DeserializeOwned>(self) -> Result<Page<R>, FetchError> {
        let data = self
            .data
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<R>, _>>()?;
        Ok(Page {
            data,
            meta: self.meta,
        })
    }
}

/// Single-record envelope: `{data: {...}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
}

/// Anything that can serve pages of a resource.
pub trait PageSource: Send + Sync + 'static {
    fn fetch_page(
        &self,
        resource: Resource,
        params: &QueryParams,
    ) -> impl Future<Output = Result<Page<serde_json::Value>, FetchError>> + Send;
}

/// Write side of the API used by the dashboard.
pub trait RecordWriter: Send + Sync + 'static {
    /// Create a record; returns the stored record as the server echoes it.
    fn create(
        &self,
        resource: Resource,
        body: &serde_json::Value,
    ) -> impl Future<Output = Result<serde_json::Value, FetchError>> + Send;

    fn approve(
        &self,
        resource: Resource,
        id: &str,
    ) -> impl Future<Output = Result<(), FetchError>> + Send;

    fn remove(
        &self,
        resource: Resource,
        id: &str,
    ) -> impl Future<Output = Result<(), FetchError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::Agency;

    #[test]
    fn test_page_decode() {
        let raw: Page<serde_json::Value> = serde_json::from_str(
            r#"{"data": [{"id": 1, "name": "A"}, {"id": 2}], "meta": {"total": 30}}"#,
        )
        .unwrap();
        let page: Page<Agency> = raw.decode().unwrap();
        assert_eq!(page.data.len(), 2);
        assert_eq!(page.meta.total, 30);
        assert_eq!(page.data[1].id, "2");
    }

    #[test]
    fn test_page_missing_meta_defaults() {
        let raw: Page<serde_json::Value> = serde_json::from_str(r#"{"data": []}"#).unwrap();
        assert_eq!(raw.meta.total, 0);
    }

    #[test]
    fn test_page_decode_rejects_record_without_id() {
        let raw: Page<serde_json::Value> =
            serde_json::from_str(r#"{"data": [{"name": "no id"}]}"#).unwrap();
        let result: Result<Page<Agency>, _> = raw.decode();
        assert!(matches!(result, Err(FetchError::Decode(_))));
    }
}
