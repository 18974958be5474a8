//! In-memory page source for tests.

use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::Semaphore;

use super::{FetchError, Page, PageMeta, PageSource, ParamValue, QueryParams};
use crate::records::Resource;

/// Serves deterministic pages from a fixed record list.
///
/// Search matches `name`/`title` case-insensitively, `status` filters by the
/// record's status. Selected pages can be made to fail, and a gate can hold
/// every response until permits are released.
pub struct FakeSource {
    records: Vec<Value>,
    requests: Mutex<Vec<QueryParams>>,
    calls: AtomicUsize,
    fail_pages: Mutex<HashSet<u32>>,
    gate: Option<Arc<Semaphore>>,
}

impl FakeSource {
    pub fn new(records: Vec<Value>) -> Self {
        Self {
            records,
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            fail_pages: Mutex::new(HashSet::new()),
            gate: None,
        }
    }

    /// `count` approved agencies named "Agency 01".. with alternating cities
    pub fn agencies(count: usize) -> Self {
        let records = (1..=count)
            .map(|i| {
                json!({
                    "id": i,
                    "name": format!("Agency {:02}", i),
                    "location": if i % 2 == 0 { "Osaka" } else { "Tokyo" },
                    "status": "APPROVED",
                })
            })
            .collect();
        Self::new(records)
    }

    /// Hold every response until `release` is called.
    pub fn gated(mut self) -> Self {
        self.gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    pub fn release(&self, responses: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(responses);
        }
    }

    pub fn fail_page(&self, page: u32) {
        self.fail_pages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(page);
    }

    pub fn heal(&self) {
        self.fail_pages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<QueryParams> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn matching(&self, params: &QueryParams) -> Vec<Value> {
        let search = match params.get("search") {
            Some(ParamValue::Str(s)) => s.to_lowercase(),
            _ => String::new(),
        };
        let status = match params.get("status") {
            Some(ParamValue::Str(s)) => Some(s.clone()),
            _ => None,
        };

        self.records
            .iter()
            .filter(|r| {
                let name = r["name"]
                    .as_str()
                    .or_else(|| r["title"].as_str())
                    .unwrap_or_default()
                    .to_lowercase();
                let location = r["location"].as_str().unwrap_or_default().to_lowercase();
                search.is_empty() || name.contains(&search) || location.contains(&search)
            })
            .filter(|r| match &status {
                Some(s) => r["status"].as_str() == Some(s.as_str()),
                None => true,
            })
            .cloned()
            .collect()
    }
}

impl PageSource for FakeSource {
    async fn fetch_page(
        &self,
        _resource: Resource,
        params: &QueryParams,
    ) -> Result<Page<Value>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(params.clone());

        if let Some(gate) = &self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|e| FetchError::Network(e.to_string()))?;
            permit.forget();
        }

        let page = params.page().unwrap_or(1);
        let failing = self
            .fail_pages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&page);
        if failing {
            return Err(FetchError::Network("connection reset".to_string()));
        }

        let limit = match params.get("limit") {
            Some(ParamValue::Int(n)) => *n as usize,
            _ => 12,
        };
        let matching = self.matching(params);
        let total = matching.len() as u64;
        let data = matching
            .into_iter()
            .skip((page as usize - 1) * limit)
            .take(limit)
            .collect();

        Ok(Page {
            data,
            meta: PageMeta { total },
        })
    }
}
