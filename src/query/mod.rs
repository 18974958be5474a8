//! Cached query client
//!
//! Pages are cached per [`CacheKey`] in a moka future cache. Concurrent
//! requests for the same key coalesce onto a single fetch; per-key flags
//! expose `is_loading`, `is_fetching` and `is_error` for the current request.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::api::{CacheKey, FetchError, Page, PageSource, QueryParams};
use crate::config::CacheConfig;
use crate::records::{Record, Resource};

/// Page cache type alias.
pub type PageCache<R> = moka::future::Cache<CacheKey, Arc<Page<R>>>;

/// Snapshot of a query for one parameter set.
#[derive(Debug, Clone)]
pub struct QueryState<R> {
    /// Last successful response for this key
    pub data: Option<Arc<Page<R>>>,
    /// First request for this key is in flight (no data yet)
    pub is_loading: bool,
    /// Any request for this key is in flight
    pub is_fetching: bool,
    pub is_error: bool,
    pub error: Option<FetchError>,
}

#[derive(Debug, Default)]
struct KeyStatus {
    in_flight: usize,
    error: Option<FetchError>,
}

/// Query client for one record type.
///
/// Cheap to clone; clones share the cache and the request flags.
pub struct QueryClient<S, R> {
    source: Arc<S>,
    cache: PageCache<R>,
    status: Arc<Mutex<HashMap<CacheKey, KeyStatus>>>,
    _record: PhantomData<fn() -> R>,
}

impl<S, R> Clone for QueryClient<S, R> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            cache: self.cache.clone(),
            status: Arc::clone(&self.status),
            _record: PhantomData,
        }
    }
}

impl<S: PageSource, R: Record> QueryClient<S, R> {
    pub fn new(source: Arc<S>, config: &CacheConfig) -> Self {
        let cache = moka::future::Cache::builder()
            .max_capacity(config.max_entries)
            .time_to_live(Duration::from_secs(config.ttl_secs))
            .support_invalidation_closures()
            .build();

        Self {
            source,
            cache,
            status: Arc::new(Mutex::new(HashMap::new())),
            _record: PhantomData,
        }
    }

    fn with_status<T>(&self, f: impl FnOnce(&mut HashMap<CacheKey, KeyStatus>) -> T) -> T {
        let mut guard = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Fetch a page, serving it from cache when present.
    ///
    /// Concurrent calls with an equivalent parameter set share one request.
    pub async fn fetch(&self, params: &QueryParams) -> Result<Arc<Page<R>>, FetchError> {
        let key = params.cache_key(R::RESOURCE);

        if let Some(page) = self.cache.get(&key).await {
            tracing::debug!("Query cache hit: {}", key);
            return Ok(page);
        }

        self.with_status(|status| {
            let entry = status.entry(key.clone()).or_default();
            entry.in_flight += 1;
            entry.error = None;
        });

        let source = Arc::clone(&self.source);
        let request = params.clone();
        let result = self
            .cache
            .try_get_with(key.clone(), async move {
                tracing::debug!("Fetching {} {:?}", R::RESOURCE, request.to_query());
                let raw = source.fetch_page(R::RESOURCE, &request).await?;
                raw.decode::<R>().map(Arc::new)
            })
            .await
            .map_err(|e: Arc<FetchError>| (*e).clone());

        self.with_status(|status| {
            if let Some(entry) = status.get_mut(&key) {
                entry.in_flight = entry.in_flight.saturating_sub(1);
                if let Err(e) = &result {
                    entry.error = Some(e.clone());
                }
                if entry.in_flight == 0 && entry.error.is_none() {
                    status.remove(&key);
                }
            }
        });

        if let Err(e) = &result {
            tracing::warn!("Query {} failed: {}", key, e);
        }
        result
    }

    /// Current state of the query for `params` without issuing a request.
    pub async fn state(&self, params: &QueryParams) -> QueryState<R> {
        let key = params.cache_key(R::RESOURCE);
        let data = self.cache.get(&key).await;
        let (in_flight, error) = self.with_status(|status| {
            status
                .get(&key)
                .map(|s| (s.in_flight > 0, s.error.clone()))
                .unwrap_or((false, None))
        });

        QueryState {
            is_loading: in_flight && data.is_none(),
            is_fetching: in_flight,
            is_error: error.is_some(),
            error,
            data,
        }
    }

    /// Whether a request for `params` is in flight.
    pub fn is_fetching(&self, params: &QueryParams) -> bool {
        let key = params.cache_key(R::RESOURCE);
        self.with_status(|status| status.get(&key).is_some_and(|s| s.in_flight > 0))
    }

    /// Drop every cached page of `resource` (after a mutation).
    pub fn invalidate_resource(&self, resource: Resource) {
        if resource != R::RESOURCE {
            return;
        }
        if let Err(e) = self
            .cache
            .invalidate_entries_if(move |key, _| key.resource == resource)
        {
            tracing::warn!("Failed to invalidate {} cache: {}", resource, e);
        }
        self.forget_settled();
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
        self.forget_settled();
    }

    /// Drop error flags; in-flight counts stay until their fetch returns.
    fn forget_settled(&self) {
        self.with_status(|status| {
            status.retain(|_, s| {
                s.error = None;
                s.in_flight > 0
            })
        });
    }
}

/// Something holding cached pages that a mutation must invalidate.
pub trait CacheInvalidator: Send + Sync {
    fn invalidate_resource(&self, resource: Resource);
}

impl<S: PageSource, R: Record> CacheInvalidator for QueryClient<S, R> {
    fn invalidate_resource(&self, resource: Resource) {
        QueryClient::invalidate_resource(self, resource);
    }
}
