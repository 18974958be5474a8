//! List state controller
//!
//! Owns the search term, the current page and the accumulated result set of
//! one list view. Every state change is an explicit transition; results are
//! tagged with the generation of the filter session that requested them so
//! late responses from an abandoned session are dropped.

use std::sync::Arc;

use crate::api::{FetchError, Page, QueryParams};
use crate::records::{Record, Status};

/// A page the controller wants fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub generation: u64,
    pub page: u32,
    pub params: QueryParams,
}

/// What happened when a fetch result was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Page 1 replaced the accumulated set
    Replaced { count: usize },
    /// A later page was appended
    Appended { count: usize },
    /// Result belonged to an older session or a page no longer awaited
    Stale,
    /// Fetch failed; accumulated set and has_more untouched
    Failed(FetchError),
}

#[derive(Debug, Clone)]
pub struct ListState<R> {
    search: String,
    /// Page of the current (or last successful) request
    page: u32,
    page_size: u32,
    status_filter: Option<Status>,
    items: Vec<R>,
    has_more: bool,
    generation: u64,
    /// Page currently awaited, if any
    in_flight: Option<u32>,
    /// Last page merged in this session (0 = none yet)
    loaded_page: u32,
    total: Option<u64>,
    error: Option<FetchError>,
}

impl<R: Record> ListState<R> {
    pub fn new(page_size: u32, status_filter: Option<Status>) -> Self {
        Self {
            search: String::new(),
            page: 1,
            page_size: page_size.max(1),
            status_filter,
            items: Vec::new(),
            has_more: true,
            generation: 0,
            in_flight: None,
            loaded_page: 0,
            total: None,
            error: None,
        }
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    #[cfg(test)]
    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn items(&self) -> &[R] {
        &self.items
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    #[cfg(test)]
    pub fn is_loading_more(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Server-declared total for the current filter, once known
    pub fn total(&self) -> Option<u64> {
        self.total
    }

    pub fn error(&self) -> Option<&FetchError> {
        self.error.as_ref()
    }

    /// Nothing merged yet and page 1 is awaited
    pub fn is_initial_load(&self) -> bool {
        self.loaded_page == 0 && self.in_flight == Some(1)
    }

    /// Parameters of the current page under the current search term
    pub fn current_params(&self) -> QueryParams {
        QueryParams::for_page(&self.search, self.page, self.page_size, self.status_filter)
    }

    fn request(&mut self, page: u32) -> PageRequest {
        self.page = page;
        self.in_flight = Some(page);
        PageRequest {
            generation: self.generation,
            page,
            params: self.current_params(),
        }
    }

    /// Start a new filter session for the current search term.
    fn reset_session(&mut self) -> PageRequest {
        self.generation += 1;
        self.items.clear();
        self.has_more = true;
        self.loaded_page = 0;
        self.total = None;
        self.error = None;
        self.request(1)
    }

    /// Request for the first page of the initial session.
    pub fn start(&mut self) -> PageRequest {
        tracing::debug!("Starting list session for '{}'", self.search);
        self.reset_session()
    }

    /// Change the search term. Returns the page-1 request of the new
    /// session, or `None` when the term did not change.
    pub fn set_search(&mut self, search: &str) -> Option<PageRequest> {
        if search == self.search {
            return None;
        }
        tracing::debug!("Search changed '{}' -> '{}'", self.search, search);
        self.search = search.to_string();
        Some(self.reset_session())
    }

    /// Discard everything and refetch page 1 with the same search term.
    pub fn reload(&mut self) -> PageRequest {
        self.reset_session()
    }

    /// Advance to the next page. No-op while a load is outstanding, after
    /// the last page, or after a failure (errors wait for a manual reload).
    pub fn load_more(&mut self) -> Option<PageRequest> {
        if !self.has_more || self.in_flight.is_some() || self.error.is_some() {
            return None;
        }
        if self.loaded_page == 0 {
            return None;
        }
        let next = self.loaded_page + 1;
        tracing::debug!("Loading page {} for '{}'", next, self.search);
        Some(self.request(next))
    }

    /// Merge the result of `request` into the accumulated set.
    pub fn apply(
        &mut self,
        generation: u64,
        page: u32,
        result: Result<Arc<Page<R>>, FetchError>,
    ) -> ApplyOutcome {
        if generation != self.generation || self.in_flight != Some(page) {
            tracing::debug!(
                "Discarding stale page {} (generation {}, current {})",
                page,
                generation,
                self.generation
            );
            return ApplyOutcome::Stale;
        }
        self.in_flight = None;

        let fetched = match result {
            Ok(fetched) => fetched,
            Err(e) => {
                tracing::warn!("Page {} failed for '{}': {}", page, self.search, e);
                self.page = self.loaded_page.max(1);
                self.error = Some(e.clone());
                return ApplyOutcome::Failed(e);
            }
        };

        let returned = fetched.data.len();
        let accepted: Vec<R> = fetched
            .data
            .iter()
            .filter(|r| self.status_filter.is_none_or(|s| r.status() == s))
            .cloned()
            .collect();
        let count = accepted.len();

        self.has_more = returned == self.page_size as usize;
        self.total = Some(fetched.meta.total);
        self.loaded_page = page;
        self.error = None;

        if page == 1 {
            self.items = accepted;
            ApplyOutcome::Replaced { count }
        } else {
            self.items.extend(accepted);
            ApplyOutcome::Appended { count }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::PageMeta;
    use crate::records::Agency;

    fn agencies(range: std::ops::RangeInclusive<usize>, status: Status) -> Vec<Agency> {
        range
            .map(|i| Agency {
                id: i.to_string(),
                name: Some(format!("Agency {:02}", i)),
                status,
                ..Default::default()
            })
            .collect()
    }

    fn page(data: Vec<Agency>, total: u64) -> Result<Arc<Page<Agency>>, FetchError> {
        Ok(Arc::new(Page {
            data,
            meta: PageMeta { total },
        }))
    }

    fn state() -> ListState<Agency> {
        ListState::new(12, Some(Status::Approved))
    }

    #[test]
    fn test_scenario_a_three_pages() {
        let mut s = state();
        let req = s.start();
        assert_eq!(req.page, 1);
        assert_eq!(req.params.page(), Some(1));

        s.apply(req.generation, 1, page(agencies(1..=12, Status::Approved), 30));
        assert_eq!(s.items().len(), 12);
        assert!(s.has_more());
        assert_eq!(s.total(), Some(30));

        let req = s.load_more().unwrap();
        assert_eq!(req.page, 2);
        s.apply(req.generation, 2, page(agencies(13..=24, Status::Approved), 30));
        assert_eq!(s.items().len(), 24);
        assert!(s.has_more());

        let req = s.load_more().unwrap();
        assert_eq!(req.page, 3);
        s.apply(req.generation, 3, page(agencies(25..=30, Status::Approved), 30));
        assert_eq!(s.items().len(), 30);
        assert!(!s.has_more());

        // exhausted sessions never request again
        assert_eq!(s.load_more(), None);
        assert_eq!(s.page(), 3);
    }

    #[test]
    fn test_scenario_b_search_resets_session() {
        let mut s = state();
        let req = s.start();
        s.apply(req.generation, 1, page(agencies(1..=12, Status::Approved), 30));
        let req = s.load_more().unwrap();
        s.apply(req.generation, 2, page(agencies(13..=24, Status::Approved), 30));
        assert_eq!(s.items().len(), 24);

        let req = s.set_search("tokyo").unwrap();
        assert!(s.items().is_empty());
        assert_eq!(s.page(), 1);
        assert!(s.has_more());
        assert_eq!(req.page, 1);
        assert_eq!(
            req.params.get("search"),
            Some(&crate::api::ParamValue::Str("tokyo".to_string()))
        );
    }

    #[test]
    fn test_same_search_is_noop() {
        let mut s = state();
        s.start();
        assert!(s.set_search("").is_none());
        assert!(s.set_search("osaka").is_some());
        assert!(s.set_search("osaka").is_none());
    }

    #[test]
    fn test_scenario_d_failure_keeps_accumulated() {
        let mut s = state();
        let req = s.start();
        s.apply(req.generation, 1, page(agencies(1..=12, Status::Approved), 30));
        let req = s.load_more().unwrap();
        s.apply(req.generation, 2, page(agencies(13..=24, Status::Approved), 30));

        let req = s.load_more().unwrap();
        let outcome = s.apply(
            req.generation,
            3,
            Err(FetchError::Network("offline".to_string())),
        );
        assert!(matches!(outcome, ApplyOutcome::Failed(_)));
        assert_eq!(s.items().len(), 24);
        assert!(s.has_more());
        assert!(s.error().is_some());
        assert_eq!(s.page(), 2);

        // no automatic retry; reload starts over
        assert_eq!(s.load_more(), None);
        let req = s.reload();
        assert_eq!(req.page, 1);
        assert!(s.error().is_none());
    }

    #[test]
    fn test_no_duplicate_concurrent_loads() {
        let mut s = state();
        let req = s.start();
        s.apply(req.generation, 1, page(agencies(1..=12, Status::Approved), 30));

        let first = s.load_more().unwrap();
        assert!(s.is_loading_more());
        assert_eq!(s.load_more(), None);
        assert_eq!(s.page(), first.page);
    }

    #[test]
    fn test_load_more_before_first_page_is_noop() {
        let mut s = state();
        s.start();
        assert_eq!(s.load_more(), None);
        assert!(s.is_initial_load());
    }

    #[test]
    fn test_stale_generation_discarded() {
        let mut s = state();
        let old = s.start();
        let new = s.set_search("kyoto").unwrap();

        let outcome = s.apply(old.generation, 1, page(agencies(1..=12, Status::Approved), 30));
        assert_eq!(outcome, ApplyOutcome::Stale);
        assert!(s.items().is_empty());
        assert!(s.is_loading_more());

        let outcome = s.apply(new.generation, 1, page(agencies(1..=3, Status::Approved), 3));
        assert_eq!(outcome, ApplyOutcome::Replaced { count: 3 });
        assert!(!s.has_more());
    }

    #[test]
    fn test_status_filter_applied_but_has_more_uses_raw_count() {
        let mut s = state();
        let req = s.start();
        let mut data = agencies(1..=10, Status::Approved);
        data.extend(agencies(11..=12, Status::Pending));

        let outcome = s.apply(req.generation, 1, page(data, 40));
        assert_eq!(outcome, ApplyOutcome::Replaced { count: 10 });
        assert_eq!(s.items().len(), 10);
        assert!(s.has_more());
    }

    #[test]
    fn test_page_one_replaces_and_later_pages_append_in_order() {
        let mut s: ListState<Agency> = ListState::new(2, None);
        let req = s.start();
        s.apply(req.generation, 1, page(agencies(1..=2, Status::Pending), 5));
        let req = s.load_more().unwrap();
        s.apply(req.generation, 2, page(agencies(3..=4, Status::Pending), 5));

        let ids: Vec<&str> = s.items().iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3", "4"]);

        let req = s.reload();
        s.apply(req.generation, 1, page(agencies(9..=10, Status::Pending), 5));
        let ids: Vec<&str> = s.items().iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["9", "10"]);
    }
}
