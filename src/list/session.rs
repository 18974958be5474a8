//! List session driver
//!
//! Ties a [`ListState`] and an [`IncrementalLoader`] to a [`QueryClient`].
//! Page fetches run as spawned tasks and report back over a channel; the
//! session applies each result in arrival order, so late responses from an
//! abandoned search are discarded by their generation tag.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::loader::{IncrementalLoader, LoaderIndicator, Rect, Sentinel};
use super::projector::{SortKey, project};
use super::state::{ApplyOutcome, ListState, PageRequest};
use crate::api::{FetchError, Page, PageSource, QueryParams};
use crate::config::ListConfig;
use crate::constants::{ROW_HEIGHT_PX, SESSION_EVENT_CAPACITY};
use crate::query::{QueryClient, QueryState};
use crate::records::Record;

/// Events sent by fetch tasks back to the session
#[derive(Debug)]
pub enum SessionEvent<R> {
    PageLoaded {
        generation: u64,
        page: u32,
        result: Result<Arc<Page<R>>, FetchError>,
    },
}

/// What the view should render right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewStatus {
    /// First page of the session not there yet
    Loading,
    /// Last fetch failed; records loaded so far stay visible
    Failed(FetchError),
    /// Nothing matched
    Empty,
    Ready(LoaderIndicator),
}

pub struct ListSession<S, R> {
    client: QueryClient<S, R>,
    state: ListState<R>,
    loader: IncrementalLoader,
    sentinel: Sentinel,
    sort: SortKey,
    event_tx: mpsc::Sender<SessionEvent<R>>,
    event_rx: mpsc::Receiver<SessionEvent<R>>,
    /// Spawned fetches whose result has not been received yet
    pending: usize,
    /// Parameters of the most recently dispatched fetch
    last_request: Option<QueryParams>,
}

impl<S: PageSource, R: Record> ListSession<S, R> {
    pub fn new(client: QueryClient<S, R>, config: &ListConfig) -> Self {
        let (event_tx, event_rx) = mpsc::channel(SESSION_EVENT_CAPACITY);
        Self {
            client,
            state: ListState::new(config.page_size, R::RESOURCE.listing_status()),
            loader: IncrementalLoader::new(config.settle_delay()),
            sentinel: Sentinel::new(config.sentinel_margin_px, config.sentinel_threshold),
            sort: SortKey::default(),
            event_tx,
            event_rx,
            pending: 0,
            last_request: None,
        }
    }

    pub fn state(&self) -> &ListState<R> {
        &self.state
    }

    #[cfg(test)]
    pub fn loader(&self) -> &IncrementalLoader {
        &self.loader
    }

    fn dispatch(&mut self, request: PageRequest) {
        let client = self.client.clone();
        let tx = self.event_tx.clone();
        self.pending += 1;
        self.last_request = Some(request.params.clone());

        tokio::spawn(async move {
            let PageRequest {
                generation,
                page,
                params,
            } = request;
            let result = client.fetch(&params).await;
            let event = SessionEvent::PageLoaded {
                generation,
                page,
                result,
            };
            if tx.send(event).await.is_err() {
                tracing::warn!("List session: event receiver dropped");
            }
        });
    }

    /// Load page 1 of the current search term.
    pub fn start(&mut self) {
        self.loader.reset();
        let request = self.state.start();
        self.dispatch(request);
    }

    /// Switch to a new search term. Accumulated records are cleared at once.
    pub fn set_search(&mut self, search: &str) {
        if let Some(request) = self.state.set_search(search) {
            self.loader.reset();
            self.dispatch(request);
        }
    }

    /// Start over with the same search term, clearing any error. Cached
    /// pages are dropped so every page is fetched again.
    pub fn reload(&mut self) {
        self.client.invalidate_all();
        self.loader.reset();
        let request = self.state.reload();
        self.dispatch(request);
    }

    /// Re-order the view. Never touches the network.
    pub fn set_sort(&mut self, sort: SortKey) {
        self.sort = sort;
    }

    /// Feed a sentinel visibility signal. Returns true when a page load started.
    pub fn on_sentinel(&mut self, visible: bool) -> bool {
        let fetching = self.client.is_fetching(&self.state.current_params());
        match self
            .loader
            .on_sentinel(visible, &mut self.state, fetching, Instant::now())
        {
            Some(request) => {
                self.dispatch(request);
                true
            }
            None => false,
        }
    }

    /// Where the sentinel sits: one row below the last loaded record.
    pub fn sentinel_rect(&self) -> Rect {
        Rect::new(self.state.items().len() as f64 * ROW_HEIGHT_PX, ROW_HEIGHT_PX)
    }

    /// The viewport moved; test the sentinel against it.
    pub fn scroll_to(&mut self, viewport: Rect) -> bool {
        let visible = self.sentinel.is_visible(viewport, self.sentinel_rect());
        self.on_sentinel(visible)
    }

    /// Wait for the next fetch result and apply it. Returns `None` when no
    /// fetch is outstanding.
    pub async fn next_event(&mut self) -> Option<ApplyOutcome> {
        if self.pending == 0 {
            return None;
        }
        let SessionEvent::PageLoaded {
            generation,
            page,
            result,
        } = self.event_rx.recv().await?;
        self.pending -= 1;

        let outcome = self.state.apply(generation, page, result);
        self.loader
            .on_resolved(&outcome, self.state.has_more(), Instant::now());
        Some(outcome)
    }

    /// Drain outstanding fetches, returning the outcome of the last one that
    /// belonged to the current session.
    pub async fn settle_fetches(&mut self) -> Option<ApplyOutcome> {
        let mut last = None;
        while let Some(outcome) = self.next_event().await {
            if outcome != ApplyOutcome::Stale {
                last = Some(outcome);
            }
        }
        last
    }

    /// Sleep out the loader's settle period, if one is running.
    pub async fn wait_settled(&mut self) {
        if let Some(deadline) = self.loader.settle_deadline() {
            tokio::time::sleep_until(deadline).await;
        }
        self.loader.tick(Instant::now());
    }

    /// Query state of the most recently requested page.
    pub async fn query_state(&self) -> Option<QueryState<R>> {
        let params = self.last_request.as_ref()?;
        Some(self.client.state(params).await)
    }

    /// Records in display order.
    pub fn view(&self) -> Vec<&R> {
        project(self.state.items(), self.sort)
    }

    pub fn status(&self) -> ViewStatus {
        if let Some(e) = self.state.error() {
            return ViewStatus::Failed(e.clone());
        }
        if self.state.is_initial_load() {
            return ViewStatus::Loading;
        }
        if self.state.items().is_empty() {
            return ViewStatus::Empty;
        }
        ViewStatus::Ready(self.loader.indicator())
    }
}
