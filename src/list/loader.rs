//! Incremental loading driven by sentinel visibility.
//!
//! Idle -> (sentinel visible, more pages, nothing fetching) -> Loading ->
//! (page resolves) -> Settling -> (settle delay elapsed) -> Idle. Once the
//! last page arrives the loader is Exhausted until the session resets.

use std::time::Duration;
use tokio::time::Instant;

use super::state::{ApplyOutcome, ListState, PageRequest};
use crate::records::Record;

/// Vertical extent of an element or viewport, in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub top: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(top: f64, height: f64) -> Self {
        Self { top, height }
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }
}

/// Visibility test for the sentinel below the last list item.
#[derive(Debug, Clone, Copy)]
pub struct Sentinel {
    /// Viewport is grown by this much on both edges
    pub margin: f64,
    /// Fraction of the sentinel that must be inside the grown viewport
    pub threshold: f64,
}

impl Sentinel {
    pub fn new(margin: f64, threshold: f64) -> Self {
        Self {
            margin,
            threshold: threshold.clamp(0.0, 1.0),
        }
    }

    pub fn is_visible(&self, viewport: Rect, element: Rect) -> bool {
        let top = viewport.top - self.margin;
        let bottom = viewport.bottom() + self.margin;

        if element.height <= 0.0 {
            return element.top >= top && element.top <= bottom;
        }

        let overlap = element.bottom().min(bottom) - element.top.max(top);
        if overlap < 0.0 {
            return false;
        }
        if self.threshold == 0.0 {
            return true;
        }
        overlap > 0.0 && overlap / element.height >= self.threshold
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderPhase {
    Idle,
    Loading { page: u32 },
    Settling { until: Instant },
    Exhausted,
}

/// What the view shows below the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderIndicator {
    Hidden,
    LoadingMore,
    EndOfResults,
}

#[derive(Debug, Clone)]
pub struct IncrementalLoader {
    phase: LoaderPhase,
    settle_delay: Duration,
}

impl IncrementalLoader {
    pub fn new(settle_delay: Duration) -> Self {
        Self {
            phase: LoaderPhase::Idle,
            settle_delay,
        }
    }

    #[cfg(test)]
    pub fn phase(&self) -> LoaderPhase {
        self.phase
    }

    /// Back to Idle for a new filter session.
    pub fn reset(&mut self) {
        self.phase = LoaderPhase::Idle;
    }

    /// Leave Settling once its deadline has passed.
    pub fn tick(&mut self, now: Instant) {
        if let LoaderPhase::Settling { until } = self.phase
            && now >= until
        {
            self.phase = LoaderPhase::Idle;
        }
    }

    /// When the current settling period ends, if settling.
    pub fn settle_deadline(&self) -> Option<Instant> {
        match self.phase {
            LoaderPhase::Settling { until } => Some(until),
            _ => None,
        }
    }

    /// React to a sentinel visibility signal. Returns the next-page request
    /// when a load starts.
    pub fn on_sentinel<R: Record>(
        &mut self,
        visible: bool,
        state: &mut ListState<R>,
        fetching: bool,
        now: Instant,
    ) -> Option<PageRequest> {
        self.tick(now);

        if !state.has_more() {
            self.phase = LoaderPhase::Exhausted;
            return None;
        }
        if !visible || fetching || self.phase != LoaderPhase::Idle {
            return None;
        }

        let request = state.load_more()?;
        tracing::debug!("Sentinel visible, loading page {}", request.page);
        self.phase = LoaderPhase::Loading { page: request.page };
        Some(request)
    }

    /// A fetch owned by the list resolved and was applied with `outcome`.
    pub fn on_resolved(&mut self, outcome: &ApplyOutcome, has_more: bool, now: Instant) {
        if matches!(outcome, ApplyOutcome::Stale) {
            return;
        }
        if matches!(outcome, ApplyOutcome::Failed(_)) {
            self.phase = LoaderPhase::Idle;
            return;
        }
        if !has_more {
            self.phase = LoaderPhase::Exhausted;
            return;
        }
        if matches!(self.phase, LoaderPhase::Loading { .. }) {
            self.phase = if self.settle_delay.is_zero() {
                LoaderPhase::Idle
            } else {
                LoaderPhase::Settling {
                    until: now + self.settle_delay,
                }
            };
        }
    }

    pub fn indicator(&self) -> LoaderIndicator {
        match self.phase {
            LoaderPhase::Idle => LoaderIndicator::Hidden,
            LoaderPhase::Loading { .. } | LoaderPhase::Settling { .. } => {
                LoaderIndicator::LoadingMore
            }
            LoaderPhase::Exhausted => LoaderIndicator::EndOfResults,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{FetchError, Page, PageMeta};
    use crate::records::{Agency, Status};
    use std::sync::Arc;

    fn full_page(start: usize, len: usize) -> Result<Arc<Page<Agency>>, FetchError> {
        let data = (start..start + len)
            .map(|i| Agency {
                id: i.to_string(),
                status: Status::Approved,
                ..Default::default()
            })
            .collect();
        Ok(Arc::new(Page {
            data,
            meta: PageMeta { total: 100 },
        }))
    }

    fn loaded_state() -> ListState<Agency> {
        let mut state = ListState::new(12, None);
        let req = state.start();
        state.apply(req.generation, 1, full_page(0, 12));
        state
    }

    #[test]
    fn test_sentinel_margin_triggers_early() {
        let sentinel = Sentinel::new(100.0, 0.1);
        let viewport = Rect::new(0.0, 600.0);

        // 50px below the fold, inside the 100px margin
        assert!(sentinel.is_visible(viewport, Rect::new(650.0, 20.0)));
        // 150px below the fold
        assert!(!sentinel.is_visible(viewport, Rect::new(750.0, 20.0)));
    }

    #[test]
    fn test_sentinel_threshold() {
        let sentinel = Sentinel::new(0.0, 0.5);
        let viewport = Rect::new(0.0, 100.0);
        // 40% inside
        assert!(!sentinel.is_visible(viewport, Rect::new(96.0, 10.0)));
        // 60% inside
        assert!(sentinel.is_visible(viewport, Rect::new(94.0, 10.0)));
        // entirely below
        assert!(!sentinel.is_visible(viewport, Rect::new(120.0, 10.0)));
    }

    #[test]
    fn test_zero_height_sentinel() {
        let sentinel = Sentinel::new(100.0, 0.1);
        let viewport = Rect::new(0.0, 600.0);
        assert!(sentinel.is_visible(viewport, Rect::new(700.0, 0.0)));
        assert!(!sentinel.is_visible(viewport, Rect::new(701.0, 0.0)));
    }

    #[test]
    fn test_visible_sentinel_starts_one_load() {
        let mut state = loaded_state();
        let mut loader = IncrementalLoader::new(Duration::ZERO);
        let now = Instant::now();

        let req = loader.on_sentinel(true, &mut state, false, now).unwrap();
        assert_eq!(req.page, 2);
        assert_eq!(loader.phase(), LoaderPhase::Loading { page: 2 });
        assert_eq!(loader.indicator(), LoaderIndicator::LoadingMore);

        // re-trigger while loading does nothing
        assert!(loader.on_sentinel(true, &mut state, false, now).is_none());
        assert_eq!(state.page(), 2);
    }

    #[test]
    fn test_query_fetching_blocks_trigger() {
        let mut state = loaded_state();
        let mut loader = IncrementalLoader::new(Duration::ZERO);

        assert!(
            loader
                .on_sentinel(true, &mut state, true, Instant::now())
                .is_none()
        );
        assert_eq!(state.page(), 1);
        assert_eq!(loader.phase(), LoaderPhase::Idle);
    }

    #[test]
    fn test_hidden_sentinel_does_nothing() {
        let mut state = loaded_state();
        let mut loader = IncrementalLoader::new(Duration::ZERO);
        assert!(
            loader
                .on_sentinel(false, &mut state, false, Instant::now())
                .is_none()
        );
    }

    #[test]
    fn test_settling_holds_indicator_then_idles() {
        let mut state = loaded_state();
        let mut loader = IncrementalLoader::new(Duration::from_secs(2));
        let start = Instant::now();

        let req = loader.on_sentinel(true, &mut state, false, start).unwrap();
        let outcome = state.apply(req.generation, req.page, full_page(12, 12));
        loader.on_resolved(&outcome, state.has_more(), start);

        assert_eq!(loader.indicator(), LoaderIndicator::LoadingMore);
        assert_eq!(loader.settle_deadline(), Some(start + Duration::from_secs(2)));
        assert!(
            loader
                .on_sentinel(true, &mut state, false, start + Duration::from_secs(1))
                .is_none()
        );

        let later = start + Duration::from_secs(2);
        let req = loader.on_sentinel(true, &mut state, false, later).unwrap();
        assert_eq!(req.page, 3);
    }

    #[test]
    fn test_short_page_exhausts() {
        let mut state = loaded_state();
        let mut loader = IncrementalLoader::new(Duration::from_secs(2));
        let now = Instant::now();

        let req = loader.on_sentinel(true, &mut state, false, now).unwrap();
        let outcome = state.apply(req.generation, req.page, full_page(12, 5));
        loader.on_resolved(&outcome, state.has_more(), now);

        assert_eq!(loader.phase(), LoaderPhase::Exhausted);
        assert_eq!(loader.indicator(), LoaderIndicator::EndOfResults);
        assert!(loader.on_sentinel(true, &mut state, false, now).is_none());
    }

    #[test]
    fn test_failure_returns_to_idle_without_retry() {
        let mut state = loaded_state();
        let mut loader = IncrementalLoader::new(Duration::ZERO);
        let now = Instant::now();

        let req = loader.on_sentinel(true, &mut state, false, now).unwrap();
        let outcome = state.apply(
            req.generation,
            req.page,
            Err(FetchError::Network("down".to_string())),
        );
        loader.on_resolved(&outcome, state.has_more(), now);

        assert_eq!(loader.phase(), LoaderPhase::Idle);
        assert!(loader.on_sentinel(true, &mut state, false, now).is_none());
        assert_eq!(state.items().len(), 12);
    }
}
