use crate::error::AppError;
use crate::metadata::ImagePage;
use crate::store::{normalize_search, GalleryEvent, GalleryState, Operation};
use crate::viewport::{SentinelObserver, ViewportGeometry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Bootstrap,
    Proximity,
    SearchChanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    FetchInFlight { request_id: u64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub id: u64,
    pub generation: u64,
    pub trigger: Trigger,
    pub cursor: Option<String>,
    pub limit: u32,
    pub search: Option<String>,
    pub first_page: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Settled {
    Applied {
        first_page: bool,
        added: usize,
        has_more: bool,
        restore_scroll: Option<f64>,
    },
    Failed {
        message: String,
        restore_scroll: Option<f64>,
    },
    /// Superseded by a newer search; the store was not touched.
    Discarded,
}

impl Settled {
    pub fn restore_scroll(&self) -> Option<f64> {
        match self {
            Settled::Applied { restore_scroll, .. } | Settled::Failed { restore_scroll, .. } => {
                *restore_scroll
            }
            Settled::Discarded => None,
        }
    }
}

#[derive(Debug)]
pub struct PaginationCoordinator {
    state: GalleryState,
    phase: Phase,
    generation: u64,
    next_request_id: u64,
    bootstrapped: bool,
    bootstrap_pending: bool,
    observer: SentinelObserver,
    page_size: u32,
    saved_scroll: Option<f64>,
    rearm_after_render: bool,
}

impl PaginationCoordinator {
    pub fn new(page_size: u32, proximity_margin: f64) -> Self {
        Self {
            state: GalleryState::new(),
            phase: Phase::Idle,
            generation: 0,
            next_request_id: 1,
            bootstrapped: false,
            bootstrap_pending: false,
            observer: SentinelObserver::new(proximity_margin),
            page_size: page_size.max(1),
            saved_scroll: None,
            rearm_after_render: false,
        }
    }

    pub fn state(&self) -> &GalleryState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_idle(&self) -> bool {
        self.phase == Phase::Idle
    }

    pub fn sentinel_armed(&self) -> bool {
        self.observer.is_watching() && self.can_load_more()
    }

    fn can_load_more(&self) -> bool {
        self.is_idle() && self.state.has_more && !self.state.loading
    }

    pub fn bootstrap(&mut self) -> Option<FetchRequest> {
        if self.bootstrapped {
            log::debug!("Bootstrap ignored: already bootstrapped");
            return None;
        }
        if !self.state.images.is_empty() {
            self.bootstrapped = true;
            self.bootstrap_pending = false;
            log::debug!("Bootstrap skipped: {} images already loaded", self.state.images.len());
            return None;
        }
        if self.state.loading || !self.is_idle() {
            log::debug!("Bootstrap deferred: a request is outstanding");
            self.bootstrap_pending = true;
            return None;
        }

        self.bootstrap_pending = false;
        self.bootstrapped = true;
        Some(self.issue(Trigger::Bootstrap, true))
    }

    /// Runs a bootstrap that was deferred because another request was
    /// outstanding at mount time.
    pub fn resume_bootstrap(&mut self) -> Option<FetchRequest> {
        if !self.bootstrap_pending || self.state.loading || !self.is_idle() {
            return None;
        }
        log::debug!("Resuming deferred bootstrap");
        self.bootstrap()
    }

    pub fn sentinel_check(&mut self, geometry: ViewportGeometry) -> Option<FetchRequest> {
        if !self.sentinel_armed() {
            log::trace!(
                "Sentinel not armed (watching: {}, has_more: {}, loading: {}, phase: {:?})",
                self.observer.is_watching(),
                self.state.has_more,
                self.state.loading,
                self.phase
            );
            return None;
        }

        self.observer.evaluate(geometry)?;
        self.load_more(geometry.scroll_offset)
    }

    /// `scroll_offset` is restored once the page has been merged.
    pub fn load_more(&mut self, scroll_offset: f64) -> Option<FetchRequest> {
        if !self.can_load_more() {
            log::debug!(
                "Load more ignored (has_more: {}, loading: {}, phase: {:?})",
                self.state.has_more,
                self.state.loading,
                self.phase
            );
            return None;
        }

        self.observer.unobserve();
        // With no cursor there is nothing to continue from; start over.
        let first_page = self.state.next_cursor.is_none();
        if !first_page {
            self.saved_scroll = Some(scroll_offset);
        }
        Some(self.issue(Trigger::Proximity, first_page))
    }

    /// Supersedes whatever is in flight.
    pub fn search_changed(&mut self, term: Option<String>) -> Option<FetchRequest> {
        let term = normalize_search(term);
        if term == self.state.search_query && self.bootstrapped {
            log::debug!("Search term unchanged ({:?}); nothing to do", term);
            return None;
        }

        log::info!("Search changed from {:?} to {:?}", self.state.search_query, term);
        self.state.apply(GalleryEvent::SearchChanged(term));
        self.state.apply(GalleryEvent::Reset);
        self.generation += 1;
        self.bootstrapped = true;
        self.bootstrap_pending = false;
        self.saved_scroll = None;
        self.rearm_after_render = false;
        self.observer.unobserve();

        if let Phase::FetchInFlight { request_id } = self.phase {
            log::debug!("Request {} superseded by new search", request_id);
        }
        Some(self.issue(Trigger::SearchChanged, true))
    }

    fn issue(&mut self, trigger: Trigger, first_page: bool) -> FetchRequest {
        let id = self.next_request_id;
        self.next_request_id += 1;
        self.phase = Phase::FetchInFlight { request_id: id };
        self.state.apply(GalleryEvent::FetchStarted);

        let request = FetchRequest {
            id,
            generation: self.generation,
            trigger,
            cursor: if first_page { None } else { self.state.next_cursor.clone() },
            limit: self.page_size,
            search: self.state.search_query.clone(),
            first_page,
        };
        log::debug!(
            "Issuing fetch {} ({:?}, cursor: {:?}, search: {:?}, generation: {})",
            request.id,
            request.trigger,
            request.cursor,
            request.search,
            request.generation
        );
        request
    }

    pub fn complete(
        &mut self,
        request: &FetchRequest,
        result: Result<ImagePage, AppError>,
    ) -> Settled {
        let current = self.phase == Phase::FetchInFlight { request_id: request.id };
        if !current || request.generation != self.generation {
            log::warn!(
                "Discarding response to fetch {} (generation {}, current {}, phase {:?})",
                request.id,
                request.generation,
                self.generation,
                self.phase
            );
            return Settled::Discarded;
        }

        self.phase = Phase::Idle;
        let restore_scroll = if request.first_page {
            None
        } else {
            self.saved_scroll.take()
        };

        let settled = match result {
            Ok(page) => {
                let before = if request.first_page { 0 } else { self.state.images.len() };
                self.state.apply(GalleryEvent::FetchSucceeded {
                    page,
                    first_page: request.first_page,
                });
                let added = self.state.images.len().saturating_sub(before);
                log::debug!(
                    "Fetch {} merged {} images (total {}, has_more: {})",
                    request.id,
                    added,
                    self.state.images.len(),
                    self.state.has_more
                );
                Settled::Applied {
                    first_page: request.first_page,
                    added,
                    has_more: self.state.has_more,
                    restore_scroll,
                }
            }
            Err(e) => {
                let message = Operation::Fetch.describe_failure(&e.to_string());
                log::warn!("Fetch {} failed: {}", request.id, message);
                self.state.apply(GalleryEvent::FetchFailed(message.clone()));
                Settled::Failed {
                    message,
                    restore_scroll,
                }
            }
        };

        self.rearm_after_render = self.state.has_more;
        if !self.state.has_more {
            log::info!("All pages loaded for search {:?}", self.state.search_query);
        }
        settled
    }

    /// Whether `request` is the most recent one issued. Older requests must
    /// not restore their saved scroll offset over a newer one's.
    pub fn is_latest(&self, request: &FetchRequest) -> bool {
        request.id + 1 == self.next_request_id
    }

    pub fn render_complete(&mut self) {
        if self.rearm_after_render && self.state.has_more && self.is_idle() {
            self.observer.observe();
            self.rearm_after_render = false;
        }
    }

    pub fn begin_operation(&mut self, operation: Operation) {
        log::debug!("{:?} started", operation);
        self.state.apply(GalleryEvent::FetchStarted);
    }

    pub fn apply(&mut self, event: GalleryEvent) {
        self.state.apply(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::image;

    fn page(keys: &[&str], next_cursor: Option<&str>, has_more: bool) -> ImagePage {
        ImagePage {
            images: keys.iter().map(|k| image(k)).collect(),
            next_cursor: next_cursor.map(|c| c.to_string()),
            has_more,
        }
    }

    fn near_sentinel() -> ViewportGeometry {
        ViewportGeometry {
            scroll_offset: 480.0,
            viewport_height: 600.0,
            sentinel_top: 1200.0,
        }
    }

    fn far_sentinel() -> ViewportGeometry {
        ViewportGeometry {
            scroll_offset: 0.0,
            viewport_height: 600.0,
            sentinel_top: 5000.0,
        }
    }

    fn bootstrapped(first: ImagePage) -> PaginationCoordinator {
        let mut coordinator = PaginationCoordinator::new(12, 200.0);
        let request = coordinator.bootstrap().unwrap();
        coordinator.complete(&request, Ok(first));
        coordinator.render_complete();
        coordinator
    }

    #[test]
    fn bootstrap_requests_first_page_once() {
        let mut coordinator = PaginationCoordinator::new(12, 200.0);
        let request = coordinator.bootstrap().unwrap();
        assert_eq!(request.trigger, Trigger::Bootstrap);
        assert!(request.first_page);
        assert_eq!(request.cursor, None);
        assert_eq!(request.limit, 12);
        assert!(coordinator.state().loading);

        assert_eq!(coordinator.bootstrap(), None);
    }

    #[test]
    fn bootstrap_page_populates_state() {
        let coordinator = bootstrapped(page(&["img1", "img2"], Some("c1"), true));
        let state = coordinator.state();
        assert_eq!(state.images.len(), 2);
        assert_eq!(state.next_cursor.as_deref(), Some("c1"));
        assert!(state.has_more);
        assert!(!state.loading);
        assert!(coordinator.is_idle());
    }

    #[test]
    fn sentinel_out_of_range_does_nothing() {
        let mut coordinator = bootstrapped(page(&["img1"], Some("c1"), true));
        assert_eq!(coordinator.sentinel_check(far_sentinel()), None);
        assert!(coordinator.sentinel_armed());
    }

    #[test]
    fn repeated_triggers_while_in_flight_are_ignored() {
        let mut coordinator = bootstrapped(page(&["img1"], Some("c1"), true));
        let first = coordinator.sentinel_check(near_sentinel()).unwrap();
        assert_eq!(first.cursor.as_deref(), Some("c1"));

        for _ in 0..5 {
            assert_eq!(coordinator.sentinel_check(near_sentinel()), None);
            assert_eq!(coordinator.load_more(0.0), None);
        }
        assert_eq!(coordinator.phase(), Phase::FetchInFlight { request_id: first.id });
    }

    #[test]
    fn next_request_uses_cursor_from_previous_response() {
        let mut coordinator = bootstrapped(page(&["img1"], Some("c1"), true));
        let second = coordinator.load_more(0.0).unwrap();
        coordinator.complete(&second, Ok(page(&["img2"], Some("opaque/c2"), true)));
        coordinator.render_complete();

        let third = coordinator.load_more(0.0).unwrap();
        assert_eq!(third.cursor.as_deref(), Some("opaque/c2"));
    }

    #[test]
    fn last_page_stops_further_fetches() {
        let mut coordinator = bootstrapped(page(&["img1", "img2"], Some("c1"), true));
        let request = coordinator.sentinel_check(near_sentinel()).unwrap();
        coordinator.complete(&request, Ok(page(&["img3"], None, false)));
        coordinator.render_complete();

        let keys: Vec<&str> = coordinator.state().images.iter().map(|i| i.key()).collect();
        assert_eq!(keys, vec!["img1", "img2", "img3"]);
        assert!(!coordinator.state().has_more);
        assert!(!coordinator.sentinel_armed());
        for _ in 0..3 {
            assert_eq!(coordinator.sentinel_check(near_sentinel()), None);
        }
        assert_eq!(coordinator.load_more(0.0), None);
    }

    #[test]
    fn observer_waits_for_render_before_rearming() {
        let mut coordinator = bootstrapped(page(&["img1"], Some("c1"), true));
        let request = coordinator.sentinel_check(near_sentinel()).unwrap();
        coordinator.complete(&request, Ok(page(&["img2"], Some("c2"), true)));

        assert_eq!(coordinator.sentinel_check(near_sentinel()), None);
        coordinator.render_complete();
        assert!(coordinator.sentinel_check(near_sentinel()).is_some());
    }

    #[test]
    fn scroll_offset_is_restored_for_later_pages_only() {
        let mut coordinator = PaginationCoordinator::new(12, 200.0);
        let first = coordinator.bootstrap().unwrap();
        let settled = coordinator.complete(&first, Ok(page(&["img1"], Some("c1"), true)));
        assert_eq!(settled.restore_scroll(), None);
        coordinator.render_complete();

        let second = coordinator.sentinel_check(near_sentinel()).unwrap();
        let settled = coordinator.complete(&second, Ok(page(&["img2"], Some("c2"), true)));
        assert_eq!(settled.restore_scroll(), Some(480.0));
    }

    #[test]
    fn failure_records_error_and_allows_retry() {
        let mut coordinator = bootstrapped(page(&["img1"], Some("c1"), true));
        let request = coordinator.load_more(10.0).unwrap();
        let settled = coordinator.complete(&request, Err(AppError::Request("timeout".into())));

        assert_eq!(
            settled,
            Settled::Failed {
                message: "timeout".into(),
                restore_scroll: Some(10.0)
            }
        );
        assert_eq!(coordinator.state().error.as_deref(), Some("timeout"));
        assert!(!coordinator.state().loading);

        coordinator.render_complete();
        let retry = coordinator.sentinel_check(near_sentinel()).unwrap();
        assert_eq!(retry.cursor.as_deref(), Some("c1"));
    }

    #[test]
    fn search_change_resets_before_first_page_resolves() {
        let mut coordinator = bootstrapped(page(&["img1"], Some("c1"), true));
        let request = coordinator.search_changed(Some("cat".into())).unwrap();

        assert_eq!(request.trigger, Trigger::SearchChanged);
        assert!(request.first_page);
        assert_eq!(request.cursor, None);
        assert_eq!(request.search.as_deref(), Some("cat"));

        let state = coordinator.state();
        assert!(state.images.is_empty());
        assert!(state.has_more);
        assert_eq!(state.next_cursor, None);
        assert_eq!(state.search_query.as_deref(), Some("cat"));
    }

    #[test]
    fn unchanged_search_term_is_ignored() {
        let mut coordinator = bootstrapped(page(&["img1"], Some("c1"), true));
        assert!(coordinator.search_changed(Some("cat".into())).is_some());
        assert_eq!(coordinator.search_changed(Some(" cat ".into())), None);
    }

    #[test]
    fn stale_response_from_previous_search_is_discarded() {
        let mut coordinator = PaginationCoordinator::new(12, 200.0);
        let stale = coordinator.bootstrap().unwrap();
        let fresh = coordinator.search_changed(Some("sunset".into())).unwrap();
        assert_ne!(stale.generation, fresh.generation);

        let settled = coordinator.complete(&fresh, Ok(page(&["s1"], Some("s-c1"), true)));
        assert!(matches!(settled, Settled::Applied { added: 1, .. }));

        let settled = coordinator.complete(&stale, Ok(page(&["old1", "old2"], Some("c1"), true)));
        assert_eq!(settled, Settled::Discarded);

        let keys: Vec<&str> = coordinator.state().images.iter().map(|i| i.key()).collect();
        assert_eq!(keys, vec!["s1"]);
        assert_eq!(coordinator.state().next_cursor.as_deref(), Some("s-c1"));
    }

    #[test]
    fn stale_response_arriving_first_does_not_clear_guard() {
        let mut coordinator = PaginationCoordinator::new(12, 200.0);
        let stale = coordinator.bootstrap().unwrap();
        let fresh = coordinator.search_changed(Some("sunset".into())).unwrap();

        assert_eq!(coordinator.complete(&stale, Ok(page(&["old"], None, false))), Settled::Discarded);
        assert_eq!(coordinator.phase(), Phase::FetchInFlight { request_id: fresh.id });
        assert!(coordinator.state().loading);
        assert_eq!(coordinator.load_more(0.0), None);
    }

    #[test]
    fn bootstrap_deferred_by_failed_upload_runs_once_it_settles() {
        let mut coordinator = PaginationCoordinator::new(12, 200.0);
        coordinator.begin_operation(Operation::Upload);
        assert_eq!(coordinator.bootstrap(), None);
        assert_eq!(coordinator.resume_bootstrap(), None);

        coordinator.apply(GalleryEvent::FetchFailed("upload rejected".into()));
        let request = coordinator.resume_bootstrap().unwrap();
        assert_eq!(request.trigger, Trigger::Bootstrap);
        assert!(request.first_page);
        assert_eq!(request.cursor, None);
        assert_eq!(coordinator.resume_bootstrap(), None);
    }

    #[test]
    fn deferred_bootstrap_is_dropped_when_upload_fills_the_gallery() {
        let mut coordinator = PaginationCoordinator::new(12, 200.0);
        coordinator.begin_operation(Operation::Upload);
        assert_eq!(coordinator.bootstrap(), None);

        coordinator.apply(GalleryEvent::UploadSucceeded(image("img1")));
        assert_eq!(coordinator.resume_bootstrap(), None);
        assert_eq!(coordinator.bootstrap(), None);
    }

    #[test]
    fn resume_without_deferral_does_nothing() {
        let mut coordinator = PaginationCoordinator::new(12, 200.0);
        assert_eq!(coordinator.resume_bootstrap(), None);
        assert!(coordinator.bootstrap().is_some());
    }

    #[test]
    fn only_the_newest_request_is_latest() {
        let mut coordinator = bootstrapped(page(&["img1"], Some("c1"), true));
        let older = coordinator.load_more(100.0).unwrap();
        assert!(coordinator.is_latest(&older));
        coordinator.complete(&older, Ok(page(&["img2"], Some("c2"), true)));

        let newer = coordinator.load_more(700.0).unwrap();
        assert!(!coordinator.is_latest(&older));
        assert!(coordinator.is_latest(&newer));
    }

    #[test]
    fn operations_block_proximity_until_they_settle() {
        let mut coordinator = bootstrapped(page(&["img1"], Some("c1"), true));
        coordinator.begin_operation(Operation::Upload);
        assert_eq!(coordinator.sentinel_check(near_sentinel()), None);

        coordinator.apply(GalleryEvent::UploadSucceeded(image("img9")));
        assert!(coordinator.sentinel_check(near_sentinel()).is_some());
    }
}
