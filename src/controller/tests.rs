//! Tests for the pagination controller

use super::*;
use crate::config::ObserverOverrides;
use crate::error::{Error, Result};
use crate::fetch::PageFetcher;
use crate::types::{Cursor, PageResult, QueryKey};
use crate::visibility::{ManualWatcher, TargetId};
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, Semaphore};

// ============================================================================
// Fixtures
// ============================================================================

#[derive(Default)]
struct MockState {
    catalog: Vec<Vec<String>>,
    calls: Mutex<Vec<(Cursor, QueryKey)>>,
    failures: Mutex<HashSet<Cursor>>,
    renumber: Mutex<Option<Cursor>>,
    gate: Option<Semaphore>,
    live: AtomicUsize,
}

/// Counts a fetch as live until its future completes or is dropped
struct LiveGuard<'a>(&'a AtomicUsize);

impl<'a> LiveGuard<'a> {
    fn enter(live: &'a AtomicUsize) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self(live)
    }
}

impl Drop for LiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Serves pages from a fixed catalog; the last catalog entry is the last page
#[derive(Clone)]
struct MockFetcher {
    state: Arc<MockState>,
}

impl MockFetcher {
    fn new(catalog: &[&[&str]]) -> Self {
        Self::build(catalog, None)
    }

    /// Every fetch waits for a permit from `release`
    fn gated(catalog: &[&[&str]]) -> Self {
        Self::build(catalog, Some(Semaphore::new(0)))
    }

    fn build(catalog: &[&[&str]], gate: Option<Semaphore>) -> Self {
        let catalog = catalog
            .iter()
            .map(|page| page.iter().map(|s| (*s).to_string()).collect())
            .collect();
        Self {
            state: Arc::new(MockState {
                catalog,
                gate,
                ..Default::default()
            }),
        }
    }

    fn release(&self, permits: usize) {
        if let Some(gate) = &self.state.gate {
            gate.add_permits(permits);
        }
    }

    fn fail_once(&self, cursor: Cursor) {
        self.state.failures.lock().unwrap().insert(cursor);
    }

    fn renumber_next(&self, number: Cursor) {
        *self.state.renumber.lock().unwrap() = Some(number);
    }

    fn calls(&self) -> Vec<Cursor> {
        self.state.calls.lock().unwrap().iter().map(|c| c.0).collect()
    }

    /// Fetches currently running
    fn live(&self) -> usize {
        self.state.live.load(Ordering::SeqCst)
    }

    fn queries(&self) -> Vec<QueryKey> {
        self.state
            .calls
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.1.clone())
            .collect()
    }
}

#[async_trait]
impl PageFetcher<String> for MockFetcher {
    async fn fetch(&self, cursor: Cursor, query: &QueryKey) -> Result<PageResult<String>> {
        self.state
            .calls
            .lock()
            .unwrap()
            .push((cursor, query.clone()));
        let _live = LiveGuard::enter(&self.state.live);

        if let Some(gate) = &self.state.gate {
            gate.acquire().await.unwrap().forget();
        }

        if self.state.failures.lock().unwrap().remove(&cursor) {
            return Err(Error::http_status(503, "unavailable"));
        }

        let items = self
            .state
            .catalog
            .get(cursor as usize)
            .cloned()
            .ok_or_else(|| Error::http_status(404, "no such page"))?;
        let number = self.state.renumber.lock().unwrap().take().unwrap_or(cursor);
        let is_last = cursor as usize + 1 == self.state.catalog.len();

        Ok(PageResult::new(number, items, is_last))
    }
}

const TWO_PAGES: &[&[&str]] = &[&["a", "b"], &["c"]];
const FOUR_PAGES: &[&[&str]] = &[&["a"], &["b"], &["c"], &["d"]];

fn products() -> QueryKey {
    QueryKey::new("products").with_variables([3])
}

fn sentinel() -> TargetId {
    TargetId::new("sentinel")
}

fn pager(fetcher: &MockFetcher, watcher: &ManualWatcher) -> PaginationController<String> {
    PaginationController::<String>::new(
        products(),
        Arc::new(fetcher.clone()),
        Arc::new(watcher.clone()),
    )
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

/// Yield until `cond` holds
async fn wait_until(cond: impl Fn() -> bool) {
    for _ in 0..1000 {
        if cond() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}

/// Let spawned tasks run for a while
async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

async fn next_event(rx: &mut broadcast::Receiver<PagerEvent>) -> PagerEvent {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

// ============================================================================
// Visibility Signal Tests
// ============================================================================

#[tokio::test]
async fn test_two_page_scenario() {
    let fetcher = MockFetcher::new(TWO_PAGES);
    let pager = pager(&fetcher, &ManualWatcher::new());

    let outcome = pager.on_visibility_changed(true).await.unwrap();
    assert_eq!(
        outcome,
        Some(FetchOutcome::Appended {
            cursor: 0,
            items: 2,
            is_last: false
        })
    );
    assert_eq!(pager.pages().await, vec![PageResult::new(0, strings(&["a", "b"]), false)]);
    assert_eq!(pager.fetch_state().await, FetchState::Settled);

    let outcome = pager.on_visibility_changed(true).await.unwrap().unwrap();
    assert_eq!(outcome.cursor(), 1);
    assert_eq!(
        pager.pages().await,
        vec![
            PageResult::new(0, strings(&["a", "b"]), false),
            PageResult::new(1, strings(&["c"]), true),
        ]
    );
    assert_eq!(pager.cursor().await, 1);

    for _ in 0..5 {
        assert_eq!(pager.on_visibility_changed(true).await.unwrap(), None);
    }
    assert_eq!(fetcher.calls(), vec![0, 1]);
    assert!(!pager.has_next_page().await);
    assert_eq!(pager.next_cursor().await, None);
    assert_eq!(pager.items().await, strings(&["a", "b", "c"]));
}

#[tokio::test]
async fn test_not_visible_issues_nothing() {
    let fetcher = MockFetcher::new(TWO_PAGES);
    let pager = pager(&fetcher, &ManualWatcher::new());

    assert_eq!(pager.on_visibility_changed(false).await.unwrap(), None);
    assert!(fetcher.calls().is_empty());
    assert_eq!(pager.fetch_state().await, FetchState::Idle);
    assert!(!pager.is_visible().await);
}

#[tokio::test]
async fn test_signals_while_pending_are_ignored() {
    let fetcher = MockFetcher::gated(FOUR_PAGES);
    let pager = pager(&fetcher, &ManualWatcher::new());

    let first = tokio::spawn({
        let pager = pager.clone();
        async move { pager.on_visibility_changed(true).await }
    });
    wait_until(|| fetcher.calls().len() == 1).await;
    assert!(pager.is_pending().await);

    for _ in 0..10 {
        assert_eq!(pager.on_visibility_changed(true).await.unwrap(), None);
    }
    assert_eq!(fetcher.calls(), vec![0]);

    fetcher.release(1);
    let outcome = first.await.unwrap().unwrap().unwrap();
    assert!(outcome.is_appended());
    assert_eq!(pager.pages().await.len(), 1);
    assert!(!pager.is_pending().await);
}

#[tokio::test]
async fn test_failed_fetch_retries_same_cursor() {
    let fetcher = MockFetcher::new(TWO_PAGES);
    fetcher.fail_once(0);
    let pager = pager(&fetcher, &ManualWatcher::new());

    let err = pager.on_visibility_changed(true).await.unwrap_err();
    assert!(matches!(err, Error::HttpStatus { status: 503, .. }));
    assert!(pager.pages().await.is_empty());
    assert_eq!(pager.fetch_state().await, FetchState::Idle);

    let outcome = pager.on_visibility_changed(true).await.unwrap().unwrap();
    assert_eq!(outcome.cursor(), 0);
    assert_eq!(fetcher.calls(), vec![0, 0]);
}

#[tokio::test]
async fn test_failure_after_first_page_keeps_pages() {
    let fetcher = MockFetcher::new(FOUR_PAGES);
    fetcher.fail_once(1);
    let pager = pager(&fetcher, &ManualWatcher::new());

    pager.on_visibility_changed(true).await.unwrap();
    assert!(pager.on_visibility_changed(true).await.is_err());

    assert_eq!(pager.pages().await.len(), 1);
    assert_eq!(pager.cursor().await, 0);
    assert_eq!(pager.next_cursor().await, Some(1));
}

#[tokio::test]
async fn test_page_number_mismatch_is_a_failure() {
    let fetcher = MockFetcher::new(FOUR_PAGES);
    fetcher.renumber_next(5);
    let pager = pager(&fetcher, &ManualWatcher::new());

    let err = pager.on_visibility_changed(true).await.unwrap_err();
    assert!(matches!(
        err,
        Error::PageMismatch {
            requested: 0,
            returned: 5
        }
    ));
    assert!(pager.pages().await.is_empty());
    assert_eq!(pager.fetch_state().await, FetchState::Idle);
}

// ============================================================================
// Disposal Tests
// ============================================================================

#[tokio::test]
async fn test_dispose_discards_in_flight_page() {
    let fetcher = MockFetcher::gated(FOUR_PAGES);
    let pager = pager(&fetcher, &ManualWatcher::new());

    fetcher.release(1);
    pager.on_visibility_changed(true).await.unwrap();

    let second = tokio::spawn({
        let pager = pager.clone();
        async move { pager.on_visibility_changed(true).await }
    });
    wait_until(|| fetcher.calls().len() == 2).await;

    pager.dispose().await;
    assert_eq!(pager.fetch_state().await, FetchState::Idle);

    let outcome = second.await.unwrap().unwrap();
    assert_eq!(outcome, Some(FetchOutcome::Discarded { cursor: 1 }));
    wait_until(|| fetcher.live() == 0).await;
    assert_eq!(pager.pages().await.len(), 1);
    assert_eq!(pager.fetch_state().await, FetchState::Idle);
}

#[tokio::test]
async fn test_disposed_controller_ignores_everything() {
    let fetcher = MockFetcher::new(FOUR_PAGES);
    let watcher = ManualWatcher::new();
    watcher.attach(sentinel());
    let pager = pager(&fetcher, &watcher);

    pager.dispose().await;
    assert!(pager.is_disposed().await);

    assert_eq!(pager.on_visibility_changed(true).await.unwrap(), None);
    assert!(matches!(pager.refetch().await, Err(Error::Disposed)));
    assert!(!pager.bind_target(sentinel()).await);
    assert_eq!(watcher.observer_count(&sentinel()), 0);
    assert!(fetcher.calls().is_empty());
}

#[tokio::test]
async fn test_dispose_unbinds_target() {
    let watcher = ManualWatcher::new();
    watcher.attach(sentinel());
    let pager = pager(&MockFetcher::new(FOUR_PAGES), &watcher);

    assert!(pager.bind_target(sentinel()).await);
    pager.dispose().await;

    assert_eq!(pager.bound_target().await, None);
    assert_eq!(watcher.observer_count(&sentinel()), 0);
}

// ============================================================================
// Refetch Tests
// ============================================================================

#[tokio::test]
async fn test_refetch_resets_to_first_page() {
    let fetcher = MockFetcher::new(TWO_PAGES);
    let pager = pager(&fetcher, &ManualWatcher::new());
    let mut events = pager.subscribe();

    pager.on_visibility_changed(true).await.unwrap();
    pager.on_visibility_changed(true).await.unwrap();
    assert!(!pager.has_next_page().await);

    // Hidden sentinel and exhausted list do not block an explicit refetch
    pager.on_visibility_changed(false).await.unwrap();
    let outcome = pager.refetch().await.unwrap();

    assert_eq!(outcome.cursor(), 0);
    assert_eq!(pager.pages().await, vec![PageResult::new(0, strings(&["a", "b"]), false)]);
    assert_eq!(pager.cursor().await, 0);
    assert_eq!(fetcher.calls(), vec![0, 1, 0]);

    assert!(matches!(next_event(&mut events).await, PagerEvent::PageLoaded { cursor: 0, .. }));
    assert!(matches!(next_event(&mut events).await, PagerEvent::PageLoaded { cursor: 1, is_last: true }));
    assert!(matches!(next_event(&mut events).await, PagerEvent::Reset));
    assert!(matches!(next_event(&mut events).await, PagerEvent::PageLoaded { cursor: 0, .. }));
}

#[tokio::test]
async fn test_refetch_supersedes_in_flight_fetch() {
    let fetcher = MockFetcher::gated(FOUR_PAGES);
    let pager = pager(&fetcher, &ManualWatcher::new());

    let scrolled = tokio::spawn({
        let pager = pager.clone();
        async move { pager.on_visibility_changed(true).await }
    });
    wait_until(|| fetcher.calls().len() == 1).await;

    let refetched = tokio::spawn({
        let pager = pager.clone();
        async move { pager.refetch().await }
    });
    wait_until(|| fetcher.calls().len() == 2).await;

    // The superseded request is cancelled, not left running
    let scrolled = scrolled.await.unwrap().unwrap();
    assert_eq!(scrolled, Some(FetchOutcome::Discarded { cursor: 0 }));
    wait_until(|| fetcher.live() == 1).await;
    assert!(pager.is_pending().await);

    fetcher.release(1);
    let refetched = refetched.await.unwrap().unwrap();

    assert!(refetched.is_appended());
    assert_eq!(fetcher.live(), 0);
    assert_eq!(pager.pages().await.len(), 1);
    assert_eq!(pager.fetch_state().await, FetchState::Settled);
}

// ============================================================================
// Query Identity Tests
// ============================================================================

#[tokio::test]
async fn test_query_change_discards_pages() {
    let fetcher = MockFetcher::new(FOUR_PAGES);
    let pager = pager(&fetcher, &ManualWatcher::new());

    pager.on_visibility_changed(true).await.unwrap();
    pager.on_visibility_changed(true).await.unwrap();
    assert_eq!(pager.pages().await.len(), 2);

    assert!(!pager.set_query(products()).await);
    assert_eq!(pager.pages().await.len(), 2);

    let shoes = products().with_strings(["shoes"]);
    assert!(pager.set_query(shoes.clone()).await);
    assert!(pager.pages().await.is_empty());
    assert_eq!(pager.cursor().await, 0);
    assert_eq!(pager.fetch_state().await, FetchState::Idle);

    pager.on_visibility_changed(true).await.unwrap();
    assert_eq!(fetcher.calls(), vec![0, 1, 0]);
    assert_eq!(fetcher.queries()[2], shoes);
    assert_eq!(pager.query().await, shoes);
}

#[tokio::test]
async fn test_each_key_component_is_identity() {
    let fetcher = MockFetcher::new(FOUR_PAGES);
    let pager = pager(&fetcher, &ManualWatcher::new());

    let keys = [
        QueryKey::new("orders").with_variables([3]),
        QueryKey::new("orders").with_variables([4]),
        QueryKey::new("orders").with_variables([4, 1]),
        QueryKey::new("orders").with_variables([4, 1]).with_strings(["x"]),
        QueryKey::new("orders").with_variables([4, 1]).with_strings(["y"]),
    ];

    for key in keys {
        pager.on_visibility_changed(true).await.unwrap();
        assert!(!pager.pages().await.is_empty());
        assert!(pager.set_query(key).await);
        assert!(pager.pages().await.is_empty());
    }
}

#[tokio::test]
async fn test_query_change_discards_in_flight_page() {
    let fetcher = MockFetcher::gated(FOUR_PAGES);
    let pager = pager(&fetcher, &ManualWatcher::new());

    let scrolled = tokio::spawn({
        let pager = pager.clone();
        async move { pager.on_visibility_changed(true).await }
    });
    wait_until(|| fetcher.calls().len() == 1).await;

    assert!(pager.set_query(QueryKey::new("orders")).await);

    let outcome = scrolled.await.unwrap().unwrap();
    assert_eq!(outcome, Some(FetchOutcome::Discarded { cursor: 0 }));
    wait_until(|| fetcher.live() == 0).await;
    assert!(pager.pages().await.is_empty());
    assert_eq!(pager.fetch_state().await, FetchState::Idle);
}

// ============================================================================
// Target Binding Tests
// ============================================================================

#[tokio::test]
async fn test_bound_target_drives_fetches() {
    let fetcher = MockFetcher::new(TWO_PAGES);
    let watcher = ManualWatcher::new();
    watcher.attach(sentinel());
    let pager = pager(&fetcher, &watcher);
    let mut events = pager.subscribe();

    assert!(pager.bind_target(sentinel()).await);
    assert_eq!(pager.bound_target().await, Some(sentinel()));

    watcher.report(&sentinel(), 1.0);
    assert!(matches!(
        next_event(&mut events).await,
        PagerEvent::PageLoaded {
            cursor: 0,
            is_last: false
        }
    ));

    watcher.report(&sentinel(), 0.0);
    watcher.report(&sentinel(), 1.0);
    assert!(matches!(
        next_event(&mut events).await,
        PagerEvent::PageLoaded {
            cursor: 1,
            is_last: true
        }
    ));

    watcher.report(&sentinel(), 0.0);
    watcher.report(&sentinel(), 1.0);
    settle().await;

    assert_eq!(fetcher.calls(), vec![0, 1]);
    assert_eq!(pager.items().await, strings(&["a", "b", "c"]));
}

#[tokio::test]
async fn test_bound_target_ignores_signals_while_pending() {
    let fetcher = MockFetcher::gated(FOUR_PAGES);
    let watcher = ManualWatcher::new();
    watcher.attach(sentinel());
    let pager = pager(&fetcher, &watcher);
    let mut events = pager.subscribe();

    pager.bind_target(sentinel()).await;
    watcher.report(&sentinel(), 1.0);
    wait_until(|| fetcher.calls().len() == 1).await;

    for _ in 0..5 {
        watcher.report(&sentinel(), 0.0);
        watcher.report(&sentinel(), 1.0);
    }
    settle().await;
    assert_eq!(fetcher.calls(), vec![0]);

    fetcher.release(1);
    assert!(matches!(next_event(&mut events).await, PagerEvent::PageLoaded { cursor: 0, .. }));
    settle().await;
    assert_eq!(fetcher.calls(), vec![0]);
}

#[tokio::test]
async fn test_bound_target_reports_failures() {
    let fetcher = MockFetcher::new(TWO_PAGES);
    fetcher.fail_once(0);
    let watcher = ManualWatcher::new();
    watcher.attach(sentinel());
    let pager = pager(&fetcher, &watcher);
    let mut events = pager.subscribe();

    pager.bind_target(sentinel()).await;
    watcher.report(&sentinel(), 1.0);

    match next_event(&mut events).await {
        PagerEvent::FetchFailed { cursor, error } => {
            assert_eq!(cursor, 0);
            assert!(matches!(*error, Error::HttpStatus { status: 503, .. }));
        }
        other => panic!("expected FetchFailed, got {other:?}"),
    }
    assert_eq!(pager.fetch_state().await, FetchState::Idle);

    watcher.report(&sentinel(), 0.0);
    watcher.report(&sentinel(), 1.0);
    assert!(matches!(next_event(&mut events).await, PagerEvent::PageLoaded { cursor: 0, .. }));
}

#[tokio::test]
async fn test_bind_unattached_target_is_ignored() {
    let watcher = ManualWatcher::new();
    let pager = pager(&MockFetcher::new(TWO_PAGES), &watcher);

    assert!(!pager.bind_target("ghost").await);
    assert_eq!(pager.bound_target().await, None);
}

#[tokio::test]
async fn test_refused_target_keeps_current_binding() {
    let fetcher = MockFetcher::new(TWO_PAGES);
    let watcher = ManualWatcher::new();
    watcher.attach(sentinel());
    let pager = pager(&fetcher, &watcher);
    let mut events = pager.subscribe();

    assert!(pager.bind_target(sentinel()).await);
    assert!(!pager.bind_target("ghost").await);
    assert!(!pager.bind_target("").await);

    assert_eq!(pager.bound_target().await, Some(sentinel()));
    assert_eq!(watcher.observer_count(&sentinel()), 1);

    watcher.report(&sentinel(), 1.0);
    assert!(matches!(next_event(&mut events).await, PagerEvent::PageLoaded { cursor: 0, .. }));
    assert_eq!(fetcher.calls(), vec![0]);
}

#[tokio::test]
async fn test_rebind_releases_previous_target() {
    let watcher = ManualWatcher::new();
    watcher.attach("first");
    watcher.attach("second");
    let pager = pager(&MockFetcher::new(TWO_PAGES), &watcher);

    assert!(pager.bind_target("first").await);
    assert_eq!(watcher.observer_count(&TargetId::new("first")), 1);

    assert!(pager.bind_target("second").await);
    assert_eq!(watcher.observer_count(&TargetId::new("first")), 0);
    assert_eq!(watcher.observer_count(&TargetId::new("second")), 1);
    assert_eq!(pager.bound_target().await, Some(TargetId::new("second")));
}

#[tokio::test]
async fn test_unbind_stops_signals() {
    let fetcher = MockFetcher::new(TWO_PAGES);
    let watcher = ManualWatcher::new();
    watcher.attach(sentinel());
    let pager = pager(&fetcher, &watcher);

    pager.bind_target(sentinel()).await;
    assert_eq!(pager.unbind_target().await, Some(sentinel()));
    assert_eq!(pager.unbind_target().await, None);

    assert_eq!(watcher.report(&sentinel(), 1.0), 0);
    settle().await;
    assert!(fetcher.calls().is_empty());
}

// ============================================================================
// Builder Tests
// ============================================================================

#[tokio::test]
async fn test_builder_applies_observer_overrides() {
    let fetcher = MockFetcher::new(TWO_PAGES);
    let watcher = ManualWatcher::new();
    watcher.attach(sentinel());

    let pager: PaginationController<String> =
        PaginationController::<String>::builder(products(), Arc::new(fetcher.clone()), Arc::new(watcher.clone()))
            .observer(ObserverOverrides {
                threshold: Some(0.5),
                ..Default::default()
            })
            .event_capacity(8)
            .build()
            .unwrap();
    assert_eq!(pager.options().threshold, 0.5);

    let mut events = pager.subscribe();
    pager.bind_target(sentinel()).await;

    // Half visible is enough with a 0.5 threshold
    watcher.report(&sentinel(), 0.5);
    assert!(matches!(next_event(&mut events).await, PagerEvent::PageLoaded { cursor: 0, .. }));
}

#[test]
fn test_builder_rejects_invalid_threshold() {
    let result: Result<PaginationController<String>> = PaginationController::<String>::builder(
        products(),
        Arc::new(MockFetcher::new(TWO_PAGES)),
        Arc::new(ManualWatcher::new()),
    )
    .observer(ObserverOverrides {
        threshold: Some(3.0),
        ..Default::default()
    })
    .build();

    assert!(result.is_err());
}
