//! Pagination controller implementation
//!
//! Owns the accumulated pages and decides, from visibility signals, when the
//! next page is requested. At most one fetch is in flight; completions that
//! arrive after a reset, a query change or disposal are dropped.

use super::types::{FetchOutcome, FetchState, FetchTicket, PagerEvent};
use crate::config::{ObserverOptions, ObserverOverrides};
use crate::error::{Error, Result};
use crate::fetch::PageFetcher;
use crate::types::{Cursor, PageResult, QueryKey};
use crate::visibility::{Registration, TargetId, VisibilityWatcher};
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, Mutex};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, warn};

/// Default capacity of the event channel
const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Active target registration
#[derive(Debug)]
struct Binding {
    id: u64,
    target: TargetId,
    task: JoinHandle<()>,
}

/// Mutable controller state
#[derive(Debug)]
struct ControllerState<T> {
    query: QueryKey,
    pages: Vec<PageResult<T>>,
    cursor: Cursor,
    fetch_state: FetchState,
    visible: bool,
    disposed: bool,
    /// Bumped on every reset; completions from an older epoch are stale
    epoch: u64,
    binding: Option<Binding>,
    next_binding_id: u64,
    /// Task running the current ticket's fetch
    in_flight: Option<AbortHandle>,
}

impl<T> ControllerState<T> {
    fn new(query: QueryKey) -> Self {
        Self {
            query,
            pages: Vec::new(),
            cursor: 0,
            fetch_state: FetchState::Idle,
            visible: false,
            disposed: false,
            epoch: 0,
            binding: None,
            next_binding_id: 0,
            in_flight: None,
        }
    }

    /// Next cursor to request, `None` once the last page has loaded
    fn next_cursor(&self) -> Option<Cursor> {
        match self.pages.last() {
            Some(page) => page.next_cursor(),
            None => Some(0),
        }
    }

    /// Abort the fetch in flight, if any
    fn cancel_in_flight(&mut self) {
        if let Some(task) = self.in_flight.take() {
            task.abort();
        }
    }

    /// Drop pages and cursor, cancelling the fetch in flight
    fn reset(&mut self) {
        self.cancel_in_flight();
        self.pages.clear();
        self.cursor = 0;
        self.fetch_state = FetchState::Idle;
        self.epoch += 1;
    }

    fn ticket(&mut self, cursor: Cursor) -> FetchTicket {
        self.fetch_state = FetchState::Pending;
        FetchTicket {
            cursor,
            epoch: self.epoch,
            query: self.query.clone(),
        }
    }

    /// Apply a visibility signal, issuing a ticket when every guard holds
    fn on_signal(&mut self, visible: bool) -> Option<FetchTicket> {
        self.visible = visible;
        if !visible || self.disposed || self.fetch_state.is_pending() {
            return None;
        }
        let cursor = self.next_cursor()?;
        Some(self.ticket(cursor))
    }

    fn binding_id(&self) -> Option<u64> {
        self.binding.as_ref().map(|b| b.id)
    }
}

struct Inner<T> {
    fetcher: Arc<dyn PageFetcher<T>>,
    watcher: Arc<dyn VisibilityWatcher>,
    options: ObserverOptions,
    state: Mutex<ControllerState<T>>,
    events: broadcast::Sender<PagerEvent>,
}

impl<T> Inner<T> {
    fn emit(&self, event: PagerEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        if let Some(binding) = self.state.get_mut().binding.take() {
            binding.task.abort();
        }
    }
}

/// Visibility-driven pagination controller
///
/// Cheap to clone; clones share the same state.
pub struct PaginationController<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for PaginationController<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> PaginationController<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a controller with default observer options
    pub fn new(
        query: QueryKey,
        fetcher: Arc<dyn PageFetcher<T>>,
        watcher: Arc<dyn VisibilityWatcher>,
    ) -> Self {
        Self::from_parts(
            query,
            fetcher,
            watcher,
            ObserverOptions::default(),
            DEFAULT_EVENT_CAPACITY,
        )
    }

    /// Start building a controller
    pub fn builder(
        query: QueryKey,
        fetcher: Arc<dyn PageFetcher<T>>,
        watcher: Arc<dyn VisibilityWatcher>,
    ) -> ControllerBuilder<T> {
        ControllerBuilder {
            query,
            fetcher,
            watcher,
            overrides: ObserverOverrides::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    fn from_parts(
        query: QueryKey,
        fetcher: Arc<dyn PageFetcher<T>>,
        watcher: Arc<dyn VisibilityWatcher>,
        options: ObserverOptions,
        event_capacity: usize,
    ) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                fetcher,
                watcher,
                options,
                state: Mutex::new(ControllerState::new(query)),
                events,
            }),
        }
    }

    // ========================================================================
    // Entry points
    // ========================================================================

    /// Handle a visibility signal for the bound target
    ///
    /// Returns `Ok(None)` when no fetch was issued: the target is not
    /// visible, a fetch is already in flight, the last page has loaded or
    /// the controller is disposed.
    pub async fn on_visibility_changed(&self, visible: bool) -> Result<Option<FetchOutcome>> {
        let flight = {
            let mut state = self.inner.state.lock().await;
            match state.on_signal(visible) {
                Some(ticket) => Some(self.launch(&mut state, ticket)),
                None => None,
            }
        };
        match flight {
            Some(flight) => flight.outcome().await.map(Some),
            None => Ok(None),
        }
    }

    /// Drop every page and load the first one again
    ///
    /// Ignores visibility and the last-page flag. A fetch in flight is
    /// cancelled before the first page is requested.
    pub async fn refetch(&self) -> Result<FetchOutcome> {
        let flight = {
            let mut state = self.inner.state.lock().await;
            if state.disposed {
                return Err(Error::Disposed);
            }
            state.reset();
            let ticket = state.ticket(0);
            debug!(query = %ticket.query, "Refetching from the first page");
            // Under the lock so Reset precedes the refetched page's event
            self.inner.emit(PagerEvent::Reset);
            self.launch(&mut state, ticket)
        };
        flight.outcome().await
    }

    /// Switch to another list
    ///
    /// A different key discards pages, cursor and fetch state. Returns
    /// whether anything was reset.
    pub async fn set_query(&self, query: QueryKey) -> bool {
        {
            let mut state = self.inner.state.lock().await;
            if state.query == query {
                return false;
            }
            debug!(from = %state.query, to = %query, "Query identity changed");
            state.query = query;
            state.reset();
        }
        self.inner.emit(PagerEvent::Reset);
        true
    }

    /// Stop reacting to signals and drop any in-flight result
    pub async fn dispose(&self) {
        let binding = {
            let mut state = self.inner.state.lock().await;
            state.disposed = true;
            state.cancel_in_flight();
            state.fetch_state = FetchState::Idle;
            state.epoch += 1;
            state.binding.take()
        };
        if let Some(binding) = binding {
            stop_binding(binding).await;
        }
    }

    /// Spawn the fetch for `ticket` and track it as the one in flight
    fn launch(&self, state: &mut ControllerState<T>, ticket: FetchTicket) -> Flight {
        let cursor = ticket.cursor;
        let controller = self.clone();
        let task = tokio::spawn(async move { controller.complete(ticket).await });
        state.in_flight = Some(task.abort_handle());
        Flight { cursor, task }
    }

    /// Run a ticket's fetch and apply the result
    async fn complete(&self, ticket: FetchTicket) -> Result<FetchOutcome> {
        let result = self.inner.fetcher.fetch(ticket.cursor, &ticket.query).await;

        let mut state = self.inner.state.lock().await;
        if state.epoch != ticket.epoch {
            debug!(cursor = ticket.cursor, "Discarding stale page");
            return Ok(FetchOutcome::Discarded {
                cursor: ticket.cursor,
            });
        }
        state.in_flight = None;

        let page = match result {
            Ok(page) if page.number == ticket.cursor => page,
            Ok(page) => {
                state.fetch_state = FetchState::Idle;
                let e = Error::PageMismatch {
                    requested: ticket.cursor,
                    returned: page.number,
                };
                warn!(cursor = ticket.cursor, "Page fetch failed: {e}");
                return Err(e);
            }
            Err(e) => {
                state.fetch_state = FetchState::Idle;
                warn!(cursor = ticket.cursor, "Page fetch failed: {e}");
                return Err(e);
            }
        };

        let outcome = FetchOutcome::Appended {
            cursor: page.number,
            items: page.items.len(),
            is_last: page.is_last,
        };
        let is_last = page.is_last;

        state.cursor = page.number;
        state.pages.push(page);
        state.fetch_state = FetchState::Settled;
        drop(state);

        debug!(cursor = ticket.cursor, is_last, "Page appended");
        self.inner.emit(PagerEvent::PageLoaded {
            cursor: ticket.cursor,
            is_last,
        });
        Ok(outcome)
    }

    // ========================================================================
    // Target binding
    // ========================================================================

    /// Observe `target`; its visibility signals drive the controller
    ///
    /// Replaces any previous target. A target the watcher refuses is logged
    /// and ignored, leaving the current binding in place. Returns whether
    /// `target` is now bound.
    pub async fn bind_target(&self, target: impl Into<TargetId>) -> bool {
        let target = target.into();

        let registration = match self.inner.watcher.observe(&target, &self.inner.options) {
            Ok(registration) => registration,
            Err(e) => {
                warn!("Ignoring target binding: {e}");
                return false;
            }
        };

        let stale = {
            let mut state = self.inner.state.lock().await;
            if state.disposed {
                warn!(sentinel = %target, "Ignoring target binding on a disposed controller");
                return false;
            }

            let id = state.next_binding_id;
            state.next_binding_id += 1;

            let task = tokio::spawn(watch_signals(Arc::downgrade(&self.inner), id, registration));
            debug!(sentinel = %target, "Target bound");
            state.binding.replace(Binding { id, target, task })
        };

        if let Some(stale) = stale {
            debug!(sentinel = %stale.target, "Previous target unbound");
            stop_binding(stale).await;
        }
        true
    }

    /// Stop observing the bound target, returning it
    pub async fn unbind_target(&self) -> Option<TargetId> {
        let binding = self.inner.state.lock().await.binding.take()?;
        let target = binding.target.clone();
        stop_binding(binding).await;
        debug!(sentinel = %target, "Target unbound");
        Some(target)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Snapshot of the accumulated pages
    pub async fn pages(&self) -> Vec<PageResult<T>> {
        self.inner.state.lock().await.pages.clone()
    }

    /// Items of every page, in order
    pub async fn items(&self) -> Vec<T> {
        let state = self.inner.state.lock().await;
        state
            .pages
            .iter()
            .flat_map(|p| p.items.iter().cloned())
            .collect()
    }

    /// Number of the most recent page (0 before any page has loaded)
    pub async fn cursor(&self) -> Cursor {
        self.inner.state.lock().await.cursor
    }

    /// Cursor the next fetch would request, `None` once the last page has
    /// loaded
    pub async fn next_cursor(&self) -> Option<Cursor> {
        self.inner.state.lock().await.next_cursor()
    }

    /// Check if more pages can be fetched
    pub async fn has_next_page(&self) -> bool {
        self.next_cursor().await.is_some()
    }

    /// Current fetch state
    pub async fn fetch_state(&self) -> FetchState {
        self.inner.state.lock().await.fetch_state
    }

    /// Check if a fetch is in flight
    pub async fn is_pending(&self) -> bool {
        self.fetch_state().await.is_pending()
    }

    /// Last visibility reported for the bound target
    pub async fn is_visible(&self) -> bool {
        self.inner.state.lock().await.visible
    }

    /// Current query identity
    pub async fn query(&self) -> QueryKey {
        self.inner.state.lock().await.query.clone()
    }

    /// Currently bound target
    pub async fn bound_target(&self) -> Option<TargetId> {
        self.inner
            .state
            .lock()
            .await
            .binding
            .as_ref()
            .map(|b| b.target.clone())
    }

    /// Check if [`dispose`](Self::dispose) has been called
    pub async fn is_disposed(&self) -> bool {
        self.inner.state.lock().await.disposed
    }

    /// Effective observer options
    pub fn options(&self) -> &ObserverOptions {
        &self.inner.options
    }

    /// Subscribe to controller events
    pub fn subscribe(&self) -> broadcast::Receiver<PagerEvent> {
        self.inner.events.subscribe()
    }
}

impl<T> std::fmt::Debug for PaginationController<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaginationController")
            .field("options", &self.inner.options)
            .finish_non_exhaustive()
    }
}

/// Fetch task spawned for one ticket
struct Flight {
    cursor: Cursor,
    task: JoinHandle<Result<FetchOutcome>>,
}

impl Flight {
    /// Wait for the fetch; a cancelled fetch counts as discarded
    async fn outcome(self) -> Result<FetchOutcome> {
        match self.task.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => {
                debug!(cursor = self.cursor, "In-flight page cancelled");
                Ok(FetchOutcome::Discarded {
                    cursor: self.cursor,
                })
            }
            Err(e) => Err(Error::Other(format!(
                "Page {} fetch task failed: {e}",
                self.cursor
            ))),
        }
    }
}

/// Abort a binding's signal task and wait until its registration is gone
async fn stop_binding(binding: Binding) {
    binding.task.abort();
    // Cancelled is the expected result
    let _ = binding.task.await;
}

/// Feed a registration's signals into the controller, in arrival order
///
/// Fetches run on their own task so signals that arrive while one is in
/// flight are evaluated (and ignored) immediately.
async fn watch_signals<T>(
    weak: Weak<Inner<T>>,
    binding_id: u64,
    mut registration: Registration,
) where
    T: Clone + Send + Sync + 'static,
{
    while let Some(visible) = registration.next_signal().await {
        let Some(inner) = weak.upgrade() else {
            break;
        };

        let controller = PaginationController { inner };
        let flight = {
            let mut state = controller.inner.state.lock().await;
            if state.binding_id() != Some(binding_id) {
                break;
            }
            match state.on_signal(visible) {
                Some(ticket) => Some(controller.launch(&mut state, ticket)),
                None => None,
            }
        };

        if let Some(flight) = flight {
            tokio::spawn(async move {
                let cursor = flight.cursor;
                if let Err(e) = flight.outcome().await {
                    controller.inner.emit(PagerEvent::FetchFailed {
                        cursor,
                        error: Arc::new(e),
                    });
                }
            });
        }
    }
    debug!(sentinel = %registration.target(), "Signal stream closed");
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`PaginationController`]
pub struct ControllerBuilder<T> {
    query: QueryKey,
    fetcher: Arc<dyn PageFetcher<T>>,
    watcher: Arc<dyn VisibilityWatcher>,
    overrides: ObserverOverrides,
    event_capacity: usize,
}

impl<T> ControllerBuilder<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Observer option overrides, merged over the defaults
    #[must_use]
    pub fn observer(mut self, overrides: ObserverOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Capacity of the event channel
    #[must_use]
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Build the controller; fails if the observer options are invalid
    pub fn build(self) -> Result<PaginationController<T>> {
        let options = ObserverOptions::from_overrides(&self.overrides)?;
        Ok(PaginationController::from_parts(
            self.query,
            self.fetcher,
            self.watcher,
            options,
            self.event_capacity,
        ))
    }
}
