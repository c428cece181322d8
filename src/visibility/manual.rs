//! In-process visibility watcher
//!
//! Targets are attached by name and their intersection ratio is reported
//! by whoever knows the layout (a renderer, a terminal list, a test).
//! The watcher turns ratios into threshold-crossing signals.

use super::types::{Registration, TargetId, VisibilityWatcher};
use crate::config::ObserverOptions;
use crate::error::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::mpsc;
use tracing::debug;

/// One observer on one target
#[derive(Debug)]
struct Observer {
    target: TargetId,
    options: ObserverOptions,
    sender: mpsc::UnboundedSender<bool>,
    last: Option<bool>,
}

#[derive(Debug, Default)]
struct WatcherState {
    attached: HashSet<TargetId>,
    observers: HashMap<u64, Observer>,
    next_id: u64,
}

/// Watcher driven by reported intersection ratios
#[derive(Debug, Clone, Default)]
pub struct ManualWatcher {
    state: Arc<Mutex<WatcherState>>,
}

impl ManualWatcher {
    /// Create a watcher with no attached targets
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, WatcherState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make a target observable
    pub fn attach(&self, target: impl Into<TargetId>) {
        self.lock().attached.insert(target.into());
    }

    /// Remove a target; its observers are closed and emit nothing more
    pub fn detach(&self, target: &TargetId) {
        let mut state = self.lock();
        state.attached.remove(target);
        state.observers.retain(|_, o| &o.target != target);
    }

    /// Check if a target is attached
    pub fn is_attached(&self, target: &TargetId) -> bool {
        self.lock().attached.contains(target)
    }

    /// Number of live observers on a target
    pub fn observer_count(&self, target: &TargetId) -> usize {
        self.lock()
            .observers
            .values()
            .filter(|o| &o.target == target)
            .count()
    }

    /// Report the visible fraction of `target`
    ///
    /// Each observer receives a signal only when the target crosses its
    /// threshold; the first report always produces one. Returns the number
    /// of signals delivered.
    pub fn report(&self, target: &TargetId, ratio: f64) -> usize {
        let ratio = ratio.clamp(0.0, 1.0);
        let mut state = self.lock();
        let mut delivered = 0;

        state.observers.retain(|_, observer| {
            if &observer.target != target {
                return true;
            }

            let visible = observer.options.is_visible(ratio);
            if observer.last == Some(visible) {
                return true;
            }
            observer.last = Some(visible);

            // Receiver gone: the registration was dropped without teardown
            // reaching us yet.
            if observer.sender.send(visible).is_err() {
                return false;
            }
            delivered += 1;
            true
        });

        debug!(id = %target, ratio, delivered, "Reported visibility");
        delivered
    }
}

impl VisibilityWatcher for ManualWatcher {
    fn observe(&self, target: &TargetId, options: &ObserverOptions) -> Result<Registration> {
        if target.as_str().is_empty() {
            return Err(Error::misconfigured_target(target.as_str(), "empty target id"));
        }
        options
            .validate()
            .map_err(|e| Error::misconfigured_target(target.as_str(), e.to_string()))?;

        let mut state = self.lock();
        if !state.attached.contains(target) {
            return Err(Error::misconfigured_target(
                target.as_str(),
                "target is not attached",
            ));
        }
        if let Some(root) = &options.root {
            if !state.attached.contains(root) {
                return Err(Error::misconfigured_target(
                    target.as_str(),
                    format!("root '{root}' is not attached"),
                ));
            }
        }

        let id = state.next_id;
        state.next_id += 1;

        let (sender, receiver) = mpsc::unbounded_channel();
        state.observers.insert(
            id,
            Observer {
                target: target.clone(),
                options: options.clone(),
                sender,
                last: None,
            },
        );
        drop(state);

        let weak: Weak<Mutex<WatcherState>> = Arc::downgrade(&self.state);
        Ok(Registration::new(target.clone(), receiver, move || {
            if let Some(state) = weak.upgrade() {
                state
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .observers
                    .remove(&id);
            }
        }))
    }
}
