//! Visibility types and traits
//!
//! Defines the watcher abstraction and the registration guard returned
//! when a target is observed.

use crate::config::ObserverOptions;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;

/// Identifier of an observable element
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(String);

impl TargetId {
    /// Create a target id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TargetId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for TargetId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Source of visibility signals for observed targets
pub trait VisibilityWatcher: Send + Sync {
    /// Start observing `target`
    ///
    /// The returned registration yields `true`/`false` each time the target
    /// crosses the visibility threshold. Dropping it stops observation.
    fn observe(&self, target: &TargetId, options: &ObserverOptions) -> Result<Registration>;
}

/// Live observation of one target
///
/// Teardown runs exactly once, on [`Registration::disconnect`] or drop.
pub struct Registration {
    target: TargetId,
    signals: mpsc::UnboundedReceiver<bool>,
    teardown: Option<Box<dyn FnOnce() + Send>>,
}

impl Registration {
    /// Create a registration from a signal receiver and a teardown hook
    pub fn new(
        target: TargetId,
        signals: mpsc::UnboundedReceiver<bool>,
        teardown: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            target,
            signals,
            teardown: Some(Box::new(teardown)),
        }
    }

    /// Observed target
    pub fn target(&self) -> &TargetId {
        &self.target
    }

    /// Wait for the next signal; `None` once the watcher stops observing
    pub async fn next_signal(&mut self) -> Option<bool> {
        self.signals.recv().await
    }

    /// Next buffered signal, if any
    pub fn try_next_signal(&mut self) -> Option<bool> {
        self.signals.try_recv().ok()
    }

    /// Stop observing
    pub fn disconnect(self) {}
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Some(teardown) = self.teardown.take() {
            teardown();
        }
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("target", &self.target)
            .field("connected", &self.teardown.is_some())
            .finish_non_exhaustive()
    }
}
