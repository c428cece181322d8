//! Controller types
//!
//! Fetch state, outcomes and the events published to subscribers.

use crate::error::Error;
use crate::types::Cursor;
use std::sync::Arc;

/// Whether a new fetch may be issued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchState {
    /// Nothing fetched yet, or the last fetch failed
    #[default]
    Idle,
    /// A fetch is in flight
    Pending,
    /// The last fetch succeeded
    Settled,
}

impl FetchState {
    /// Check if a fetch is in flight
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

/// What happened to an issued fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The page was appended
    Appended {
        /// Cursor of the appended page
        cursor: Cursor,
        /// Number of items on the page
        items: usize,
        /// The page was the last one
        is_last: bool,
    },
    /// The fetch finished after a reset, query change or disposal and its
    /// result was dropped
    Discarded {
        /// Cursor that was requested
        cursor: Cursor,
    },
}

impl FetchOutcome {
    /// Check if the page was appended
    pub fn is_appended(&self) -> bool {
        matches!(self, Self::Appended { .. })
    }

    /// Requested cursor
    pub fn cursor(&self) -> Cursor {
        match self {
            Self::Appended { cursor, .. } | Self::Discarded { cursor } => *cursor,
        }
    }
}

/// Notification published by a controller
#[derive(Debug, Clone)]
pub enum PagerEvent {
    /// A page was appended
    PageLoaded {
        /// Cursor of the page
        cursor: Cursor,
        /// The page was the last one
        is_last: bool,
    },
    /// A fetch started by the bound target failed
    FetchFailed {
        /// Cursor that failed
        cursor: Cursor,
        /// Failure reported by the fetcher
        error: Arc<Error>,
    },
    /// Pages were discarded (refetch or query change)
    Reset,
}

/// Request issued under the state lock and completed outside it
#[derive(Debug, Clone)]
pub(crate) struct FetchTicket {
    pub cursor: Cursor,
    pub epoch: u64,
    pub query: crate::types::QueryKey,
}
