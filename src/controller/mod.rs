//! Pagination controller module
//!
//! Turns visibility signals into page requests.
//!
//! # Overview
//!
//! The controller provides:
//! - `PaginationController` - Cursor, accumulated pages and the fetch guard
//! - `FetchState` / `FetchOutcome` - What the controller is doing and what
//!   happened to a fetch
//! - `PagerEvent` - Notifications for fetches started by the bound target
//!
//! # Example
//!
//! ```rust,ignore
//! let watcher = ManualWatcher::new();
//! watcher.attach("sentinel");
//!
//! let pager = PaginationController::new(
//!     QueryKey::new("products").with_variables([3]),
//!     Arc::new(HttpPageFetcher::<Product>::new(fetcher_config)?),
//!     Arc::new(watcher.clone()),
//! );
//! pager.bind_target("sentinel").await;
//!
//! // Sentinel scrolled fully into view: page 0 is requested
//! watcher.report(&"sentinel".into(), 1.0);
//! ```

mod pager;
mod types;

pub use pager::{ControllerBuilder, PaginationController};
pub use types::{FetchOutcome, FetchState, PagerEvent};

#[cfg(test)]
mod tests;
