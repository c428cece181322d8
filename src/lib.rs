//! # infinite-pager
//!
//! Visibility-driven pagination for infinite-scroll lists.
//!
//! A sentinel element sits after the last rendered row. Whenever it becomes
//! visible the controller requests the next page, never more than one at a
//! time, and stops once a page reports it is the last.
//!
//! ## Features
//!
//! - **Single-flight paging**: one fetch in flight; extra signals are ignored
//! - **Query identity**: changing the list's parameters discards its pages
//! - **Stale result protection**: results that land after a reset are dropped
//! - **HTTP fetcher**: JSON page endpoints with retry, backoff and throttling
//! - **Scoped observation**: target registrations are released on rebind or drop
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use infinite_pager::{ManualWatcher, PaginationController, QueryKey};
//! use std::sync::Arc;
//!
//! let watcher = ManualWatcher::new();
//! watcher.attach("list-end");
//!
//! let pager = PaginationController::new(
//!     QueryKey::new("products").with_variables([3]),
//!     Arc::new(my_fetcher),
//!     Arc::new(watcher.clone()),
//! );
//! pager.bind_target("list-end").await;
//!
//! // The layout reports the sentinel fully visible
//! watcher.report(&"list-end".into(), 1.0);
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                  PaginationController                    │
//! │  on_visibility_changed()  refetch()  set_query()         │
//! │  bind_target() / unbind_target()  pages()  subscribe()   │
//! └──────────────────────────────────────────────────────────┘
//!              │                               │
//! ┌────────────┴────────────┐     ┌────────────┴────────────┐
//! │   VisibilityWatcher     │     │      PageFetcher        │
//! ├─────────────────────────┤     ├─────────────────────────┤
//! │ Registration (RAII)     │     │ HttpPageFetcher         │
//! │ ManualWatcher           │     │ Retry / Backoff         │
//! │ Threshold / RootMargin  │     │ Throttle                │
//! └─────────────────────────┘     └─────────────────────────┘
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types
pub mod error;

/// Common types and type aliases
pub mod types;

/// Observer options and configuration files
pub mod config;

/// Page fetchers
pub mod fetch;

/// Visibility watchers
pub mod visibility;

/// Pagination controller
pub mod controller;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};
pub use types::*;

pub use config::{load_config, ObserverOptions, ObserverOverrides, PagerConfig, RootMargin};
pub use controller::{FetchOutcome, FetchState, PagerEvent, PaginationController};
pub use fetch::{HttpFetcherConfig, HttpPageFetcher, PageFetcher, PageLayout};
pub use visibility::{ManualWatcher, Registration, TargetId, VisibilityWatcher};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
