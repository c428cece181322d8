//! Visibility module
//!
//! Signals that tell the pager when the sentinel target is on screen.
//!
//! # Overview
//!
//! - `VisibilityWatcher` - Turns a target + options into a [`Registration`]
//! - `Registration` - Signal stream for one target, torn down on drop
//! - `ManualWatcher` - In-process watcher fed with intersection ratios

mod manual;
mod types;

pub use manual::ManualWatcher;
pub use types::{Registration, TargetId, VisibilityWatcher};
