//! Configuration module
//!
//! Observer options (with default merging and margin parsing) and the
//! YAML pager configuration used by the CLI.

mod observer;
mod types;

pub use observer::{MarginValue, ObserverOptions, ObserverOverrides, RootMargin};
pub use types::{load_config, load_config_from_str, PagerConfig};
