//! Page fetching module
//!
//! # Overview
//!
//! The controller asks a [`PageFetcher`] for one page at a time. The crate
//! ships an HTTP implementation; embedders can plug in anything else that
//! returns a [`PageResult`](crate::types::PageResult) for a cursor.
//!
//! # Features
//!
//! - **Query mapping**: cursor, page size, numeric and string variables
//!   become query parameters
//! - **Response layout**: configurable paths for items, last flag and page number
//! - **Retries**: Constant, linear and exponential backoff for 429/5xx and timeouts
//! - **Throttling**: Token bucket rate cap using governor

mod http;
mod throttle;
mod types;

pub use http::HttpPageFetcher;
pub use throttle::Throttle;
pub use types::{HttpFetcherConfig, PageFetcher, PageLayout};
