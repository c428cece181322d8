//! CLI module
//!
//! Command-line interface for driving a pager against an HTTP endpoint.
//!
//! # Commands
//!
//! - `scroll` - Page through a list the way an infinite-scroll view would
//! - `options` - Print the effective observer options
//! - `validate` - Check a pager configuration file

mod commands;
mod runner;

pub use commands::{Cli, Commands, OutputFormat};
pub use runner::Runner;
