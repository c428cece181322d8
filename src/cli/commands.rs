//! CLI commands and argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Visibility-driven pager CLI
#[derive(Parser, Debug)]
#[command(name = "infinite-pager")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Pager configuration file (YAML)
    #[arg(short = 'C', long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, default_value = "json")]
    pub format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scroll through a list, loading a page each time the sentinel shows up
    Scroll {
        /// Stop after this many pages
        #[arg(long)]
        max_pages: Option<usize>,
    },

    /// Print the effective observer options
    Options {
        /// Fraction of the sentinel that must be visible (0 to 1)
        #[arg(long)]
        threshold: Option<f64>,

        /// Margin around the root, CSS shorthand (e.g. "0px 0px 200px 0px")
        #[arg(long)]
        root_margin: Option<String>,

        /// Element used as the viewport
        #[arg(long)]
        root: Option<String>,
    },

    /// Validate a pager configuration file
    Validate,
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output (one page per line)
    Json,
    /// Human-readable output
    Pretty,
}
