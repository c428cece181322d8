//! CLI runner - executes commands

use crate::cli::commands::{Cli, Commands, OutputFormat};
use crate::config::{load_config, ObserverOptions, ObserverOverrides, PagerConfig};
use crate::controller::{PagerEvent, PaginationController};
use crate::error::{Error, Result};
use crate::fetch::HttpPageFetcher;
use crate::types::PageResult;
use crate::visibility::{ManualWatcher, TargetId};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::info;

/// Target standing in for the element after the last rendered row
const SENTINEL: &str = "list-end";

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command
    pub async fn run(&self) -> Result<()> {
        match &self.cli.command {
            Commands::Scroll { max_pages } => self.scroll(*max_pages).await,
            Commands::Options {
                threshold,
                root_margin,
                root,
            } => self.options(*threshold, root_margin.as_deref(), root.as_deref()),
            Commands::Validate => self.validate(),
        }
    }

    /// Load pager configuration
    fn load_config(&self) -> Result<PagerConfig> {
        let path = self
            .cli
            .config
            .as_ref()
            .ok_or_else(|| Error::config("Config file not specified (use -C flag)"))?;
        load_config(path)
    }

    /// Page through the configured list until the last page
    async fn scroll(&self, max_pages: Option<usize>) -> Result<()> {
        let config = self.load_config()?;
        let options = config.observer_options()?;

        let watcher = ManualWatcher::new();
        let sentinel = TargetId::new(SENTINEL);
        watcher.attach(sentinel.clone());
        if let Some(root) = &options.root {
            watcher.attach(root.clone());
        }

        let fetcher: HttpPageFetcher<Value> = HttpPageFetcher::new(config.fetcher.clone())?;
        let pager = PaginationController::<Value>::builder(
            config.query.clone(),
            Arc::new(fetcher),
            Arc::new(watcher.clone()),
        )
        .observer(config.observer.clone())
        .build()?;

        let mut events = pager.subscribe();
        if !pager.bind_target(sentinel.clone()).await {
            return Err(Error::misconfigured_target(SENTINEL, "binding refused"));
        }

        info!(query = %config.query, url = %config.fetcher.url, "Scrolling");
        let mut loaded = 0usize;

        loop {
            // Rows rendered so far are exhausted: the sentinel comes into view
            watcher.report(&sentinel, 1.0);

            match events.recv().await {
                Ok(PagerEvent::PageLoaded { cursor, is_last }) => {
                    if let Some(page) = pager.pages().await.pop() {
                        self.print_page(&page);
                    }
                    loaded += 1;
                    info!(cursor, is_last, "Page loaded");

                    if is_last || max_pages.is_some_and(|max| loaded >= max) {
                        break;
                    }
                }
                Ok(PagerEvent::FetchFailed { cursor, error }) => {
                    pager.dispose().await;
                    return Err(Error::Other(format!("Page {cursor} failed: {error}")));
                }
                Ok(PagerEvent::Reset) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            }

            // The new rows push the sentinel back out of view
            watcher.report(&sentinel, 0.0);
        }

        pager.dispose().await;
        info!(
            pages = loaded,
            items = pager.items().await.len(),
            "Scroll finished"
        );
        Ok(())
    }

    /// Print a single page
    fn print_page(&self, page: &PageResult<Value>) {
        match self.cli.format {
            OutputFormat::Json => {
                let line = json!({
                    "page": page.number,
                    "last": page.is_last,
                    "items": page.items,
                });
                println!("{line}");
            }
            OutputFormat::Pretty => {
                println!(
                    "Page {} ({} items{})",
                    page.number,
                    page.items.len(),
                    if page.is_last { ", last" } else { "" }
                );
                for item in &page.items {
                    println!("  {item}");
                }
            }
        }
    }

    /// Print effective observer options
    fn options(
        &self,
        threshold: Option<f64>,
        root_margin: Option<&str>,
        root: Option<&str>,
    ) -> Result<()> {
        let base = match &self.cli.config {
            Some(_) => self.load_config()?.observer_options()?,
            None => ObserverOptions::default(),
        };

        let overrides = ObserverOverrides {
            root: root.map(TargetId::new),
            threshold,
            root_margin: root_margin.map(str::parse).transpose()?,
        };
        let options = base.merged(&overrides)?;

        match self.cli.format {
            OutputFormat::Json => println!("{}", serde_json::to_string(&options)?),
            OutputFormat::Pretty => {
                println!(
                    "root:        {}",
                    options
                        .root
                        .as_ref()
                        .map_or("viewport", TargetId::as_str)
                );
                println!("threshold:   {}", options.threshold);
                println!("root_margin: {}", options.root_margin);
            }
        }
        Ok(())
    }

    /// Validate the configuration file
    fn validate(&self) -> Result<()> {
        let config = self.load_config()?;
        let options = config.observer_options()?;

        if self.cli.verbose {
            println!("Query:     {}", config.query);
            println!("Endpoint:  {}", config.fetcher.url);
            println!("Threshold: {}", options.threshold);
            println!("Margin:    {}", options.root_margin);
        }
        println!("Configuration is valid");
        Ok(())
    }
}
