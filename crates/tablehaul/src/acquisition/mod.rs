//! Acquisition backends.
//!
//! Both backends log in, reach the listing, read pages and advance through
//! them behind one trait, so the paginator and exporter never know which
//! one produced the rows.

pub mod direct;
pub mod http_client;
pub mod rendered;

use crate::config::{ScrapeConfig, StrategyKind};
use crate::error::Result;
use crate::model::{ListingHandle, ListingPage, NavigationPath};
use crate::session::Session;
use async_trait::async_trait;
use std::path::Path;

pub use direct::DirectChannel;
pub use rendered::RenderedView;

/// A way of getting listing pages out of the target site.
#[async_trait]
pub trait AcquisitionStrategy: Send {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Log in. Also used to replace an expired session mid-run.
    async fn authenticate(&mut self) -> Result<Session>;

    /// Reach the listing view and point a handle at its first page.
    async fn navigate(&mut self, path: &NavigationPath) -> Result<ListingHandle>;

    /// Read the page the handle points at.
    async fn read_page(&mut self, handle: &ListingHandle) -> Result<ListingPage>;

    /// Move the handle to the page after `current`.
    async fn advance(&mut self, handle: &mut ListingHandle, current: &ListingPage) -> Result<()>;

    /// Return to the handle's page after a fresh login.
    async fn resume(&mut self, _handle: &ListingHandle) -> Result<()> {
        Ok(())
    }

    /// Leave diagnostics for a failed run next to `path`. Best effort.
    async fn capture_failure(&mut self, _path: &Path) {}

    /// Log out and release the session. Best effort, safe to call twice.
    async fn close(&mut self);
}

/// Build the backend selected by the configuration.
pub async fn connect(config: &ScrapeConfig) -> Result<Box<dyn AcquisitionStrategy>> {
    match config.strategy {
        StrategyKind::Api => Ok(Box::new(DirectChannel::new(config.clone())?)),
        StrategyKind::Rendered => Ok(Box::new(RenderedView::launch(config.clone()).await?)),
    }
}
