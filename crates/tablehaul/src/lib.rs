// Copyright 2026 Tablehaul Contributors
// SPDX-License-Identifier: Apache-2.0

//! Tablehaul: pull a paginated table out of a login-protected web app.
//!
//! A run logs in, walks the menu to the listing, reads every page through
//! either the JSON listing endpoint or a real browser, and writes the
//! deduplicated records to a JSON file.

#![allow(clippy::new_without_default)]

pub mod acquisition;
pub mod config;
pub mod dom;
pub mod error;
pub mod export;
pub mod model;
pub mod normalize;
pub mod paginator;
pub mod progress;
pub mod reader;
pub mod renderer;
pub mod runner;
pub mod session;
pub mod wait;

pub use acquisition::{AcquisitionStrategy, DirectChannel, RenderedView};
pub use config::{Credentials, ExportFormat, ScrapeConfig, StrategyKind};
pub use error::{Result, ScrapeError};
pub use model::{ListingHandle, ListingPage, NavigationPath, Record, ResultSet};
pub use runner::{RunSummary, Runner};
