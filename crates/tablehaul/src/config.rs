// Copyright 2026 Tablehaul Contributors
// SPDX-License-Identifier: Apache-2.0

//! Run configuration.
//!
//! The library never reaches for defaults on its own: the CLI (or a test)
//! builds a [`ScrapeConfig`] and hands it to the runner.

use crate::error::{Result, ScrapeError};
use crate::model::{Locator, NavStep, NavigationPath};
use crate::normalize::FieldKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Which backend acquires the listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Call the JSON listing endpoint directly.
    Api,
    /// Drive a real browser and read the rendered table.
    Rendered,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Api => f.write_str("api"),
            Self::Rendered => f.write_str("rendered"),
        }
    }
}

/// Output serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    /// Pretty-printed JSON array.
    #[default]
    Json,
    /// One JSON object per line.
    Jsonl,
}

/// Username and password for the login surface.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Where and how to log in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginSurface {
    pub login_path: String,
    /// Form field names used by the direct POST.
    pub username_field: String,
    pub password_field: String,
    /// Inputs and button used when driving the browser.
    pub username_selector: String,
    pub password_selector: String,
    pub submit_selector: String,
    /// Element only shown to a logged-in user.
    pub success_marker: Locator,
    /// Element that carries a login error message.
    pub error_selector: String,
    /// Best-effort logout target on close.
    pub logout_path: Option<String>,
}

impl Default for LoginSurface {
    fn default() -> Self {
        Self {
            login_path: "/login".into(),
            username_field: "username".into(),
            password_field: "password".into(),
            username_selector: r#"input[name="username"]"#.into(),
            password_selector: r#"input[name="password"]"#.into(),
            submit_selector: r#"button[type="submit"]"#.into(),
            success_marker: Locator::LinkText("Logout".into()),
            error_selector: ".alert-danger, .alert-error, .error, .flash-error".into(),
            logout_path: Some("/logout".into()),
        }
    }
}

/// Selectors for the rendered listing table and its pager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSelectors {
    pub table: String,
    pub header_cells: String,
    pub rows: String,
    pub cells: String,
    pub next: Locator,
    /// Pager item marking the current page.
    pub active_page: String,
}

impl Default for TableSelectors {
    fn default() -> Self {
        Self {
            table: "table".into(),
            header_cells: "thead th".into(),
            rows: "tbody tr".into(),
            cells: "td".into(),
            next: Locator::LinkText("Next".into()),
            active_page: ".pagination .active".into(),
        }
    }
}

/// Shape of the JSON listing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEndpoint {
    pub path: String,
    pub page_param: String,
    pub cursor_param: String,
    pub items_field: String,
    pub page_field: String,
    pub total_pages_field: String,
    pub next_cursor_field: String,
    pub first_page: u32,
}

impl Default for ApiEndpoint {
    fn default() -> Self {
        Self {
            path: "/api/products".into(),
            page_param: "page".into(),
            cursor_param: "cursor".into(),
            items_field: "products".into(),
            page_field: "page".into(),
            total_pages_field: "total_pages".into(),
            next_cursor_field: "next_cursor".into(),
            first_page: 1,
        }
    }
}

/// Header-to-field mapping and value typing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldMapping {
    /// Field that identifies a record across pages.
    pub id_field: String,
    /// Table header → field name. Unlisted headers are snake_cased.
    pub renames: BTreeMap<String, String>,
    /// Field name → value type. Unlisted fields are text.
    pub kinds: BTreeMap<String, FieldKind>,
    /// Headers whose columns are dropped.
    pub ignored_headers: Vec<String>,
}

impl Default for FieldMapping {
    fn default() -> Self {
        let renames = [
            ("ID", "id"),
            ("Name", "name"),
            ("Category", "category"),
            ("Price", "price"),
            ("Stock", "stock"),
        ]
        .into_iter()
        .map(|(h, f)| (h.to_string(), f.to_string()))
        .collect();
        let kinds = [
            ("id", FieldKind::Integer),
            ("price", FieldKind::Currency),
            ("stock", FieldKind::Integer),
        ]
        .into_iter()
        .map(|(f, k)| (f.to_string(), k))
        .collect();
        Self {
            id_field: "id".into(),
            renames,
            kinds,
            ignored_headers: vec!["Actions".into()],
        }
    }
}

/// Bounds on the page loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationPolicy {
    pub max_pages: u32,
    /// Attempts per page read or advance before giving up.
    pub advance_attempts: u32,
    /// Base delay of the exponential backoff between attempts.
    pub backoff_ms: u64,
    /// Re-logins allowed per run after the session expires.
    pub max_reauth: u32,
}

impl Default for PaginationPolicy {
    fn default() -> Self {
        Self {
            max_pages: 50,
            advance_attempts: 3,
            backoff_ms: 500,
            max_reauth: 1,
        }
    }
}

/// Per-operation time limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timeouts {
    /// HTTP round trip or page load.
    pub request_ms: u64,
    /// Waiting for an element or view during navigation.
    pub step_ms: u64,
    pub poll_interval_ms: u64,
    pub step_attempts: u32,
    pub step_pause_ms: u64,
    pub auth_attempts: u32,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            request_ms: 10_000,
            step_ms: 10_000,
            poll_interval_ms: 100,
            step_attempts: 3,
            step_pause_ms: 1_000,
            auth_attempts: 2,
        }
    }
}

impl Timeouts {
    pub fn step(&self) -> Duration {
        Duration::from_millis(self.step_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn step_pause(&self) -> Duration {
        Duration::from_millis(self.step_pause_ms)
    }
}

/// Everything one run needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeConfig {
    pub base_url: String,
    pub credentials: Credentials,
    pub output: PathBuf,
    pub format: ExportFormat,
    pub strategy: StrategyKind,
    pub headless: bool,
    pub navigation: NavigationPath,
    pub login: LoginSurface,
    pub table: TableSelectors,
    pub api: ApiEndpoint,
    pub fields: FieldMapping,
    pub pagination: PaginationPolicy,
    pub timeouts: Timeouts,
    /// Where a failing browser run leaves its screenshot.
    pub screenshot_path: Option<PathBuf>,
    /// Write what was collected to `<output>.partial.json` on interrupt.
    pub flush_partial: bool,
}

impl ScrapeConfig {
    /// A configuration for the inventory listing with stock settings.
    pub fn new(
        base_url: impl Into<String>,
        credentials: Credentials,
        output: impl Into<PathBuf>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            credentials,
            output: output.into(),
            format: ExportFormat::Json,
            strategy: StrategyKind::Api,
            headless: true,
            navigation: NavigationPath::new(vec![
                NavStep::new("Menu", "/menu"),
                NavStep::new("Data Management", "/data-management"),
                NavStep::new("Inventory", "/inventory"),
                NavStep::new("Products", "/products"),
            ]),
            login: LoginSurface::default(),
            table: TableSelectors::default(),
            api: ApiEndpoint::default(),
            fields: FieldMapping::default(),
            pagination: PaginationPolicy::default(),
            timeouts: Timeouts::default(),
            screenshot_path: Some(PathBuf::from("error_screenshot.png")),
            flush_partial: false,
        }
    }

    /// Parsed base URL, with a trailing slash so relative joins keep its path.
    pub fn base_url(&self) -> Result<Url> {
        let raw = if self.base_url.ends_with('/') {
            self.base_url.clone()
        } else {
            format!("{}/", self.base_url)
        };
        Url::parse(&raw).map_err(|e| ScrapeError::Config(format!("base url {:?}: {e}", self.base_url)))
    }

    /// Resolve a site path such as `/login` against the base URL.
    pub fn site_url(&self, path: &str) -> Result<Url> {
        let base = self.base_url()?;
        base.join(path.trim_start_matches('/'))
            .map_err(|e| ScrapeError::Config(format!("path {path:?}: {e}")))
    }

    /// Where a partial result set is flushed on interrupt.
    pub fn partial_output(&self) -> PathBuf {
        let mut name = self
            .output
            .file_stem()
            .map(|s| s.to_os_string())
            .unwrap_or_else(|| "output".into());
        name.push(".partial.json");
        self.output.with_file_name(name)
    }

    /// Reject configurations that cannot possibly run.
    pub fn validate(&self) -> Result<()> {
        let base = self.base_url()?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(ScrapeError::Config(format!(
                "unsupported scheme {:?}",
                base.scheme()
            )));
        }
        if self.credentials.username.is_empty() || self.credentials.password.is_empty() {
            return Err(ScrapeError::Config("username and password are required".into()));
        }
        if self.output.as_os_str().is_empty() {
            return Err(ScrapeError::Config("output path is empty".into()));
        }
        if self.strategy == StrategyKind::Rendered && self.navigation.steps.is_empty() {
            return Err(ScrapeError::Config("navigation path has no steps".into()));
        }
        if self.fields.id_field.is_empty() {
            return Err(ScrapeError::Config("id field is empty".into()));
        }
        if self.pagination.max_pages == 0
            || self.pagination.advance_attempts == 0
            || self.timeouts.step_attempts == 0
            || self.timeouts.auth_attempts == 0
        {
            return Err(ScrapeError::Config(
                "page, attempt and retry bounds must be at least 1".into(),
            ));
        }
        if self.timeouts.request_ms == 0 || self.timeouts.step_ms == 0 {
            return Err(ScrapeError::Config("timeouts must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ScrapeConfig {
        ScrapeConfig::new(
            "http://localhost:5000",
            Credentials::new("demo", "password123"),
            "out/products.json",
        )
    }

    #[test]
    fn site_urls_resolve_under_base_path() {
        let mut cfg = config();
        assert_eq!(
            cfg.site_url("/login").unwrap().as_str(),
            "http://localhost:5000/login"
        );
        cfg.base_url = "http://intranet.local/shop".into();
        assert_eq!(
            cfg.site_url("/api/products").unwrap().as_str(),
            "http://intranet.local/shop/api/products"
        );
    }

    #[test]
    fn validate_rejects_bad_input() {
        assert!(config().validate().is_ok());

        let mut cfg = config();
        cfg.credentials.password.clear();
        assert!(matches!(cfg.validate(), Err(ScrapeError::Config(_))));

        let mut cfg = config();
        cfg.base_url = "ftp://example.com".into();
        assert!(cfg.validate().is_err());

        let mut cfg = config();
        cfg.pagination.max_pages = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn password_is_not_leaked() {
        let cfg = config();
        assert!(!format!("{:?}", cfg.credentials).contains("password123"));
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(!json.contains("password123"));
    }

    #[test]
    fn partial_output_sits_next_to_output() {
        assert_eq!(
            config().partial_output(),
            PathBuf::from("out/products.partial.json")
        );
    }
}
