// Copyright 2026 Tablehaul Contributors
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy for a scrape run.
//!
//! `Auth`, `Navigation`, `Parse`, `Pagination` and `Io` are terminal: they
//! abort the run and no output file is written. `Timeout`, `Transport` and
//! `Browser` are transient and only escape once a retry budget is spent.

use std::fmt;
use std::path::PathBuf;

/// Why a login attempt did not produce a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthFailure {
    /// The site answered with its login surface again or an error message.
    Rejected(String),
    /// Neither the logged-in marker nor an error showed up in time.
    NoSuccessMarker { attempts: u32 },
    /// The login view itself could not be driven (missing inputs, transport).
    Flow(String),
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected(msg) => write!(f, "credentials rejected: {msg}"),
            Self::NoSuccessMarker { attempts } => {
                write!(f, "no logged-in marker after {attempts} attempt(s)")
            }
            Self::Flow(msg) => write!(f, "login flow failed: {msg}"),
        }
    }
}

/// Why a navigation step could not be completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationFailure {
    /// The link or element for the step never appeared.
    ElementNotFound { locator: String },
    /// The element was used but the target view did not become ready.
    Timeout { timeout_ms: u64 },
    /// The target URL could not be built.
    InvalidTarget(String),
}

impl fmt::Display for NavigationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ElementNotFound { locator } => write!(f, "element not found: {locator}"),
            Self::Timeout { timeout_ms } => write!(f, "view not ready after {timeout_ms}ms"),
            Self::InvalidTarget(msg) => write!(f, "invalid target: {msg}"),
        }
    }
}

/// All errors a scrape run can surface.
#[derive(thiserror::Error, Debug)]
pub enum ScrapeError {
    #[error("authentication as '{username}' at {base_url} failed: {failure}")]
    Auth {
        base_url: String,
        username: String,
        failure: AuthFailure,
    },

    #[error("navigation step '{step}' failed: {failure}")]
    Navigation {
        step: String,
        failure: NavigationFailure,
    },

    #[error("page {page} could not be parsed: {reason}")]
    Parse { page: u32, reason: String },

    #[error("pagination stopped at page {page}: {reason}")]
    Pagination { page: u32, reason: String },

    #[error("cannot write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out after {timeout_ms}ms waiting for {what}")]
    Timeout { what: String, timeout_ms: u64 },

    #[error("request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    #[error("browser error: {0}")]
    Browser(String),

    #[error("session expired (redirected to {url})")]
    SessionExpired { url: String },

    #[error("run interrupted after {pages} page(s)")]
    Interrupted { pages: u32 },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ScrapeError {
    /// Whether a bounded retry may clear this error.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Transport { .. } | Self::Browser(_)
        )
    }

    /// Short label used in logs and progress events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Auth { .. } => "auth",
            Self::Navigation { .. } => "navigation",
            Self::Parse { .. } => "parse",
            Self::Pagination { .. } => "pagination",
            Self::Io { .. } => "io",
            Self::Timeout { .. } => "timeout",
            Self::Transport { .. } => "transport",
            Self::Browser(_) => "browser",
            Self::SessionExpired { .. } => "session_expired",
            Self::Interrupted { .. } => "interrupted",
            Self::Config(_) => "config",
        }
    }

    pub(crate) fn browser(err: anyhow::Error) -> Self {
        Self::Browser(format!("{err:#}"))
    }

    pub(crate) fn transport(url: &str, err: impl fmt::Display) -> Self {
        Self::Transport {
            url: url.to_string(),
            reason: err.to_string(),
        }
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, ScrapeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(ScrapeError::Browser("stale".into()).is_transient());
        assert!(ScrapeError::Timeout {
            what: "table".into(),
            timeout_ms: 10
        }
        .is_transient());
        assert!(!ScrapeError::Parse {
            page: 2,
            reason: "no table".into()
        }
        .is_transient());
        assert!(!ScrapeError::SessionExpired { url: "/login".into() }.is_transient());
    }

    #[test]
    fn messages_carry_context() {
        let err = ScrapeError::Navigation {
            step: "Inventory".into(),
            failure: NavigationFailure::ElementNotFound {
                locator: "link \"Inventory\"".into(),
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("Inventory"));
        assert!(msg.contains("element not found"));

        let err = ScrapeError::Auth {
            base_url: "http://localhost:5000".into(),
            username: "demo".into(),
            failure: AuthFailure::NoSuccessMarker { attempts: 2 },
        };
        assert!(err.to_string().contains("2 attempt"));
    }
}
