// Copyright 2026 Tablehaul Contributors
// SPDX-License-Identifier: Apache-2.0

//! Authenticated session state and login outcome detection.
//!
//! The cookie jar itself lives in the backend (reqwest's cookie store or the
//! browser context); [`Session`] records who is logged in where, and since
//! when.

use crate::config::LoginSurface;
use crate::dom;
use chrono::{DateTime, Utc};
use url::Url;

/// A live login, owned by exactly one run.
#[derive(Debug, Clone)]
pub struct Session {
    pub base_url: Url,
    pub username: String,
    pub established_at: DateTime<Utc>,
    /// How many times the run had to log in again after expiry.
    pub reauthentications: u32,
}

impl Session {
    pub fn new(base_url: Url, username: impl Into<String>) -> Self {
        Self {
            base_url,
            username: username.into(),
            established_at: Utc::now(),
            reauthentications: 0,
        }
    }

    /// Mark a fresh login that replaced an expired one.
    pub fn renewed(&mut self) {
        self.reauthentications += 1;
        self.established_at = Utc::now();
    }
}

/// What a page seen right after submitting credentials tells us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Authenticated,
    Rejected(String),
    /// Neither success nor failure is visible yet.
    Pending,
}

/// Whether `url` points at the login view of the surface.
pub fn is_login_url(url: &str, surface: &LoginSurface) -> bool {
    let path = Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.split('?').next().unwrap_or_default().to_string());
    let login = surface.login_path.trim_end_matches('/');
    let path = path.trim_end_matches('/');
    !login.is_empty() && path.ends_with(login)
}

/// Classify the page reached after a login attempt.
///
/// A 200 answer proves nothing on its own: login forms usually re-render with
/// an error message. Success needs both leaving the login view and the
/// logged-in marker. A login view without an error is `Pending`; whether
/// that is final depends on the caller (an HTTP response is, a page that is
/// still loading is not).
pub fn classify_login(final_url: &str, html: &str, surface: &LoginSurface) -> LoginOutcome {
    let on_login = is_login_url(final_url, surface);
    if !on_login && dom::contains(html, &surface.success_marker) {
        return LoginOutcome::Authenticated;
    }
    if let Some(message) = dom::first_text(html, &surface.error_selector) {
        return LoginOutcome::Rejected(message);
    }
    LoginOutcome::Pending
}
