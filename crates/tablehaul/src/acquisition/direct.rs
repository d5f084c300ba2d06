// Copyright 2026 Tablehaul Contributors
// SPDX-License-Identifier: Apache-2.0

//! Direct channel: log in with a form POST, then page through the JSON
//! listing endpoint with the session cookie.

use super::http_client::{HttpClient, HttpResponse};
use super::AcquisitionStrategy;
use crate::config::ScrapeConfig;
use crate::error::{AuthFailure, NavigationFailure, Result, ScrapeError};
use crate::model::{ListingHandle, ListingPage, NavigationPath, PageKey, RawRow};
use crate::session::{self, LoginOutcome, Session};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

/// Backend that bypasses rendering.
pub struct DirectChannel {
    config: ScrapeConfig,
    client: HttpClient,
    /// Cursor announced by the last page read, consumed by `advance`.
    next_cursor: Option<String>,
    logged_in: bool,
}

impl DirectChannel {
    pub fn new(config: ScrapeConfig) -> Result<Self> {
        let client = HttpClient::new(config.timeouts.request_ms)
            .map_err(|e| ScrapeError::Config(format!("{e:#}")))?;
        Ok(Self::with_client(config, client))
    }

    /// Use a preconfigured client (retry policy, timeouts).
    pub fn with_client(config: ScrapeConfig, client: HttpClient) -> Self {
        Self {
            config,
            client,
            next_cursor: None,
            logged_in: false,
        }
    }

    fn auth_error(&self, failure: AuthFailure) -> ScrapeError {
        ScrapeError::Auth {
            base_url: self.config.base_url.clone(),
            username: self.config.credentials.username.clone(),
            failure,
        }
    }

    fn page_url(&self, handle: &ListingHandle) -> Url {
        let api = &self.config.api;
        let mut url = handle.url.clone();
        match &handle.cursor {
            Some(cursor) => {
                url.query_pairs_mut().append_pair(&api.cursor_param, cursor);
            }
            None => {
                url.query_pairs_mut()
                    .append_pair(&api.page_param, &handle.page.to_string());
            }
        }
        url
    }

    /// Turn a listing response into a page, or explain why it is not one.
    fn decode_page(&mut self, handle: &ListingHandle, resp: &HttpResponse) -> Result<ListingPage> {
        let api = &self.config.api;
        let parse_error = |reason: String| ScrapeError::Parse {
            page: handle.page,
            reason,
        };

        let body: Value = serde_json::from_str(&resp.body)
            .map_err(|e| {
                parse_error(format!(
                    "listing response ({}) is not JSON: {e}",
                    resp.content_type.as_deref().unwrap_or("no content type")
                ))
            })?;
        let items = body
            .get(&api.items_field)
            .and_then(Value::as_array)
            .ok_or_else(|| parse_error(format!("no '{}' array in listing response", api.items_field)))?;

        let rows = items
            .iter()
            .map(|item| match item {
                Value::Object(map) => RawRow::Object(map.clone()),
                other => RawRow::Other(other.clone()),
            })
            .collect();

        let reported_page = body
            .get(&api.page_field)
            .and_then(Value::as_u64)
            .map(|p| p as u32);
        let key = match &handle.cursor {
            Some(cursor) => PageKey::Cursor(cursor.clone()),
            None => PageKey::Index(reported_page.unwrap_or(handle.page)),
        };

        self.next_cursor = None;
        let has_next = match body.get(&api.next_cursor_field) {
            Some(Value::String(cursor)) if !cursor.is_empty() => {
                self.next_cursor = Some(cursor.clone());
                true
            }
            Some(Value::Null) => false,
            _ => match (
                reported_page.unwrap_or(handle.page),
                body.get(&api.total_pages_field).and_then(Value::as_u64),
            ) {
                (page, Some(total)) => u64::from(page) < total,
                (_, None) => {
                    debug!("listing response carries no pagination metadata; treating as last page");
                    false
                }
            },
        };

        Ok(ListingPage {
            key,
            headers: Vec::new(),
            rows,
            has_next,
        })
    }
}

#[async_trait]
impl AcquisitionStrategy for DirectChannel {
    fn name(&self) -> &'static str {
        "api"
    }

    async fn authenticate(&mut self) -> Result<Session> {
        let login = &self.config.login;
        let login_url = self.config.site_url(&login.login_path)?;
        let attempts = self.config.timeouts.auth_attempts;
        let form = [
            (login.username_field.as_str(), self.config.credentials.username.as_str()),
            (login.password_field.as_str(), self.config.credentials.password.as_str()),
        ];

        for attempt in 1..=attempts {
            debug!(attempt, url = %login_url, "posting credentials");
            let resp = match self.client.post_form(login_url.as_str(), &form).await {
                Ok(resp) => resp,
                Err(e) if attempt < attempts => {
                    warn!("login request failed (attempt {attempt}/{attempts}): {e:#}");
                    continue;
                }
                Err(e) => return Err(self.auth_error(AuthFailure::Flow(format!("{e:#}")))),
            };

            match session::classify_login(&resp.final_url, &resp.body, login) {
                LoginOutcome::Authenticated => {
                    info!(username = %self.config.credentials.username, "logged in");
                    self.logged_in = true;
                    return Ok(Session::new(
                        self.config.base_url()?,
                        self.config.credentials.username.clone(),
                    ));
                }
                LoginOutcome::Rejected(message) => {
                    return Err(self.auth_error(AuthFailure::Rejected(message)));
                }
                LoginOutcome::Pending if matches!(resp.status, 401 | 403) => {
                    return Err(self.auth_error(AuthFailure::Rejected(format!(
                        "HTTP {}",
                        resp.status
                    ))));
                }
                LoginOutcome::Pending => {
                    warn!(
                        status = resp.status,
                        final_url = %resp.final_url,
                        "no logged-in marker after login (attempt {attempt}/{attempts})"
                    );
                }
            }
        }
        Err(self.auth_error(AuthFailure::NoSuccessMarker { attempts }))
    }

    async fn navigate(&mut self, _path: &NavigationPath) -> Result<ListingHandle> {
        let url = self
            .config
            .site_url(&self.config.api.path)
            .map_err(|e| ScrapeError::Navigation {
                step: "listing endpoint".into(),
                failure: NavigationFailure::InvalidTarget(e.to_string()),
            })?;
        debug!(%url, "listing endpoint");
        self.next_cursor = None;
        Ok(ListingHandle::new(url, self.config.api.first_page))
    }

    async fn read_page(&mut self, handle: &ListingHandle) -> Result<ListingPage> {
        let url = self.page_url(handle);
        debug!(%url, "fetching listing page");
        let resp = self
            .client
            .get(url.as_str())
            .await
            .map_err(|e| ScrapeError::transport(url.as_str(), format!("{e:#}")))?;

        if matches!(resp.status, 401 | 403)
            || session::is_login_url(&resp.final_url, &self.config.login)
        {
            return Err(ScrapeError::SessionExpired {
                url: resp.final_url,
            });
        }
        match resp.status {
            200..=299 => self.decode_page(handle, &resp),
            404 => Err(ScrapeError::Navigation {
                step: "listing endpoint".into(),
                failure: NavigationFailure::InvalidTarget(format!("{url} answered 404")),
            }),
            status if status >= 500 || status == 429 => Err(ScrapeError::transport(
                url.as_str(),
                format!("HTTP {status}"),
            )),
            status => Err(ScrapeError::Parse {
                page: handle.page,
                reason: format!("listing endpoint answered HTTP {status}"),
            }),
        }
    }

    async fn advance(&mut self, handle: &mut ListingHandle, _current: &ListingPage) -> Result<()> {
        if let Some(cursor) = self.next_cursor.take() {
            handle.cursor = Some(cursor);
        }
        handle.page += 1;
        Ok(())
    }

    async fn close(&mut self) {
        if !std::mem::take(&mut self.logged_in) {
            return;
        }
        let Some(path) = self.config.login.logout_path.clone() else {
            return;
        };
        match self.config.site_url(&path) {
            Ok(url) => match self.client.get(url.as_str()).await {
                Ok(resp) => debug!(status = resp.status, "logged out"),
                Err(e) => warn!("logout failed: {e:#}"),
            },
            Err(e) => warn!("logout skipped: {e}"),
        }
    }
}
