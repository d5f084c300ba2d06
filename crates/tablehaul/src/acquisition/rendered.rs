// Copyright 2026 Tablehaul Contributors
// SPDX-License-Identifier: Apache-2.0

//! Rendered view: drive a browser tab through the login form and the menu,
//! then read the listing table out of the rendered DOM.

use super::AcquisitionStrategy;
use crate::config::ScrapeConfig;
use crate::dom;
use crate::error::{AuthFailure, NavigationFailure, Result, ScrapeError};
use crate::model::{ListingHandle, ListingPage, Locator, NavStep, NavigationPath, PageKey, RawRow};
use crate::renderer::chromium::ChromiumRenderer;
use crate::renderer::{RenderContext, Renderer};
use crate::session::{self, LoginOutcome, Session};
use crate::wait::poll_until;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// URL and table content seen before a "next" click.
#[derive(Debug, Clone, PartialEq)]
struct ViewState {
    url: String,
    fingerprint: String,
}

/// Backend that reads what a user would see.
pub struct RenderedView {
    config: ScrapeConfig,
    context: Option<Box<dyn RenderContext>>,
    renderer: Option<Arc<dyn Renderer>>,
    /// State before the advance currently being attempted.
    advance_origin: Option<ViewState>,
    logged_in: bool,
}

impl RenderedView {
    /// Launch Chromium and open one tab.
    pub async fn launch(config: ScrapeConfig) -> Result<Self> {
        let renderer = ChromiumRenderer::launch(config.headless)
            .await
            .map_err(ScrapeError::browser)?;
        let renderer: Arc<dyn Renderer> = Arc::new(renderer);
        let context = match renderer.new_context().await {
            Ok(context) => context,
            Err(e) => {
                let _ = renderer.shutdown().await;
                return Err(ScrapeError::browser(e));
            }
        };
        let mut view = Self::with_context(config, context);
        view.renderer = Some(renderer);
        Ok(view)
    }

    /// Drive an already open context. The caller owns the engine behind it.
    pub fn with_context(config: ScrapeConfig, context: Box<dyn RenderContext>) -> Self {
        Self {
            config,
            context: Some(context),
            renderer: None,
            advance_origin: None,
            logged_in: false,
        }
    }

    fn ctx(&self) -> Result<&dyn RenderContext> {
        self.context
            .as_deref()
            .ok_or_else(|| ScrapeError::Browser("browser context already closed".into()))
    }

    fn ctx_mut(&mut self) -> Result<&mut Box<dyn RenderContext>> {
        self.context
            .as_mut()
            .ok_or_else(|| ScrapeError::Browser("browser context already closed".into()))
    }

    async fn open(&mut self, url: &str) -> Result<()> {
        let timeout_ms = self.config.timeouts.request_ms;
        let result = self
            .ctx_mut()?
            .navigate(url, timeout_ms)
            .await
            .map_err(ScrapeError::browser)?;
        debug!(url, final_url = %result.final_url, load_ms = result.load_time_ms, "page loaded");
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        self.ctx()?.get_url().await.map_err(ScrapeError::browser)
    }

    async fn current_html(&self) -> Result<String> {
        self.ctx()?.get_html().await.map_err(ScrapeError::browser)
    }

    async fn view_state(&self) -> Result<ViewState> {
        let url = self.current_url().await?;
        let html = self.current_html().await?;
        let fingerprint = dom::parse_table(&html, &self.config.table)
            .map(|snap| snap.fingerprint())
            .unwrap_or_default();
        Ok(ViewState { url, fingerprint })
    }

    /// Wait until an element matching `locator` is in the page.
    async fn wait_for(&self, what: &str, locator: &Locator) -> Result<()> {
        let ctx = self.ctx()?;
        let t = &self.config.timeouts;
        poll_until(what, t.step(), t.poll_interval(), || async move {
            let html = ctx.get_html().await.ok()?;
            dom::contains(&html, locator).then_some(())
        })
        .await
    }

    fn auth_error(&self, failure: AuthFailure) -> ScrapeError {
        ScrapeError::Auth {
            base_url: self.config.base_url.clone(),
            username: self.config.credentials.username.clone(),
            failure,
        }
    }

    /// One pass over the login form. `Ok(None)` means no verdict in time.
    async fn try_login(&mut self, login_url: &str) -> Result<Option<LoginOutcome>> {
        let login = self.config.login.clone();
        let creds = self.config.credentials.clone();
        let flow = |msg: String| AuthFailure::Flow(msg);

        self.open(login_url).await?;
        self.wait_for("login form", &Locator::Css(login.username_selector.clone()))
            .await
            .map_err(|_| self.auth_error(flow("login form did not appear".into())))?;

        let ctx = self.ctx_mut()?;
        let filled_user = ctx
            .fill(&login.username_selector, &creds.username)
            .await
            .map_err(ScrapeError::browser)?;
        let filled_pass = ctx
            .fill(&login.password_selector, &creds.password)
            .await
            .map_err(ScrapeError::browser)?;
        if !(filled_user && filled_pass) {
            return Err(self.auth_error(flow("credential inputs not found".into())));
        }
        let submitted = ctx
            .click(&Locator::Css(login.submit_selector.clone()))
            .await
            .map_err(ScrapeError::browser)?;
        if !submitted {
            return Err(self.auth_error(flow(format!(
                "submit control {:?} not found",
                login.submit_selector
            ))));
        }

        let ctx = self.ctx()?;
        let t = &self.config.timeouts;
        let surface = &login;
        let outcome = poll_until("login outcome", t.step(), t.poll_interval(), || async move {
            let url = ctx.get_url().await.ok()?;
            let html = ctx.get_html().await.ok()?;
            match session::classify_login(&url, &html, surface) {
                LoginOutcome::Pending => None,
                decided => Some(decided),
            }
        })
        .await;
        match outcome {
            Ok(decided) => Ok(Some(decided)),
            Err(ScrapeError::Timeout { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Follow one menu link and wait for its view.
    async fn follow(&mut self, step: &NavStep) -> Result<()> {
        let nav_error = |failure| ScrapeError::Navigation {
            step: step.label.clone(),
            failure,
        };
        let link = Locator::LinkText(step.label.clone());

        self.wait_for(&format!("link {:?}", step.label), &link)
            .await
            .map_err(|_| {
                nav_error(NavigationFailure::ElementNotFound {
                    locator: link.to_string(),
                })
            })?;
        if !self.ctx_mut()?.click(&link).await.map_err(ScrapeError::browser)? {
            return Err(nav_error(NavigationFailure::ElementNotFound {
                locator: link.to_string(),
            }));
        }

        let target = self
            .config
            .site_url(&step.view)
            .map_err(|e| nav_error(NavigationFailure::InvalidTarget(e.to_string())))?;
        let want = target.path().trim_end_matches('/').to_string();
        let ctx = self.ctx()?;
        let t = &self.config.timeouts;
        let want = want.as_str();
        poll_until(&format!("view {}", step.view), t.step(), t.poll_interval(), || async move {
            let url = ctx.get_url().await.ok()?;
            let path = Url::parse(&url).ok()?.path().trim_end_matches('/').to_string();
            (path == want).then_some(())
        })
        .await
        .map_err(|_| {
            nav_error(NavigationFailure::Timeout {
                timeout_ms: self.config.timeouts.step_ms,
            })
        })
    }
}

fn query_page(url: &str, param: &str) -> Option<u32> {
    Url::parse(url)
        .ok()?
        .query_pairs()
        .find(|(k, _)| k == param)
        .and_then(|(_, v)| v.parse().ok())
}

#[async_trait]
impl AcquisitionStrategy for RenderedView {
    fn name(&self) -> &'static str {
        "rendered"
    }

    async fn authenticate(&mut self) -> Result<Session> {
        let login_url = self.config.site_url(&self.config.login.login_path)?;
        let attempts = self.config.timeouts.auth_attempts;

        for attempt in 1..=attempts {
            debug!(attempt, url = %login_url, "submitting login form");
            match self.try_login(login_url.as_str()).await {
                Ok(Some(LoginOutcome::Authenticated)) => {
                    info!(username = %self.config.credentials.username, "logged in");
                    self.logged_in = true;
                    return Ok(Session::new(
                        self.config.base_url()?,
                        self.config.credentials.username.clone(),
                    ));
                }
                Ok(Some(LoginOutcome::Rejected(message))) => {
                    return Err(self.auth_error(AuthFailure::Rejected(message)));
                }
                Ok(_) => warn!("no logged-in marker after login (attempt {attempt}/{attempts})"),
                Err(e) if e.is_transient() && attempt < attempts => {
                    warn!("login attempt {attempt}/{attempts} failed: {e}");
                }
                Err(e @ ScrapeError::Auth { .. }) => return Err(e),
                Err(e) => return Err(self.auth_error(AuthFailure::Flow(e.to_string()))),
            }
        }
        Err(self.auth_error(AuthFailure::NoSuccessMarker { attempts }))
    }

    async fn navigate(&mut self, path: &NavigationPath) -> Result<ListingHandle> {
        let attempts = self.config.timeouts.step_attempts;
        for step in &path.steps {
            let mut attempt = 1;
            loop {
                match self.follow(step).await {
                    Ok(()) => break,
                    Err(e) if attempt < attempts => {
                        warn!("step '{}' failed (attempt {attempt}/{attempts}): {e}", step.label);
                        tokio::time::sleep(self.config.timeouts.step_pause()).await;
                        attempt += 1;
                    }
                    Err(e) => return Err(e),
                }
            }
            info!(step = %step.label, "navigated");
        }

        let table = Locator::Css(self.config.table.table.clone());
        self.wait_for("listing table", &table)
            .await
            .map_err(|_| ScrapeError::Navigation {
                step: path
                    .steps
                    .last()
                    .map(|s| s.label.clone())
                    .unwrap_or_else(|| "listing".into()),
                failure: NavigationFailure::ElementNotFound {
                    locator: table.to_string(),
                },
            })?;

        let url = self.current_url().await?;
        let url = Url::parse(&url).map_err(|e| ScrapeError::Navigation {
            step: "listing".into(),
            failure: NavigationFailure::InvalidTarget(format!("{url}: {e}")),
        })?;
        let first = query_page(url.as_str(), &self.config.api.page_param).unwrap_or(1);
        Ok(ListingHandle::new(url, first))
    }

    async fn read_page(&mut self, handle: &ListingHandle) -> Result<ListingPage> {
        let url = self.current_url().await?;
        if session::is_login_url(&url, &self.config.login) {
            return Err(ScrapeError::SessionExpired { url });
        }
        let html = self.current_html().await?;
        let snap = dom::parse_table(&html, &self.config.table).map_err(|reason| {
            ScrapeError::Parse {
                page: handle.page,
                reason,
            }
        })?;

        let index = snap
            .active_page
            .or_else(|| query_page(&url, &self.config.api.page_param))
            .unwrap_or(handle.page);
        debug!(page = index, rows = snap.rows.len(), next = ?snap.next, "read table");

        Ok(ListingPage {
            key: PageKey::Index(index),
            has_next: snap.next.has_next(),
            headers: snap.headers,
            rows: snap.rows.into_iter().map(RawRow::Cells).collect(),
        })
    }

    async fn advance(&mut self, handle: &mut ListingHandle, _current: &ListingPage) -> Result<()> {
        let origin = match &self.advance_origin {
            Some(origin) => origin.clone(),
            None => {
                let state = self.view_state().await?;
                self.advance_origin = Some(state.clone());
                state
            }
        };

        // A retry after a click that did land must not click again.
        let now = self.view_state().await?;
        if now == origin {
            let next = self.config.table.next.clone();
            if !self.ctx_mut()?.click(&next).await.map_err(ScrapeError::browser)? {
                return Err(ScrapeError::Browser(format!("{next} vanished before click")));
            }
        }

        let login = self.config.login.clone();
        let table = self.config.table.clone();
        let ctx = self.ctx()?;
        let t = &self.config.timeouts;
        let origin_ref = &origin;
        let (login, table) = (&login, &table);
        let reached = poll_until("refreshed listing", t.step(), t.poll_interval(), || async move {
            let url = ctx.get_url().await.ok()?;
            if session::is_login_url(&url, login) {
                return Some(Err(url));
            }
            let html = ctx.get_html().await.ok()?;
            let fingerprint = dom::parse_table(&html, table)
                .map(|snap| snap.fingerprint())
                .unwrap_or_default();
            (url != origin_ref.url || fingerprint != origin_ref.fingerprint).then_some(Ok(url))
        })
        .await?;

        let url = reached.map_err(|url| ScrapeError::SessionExpired { url })?;
        self.advance_origin = None;
        if let Ok(url) = Url::parse(&url) {
            handle.url = url;
        }
        handle.page += 1;
        Ok(())
    }

    async fn resume(&mut self, handle: &ListingHandle) -> Result<()> {
        self.advance_origin = None;
        info!(url = %handle.url, "returning to listing page");
        self.open(handle.url.as_str()).await?;
        self.wait_for("listing table", &Locator::Css(self.config.table.table.clone()))
            .await
    }

    async fn capture_failure(&mut self, path: &Path) {
        let Ok(ctx) = self.ctx() else { return };
        match ctx.screenshot(path).await {
            Ok(()) => info!(path = %path.display(), "saved failure screenshot"),
            Err(e) => warn!("could not save screenshot: {e:#}"),
        }
        if let Ok(html) = ctx.get_html().await {
            let html_path = path.with_extension("html");
            if let Err(e) = tokio::fs::write(&html_path, html).await {
                warn!("could not save page HTML to {}: {e}", html_path.display());
            }
        }
    }

    async fn close(&mut self) {
        if std::mem::take(&mut self.logged_in) {
            if let Some(path) = self.config.login.logout_path.clone() {
                match self.config.site_url(&path) {
                    Ok(url) => match self.open(url.as_str()).await {
                        Ok(()) => debug!("logged out"),
                        Err(e) => warn!("logout failed: {e}"),
                    },
                    Err(e) => warn!("logout skipped: {e}"),
                }
            }
        }
        if let Some(ctx) = self.context.take() {
            if let Err(e) = ctx.close().await {
                warn!("closing browser context failed: {e:#}");
            }
        }
        if let Some(renderer) = self.renderer.take() {
            if let Err(e) = renderer.shutdown().await {
                warn!("browser shutdown failed: {e:#}");
            }
        }
    }
}
