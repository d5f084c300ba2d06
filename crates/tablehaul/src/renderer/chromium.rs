//! Chromium driven over CDP with chromiumoxide.
//!
//! One browser process per run, one tab per context. Clicks and form input
//! go through small scripts so link-text locators behave the same as in
//! [`crate::dom`].

use super::{click_script, fill_script, NavigationResult, RenderContext, Renderer};
use crate::model::Locator;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Environment variable naming an explicit browser binary.
pub const CHROMIUM_PATH_ENV: &str = "TABLEHAUL_CHROMIUM_PATH";

const BINARY_NAMES: [&str; 4] = ["google-chrome", "chromium", "chromium-browser", "chrome"];

/// Locate a Chromium-family browser.
///
/// Checked in order: the `TABLEHAUL_CHROMIUM_PATH` override, a browser
/// unpacked under the user cache dir (`<cache>/tablehaul/chromium`), the
/// `PATH`, and on macOS the stock Chrome bundle.
pub fn find_chromium() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(CHROMIUM_PATH_ENV).map(PathBuf::from) {
        if path.is_file() {
            return Some(path);
        }
        tracing::warn!(path = %path.display(), "{CHROMIUM_PATH_ENV} does not point at a file");
    }

    let cached = dirs::cache_dir().map(|cache| cache.join("tablehaul").join("chromium"));
    let mut unpacked = cached.into_iter().flat_map(|root| {
        [
            root.join("chrome-linux64/chrome"),
            root.join("chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
            root.join("chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
        ]
    });
    if let Some(path) = unpacked.find(|p| p.is_file()) {
        return Some(path);
    }

    if let Some(path) = BINARY_NAMES.iter().find_map(|name| which::which(name).ok()) {
        return Some(path);
    }

    let bundle = PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
    (cfg!(target_os = "macos") && bundle.is_file()).then_some(bundle)
}

/// A launched browser process.
pub struct ChromiumRenderer {
    browser: Mutex<Browser>,
    events: JoinHandle<()>,
    open_tabs: Arc<AtomicUsize>,
}

impl ChromiumRenderer {
    /// Start the browser. `headless = false` opens a visible window, which
    /// helps when a selector needs debugging.
    pub async fn launch(headless: bool) -> Result<Self> {
        let binary = find_chromium().ok_or_else(|| {
            anyhow!("no Chromium or Chrome found; install one or set {CHROMIUM_PATH_ENV}")
        })?;
        tracing::debug!(binary = %binary.display(), headless, "launching browser");

        let builder = BrowserConfig::builder()
            .chrome_executable(binary)
            .window_size(1280, 900)
            .args(["--no-sandbox", "--disable-gpu", "--disable-dev-shm-usage"]);
        let builder = if headless {
            builder.arg("--headless=new")
        } else {
            builder.with_head()
        };
        let config = builder.build().map_err(|e| anyhow!("browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("browser did not start")?;
        // CDP messages only flow while the handler stream is polled.
        let events = tokio::spawn(async move { while handler.next().await.is_some() {} });

        Ok(Self {
            browser: Mutex::new(browser),
            events,
            open_tabs: Arc::new(AtomicUsize::new(0)),
        })
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        let page = {
            let browser = self.browser.lock().await;
            browser.new_page("about:blank").await.context("opening a tab")?
        };
        self.open_tabs.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(ChromiumContext {
            page,
            open_tabs: Arc::clone(&self.open_tabs),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        let mut browser = self.browser.lock().await;
        let closed = browser.close().await.context("closing browser");
        let _ = browser.wait().await;
        self.events.abort();
        closed.map(|_| ())
    }

    fn active_contexts(&self) -> usize {
        self.open_tabs.load(Ordering::Relaxed)
    }
}

/// One browser tab.
pub struct ChromiumContext {
    page: Page,
    open_tabs: Arc<AtomicUsize>,
}

impl ChromiumContext {
    async fn eval_flag(&self, script: &str) -> Result<bool> {
        Ok(matches!(self.execute_js(script).await?, serde_json::Value::Bool(true)))
    }
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult> {
        let started = Instant::now();
        tokio::time::timeout(Duration::from_millis(timeout_ms), self.page.goto(url))
            .await
            .map_err(|_| anyhow!("loading {url} took longer than {timeout_ms}ms"))?
            .with_context(|| format!("loading {url}"))?;

        let final_url = self.get_url().await?;
        Ok(NavigationResult {
            final_url: if final_url.is_empty() { url.to_string() } else { final_url },
            load_time_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn execute_js(&self, script: &str) -> Result<serde_json::Value> {
        self.page
            .evaluate(script)
            .await
            .context("evaluating script")?
            .into_value()
            .map_err(|e| anyhow!("script result is not JSON: {e:?}"))
    }

    async fn get_html(&self) -> Result<String> {
        self.page.content().await.context("reading page HTML")
    }

    async fn get_url(&self) -> Result<String> {
        Ok(self
            .page
            .url()
            .await
            .context("reading page URL")?
            .unwrap_or_default())
    }

    async fn click(&mut self, locator: &Locator) -> Result<bool> {
        self.eval_flag(&click_script(locator))
            .await
            .with_context(|| format!("clicking {locator}"))
    }

    async fn fill(&mut self, selector: &str, value: &str) -> Result<bool> {
        self.eval_flag(&fill_script(selector, value))
            .await
            .with_context(|| format!("typing into {selector:?}"))
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        let params = ScreenshotParams::builder().full_page(true).build();
        self.page
            .save_screenshot(params, path)
            .await
            .with_context(|| format!("writing screenshot {}", path.display()))
            .map(|_| ())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.open_tabs.fetch_sub(1, Ordering::Relaxed);
        self.page.close().await.context("closing tab")
    }
}
