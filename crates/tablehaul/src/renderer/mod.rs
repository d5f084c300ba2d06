//! Renderer abstraction for browser-driven acquisition.
//!
//! Defines the `Renderer` and `RenderContext` traits that abstract over
//! the browser engine (currently Chromium via chromiumoxide). Tests drive
//! the rendered backend through an in-process `RenderContext`.

pub mod chromium;

use crate::model::Locator;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Result of navigating to a URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
    /// The final URL after any redirects.
    pub final_url: String,
    /// Time taken to load the page in milliseconds.
    pub load_time_ms: u64,
}

/// A browser engine that can create rendering contexts.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Create a new browser context (tab).
    async fn new_context(&self) -> Result<Box<dyn RenderContext>>;
    /// Shut down the browser engine.
    async fn shutdown(&self) -> Result<()>;
    /// Number of currently active contexts.
    fn active_contexts(&self) -> usize;
}

/// A single browser context (tab) holding the session cookies.
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Navigate to a URL with a timeout.
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult>;
    /// Execute JavaScript in the page context and return the result.
    async fn execute_js(&self, script: &str) -> Result<serde_json::Value>;
    /// Get the full page HTML.
    async fn get_html(&self) -> Result<String>;
    /// Get the current URL.
    async fn get_url(&self) -> Result<String>;
    /// Click the first element matching `locator`. `false` if none matched.
    async fn click(&mut self, locator: &Locator) -> Result<bool>;
    /// Type `value` into the input matching `selector`. `false` if none matched.
    async fn fill(&mut self, selector: &str, value: &str) -> Result<bool>;
    /// Write a PNG screenshot of the current page.
    async fn screenshot(&self, path: &Path) -> Result<()>;
    /// Close this context.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// JS expression evaluating to the first element matching `locator`, or null.
pub fn element_expr(locator: &Locator) -> String {
    match locator {
        Locator::Css(selector) => format!("document.querySelector({})", js_string(selector)),
        Locator::LinkText(text) => format!(
            "Array.from(document.querySelectorAll('a, button, input[type=submit]'))\
             .find(e => (e.innerText || e.value || '').trim().replace(/\\s+/g, ' ').toLowerCase() === {})",
            js_string(&crate::dom::normalize_label(text))
        ),
    }
}

/// Script that clicks the element and reports whether it existed.
pub fn click_script(locator: &Locator) -> String {
    format!(
        "(() => {{ const el = {}; if (!el) return false; \
         el.scrollIntoView({{block: 'center'}}); el.click(); return true; }})()",
        element_expr(locator)
    )
}

/// Script that sets an input value the way typing would.
pub fn fill_script(selector: &str, value: &str) -> String {
    format!(
        "(() => {{ const el = document.querySelector({}); if (!el) return false; \
         el.focus(); el.value = {}; \
         el.dispatchEvent(new Event('input', {{bubbles: true}})); \
         el.dispatchEvent(new Event('change', {{bubbles: true}})); return true; }})()",
        js_string(selector),
        js_string(value)
    )
}

fn js_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}
