//! Demo inventory site used by the integration tests.
//!
//! The same catalogue is served two ways: as an HTTP site with a JSON
//! listing endpoint (wiremock) for the direct channel, and as an in-process
//! browser tab implementing `RenderContext` for the rendered view.

#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tablehaul::config::LoginSurface;
use tablehaul::model::Locator;
use tablehaul::renderer::{NavigationResult, RenderContext};
use tablehaul::{Credentials, ScrapeConfig};
use url::Url;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const USERNAME: &str = "demo";
pub const PASSWORD: &str = "password123";

#[derive(Debug, Clone)]
pub struct Product {
    pub id: u32,
    pub name: String,
    pub category: String,
    pub price: f64,
    pub stock: u32,
}

/// `n` products with distinct ids and mixed categories.
pub fn catalogue(n: u32) -> Vec<Product> {
    const CATEGORIES: [&str; 3] = ["Electronics", "Accessories", "Office"];
    (1..=n)
        .map(|id| Product {
            id,
            name: format!("Product {id}"),
            category: CATEGORIES[(id % 3) as usize].to_string(),
            // Parsed from text so both renderings round-trip to the same f64.
            price: format!("{}.99", id * 10).parse().expect("decimal literal"),
            stock: id * 7 % 50,
        })
        .collect()
}

pub fn product_json(p: &Product) -> Value {
    json!({
        "id": p.id,
        "name": p.name,
        "category": p.category,
        "price": p.price,
        "stock": p.stock,
    })
}

pub fn pages(products: &[Product], per_page: usize) -> Vec<&[Product]> {
    products.chunks(per_page.max(1)).collect()
}

/// Configuration pointed at `base_url` with short timeouts.
pub fn test_config(base_url: &str, output: &Path) -> ScrapeConfig {
    let mut config = ScrapeConfig::new(base_url, Credentials::new(USERNAME, PASSWORD), output);
    config.timeouts.request_ms = 2_000;
    config.timeouts.step_ms = 300;
    config.timeouts.poll_interval_ms = 5;
    config.timeouts.step_pause_ms = 1;
    config.pagination.backoff_ms = 1;
    config.screenshot_path = Some(output.with_file_name("error_screenshot.png"));
    config
}

// ---------------------------------------------------------------------------
// HTTP site for the direct channel
// ---------------------------------------------------------------------------

const LOGIN_FORM: &str = r#"<html><body><form method="post" action="/login">
<input name="username"><input name="password" type="password">
<button type="submit">Login</button></form></body></html>"#;

const DASHBOARD: &str = r#"<html><body><h1>Welcome, demo</h1>
<a href="/menu">Menu</a> <a href="/logout">Logout</a></body></html>"#;

/// Cookie the demo site sets on a successful login.
pub const SESSION_COOKIE: &str = "session=demo-session";

/// Mount login, dashboard, logout and `/api/products?page=N` for `products`.
pub async fn mount_api_site(server: &MockServer, products: &[Product], per_page: usize) {
    mount_login(server).await;

    let chunks = pages(products, per_page);
    let total_pages = chunks.len().max(1);
    for page in 1..=total_pages {
        let items: Vec<Value> = chunks
            .get(page - 1)
            .map(|chunk| chunk.iter().map(product_json).collect())
            .unwrap_or_default();
        mount_listing_page(server, page, total_pages, items).await;
    }
}

/// One `/api/products?page=N` response, served only with the session cookie.
pub async fn mount_listing_page(server: &MockServer, page: usize, total_pages: usize, items: Vec<Value>) {
    Mock::given(method("GET"))
        .and(path("/api/products"))
        .and(query_param("page", page.to_string()))
        .and(header("cookie", SESSION_COOKIE))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "products": items,
            "page": page,
            "total_pages": total_pages,
        })))
        .mount(server)
        .await;
}

/// Login form, dashboard and logout. Listing requests without the session
/// cookie answer 401.
pub async fn mount_login(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/products"))
        .respond_with(ResponseTemplate::new(401))
        .with_priority(10)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .and(body_string_contains(format!("password={PASSWORD}")))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("location", "/dashboard")
                .insert_header("set-cookie", format!("{SESSION_COOKIE}; Path=/")),
        )
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            r#"<div class="alert alert-danger">Invalid username or password</div>{LOGIN_FORM}"#
        )))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LOGIN_FORM))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/dashboard"))
        .respond_with(ResponseTemplate::new(200).set_body_string(DASHBOARD))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/logout"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/login"))
        .mount(server)
        .await;
}

// ---------------------------------------------------------------------------
// Browser tab for the rendered view
// ---------------------------------------------------------------------------

/// Ways the rendered demo site can misbehave.
#[derive(Debug, Clone, Default)]
pub struct Quirks {
    /// "Next" stays enabled forever, past the end of the data.
    pub endless_next: bool,
    /// "Next" on the last page links back to page 1.
    pub next_wraps: bool,
    /// Menu link that is never rendered.
    pub missing_link: Option<String>,
    /// The session expires when this page is first requested.
    pub expire_on_page: Option<u32>,
    /// (page, row index) rendered without its stock cell.
    pub short_rows: Vec<(u32, usize)>,
    /// Pages whose every row is missing a cell.
    pub broken_pages: Vec<u32>,
}

#[derive(Debug)]
struct TabState {
    url: Url,
    logged_in: bool,
    login_error: bool,
    expired: bool,
    inputs: HashMap<String, String>,
}

/// The rendered site, shared between a tab and the test inspecting it.
pub struct FakeSite {
    base: Url,
    products: Vec<Product>,
    per_page: usize,
    quirks: Quirks,
    state: Mutex<TabState>,
    pub screenshots: Mutex<Vec<PathBuf>>,
    pub visits: Mutex<Vec<String>>,
}

impl FakeSite {
    pub fn new(products: Vec<Product>, per_page: usize, quirks: Quirks) -> Arc<Self> {
        let base = Url::parse("http://demo.test/").expect("static url");
        Arc::new(Self {
            state: Mutex::new(TabState {
                url: base.join("about:blank").unwrap_or_else(|_| base.clone()),
                logged_in: false,
                login_error: false,
                expired: false,
                inputs: HashMap::new(),
            }),
            base,
            products,
            per_page,
            quirks,
            screenshots: Mutex::new(Vec::new()),
            visits: Mutex::new(Vec::new()),
        })
    }

    pub fn base_url(&self) -> &str {
        self.base.as_str()
    }

    /// A tab onto this site.
    pub fn tab(self: &Arc<Self>) -> Box<dyn RenderContext> {
        Box::new(FakeTab(Arc::clone(self)))
    }

    pub fn logged_in(&self) -> bool {
        self.state.lock().unwrap().logged_in
    }

    fn total_pages(&self) -> u32 {
        (self.products.len().div_ceil(self.per_page.max(1))).max(1) as u32
    }

    /// Route a request the way the demo app would, following redirects.
    fn go(&self, state: &mut TabState, target: Url) {
        self.visits.lock().unwrap().push(target.to_string());
        let path = target.path().to_string();
        if path == "/logout" {
            state.logged_in = false;
            state.url = self.base.join("/login").unwrap_or(target);
            return;
        }
        if path != "/login" && !state.logged_in {
            state.url = self.base.join("/login").unwrap_or(target);
            return;
        }
        if path == "/products" {
            let page = page_of(&target);
            if Some(page) == self.quirks.expire_on_page && !state.expired {
                state.expired = true;
                state.logged_in = false;
                state.url = self
                    .base
                    .join(&format!("/login?next=%2Fproducts%3Fpage%3D{page}"))
                    .unwrap_or(target);
                return;
            }
        }
        if path == "/login" {
            state.inputs.clear();
        }
        state.url = target;
    }

    fn render(&self, state: &TabState) -> String {
        let nav = r#"<nav><a href="/menu">Menu</a> <a href="/logout">Logout</a></nav>"#;
        let link = |label: &str, href: &str| {
            if self.quirks.missing_link.as_deref() == Some(label) {
                String::new()
            } else {
                format!(r#"<a class="btn" href="{href}">{label}</a>"#)
            }
        };
        match state.url.path() {
            "/login" => {
                let error = if state.login_error {
                    r#"<div class="alert alert-danger">Invalid username or password</div>"#
                } else {
                    ""
                };
                format!("<html><body>{error}{LOGIN_FORM}</body></html>")
            }
            "/dashboard" => DASHBOARD.to_string(),
            "/menu" => format!(
                "<html><body>{nav}<h1>Menu</h1>{}</body></html>",
                link("Data Management", "/data-management")
            ),
            "/data-management" => format!(
                "<html><body>{nav}<h1>Data Management</h1>{}</body></html>",
                link("Inventory", "/inventory")
            ),
            "/inventory" => format!(
                "<html><body>{nav}<h1>Inventory</h1>{}</body></html>",
                link("Products", "/products")
            ),
            "/products" => format!(
                "<html><body>{nav}{}</body></html>",
                self.products_page(page_of(&state.url))
            ),
            _ => "<html><body>Not Found</body></html>".to_string(),
        }
    }

    fn products_page(&self, page: u32) -> String {
        let start = (page as usize - 1) * self.per_page;
        let slice: &[Product] = self
            .products
            .get(start..(start + self.per_page).min(self.products.len()))
            .unwrap_or(&[]);

        let mut rows = String::new();
        for (i, p) in slice.iter().enumerate() {
            let short = self.quirks.broken_pages.contains(&page)
                || self.quirks.short_rows.contains(&(page, i));
            let stock = if short {
                String::new()
            } else {
                format!("<td>{}</td>", p.stock)
            };
            rows.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>${:.2}</td>{stock}<td><a href=\"#\">Edit</a></td></tr>\n",
                p.id, p.name, p.category, p.price
            ));
        }

        let total = self.total_pages();
        let (next_class, next_href) = if self.quirks.endless_next || page < total {
            ("page-item", format!("/products?page={}", page + 1))
        } else if self.quirks.next_wraps {
            ("page-item", "/products?page=1".to_string())
        } else {
            ("page-item disabled", "#".to_string())
        };
        let prev_class = if page > 1 { "page-item" } else { "page-item disabled" };

        format!(
            r#"<table class="table">
<thead><tr><th>ID</th><th>Name</th><th>Category</th><th>Price</th><th>Stock</th><th>Actions</th></tr></thead>
<tbody>
{rows}</tbody></table>
<ul class="pagination">
<li class="{prev_class}"><a class="page-link" href="/products?page={prev}">Previous</a></li>
<li class="page-item active"><span class="page-link">{page}</span></li>
<li class="{next_class}"><a class="page-link" href="{next_href}">Next</a></li>
</ul>"#,
            prev = page.saturating_sub(1).max(1),
        )
    }
}

fn page_of(url: &Url) -> u32 {
    url.query_pairs()
        .find(|(k, _)| k == "page")
        .and_then(|(_, v)| v.parse().ok())
        .unwrap_or(1)
}

struct FakeTab(Arc<FakeSite>);

#[async_trait]
impl RenderContext for FakeTab {
    async fn navigate(&mut self, url: &str, _timeout_ms: u64) -> Result<NavigationResult> {
        let site = &self.0;
        let target = site.base.join(url)?;
        let mut state = site.state.lock().unwrap();
        site.go(&mut state, target);
        Ok(NavigationResult {
            final_url: state.url.to_string(),
            load_time_ms: 1,
        })
    }

    async fn execute_js(&self, _script: &str) -> Result<Value> {
        Ok(Value::Null)
    }

    async fn get_html(&self) -> Result<String> {
        let state = self.0.state.lock().unwrap();
        Ok(self.0.render(&state))
    }

    async fn get_url(&self) -> Result<String> {
        Ok(self.0.state.lock().unwrap().url.to_string())
    }

    async fn click(&mut self, locator: &Locator) -> Result<bool> {
        let site = &self.0;
        let mut state = site.state.lock().unwrap();
        let html = site.render(&state);
        match locator {
            Locator::Css(selector) if state.url.path() == "/login" => {
                if *selector != LoginSurface::default().submit_selector {
                    return Ok(false);
                }
                let surface = LoginSurface::default();
                let user = state.inputs.get(&surface.username_selector).cloned();
                let pass = state.inputs.get(&surface.password_selector).cloned();
                if user.as_deref() == Some(USERNAME) && pass.as_deref() == Some(PASSWORD) {
                    state.logged_in = true;
                    state.login_error = false;
                    let target = site.base.join("/dashboard")?;
                    site.go(&mut state, target);
                } else {
                    state.login_error = true;
                }
                Ok(true)
            }
            Locator::Css(_) => Ok(false),
            Locator::LinkText(_) => {
                let Some(href) = tablehaul::dom::href_of(&html, locator) else {
                    return Ok(false);
                };
                if href == "#" {
                    return Ok(true);
                }
                let target = state.url.join(&href)?;
                site.go(&mut state, target);
                Ok(true)
            }
        }
    }

    async fn fill(&mut self, selector: &str, value: &str) -> Result<bool> {
        let mut state = self.0.state.lock().unwrap();
        if state.url.path() != "/login" {
            return Ok(false);
        }
        state.inputs.insert(selector.to_string(), value.to_string());
        Ok(true)
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        if path.as_os_str().is_empty() {
            bail!("empty screenshot path");
        }
        std::fs::write(path, b"\x89PNG fake")?;
        self.0.screenshots.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
