//! Read listing tables, pagers and markers out of raw HTML.
//!
//! Works on the HTML a browser context reports (or a login response body)
//! using the `scraper` crate for CSS selector-based parsing.

use crate::config::TableSelectors;
use crate::model::Locator;
use scraper::{ElementRef, Html, Selector};

/// Elements a [`Locator::LinkText`] may refer to.
const CLICKABLE: &str = "a, button, input[type=submit]";

/// State of the "next page" affordance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextControl {
    Absent,
    Disabled,
    Enabled { href: Option<String> },
}

impl NextControl {
    pub fn has_next(&self) -> bool {
        matches!(self, Self::Enabled { .. })
    }
}

/// Everything read from one rendered listing page.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSnapshot {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub next: NextControl,
    /// Page number shown as active in the pager, if any.
    pub active_page: Option<u32>,
}

impl TableSnapshot {
    /// Content identity used to notice that the table was refreshed.
    pub fn fingerprint(&self) -> String {
        self.rows
            .iter()
            .map(|r| r.join("\u{1f}"))
            .collect::<Vec<_>>()
            .join("\u{1e}")
    }
}

/// Lower-cased, whitespace-collapsed label used for link text matching.
pub fn normalize_label(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn selector(css: &str) -> Result<Selector, String> {
    Selector::parse(css).map_err(|e| format!("invalid selector {css:?}: {e:?}"))
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn label_of(el: ElementRef<'_>) -> String {
    let text = element_text(el);
    if text.is_empty() {
        el.value().attr("value").unwrap_or_default().trim().to_string()
    } else {
        text
    }
}

fn find<'a>(doc: &'a Html, locator: &Locator) -> Result<Option<ElementRef<'a>>, String> {
    match locator {
        Locator::Css(css) => Ok(doc.select(&selector(css)?).next()),
        Locator::LinkText(text) => {
            let wanted = normalize_label(text);
            Ok(doc
                .select(&selector(CLICKABLE)?)
                .find(|el| normalize_label(&label_of(*el)) == wanted))
        }
    }
}

/// Whether `html` contains an element matching `locator`.
pub fn contains(html: &str, locator: &Locator) -> bool {
    let doc = Html::parse_document(html);
    matches!(find(&doc, locator), Ok(Some(_)))
}

/// `href` of the element matching `locator`, if it has one.
pub fn href_of(html: &str, locator: &Locator) -> Option<String> {
    let doc = Html::parse_document(html);
    find(&doc, locator)
        .ok()
        .flatten()
        .and_then(|el| el.value().attr("href").map(str::to_string))
}

/// Text of the first non-empty element matching a CSS selector.
pub fn first_text(html: &str, css: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let sel = selector(css).ok()?;
    doc.select(&sel)
        .map(element_text)
        .find(|text| !text.is_empty())
}

fn is_disabled(el: ElementRef<'_>) -> bool {
    let own = el.value();
    if own.attr("disabled").is_some()
        || own.attr("aria-disabled") == Some("true")
        || own.classes().any(|c| c == "disabled")
    {
        return true;
    }
    el.parent()
        .and_then(ElementRef::wrap)
        .map(|parent| parent.value().classes().any(|c| c == "disabled"))
        .unwrap_or(false)
}

/// Parse the listing table and its pager.
///
/// Fails only when the table itself is missing or a selector is invalid;
/// irregular rows are returned as-is for the row reader to judge.
pub fn parse_table(html: &str, selectors: &TableSelectors) -> Result<TableSnapshot, String> {
    let doc = Html::parse_document(html);

    let table = doc
        .select(&selector(&selectors.table)?)
        .next()
        .ok_or_else(|| format!("no element matches table selector {:?}", selectors.table))?;

    let mut headers: Vec<String> = table
        .select(&selector(&selectors.header_cells)?)
        .map(element_text)
        .collect();
    let row_sel = selector(&selectors.rows)?;
    let cell_sel = selector(&selectors.cells)?;

    let mut rows: Vec<Vec<String>> = Vec::new();
    for row in table.select(&row_sel) {
        let cells: Vec<String> = row.select(&cell_sel).map(element_text).collect();
        if cells.is_empty() && headers.is_empty() {
            // Header row without a <thead>.
            let th = selector("th")?;
            headers = row.select(&th).map(element_text).collect();
            continue;
        }
        rows.push(cells);
    }
    if headers.is_empty() {
        return Err("table has no header cells".to_string());
    }

    let next = match find(&doc, &selectors.next)? {
        None => NextControl::Absent,
        Some(el) if is_disabled(el) => NextControl::Disabled,
        Some(el) => NextControl::Enabled {
            href: el.value().attr("href").map(str::to_string),
        },
    };

    let active_page = doc
        .select(&selector(&selectors.active_page)?)
        .next()
        .and_then(|el| element_text(el).parse().ok());

    Ok(TableSnapshot {
        headers,
        rows,
        next,
        active_page,
    })
}
