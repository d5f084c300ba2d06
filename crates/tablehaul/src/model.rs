// Copyright 2026 Tablehaul Contributors
// SPDX-License-Identifier: Apache-2.0

//! Core data types shared by both acquisition backends.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use url::Url;

/// How to find an element on a rendered view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", content = "value", rename_all = "snake_case")]
pub enum Locator {
    /// A CSS selector.
    Css(String),
    /// A link or button whose trimmed text equals the value.
    LinkText(String),
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Css(sel) => write!(f, "css {sel:?}"),
            Self::LinkText(text) => write!(f, "link {text:?}"),
        }
    }
}

/// One menu hop: the link to follow and the view it leads to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavStep {
    /// Visible text of the menu link.
    pub label: String,
    /// URL path of the view reached by the link.
    pub view: String,
}

impl NavStep {
    pub fn new(label: impl Into<String>, view: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            view: view.into(),
        }
    }
}

/// Ordered menu hops from the landing page to the listing view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationPath {
    pub steps: Vec<NavStep>,
}

impl NavigationPath {
    pub fn new(steps: Vec<NavStep>) -> Self {
        Self { steps }
    }
}

/// Identity of a listing page as reported by the source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PageKey {
    Index(u32),
    Cursor(String),
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "page {i}"),
            Self::Cursor(c) => write!(f, "cursor {c:?}"),
        }
    }
}

/// A row as it came off the wire, before field mapping.
#[derive(Debug, Clone, PartialEq)]
pub enum RawRow {
    /// Cell texts of a table row, in column order.
    Cells(Vec<String>),
    /// One element of a JSON listing.
    Object(Map<String, Value>),
    /// A JSON listing element that is not an object.
    Other(Value),
}

/// One fetched page of the listing.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingPage {
    pub key: PageKey,
    /// Column headers for `RawRow::Cells`; empty for JSON pages.
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
    pub has_next: bool,
}

/// Position of a run inside the listing view.
#[derive(Debug, Clone)]
pub struct ListingHandle {
    /// URL of the listing view or endpoint.
    pub url: Url,
    /// 1-based index of the page the handle currently points at.
    pub page: u32,
    /// Cursor for cursor-paginated endpoints.
    pub cursor: Option<String>,
}

impl ListingHandle {
    pub fn new(url: Url, first_page: u32) -> Self {
        Self {
            url,
            page: first_page,
            cursor: None,
        }
    }
}

/// One normalized row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(BTreeMap<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) {
        self.0.insert(field.into(), value);
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn fields(&self) -> BTreeSet<String> {
        self.0.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Stable identity string for the given field, if present and scalar.
    pub fn identity(&self, id_field: &str) -> Option<String> {
        match self.0.get(id_field)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Outcome of offering a record to a [`ResultSet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Added,
    Duplicate,
    /// Field set differs from the one established by the first record.
    FieldMismatch {
        expected: BTreeSet<String>,
        found: BTreeSet<String>,
    },
    MissingIdentity,
}

/// Deduplicated, ordered accumulation of all records of a run.
#[derive(Debug, Clone)]
pub struct ResultSet {
    id_field: String,
    fields: Option<BTreeSet<String>>,
    records: Vec<Record>,
    seen: HashSet<String>,
    duplicates: usize,
    skipped_rows: usize,
    pages: u32,
}

impl ResultSet {
    pub fn new(id_field: impl Into<String>) -> Self {
        Self {
            id_field: id_field.into(),
            fields: None,
            records: Vec::new(),
            seen: HashSet::new(),
            duplicates: 0,
            skipped_rows: 0,
            pages: 0,
        }
    }

    /// Offer a record; only records with a new identity are kept.
    pub fn admit(&mut self, record: Record) -> Admission {
        let Some(identity) = record.identity(&self.id_field) else {
            return Admission::MissingIdentity;
        };

        let found = record.fields();
        match &self.fields {
            Some(expected) if *expected != found => {
                return Admission::FieldMismatch {
                    expected: expected.clone(),
                    found,
                };
            }
            Some(_) => {}
            None => self.fields = Some(found),
        }

        if !self.seen.insert(identity) {
            self.duplicates += 1;
            return Admission::Duplicate;
        }
        self.records.push(record);
        Admission::Added
    }

    pub(crate) fn note_page(&mut self, skipped_rows: usize) {
        self.pages += 1;
        self.skipped_rows += skipped_rows;
    }

    pub fn id_field(&self) -> &str {
        &self.id_field
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Field names shared by every record, once the first one is in.
    pub fn fields(&self) -> Option<&BTreeSet<String>> {
        self.fields.as_ref()
    }

    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    pub fn skipped_rows(&self) -> usize {
        self.skipped_rows
    }

    pub fn pages(&self) -> u32 {
        self.pages
    }
}
