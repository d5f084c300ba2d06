// Copyright 2026 Tablehaul Contributors
// SPDX-License-Identifier: Apache-2.0

//! Header mapping and value normalization.
//!
//! Both backends feed their rows through the same [`Normalizer`] so that a
//! table cell `"$1,299.99"` and a JSON number `1299.99` end up as the same
//! value.

use crate::config::FieldMapping;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::sync::OnceLock;

/// Value type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Integer,
    Decimal,
    /// Decimal that may carry a currency symbol and thousands separators.
    Currency,
}

/// A value that did not fit its declared kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueError {
    pub field: String,
    pub raw: String,
    pub kind: FieldKind,
}

impl std::fmt::Display for ValueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {:?} is not {:?}", self.field, self.raw, self.kind)
    }
}

/// Maps headers to field names and coerces values to their kind.
#[derive(Debug, Clone)]
pub struct Normalizer {
    mapping: FieldMapping,
}

fn integer_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[+-]?\d+$").expect("static regex"))
}

fn currency_noise_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\s,$€£¥]").expect("static regex"))
}

/// `"Unit Price"` → `"unit_price"`.
pub fn snake_case(header: &str) -> String {
    let mut out = String::with_capacity(header.len());
    let mut pending_sep = false;
    for c in header.trim().chars() {
        if c.is_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.extend(c.to_lowercase());
        } else {
            pending_sep = true;
        }
    }
    out
}

impl Normalizer {
    pub fn new(mapping: FieldMapping) -> Self {
        Self { mapping }
    }

    pub fn id_field(&self) -> &str {
        &self.mapping.id_field
    }

    /// Field name for a table header, or `None` if the column is ignored.
    pub fn field_for_header(&self, header: &str) -> Option<String> {
        let header = header.trim();
        if self
            .mapping
            .ignored_headers
            .iter()
            .any(|h| h.eq_ignore_ascii_case(header))
        {
            return None;
        }
        Some(
            self.mapping
                .renames
                .get(header)
                .cloned()
                .unwrap_or_else(|| snake_case(header)),
        )
    }

    /// Field name for a JSON key.
    pub fn field_for_key(&self, key: &str) -> String {
        self.mapping
            .renames
            .get(key)
            .cloned()
            .unwrap_or_else(|| snake_case(key))
    }

    pub fn kind_of(&self, field: &str) -> FieldKind {
        self.mapping
            .kinds
            .get(field)
            .copied()
            .unwrap_or(FieldKind::Text)
    }

    /// Coerce the text of a table cell.
    pub fn cell(&self, field: &str, raw: &str) -> Result<Value, ValueError> {
        let text = collapse_whitespace(raw);
        let kind = self.kind_of(field);
        let fail = || ValueError {
            field: field.to_string(),
            raw: text.clone(),
            kind,
        };
        match kind {
            FieldKind::Text => Ok(Value::String(text.clone())),
            FieldKind::Integer => parse_integer(&text).ok_or_else(fail),
            FieldKind::Decimal => parse_decimal(&text).ok_or_else(fail),
            FieldKind::Currency => {
                parse_decimal(&currency_noise_re().replace_all(&text, "")).ok_or_else(fail)
            }
        }
    }

    /// Coerce a JSON value from the listing endpoint.
    pub fn json(&self, field: &str, value: &Value) -> Result<Value, ValueError> {
        match (self.kind_of(field), value) {
            (_, Value::String(s)) => self.cell(field, s),
            (FieldKind::Text, other) => Ok(other.clone()),
            (FieldKind::Integer, Value::Number(n)) if n.is_i64() || n.is_u64() => {
                Ok(value.clone())
            }
            (FieldKind::Decimal | FieldKind::Currency, Value::Number(n)) => n
                .as_f64()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| self.value_error(field, value)),
            _ => Err(self.value_error(field, value)),
        }
    }

    fn value_error(&self, field: &str, value: &Value) -> ValueError {
        ValueError {
            field: field.to_string(),
            raw: value.to_string(),
            kind: self.kind_of(field),
        }
    }
}

fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_integer(text: &str) -> Option<Value> {
    if !integer_re().is_match(text) {
        return None;
    }
    text.parse::<i64>().ok().map(Value::from)
}

fn parse_decimal(text: &str) -> Option<Value> {
    let v: f64 = text.parse().ok()?;
    Number::from_f64(v).map(Value::Number)
}
