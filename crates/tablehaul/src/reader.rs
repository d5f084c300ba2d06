// Copyright 2026 Tablehaul Contributors
// SPDX-License-Identifier: Apache-2.0

//! Turn raw listing rows into records.
//!
//! Single bad rows are skipped with a warning. A non-empty page on which no
//! row survives means the source changed shape, and is a `ParseError`.

use crate::error::{Result, ScrapeError};
use crate::model::{ListingPage, RawRow, Record};
use crate::normalize::Normalizer;
use std::collections::BTreeSet;
use tracing::warn;

/// Records read from one page.
#[derive(Debug, Clone, Default)]
pub struct PageRecords {
    pub records: Vec<Record>,
    /// Rows dropped as malformed.
    pub skipped: usize,
    pub has_next: bool,
}

/// Map every row of `page` to a record.
///
/// `expected_fields` is the field set established earlier in the run; rows
/// with a different field set are skipped. `page_no` is only used for
/// diagnostics.
pub fn page_records(
    page: &ListingPage,
    page_no: u32,
    normalizer: &Normalizer,
    expected_fields: Option<&BTreeSet<String>>,
) -> Result<PageRecords> {
    let columns: Vec<Option<String>> = page
        .headers
        .iter()
        .map(|h| normalizer.field_for_header(h))
        .collect();

    let mut out = PageRecords {
        has_next: page.has_next,
        ..PageRecords::default()
    };
    let mut expected = expected_fields.cloned();
    let mut last_problem = String::new();

    for (i, row) in page.rows.iter().enumerate() {
        let parsed = match row {
            RawRow::Cells(cells) => record_from_cells(cells, &page.headers, &columns, normalizer),
            RawRow::Object(map) => record_from_object(map, normalizer),
            RawRow::Other(v) => Err(format!("listing element is not an object: {v}")),
        };
        let checked = parsed.and_then(|record| {
            if record.identity(normalizer.id_field()).is_none() {
                return Err(format!("no usable '{}' value", normalizer.id_field()));
            }
            let fields = record.fields();
            match &expected {
                Some(want) if *want != fields => Err(format!(
                    "fields {:?} differ from {:?}",
                    fields, want
                )),
                Some(_) => Ok(record),
                None => {
                    expected = Some(fields);
                    Ok(record)
                }
            }
        });

        match checked {
            Ok(record) => out.records.push(record),
            Err(problem) => {
                warn!("page {page_no}, row {}: skipped ({problem})", i + 1);
                out.skipped += 1;
                last_problem = problem;
            }
        }
    }

    if !page.rows.is_empty() && out.records.is_empty() {
        return Err(ScrapeError::Parse {
            page: page_no,
            reason: format!(
                "all {} row(s) malformed, last: {last_problem}",
                page.rows.len()
            ),
        });
    }
    Ok(out)
}

fn record_from_cells(
    cells: &[String],
    headers: &[String],
    columns: &[Option<String>],
    normalizer: &Normalizer,
) -> std::result::Result<Record, String> {
    if cells.len() != headers.len() {
        return Err(format!(
            "{} cell(s) for {} column(s)",
            cells.len(),
            headers.len()
        ));
    }
    let mut record = Record::new();
    for (cell, column) in cells.iter().zip(columns) {
        let Some(field) = column else { continue };
        let value = normalizer.cell(field, cell).map_err(|e| e.to_string())?;
        record.insert(field.clone(), value);
    }
    Ok(record)
}

fn record_from_object(
    map: &serde_json::Map<String, serde_json::Value>,
    normalizer: &Normalizer,
) -> std::result::Result<Record, String> {
    let mut record = Record::new();
    for (key, value) in map {
        let field = normalizer.field_for_key(key);
        let value = normalizer.json(&field, value).map_err(|e| e.to_string())?;
        record.insert(field, value);
    }
    Ok(record)
}
