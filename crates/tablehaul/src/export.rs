// Copyright 2026 Tablehaul Contributors
// SPDX-License-Identifier: Apache-2.0

//! Write a result set to disk.
//!
//! The destination is replaced atomically: records go to a temporary file in
//! the same directory, which is synced and then renamed over the target.

use crate::config::ExportFormat;
use crate::error::{Result, ScrapeError};
use crate::model::Record;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::info;

/// Serialize records. Field order is sorted, so equal inputs give equal bytes.
pub fn render(records: &[Record], format: ExportFormat) -> Result<Vec<u8>> {
    let encode_error = |e: serde_json::Error| ScrapeError::Io {
        path: PathBuf::new(),
        source: e.into(),
    };
    let mut out = match format {
        ExportFormat::Json => serde_json::to_vec_pretty(records).map_err(encode_error)?,
        ExportFormat::Jsonl => {
            let mut buf = Vec::new();
            for record in records {
                serde_json::to_writer(&mut buf, record).map_err(encode_error)?;
                buf.push(b'\n');
            }
            return Ok(buf);
        }
    };
    out.push(b'\n');
    Ok(out)
}

/// Atomically write `records` to `destination`, creating parent directories.
pub fn export(records: &[Record], destination: &Path, format: ExportFormat) -> Result<()> {
    let io_error = |source: std::io::Error| ScrapeError::Io {
        path: destination.to_path_buf(),
        source,
    };
    let bytes = render(records, format).map_err(|e| match e {
        ScrapeError::Io { source, .. } => io_error(source),
        other => other,
    })?;

    let dir = match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(io_error)?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(io_error)?;
    tmp.write_all(&bytes).map_err(io_error)?;
    tmp.as_file().sync_all().map_err(io_error)?;
    tmp.persist(destination).map_err(|e| io_error(e.error))?;

    info!(
        path = %destination.display(),
        records = records.len(),
        bytes = bytes.len(),
        "exported"
    );
    Ok(())
}
