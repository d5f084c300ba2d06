// Copyright 2026 Tablehaul Contributors
// SPDX-License-Identifier: Apache-2.0

//! Progress events for a scrape run.
//!
//! The runner emits `RunEvent`s through a `tokio::sync::broadcast` channel to
//! whoever subscribed (CLI, tests). When no subscriber exists, events are
//! silently dropped.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;

/// A progress event emitted during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEvent {
    /// The run this event belongs to.
    pub run_id: String,
    /// Monotonically increasing sequence number.
    pub seq: u64,
    /// The kind of progress event.
    pub event: RunEventKind,
}

/// Pipeline stages, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Authenticate,
    Navigate,
    Collect,
    Export,
}

/// The specific kind of progress event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RunEventKind {
    StageStarted {
        stage: Stage,
    },
    StageCompleted {
        stage: Stage,
        duration_ms: u64,
    },
    /// One listing page went into the result set.
    PageCollected {
        page: String,
        records: usize,
        skipped_rows: usize,
        total: usize,
    },
    /// A page read or advance failed and is being retried.
    Retrying {
        what: String,
        attempt: u32,
        error: String,
    },
    /// The session expired and a fresh login replaced it.
    Reauthenticated,
    /// A non-fatal warning occurred.
    Warning {
        message: String,
    },
    RunComplete {
        records: usize,
        pages: u32,
        duration_ms: u64,
    },
    RunFailed {
        kind: String,
        message: String,
    },
}

/// Sender half that stamps run id and sequence numbers.
#[derive(Debug)]
pub struct ProgressSink {
    run_id: String,
    seq: AtomicU64,
    tx: Option<broadcast::Sender<RunEvent>>,
}

impl ProgressSink {
    pub fn new(run_id: impl Into<String>, tx: Option<broadcast::Sender<RunEvent>>) -> Self {
        Self {
            run_id: run_id.into(),
            seq: AtomicU64::new(0),
            tx,
        }
    }

    /// A sink nobody listens to.
    pub fn disabled() -> Self {
        Self::new("", None)
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn emit(&self, event: RunEventKind) {
        let Some(tx) = &self.tx else { return };
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let _ = tx.send(RunEvent {
            run_id: self.run_id.clone(),
            seq,
            event,
        });
    }
}

/// Create a progress channel with the given capacity.
pub fn channel(capacity: usize) -> (broadcast::Sender<RunEvent>, broadcast::Receiver<RunEvent>) {
    broadcast::channel(capacity)
}
