// Copyright 2026 Tablehaul Contributors
// SPDX-License-Identifier: Apache-2.0

//! One scrape run: authenticate, navigate, collect, export.
//!
//! The backend is closed on every exit path. The output file is only
//! written after the whole listing was collected.

use crate::acquisition::{self, AcquisitionStrategy};
use crate::config::{ExportFormat, ScrapeConfig};
use crate::error::{Result, ScrapeError};
use crate::export;
use crate::model::ResultSet;
use crate::normalize::Normalizer;
use crate::paginator::Paginator;
use crate::progress::{ProgressSink, RunEvent, RunEventKind, Stage};
use crate::session::Session;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tracing::{error, info};

/// What a finished run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub strategy: String,
    pub output: PathBuf,
    pub records: usize,
    pub pages: u32,
    pub duplicates: usize,
    pub skipped_rows: usize,
    pub reauthentications: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
}

pub struct Runner {
    config: ScrapeConfig,
    events: Option<broadcast::Sender<RunEvent>>,
    cancel: Arc<AtomicBool>,
}

impl Runner {
    pub fn new(config: ScrapeConfig) -> Self {
        Self {
            config,
            events: None,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Publish progress events on `tx`.
    pub fn with_events(mut self, tx: broadcast::Sender<RunEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Share a cancellation flag; setting it stops the run between pages.
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = flag;
        self
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn config(&self) -> &ScrapeConfig {
        &self.config
    }

    /// Validate the configuration, start the configured backend and run.
    pub async fn run(&self) -> Result<RunSummary> {
        let sink = self.sink();
        let connected = match self.config.validate() {
            Ok(()) => acquisition::connect(&self.config).await,
            Err(e) => Err(e),
        };
        match connected {
            Ok(strategy) => self.run_as(strategy, sink).await,
            Err(e) => Err(self.fail(&sink, &self.empty_results(), e)),
        }
    }

    /// Run with a backend built by the caller.
    pub async fn run_with(&self, strategy: Box<dyn AcquisitionStrategy>) -> Result<RunSummary> {
        self.run_as(strategy, self.sink()).await
    }

    fn sink(&self) -> ProgressSink {
        ProgressSink::new(uuid::Uuid::new_v4().to_string(), self.events.clone())
    }

    fn empty_results(&self) -> ResultSet {
        ResultSet::new(self.config.fields.id_field.clone())
    }

    async fn run_as(
        &self,
        mut strategy: Box<dyn AcquisitionStrategy>,
        sink: ProgressSink,
    ) -> Result<RunSummary> {
        if let Err(e) = self.config.validate() {
            strategy.close().await;
            return Err(self.fail(&sink, &self.empty_results(), e));
        }
        let run_id = sink.run_id().to_string();
        let started_at = Utc::now();
        let clock = Instant::now();
        info!(run_id = %run_id, strategy = strategy.name(), url = %self.config.base_url, "run started");

        let mut results = self.empty_results();
        let outcome = self.drive(strategy.as_mut(), &sink, &mut results).await;

        if let Err(e) = &outcome {
            if !matches!(e, ScrapeError::Interrupted { .. }) {
                if let Some(path) = &self.config.screenshot_path {
                    strategy.capture_failure(path).await;
                }
            }
        }
        strategy.close().await;

        let session = match outcome {
            Ok(session) => session,
            Err(e) => return Err(self.fail(&sink, &results, e)),
        };

        let stage = clock.elapsed();
        sink.emit(RunEventKind::StageStarted {
            stage: Stage::Export,
        });
        if let Err(e) = export::export(results.records(), &self.config.output, self.config.format) {
            return Err(self.fail(&sink, &results, e));
        }
        sink.emit(RunEventKind::StageCompleted {
            stage: Stage::Export,
            duration_ms: (clock.elapsed() - stage).as_millis() as u64,
        });

        let duration_ms = clock.elapsed().as_millis() as u64;
        sink.emit(RunEventKind::RunComplete {
            records: results.len(),
            pages: results.pages(),
            duration_ms,
        });
        info!(
            records = results.len(),
            pages = results.pages(),
            duplicates = results.duplicates(),
            skipped_rows = results.skipped_rows(),
            duration_ms,
            "run complete"
        );

        Ok(RunSummary {
            run_id,
            strategy: strategy.name().to_string(),
            output: self.config.output.clone(),
            records: results.len(),
            pages: results.pages(),
            duplicates: results.duplicates(),
            skipped_rows: results.skipped_rows(),
            reauthentications: session.reauthentications,
            started_at,
            finished_at: Utc::now(),
            duration_ms,
        })
    }

    async fn drive(
        &self,
        strategy: &mut dyn AcquisitionStrategy,
        sink: &ProgressSink,
        results: &mut ResultSet,
    ) -> Result<Session> {
        let config = &self.config;

        let started = Instant::now();
        sink.emit(RunEventKind::StageStarted {
            stage: Stage::Authenticate,
        });
        let mut session = strategy.authenticate().await?;
        stage_done(sink, Stage::Authenticate, started);

        let started = Instant::now();
        sink.emit(RunEventKind::StageStarted {
            stage: Stage::Navigate,
        });
        let handle = strategy.navigate(&config.navigation).await?;
        info!(url = %handle.url, "listing reached");
        stage_done(sink, Stage::Navigate, started);

        let started = Instant::now();
        sink.emit(RunEventKind::StageStarted {
            stage: Stage::Collect,
        });
        let normalizer = Normalizer::new(config.fields.clone());
        Paginator::new(&config.pagination, &normalizer, sink)
            .with_cancel(&self.cancel)
            .collect_all(strategy, &mut session, handle, results)
            .await?;
        stage_done(sink, Stage::Collect, started);

        Ok(session)
    }

    /// Report a failed run. An interrupted run may flush what it has to the
    /// side path; the real output is never touched.
    fn fail(&self, sink: &ProgressSink, results: &ResultSet, err: ScrapeError) -> ScrapeError {
        if matches!(err, ScrapeError::Interrupted { .. })
            && self.config.flush_partial
            && !results.is_empty()
        {
            let partial = self.config.partial_output();
            match export::export(results.records(), &partial, ExportFormat::Json) {
                Ok(()) => info!(
                    path = %partial.display(),
                    records = results.len(),
                    "flushed partial results"
                ),
                Err(e) => error!("could not flush partial results: {e}"),
            }
        }
        error!(kind = err.kind(), "run failed: {err}");
        sink.emit(RunEventKind::RunFailed {
            kind: err.kind().to_string(),
            message: err.to_string(),
        });
        err
    }
}

fn stage_done(sink: &ProgressSink, stage: Stage, started: Instant) {
    info!(?stage, elapsed_ms = started.elapsed().as_millis() as u64, "stage complete");
    sink.emit(RunEventKind::StageCompleted {
        stage,
        duration_ms: started.elapsed().as_millis() as u64,
    });
}
