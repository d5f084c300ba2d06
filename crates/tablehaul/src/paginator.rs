// Copyright 2026 Tablehaul Contributors
// SPDX-License-Identifier: Apache-2.0

//! Walk every page of the listing into one result set.
//!
//! Termination comes from the source's own pagination controls. Two guards
//! stop a source whose "next" never ends: a page key seen twice, and the
//! `max_pages` bound.

use crate::acquisition::AcquisitionStrategy;
use crate::config::PaginationPolicy;
use crate::error::{AuthFailure, Result, ScrapeError};
use crate::model::{Admission, ListingHandle, ListingPage, PageKey, ResultSet};
use crate::normalize::Normalizer;
use crate::progress::{ProgressSink, RunEventKind};
use crate::reader;
use crate::session::Session;
use crate::wait::RetryBudget;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Everything the page loop needs besides the backend itself.
pub struct Paginator<'a> {
    policy: &'a PaginationPolicy,
    normalizer: &'a Normalizer,
    events: &'a ProgressSink,
    cancel: Option<&'a AtomicBool>,
}

impl<'a> Paginator<'a> {
    pub fn new(policy: &'a PaginationPolicy, normalizer: &'a Normalizer, events: &'a ProgressSink) -> Self {
        Self {
            policy,
            normalizer,
            events,
            cancel: None,
        }
    }

    /// Stop between pages once `flag` is set.
    pub fn with_cancel(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel.is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    fn budget(&self, what: String) -> RetryBudget {
        RetryBudget::new(
            what,
            self.policy.advance_attempts,
            Duration::from_millis(self.policy.backoff_ms),
        )
    }

    /// Read all pages starting at `handle` into `results`.
    ///
    /// On error, `results` keeps whatever was collected before it, so an
    /// interrupted run can still be flushed.
    pub async fn collect_all(
        &self,
        strategy: &mut dyn AcquisitionStrategy,
        session: &mut Session,
        mut handle: ListingHandle,
        results: &mut ResultSet,
    ) -> Result<()> {
        let mut visited: HashSet<PageKey> = HashSet::new();

        loop {
            if self.cancelled() {
                info!(pages = results.pages(), "interrupted between pages");
                return Err(ScrapeError::Interrupted {
                    pages: results.pages(),
                });
            }

            let page = self.read(strategy, session, &mut handle).await?;
            if !visited.insert(page.key.clone()) {
                let reason = format!("{} was served again; the next control loops", page.key);
                warn!("{reason}");
                self.events.emit(RunEventKind::Warning {
                    message: reason.clone(),
                });
                return Err(ScrapeError::Pagination {
                    page: handle.page,
                    reason,
                });
            }

            let out = reader::page_records(&page, handle.page, self.normalizer, results.fields())?;
            let mut skipped = out.skipped;
            let mut added = 0;
            for record in out.records {
                match results.admit(record) {
                    Admission::Added => added += 1,
                    Admission::Duplicate => {}
                    other => {
                        warn!("{}: record dropped ({other:?})", page.key);
                        skipped += 1;
                    }
                }
            }
            results.note_page(skipped);
            debug!(page = %page.key, added, skipped, total = results.len(), "page collected");
            self.events.emit(RunEventKind::PageCollected {
                page: page.key.to_string(),
                records: added,
                skipped_rows: skipped,
                total: results.len(),
            });

            if !page.has_next {
                info!(pages = results.pages(), records = results.len(), "reached last page");
                return Ok(());
            }
            if results.pages() >= self.policy.max_pages {
                return Err(ScrapeError::Pagination {
                    page: handle.page,
                    reason: format!(
                        "next control still active after {} pages",
                        self.policy.max_pages
                    ),
                });
            }

            self.advance(strategy, session, &mut handle, &page).await?;
        }
    }

    async fn read(
        &self,
        strategy: &mut dyn AcquisitionStrategy,
        session: &mut Session,
        handle: &mut ListingHandle,
    ) -> Result<ListingPage> {
        let mut budget = self.budget(format!("reading page {}", handle.page));
        loop {
            match strategy.read_page(handle).await {
                Ok(page) => return Ok(page),
                Err(ScrapeError::SessionExpired { url }) => {
                    self.reauthenticate(strategy, session, handle, url).await?;
                }
                Err(e) if budget.retry_after(&e).await => self.note_retry(&budget, &e),
                Err(e) if e.is_transient() => {
                    return Err(ScrapeError::Pagination {
                        page: handle.page,
                        reason: format!("read failed after {} attempt(s): {e}", budget.failures()),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn advance(
        &self,
        strategy: &mut dyn AcquisitionStrategy,
        session: &mut Session,
        handle: &mut ListingHandle,
        current: &ListingPage,
    ) -> Result<()> {
        let mut budget = self.budget(format!("advancing past {}", current.key));
        loop {
            match strategy.advance(handle, current).await {
                Ok(()) => return Ok(()),
                Err(ScrapeError::SessionExpired { url }) => {
                    self.reauthenticate(strategy, session, handle, url).await?;
                }
                Err(e) if budget.retry_after(&e).await => self.note_retry(&budget, &e),
                Err(e) if e.is_transient() => {
                    return Err(ScrapeError::Pagination {
                        page: handle.page,
                        reason: format!(
                            "advance failed after {} attempt(s): {e}",
                            budget.failures()
                        ),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn note_retry(&self, budget: &RetryBudget, err: &ScrapeError) {
        self.events.emit(RunEventKind::Retrying {
            what: err.kind().to_string(),
            attempt: budget.failures(),
            error: err.to_string(),
        });
    }

    async fn reauthenticate(
        &self,
        strategy: &mut dyn AcquisitionStrategy,
        session: &mut Session,
        handle: &ListingHandle,
        url: String,
    ) -> Result<()> {
        if session.reauthentications >= self.policy.max_reauth {
            return Err(ScrapeError::Auth {
                base_url: session.base_url.to_string(),
                username: session.username.clone(),
                failure: AuthFailure::Flow(format!(
                    "session expired again at {url} after {} re-login(s)",
                    session.reauthentications
                )),
            });
        }
        warn!(%url, "session expired, logging in again");
        strategy.authenticate().await?;
        session.renewed();
        strategy.resume(handle).await?;
        self.events.emit(RunEventKind::Reauthenticated);
        Ok(())
    }
}
