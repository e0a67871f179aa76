//! Poll driver
//!
//! One fetch → normalize → dedup → summarize → compose → dispatch cycle.
//! Items are handled strictly one after another. There is no scheduling
//! loop here; callers (cron, systemd timer) decide how often to run.

use crate::composer;
use crate::normalizer::normalize;
use crate::notify::{Channel, Dispatcher};
use crate::services::{FetchError, RecallSource, Summarizer};
use crate::store::{DedupStore, StoreError};
use recall_common::StoredRecall;
use std::fmt;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Errors that abort a cycle
#[derive(Debug, Error)]
pub enum PollError {
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Store failed: {0}")]
    Store(#[from] StoreError),
}

/// Counters for one cycle
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PollReport {
    pub fetched: usize,
    pub rejected: usize,
    pub newly_saved: usize,
    pub already_seen: usize,
    pub dispatched: usize,
    pub delivery_failures: usize,
}

impl fmt::Display for PollReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "fetched={} rejected={} new={} seen={} dispatched={} delivery_failures={}",
            self.fetched,
            self.rejected,
            self.newly_saved,
            self.already_seen,
            self.dispatched,
            self.delivery_failures
        )
    }
}

pub struct PollDriver<'a> {
    source: &'a dyn RecallSource,
    store: &'a DedupStore,
    summarizer: Option<&'a dyn Summarizer>,
    dispatcher: &'a Dispatcher,
    channel: Channel,
    dry_run: bool,
    limit: u32,
    sort_field: String,
}

impl<'a> PollDriver<'a> {
    pub fn new(
        source: &'a dyn RecallSource,
        store: &'a DedupStore,
        dispatcher: &'a Dispatcher,
        channel: Channel,
    ) -> Self {
        Self {
            source,
            store,
            summarizer: None,
            dispatcher,
            channel,
            dry_run: true,
            limit: recall_common::config::DEFAULT_FETCH_LIMIT,
            sort_field: recall_common::config::DEFAULT_SORT_FIELD.to_string(),
        }
    }

    pub fn with_summarizer(mut self, summarizer: Option<&'a dyn Summarizer>) -> Self {
        self.summarizer = summarizer;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_batch(mut self, limit: u32, sort_field: impl Into<String>) -> Self {
        self.limit = limit;
        self.sort_field = sort_field.into();
        self
    }

    /// Run one cycle
    ///
    /// Fetch and store failures abort the cycle. Summarization and delivery
    /// failures are logged, counted and skipped; a stored record stays
    /// stored even when its alert could not be delivered.
    pub async fn run_once(&self) -> Result<PollReport, PollError> {
        let mut report = PollReport::default();

        info!(
            limit = self.limit,
            sort = %self.sort_field,
            backend = self.store.backend_name(),
            channel = %self.channel,
            dry_run = self.dry_run,
            "Starting poll cycle"
        );

        let batch = self
            .source
            .fetch(self.limit, &self.sort_field)
            .await
            .map_err(|e| {
                error!(error = %e, "Fetch failed, aborting cycle");
                e
            })?;
        report.fetched = batch.len();

        for (index, raw) in batch.iter().enumerate() {
            let recall = match normalize(raw) {
                Ok(recall) => recall,
                Err(rejection) => {
                    warn!(index, reason = %rejection, "Skipping record");
                    report.rejected += 1;
                    continue;
                }
            };

            match self.store.insert_if_new(&recall).await? {
                Some(stored) => {
                    report.newly_saved += 1;
                    self.notify(&stored, &mut report).await;
                }
                None => {
                    debug!(recall_number = %recall.recall_number, "Already seen");
                    report.already_seen += 1;
                }
            }
        }

        info!(%report, "Poll cycle complete");
        Ok(report)
    }

    async fn notify(&self, stored: &StoredRecall, report: &mut PollReport) {
        let recall = &stored.recall;

        let summary = match self.summarizer {
            Some(summarizer) => match summarizer.summarize(&recall.notice_text()).await {
                Ok(summary) => Some(summary),
                Err(e) => {
                    warn!(
                        recall_number = %recall.recall_number,
                        error = %e,
                        "Summarization failed, sending alert without summary"
                    );
                    None
                }
            },
            None => None,
        };

        let alert = composer::compose(recall, summary.as_ref());

        match self
            .dispatcher
            .dispatch(&alert, &self.channel, self.dry_run)
            .await
        {
            Ok(outcome) => {
                debug!(recall_number = %recall.recall_number, ?outcome, "Alert dispatched");
                report.dispatched += 1;
            }
            Err(e) => {
                error!(
                    recall_number = %recall.recall_number,
                    id = %stored.id,
                    error = %e,
                    retryable = e.is_retryable(),
                    "Alert delivery failed; record stays stored"
                );
                report.delivery_failures += 1;
            }
        }
    }
}
