//! Background ingestion worker.
//!
//! Each cycle first reclaims documents stuck in `processing`, then ingests
//! every `pending` document plus the ones just reclaimed. Documents run as
//! independent tasks in a [`JoinSet`], at most `worker_concurrency` at a time.
//! A run that fails with a retryable error (embedding service unreachable) is
//! retried with exponential backoff up to `max_attempts`; anything else leaves
//! the document `failed`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use docqa_core::ingest::{IngestOutcome, IngestionPipeline};
use docqa_core::models::DocumentStatus;
use docqa_core::reconcile::reclaim_stale;
use docqa_core::store::Store;

use crate::config::IngestionConfig;

/// Totals for one worker cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub reclaimed: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl CycleReport {
    pub fn is_idle(&self) -> bool {
        *self == CycleReport::default()
    }
}

pub struct Worker {
    store: Arc<dyn Store>,
    pipeline: Arc<IngestionPipeline>,
    settings: IngestionConfig,
    retry_base_delay: Duration,
}

impl Worker {
    pub fn new(
        store: Arc<dyn Store>,
        pipeline: Arc<IngestionPipeline>,
        settings: IngestionConfig,
    ) -> Self {
        Self {
            store,
            pipeline,
            settings,
            retry_base_delay: Duration::from_secs(1),
        }
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    /// Run one reclaim-and-ingest cycle.
    pub async fn run_once(&self) -> Result<CycleReport> {
        let reclaimed = reclaim_stale(self.store.as_ref(), self.settings.stale_after_secs).await?;

        let mut ids: Vec<String> = self
            .store
            .list_documents(Some(DocumentStatus::Pending))
            .await?
            .into_iter()
            .map(|d| d.id)
            .collect();
        // Oldest first.
        ids.reverse();
        ids.extend(reclaimed.iter().cloned());

        let mut report = CycleReport {
            reclaimed: reclaimed.len(),
            ..CycleReport::default()
        };
        if ids.is_empty() {
            return Ok(report);
        }

        let semaphore = Arc::new(Semaphore::new(self.settings.worker_concurrency.max(1)));
        let mut tasks = JoinSet::new();
        for id in ids {
            let semaphore = semaphore.clone();
            let pipeline = self.pipeline.clone();
            let max_attempts = self.settings.max_attempts;
            let base_delay = self.retry_base_delay;
            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .context("acquiring ingestion permit")?;
                Ok::<_, anyhow::Error>(
                    ingest_with_retry(&pipeline, &id, max_attempts, base_delay).await,
                )
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined.context("ingestion task panicked")?? {
                Some(IngestOutcome::Completed { .. }) => report.completed += 1,
                Some(IngestOutcome::Skipped { .. }) => report.skipped += 1,
                None => report.failed += 1,
            }
        }

        tracing::info!(
            reclaimed = report.reclaimed,
            completed = report.completed,
            failed = report.failed,
            skipped = report.skipped,
            "worker cycle finished"
        );
        Ok(report)
    }

    /// Run cycles every `poll_interval_secs` until Ctrl-C.
    pub async fn run(&self) -> Result<()> {
        let interval = self.settings.poll_interval();
        tracing::info!(
            concurrency = self.settings.worker_concurrency,
            poll_secs = interval.as_secs(),
            "worker started"
        );
        loop {
            if let Err(e) = self.run_once().await {
                tracing::error!(error = %e, "worker cycle failed");
            }
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("worker shutting down");
                    return Ok(());
                }
            }
        }
    }
}

/// Ingest one document, retrying retryable failures. `None` means the
/// document ended up failed.
async fn ingest_with_retry(
    pipeline: &IngestionPipeline,
    document_id: &str,
    max_attempts: u32,
    base_delay: Duration,
) -> Option<IngestOutcome> {
    let max_attempts = max_attempts.max(1);
    for attempt in 1..=max_attempts {
        match pipeline.ingest(document_id).await {
            Ok(outcome) => return Some(outcome),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let delay = base_delay * (1u32 << (attempt - 1).min(5));
                tracing::warn!(
                    document_id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "retrying ingestion"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                tracing::error!(document_id, attempt, error = %e, "ingestion gave up");
                return None;
            }
        }
    }
    None
}
