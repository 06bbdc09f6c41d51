//! Incremental-processing orchestrator and polling scheduler.
//!
//! Each cycle discovers source files, diffs them against the ledger, and
//! drives the transform once per new file, persisting the ledger after each
//! success. One bad file never halts the batch: it is logged, left out of
//! the ledger, and retried on the next cycle.
//!
//! The scheduler is sleep-after-work: a cycle that outlasts the poll
//! interval is followed by a full sleep, never a catch-up burst.

mod signal;

use snafu::prelude::*;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{Config, SourceConfig};
use crate::emit;
use crate::error::{LedgerSnafu, PipelineError, PipelineStorageSnafu, TransformSnafu};
use crate::ledger::{ProcessedLedger, ProcessedSet};
use crate::metrics::events::{
    CycleCompleted, CycleDuration, CycleResultType, FileProcessed, FileStatus, FilesDiscovered,
};
use crate::storage::{StorageProvider, StorageProviderRef};
use crate::transform::{FileOutcome, ProcessFile, TransformEngine};

pub use signal::shutdown_signal;

/// Counters for a single processing cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    /// Files present under the source prefix.
    pub discovered: usize,
    /// Files cleaned and appended this cycle.
    pub processed: usize,
    /// Files whose rows were all filtered out (recorded, nothing written).
    pub filtered: usize,
    /// Files that failed and will be retried next cycle.
    pub failed: usize,
}

/// Result of a single processing cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Discovery found nothing new.
    NoNewFiles,
    /// At least one file was attempted.
    Processed(CycleStats),
}

/// Order-preserving delta: keys of `all` absent from `processed`.
pub fn compute_delta(all: &[String], processed: &ProcessedSet) -> Vec<String> {
    all.iter()
        .filter(|key| !processed.contains(key.as_str()))
        .cloned()
        .collect()
}

/// The per-cycle orchestrator, holding every collaborator it needs.
///
/// Constructed once at startup and handed to the scheduler; no component
/// reaches for ambient global state.
pub struct Watcher {
    storage: StorageProviderRef,
    ledger: ProcessedLedger,
    transform: Arc<dyn ProcessFile>,
    source: SourceConfig,
}

impl Watcher {
    /// Assemble a watcher from already-built collaborators.
    pub fn new(
        storage: StorageProviderRef,
        ledger: ProcessedLedger,
        transform: Arc<dyn ProcessFile>,
        source: SourceConfig,
    ) -> Self {
        Self {
            storage,
            ledger,
            transform,
            source,
        }
    }

    /// Build the full production stack from configuration.
    pub async fn connect(config: &Config) -> Result<Self, PipelineError> {
        let storage = Arc::new(
            StorageProvider::for_url_with_options(
                &config.storage.url,
                config.storage.options.clone(),
            )
            .await
            .context(PipelineStorageSnafu)?,
        );

        let ledger = ProcessedLedger::new(storage.clone(), config.ledger.marker_key.clone());

        let transform = TransformEngine::new(
            storage.clone(),
            config.layout.clone(),
            config.columns.clone(),
        )
        .context(TransformSnafu)?;

        Ok(Self::new(
            storage,
            ledger,
            Arc::new(transform),
            config.source.clone(),
        ))
    }

    /// Enumerate processable source files in listing order.
    ///
    /// Paging through large listings is handled by the gateway; only keys
    /// carrying the configured suffix are returned.
    pub async fn list_source_files(&self) -> Result<Vec<String>, PipelineError> {
        let mut keys = self
            .storage
            .list_keys(&self.source.prefix)
            .await
            .context(PipelineStorageSnafu)?;
        keys.retain(|key| key.ends_with(&self.source.suffix));
        Ok(keys)
    }

    /// Run one discovery-and-process pass.
    ///
    /// Gateway and ledger failures abort the cycle (and surface to the
    /// scheduler's failure boundary); per-file transform failures do not.
    pub async fn run_cycle(&self) -> Result<CycleOutcome, PipelineError> {
        let cycle_start = Instant::now();

        let mut working = self.ledger.load().await.context(LedgerSnafu)?;
        let all = self.list_source_files().await?;
        let delta = compute_delta(&all, &working);

        emit!(FilesDiscovered {
            total: all.len(),
            pending: delta.len(),
        });
        info!(
            "Found {} file(s) under {}, {} new to process",
            all.len(),
            self.source.prefix,
            delta.len()
        );

        if delta.is_empty() {
            info!("No new files found");
            emit!(CycleCompleted {
                result: CycleResultType::NoNewFiles,
            });
            emit!(CycleDuration {
                duration: cycle_start.elapsed(),
            });
            return Ok(CycleOutcome::NoNewFiles);
        }

        let mut stats = CycleStats {
            discovered: all.len(),
            ..CycleStats::default()
        };

        for key in &delta {
            match self.transform.process(key).await {
                Ok(FileOutcome::Cleaned { rows, partitions }) => {
                    info!(
                        "Processed {}: {} rows across {} partition(s)",
                        key, rows, partitions
                    );
                    stats.processed += 1;
                    emit!(FileProcessed {
                        status: FileStatus::Success,
                    });
                    self.record_processed(&mut working, key).await?;
                }
                Ok(FileOutcome::AllRowsFiltered) => {
                    // The source file is immutable, so a retry could only
                    // repeat the same outcome; record it as done.
                    warn!("{}: no rows survived cleaning, marking as processed", key);
                    stats.filtered += 1;
                    emit!(FileProcessed {
                        status: FileStatus::Filtered,
                    });
                    self.record_processed(&mut working, key).await?;
                }
                Err(e) => {
                    warn!("Error processing {}: {}", key, e);
                    stats.failed += 1;
                    emit!(FileProcessed {
                        status: FileStatus::Failed,
                    });
                }
            }
        }

        emit!(CycleCompleted {
            result: CycleResultType::Processed,
        });
        emit!(CycleDuration {
            duration: cycle_start.elapsed(),
        });
        info!(
            "Cycle complete: {} processed, {} filtered, {} failed",
            stats.processed, stats.filtered, stats.failed
        );

        Ok(CycleOutcome::Processed(stats))
    }

    /// Append a finished key to the working set and persist the ledger
    /// before the next file is touched.
    async fn record_processed(
        &self,
        working: &mut ProcessedSet,
        key: &str,
    ) -> Result<(), PipelineError> {
        working.insert(key);
        self.ledger.save(working).await.context(LedgerSnafu)
    }

    /// Poll forever, isolating each cycle behind a failure boundary.
    ///
    /// Only cancellation ends the loop; a failed cycle is logged and the
    /// next poll proceeds as usual.
    pub async fn run(&self, shutdown: CancellationToken) {
        let poll_interval = Duration::from_secs(self.source.poll_interval_secs);
        info!(
            "Starting watcher, polling every {}s",
            poll_interval.as_secs()
        );

        loop {
            let result = tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Shutdown requested during cycle");
                    break;
                }

                result = self.run_cycle() => result,
            };

            match result {
                Ok(CycleOutcome::NoNewFiles) => {
                    info!(
                        "No new files, waiting {}s before next poll",
                        poll_interval.as_secs()
                    );
                }
                Ok(CycleOutcome::Processed(_)) => {
                    info!(
                        "Iteration complete, waiting {}s before next poll",
                        poll_interval.as_secs()
                    );
                }
                Err(e) => {
                    emit!(CycleCompleted {
                        result: CycleResultType::Error,
                    });
                    error!("Watcher cycle failed: {}", e);
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested during poll wait");
                    break;
                }
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }

        info!("Watcher stopped cleanly");
    }
}
