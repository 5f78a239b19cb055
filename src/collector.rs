//! Collection and upload loop.
//!
//! One cycle: scan the data directory, group the files into chunks, then for
//! each chunk build an archive, upload it and (optionally) remove the chunk's
//! files. Chunks go out strictly one after another, so a failure part-way
//! through leaves at most the failing chunk's files behind for the next scan.
//!
//! ```text
//!  Idle -> Collecting -> Uploading(i/n) -> Waiting -> Collecting -> ...
//!                                             |
//!                                  shutdown   v
//!                                          Stopped
//! ```

use crate::archive;
use crate::catalog::{self, CollectedFile, FileCatalog};
use crate::chunker;
use crate::config::ServiceConfig;
use crate::error::Result;
use crate::ingress::{IngressClient, Uploader};
use crate::shutdown::{ShutdownKind, ShutdownSignal};
use std::time::{Duration, Instant};

/// How [`CollectorLoop::run`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Single-shot mode finished its only cycle.
    Completed,
    /// Termination was requested; the final collection has been attempted.
    Shutdown,
    /// The user interrupted the service.
    Interrupted,
}

/// Outcome of one collection cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub files: usize,
    pub chunks: usize,
    pub request_ids: Vec<String>,
    pub removed_over_limit: usize,
}

pub struct CollectorLoop<U = IngressClient> {
    config: ServiceConfig,
    catalog: FileCatalog,
    uploader: U,
    shutdown: ShutdownSignal,
}

impl<U: Uploader> CollectorLoop<U> {
    pub fn new(config: ServiceConfig, uploader: U, shutdown: ShutdownSignal) -> Self {
        let catalog = FileCatalog::from_config(&config);
        Self {
            config,
            catalog,
            uploader,
            shutdown,
        }
    }

    pub fn shutdown_signal(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    /// Run a single collection cycle.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let catalog = self.catalog.clone();
        let files = tokio::task::spawn_blocking(move || catalog.collect()).await??;

        let chunks = chunker::group(&files, self.config.max_payload_size);
        let mut report = CycleReport {
            files: files.len(),
            chunks: chunks.len(),
            ..Default::default()
        };

        if chunks.is_empty() {
            tracing::info!(
                "No data marked for collection in '{}'",
                self.config.data_dir.display()
            );
            return Ok(report);
        }

        tracing::info!(
            "Collected {} files (split to {} chunks)",
            files.len(),
            chunks.len()
        );

        let total = chunks.len();
        for (i, chunk) in chunks.into_iter().enumerate() {
            tracing::info!("Uploading data chunk {}/{}", i + 1, total);
            let request_id = self.upload_chunk(chunk).await?;
            report.request_ids.push(request_id);
        }

        if self.config.cleanup_after_send {
            report.removed_over_limit = self.enforce_size_limit(files).await?;
        }

        Ok(report)
    }

    async fn upload_chunk(&self, chunk: chunker::Chunk) -> Result<String> {
        let root = self.config.data_dir.clone();
        let (archive, chunk) = tokio::task::spawn_blocking(move || {
            archive::build(&chunk, &root).map(|archive| (archive, chunk))
        })
        .await??;
        tracing::debug!("Successfully packed data chunk into tarball");

        let request_id = self.uploader.send(archive).await?;

        // Remove right away so a later failure cannot cause a re-upload
        if self.config.cleanup_after_send {
            tokio::task::spawn_blocking(move || catalog::delete_files(&chunk)).await?;
        }
        Ok(request_id)
    }

    async fn enforce_size_limit(&self, files: Vec<CollectedFile>) -> Result<usize> {
        let catalog = self.catalog.clone();
        let removed = tokio::task::spawn_blocking(move || catalog.ensure_size_limit(&files)).await?;
        Ok(removed)
    }

    /// Run a cycle unless the user interrupts first. `None` means interrupted.
    async fn cycle_or_interrupt(&self) -> Option<Result<CycleReport>> {
        tokio::select! {
            biased;
            _ = self.shutdown.interrupted() => None,
            res = self.run_cycle() => Some(res),
        }
    }

    /// Run until shutdown (continuous mode) or for one cycle (single-shot).
    ///
    /// In single-shot mode a failed cycle is returned to the caller. In
    /// continuous mode retryable failures are logged and retried after the
    /// retry interval; any other error ends the loop.
    pub async fn run(&self) -> Result<StopReason> {
        tracing::info!("Starting data collection service");

        if self.config.single_shot() {
            tracing::info!(
                "Collection interval is not set, operating in single-shot mode - service will exit after one data collection cycle"
            );
            return match self.cycle_or_interrupt().await {
                Some(res) => res.map(|_| StopReason::Completed),
                None => {
                    tracing::info!("Data collection service stopped by user");
                    Ok(StopReason::Interrupted)
                }
            };
        }

        loop {
            let started = Instant::now();
            let pause = match self.cycle_or_interrupt().await {
                None => {
                    tracing::info!("Data collection service stopped by user");
                    return Ok(StopReason::Interrupted);
                }
                Some(Ok(_)) => self.next_cycle_delay(started.elapsed()),
                Some(Err(e)) if e.is_retryable() => {
                    tracing::error!("Error during collection process: {}", e);
                    tracing::info!("Retrying in {} seconds...", self.config.retry_interval);
                    self.config.retry_interval()
                }
                Some(Err(e)) => {
                    tracing::error!("Unrecoverable error during collection process: {}", e);
                    return Err(e);
                }
            };

            if let Some(kind) = self.shutdown.wait(pause).await {
                tracing::debug!("Sleep interrupted by shutdown request");
                return Ok(self.finish(kind).await);
            }
        }
    }

    /// Time left in the interval measured from the start of the last cycle.
    fn next_cycle_delay(&self, elapsed: Duration) -> Duration {
        let interval = self.config.collection_interval();
        match interval.checked_sub(elapsed) {
            Some(left) if !left.is_zero() => {
                tracing::info!("Waiting {} seconds before next collection", left.as_secs());
                left
            }
            _ => {
                tracing::warn!(
                    "Collection cycle took {:.1}s, longer than the {}s interval, starting next cycle immediately",
                    elapsed.as_secs_f64(),
                    self.config.collection_interval
                );
                Duration::ZERO
            }
        }
    }

    async fn finish(&self, kind: ShutdownKind) -> StopReason {
        if kind == ShutdownKind::Interrupt {
            tracing::info!("Data collection service stopped by user");
            return StopReason::Interrupted;
        }

        tracing::info!("Shutdown requested, performing final collection...");
        match self.cycle_or_interrupt().await {
            Some(Ok(_)) => {
                tracing::info!("Shutdown completed after final data collection");
                StopReason::Shutdown
            }
            Some(Err(e)) => {
                tracing::error!("Final collection attempt failed: {}", e);
                tracing::info!("Shutdown completed after final collection attempt");
                StopReason::Shutdown
            }
            None => {
                tracing::info!("Final collection interrupted by user");
                StopReason::Interrupted
            }
        }
    }
}
