//! Upload engine: selection plus the batch driver.
//!
//! Drives the per-file transfer over a shuffled selection. The first failure
//! stops the batch; files after it are never attempted.

use futures::stream::{self, StreamExt};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::UploaderConfig;
use crate::error::SyncError;
use crate::store::ObjectStore;
use crate::sync::filter::FilterSet;
use crate::sync::select::{select_files, LocalFile};
use crate::sync::transfer::{StaticPolicy, Transfer, TransferOutcome, UploadPolicy};

/// Current state of a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum SyncStatus {
    /// Not syncing.
    #[default]
    Idle,
    /// Walking and filtering the origin tree.
    Selecting,
    /// Transferring files.
    Uploading { done: usize, total: usize },
    /// Every file was uploaded or skipped.
    Completed { stats: SyncStats },
    /// Stopped at the first error.
    Failed { message: String },
}

impl SyncStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }
}

/// Sync statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncStats {
    /// Files in the batch.
    pub files_selected: usize,
    /// Files written to the store.
    pub files_uploaded: usize,
    /// Files already up to date.
    pub files_skipped: usize,
    /// Bytes transferred.
    pub bytes_transferred: u64,
    /// Total duration.
    pub duration: Duration,
}

impl SyncStats {
    fn record(&mut self, outcome: TransferOutcome) {
        match outcome {
            TransferOutcome::Uploaded { bytes } => {
                self.files_uploaded += 1;
                self.bytes_transferred += bytes;
            }
            TransferOutcome::Skipped => self.files_skipped += 1,
        }
    }

    pub fn files_processed(&self) -> usize {
        self.files_uploaded + self.files_skipped
    }

    /// Average transfer rate in bytes per second.
    pub fn rate(&self) -> f64 {
        let elapsed = self.duration.as_secs_f64();
        if elapsed > 0.0 {
            self.bytes_transferred as f64 / elapsed
        } else {
            0.0
        }
    }
}

/// Current sync phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncPhase {
    Selecting,
    Uploading,
    Complete,
    Failed,
}

/// Progress update for upload runs.
#[derive(Debug, Clone)]
pub struct SyncProgress {
    /// Current phase.
    pub phase: SyncPhase,
    /// Destination key of the file just finished, if any.
    pub current_file: String,
    /// Outcome of that file.
    pub outcome: Option<TransferOutcome>,
    /// Files processed so far.
    pub files_done: usize,
    /// Total files in the batch.
    pub total_files: usize,
    /// Bytes transferred so far.
    pub bytes_done: u64,
}

/// Selects files and uploads them into one store.
pub struct Uploader {
    transfer: Transfer,
    filter: FilterSet,
    /// Maximum transfers in flight.
    concurrency: usize,
    status: SyncStatus,
    /// Progress callback.
    progress_tx: Option<mpsc::Sender<SyncProgress>>,
}

impl Uploader {
    /// Create an uploader over an existing store.
    pub fn new(store: Arc<dyn ObjectStore>, config: &UploaderConfig) -> Result<Self, SyncError> {
        if config.concurrency == 0 {
            return Err(SyncError::config("concurrency must be at least 1"));
        }

        let policy = Arc::new(StaticPolicy::new(config.visibility()));
        Ok(Self {
            transfer: Transfer::new(store, policy),
            filter: config.filter()?,
            concurrency: config.concurrency,
            status: SyncStatus::Idle,
            progress_tx: None,
        })
    }

    /// Validate the config and connect to the store it describes.
    pub fn from_config(config: &UploaderConfig) -> Result<Self, SyncError> {
        config.validate()?;
        let store = config.build_store()?;
        Self::new(store, config)
    }

    /// Replace the visibility/content-type policy.
    pub fn with_policy(mut self, policy: Arc<dyn UploadPolicy>) -> Self {
        self.transfer = Transfer::new(Arc::clone(self.transfer.store()), policy);
        self
    }

    /// Report progress on `progress_tx`.
    pub fn with_progress(mut self, progress_tx: mpsc::Sender<SyncProgress>) -> Self {
        self.progress_tx = Some(progress_tx);
        self
    }

    pub fn status(&self) -> &SyncStatus {
        &self.status
    }

    /// Send a progress update.
    async fn send_progress(&self, progress: SyncProgress) {
        if let Some(ref tx) = self.progress_tx {
            let _ = tx.send(progress).await;
        }
    }

    /// Select every file under `origin` and upload it below `destination`.
    pub async fn upload(&mut self, origin: &Path, destination: &str) -> Result<SyncStats, SyncError> {
        let files = self.select(origin, destination).await?;
        self.upload_all(&files).await
    }

    /// Run the selection step only.
    pub async fn select(&mut self, origin: &Path, destination: &str) -> Result<Vec<LocalFile>, SyncError> {
        self.status = SyncStatus::Selecting;
        self.send_progress(SyncProgress {
            phase: SyncPhase::Selecting,
            current_file: String::new(),
            outcome: None,
            files_done: 0,
            total_files: 0,
            bytes_done: 0,
        })
        .await;

        match select_files(origin, destination, &self.filter).await {
            Ok(files) => Ok(files),
            Err(err) => {
                self.fail(&err, 0, 0, 0).await;
                Err(err)
            }
        }
    }

    /// Upload a single file, skipping it when the remote copy is current.
    pub async fn upload_one(&self, file: &LocalFile) -> Result<TransferOutcome, SyncError> {
        self.transfer.upload_one(file).await
    }

    /// Upload `files` in order. The first error stops the batch and is returned.
    ///
    /// With `concurrency > 1` later files may start before earlier ones
    /// finish; on error the in-flight transfers are dropped, which aborts
    /// their open writers, and nothing new is started.
    pub async fn upload_all(&mut self, files: &[LocalFile]) -> Result<SyncStats, SyncError> {
        let started = Instant::now();
        let total = files.len();
        let mut stats = SyncStats {
            files_selected: total,
            ..Default::default()
        };
        self.status = SyncStatus::Uploading { done: 0, total };

        let transfer = self.transfer.clone();
        let transfer = &transfer;
        let mut results = stream::iter(files.iter().enumerate())
            .map(|(index, file)| async move {
                debug!("Uploading file {} of {}", index + 1, total);
                (file, transfer.upload_one(file).await)
            })
            .buffer_unordered(self.concurrency);

        while let Some((file, result)) = results.next().await {
            match result {
                Ok(outcome) => {
                    stats.record(outcome);
                    self.status = SyncStatus::Uploading {
                        done: stats.files_processed(),
                        total,
                    };
                    self.send_progress(SyncProgress {
                        phase: SyncPhase::Uploading,
                        current_file: file.destination.clone(),
                        outcome: Some(outcome),
                        files_done: stats.files_processed(),
                        total_files: total,
                        bytes_done: stats.bytes_transferred,
                    })
                    .await;
                }
                Err(err) => {
                    drop(results);
                    self.fail(&err, stats.files_processed(), total, stats.bytes_transferred)
                        .await;
                    return Err(err);
                }
            }
        }

        stats.duration = started.elapsed();
        info!(
            "Upload complete: {} uploaded, {} skipped, {} bytes in {:.2}s",
            stats.files_uploaded,
            stats.files_skipped,
            stats.bytes_transferred,
            stats.duration.as_secs_f64()
        );

        self.send_progress(SyncProgress {
            phase: SyncPhase::Complete,
            current_file: String::new(),
            outcome: None,
            files_done: stats.files_processed(),
            total_files: total,
            bytes_done: stats.bytes_transferred,
        })
        .await;
        self.status = SyncStatus::Completed {
            stats: stats.clone(),
        };

        Ok(stats)
    }

    async fn fail(&mut self, err: &SyncError, files_done: usize, total_files: usize, bytes_done: u64) {
        self.status = SyncStatus::Failed {
            message: err.to_string(),
        };
        self.send_progress(SyncProgress {
            phase: SyncPhase::Failed,
            current_file: String::new(),
            outcome: None,
            files_done,
            total_files,
            bytes_done,
        })
        .await;
    }
}
