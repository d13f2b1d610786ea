//! Retention sweeper — periodically deletes batch directories older than the
//! retention window.
//!
//! The sweeper owns deletion: it removes the directory and then evicts the
//! matching registry entry, so the registry never accumulates ids whose files
//! are gone. It takes no locks against in-flight downloads; a download racing
//! a sweep sees a partial or empty archive, which is the accepted best-effort
//! contract of this service.

use crate::services::registry::ConversionRegistry;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::fs;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

pub struct RetentionSweeper {
    upload_root: PathBuf,
    registry: Arc<dyn ConversionRegistry>,
    /// Maximum age a batch directory may reach before deletion.
    max_age: Duration,
    period: Duration,
}

impl RetentionSweeper {
    pub fn new(
        upload_root: impl Into<PathBuf>,
        registry: Arc<dyn ConversionRegistry>,
        max_age: Duration,
        period: Duration,
    ) -> Self {
        Self {
            upload_root: upload_root.into(),
            registry,
            max_age,
            period,
        }
    }

    /// Spawn the background task: one sweep immediately, then one per period.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.period);
            loop {
                // The first tick completes immediately.
                ticker.tick().await;
                self.sweep_once().await;
            }
        })
    }

    /// Run a single sweep, logging instead of propagating failures.
    pub async fn sweep_once(&self) {
        match self.sweep().await {
            Ok(removed) if removed > 0 => {
                info!(removed, "retention sweep removed expired batch directories");
            }
            Ok(_) => debug!("retention sweep found nothing to remove"),
            Err(err) => error!(error = %err, "retention sweep failed"),
        }
    }

    async fn sweep(&self) -> io::Result<usize> {
        let now = SystemTime::now();
        let mut removed = 0;
        let mut entries = fs::read_dir(&self.upload_root).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "could not stat entry, skipping");
                    continue;
                }
            };
            if !metadata.is_dir() {
                continue;
            }

            // Not every filesystem records a birth time.
            let created = match metadata.created().or_else(|_| metadata.modified()) {
                Ok(created) => created,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "no usable timestamp, skipping");
                    continue;
                }
            };
            let age = now.duration_since(created).unwrap_or_default();
            if age <= self.max_age {
                continue;
            }

            match fs::remove_dir_all(&path).await {
                Ok(()) => {
                    removed += 1;
                    if let Some(id) = entry.file_name().to_str() {
                        self.registry.remove(id);
                    }
                    debug!(
                        path = %path.display(),
                        age_secs = age.as_secs(),
                        "removed expired batch directory"
                    );
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "failed to remove expired batch directory");
                }
            }
        }

        Ok(removed)
    }
}
