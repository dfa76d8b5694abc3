//! Artifact Sweeper
//!
//! Removes event videos and snapshots older than the retention window from
//! the managed directories. Runs hourly; sweep errors are absorbed so the
//! worker never dies.

use crate::error::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// ArtifactSweeper instance
pub struct ArtifactSweeper {
    dirs: Vec<PathBuf>,
    retention_days: u64,
    sweep_interval: Duration,
}

impl ArtifactSweeper {
    pub fn new(dirs: Vec<PathBuf>, retention_days: u64) -> Self {
        Self {
            dirs,
            retention_days,
            sweep_interval: Duration::from_secs(3600),
        }
    }

    /// Shorter cadence for tests
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Delete files older than the retention window. Returns the number of
    /// files removed.
    pub async fn sweep_once(&self) -> Result<u64> {
        let cutoff = SystemTime::now() - Duration::from_secs(self.retention_days * 86_400);
        let mut removed = 0u64;

        for dir in &self.dirs {
            let mut entries = match tokio::fs::read_dir(dir).await {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::debug!(dir = %dir.display(), error = %e, "Sweep skipped directory");
                    continue;
                }
            };

            while let Some(entry) = entries.next_entry().await? {
                let meta = match entry.metadata().await {
                    Ok(meta) => meta,
                    Err(_) => continue,
                };
                if !meta.is_file() {
                    continue;
                }
                let Ok(modified) = meta.modified() else {
                    continue;
                };
                if modified < cutoff {
                    match tokio::fs::remove_file(entry.path()).await {
                        Ok(()) => {
                            removed += 1;
                            tracing::debug!(path = %entry.path().display(), "Expired artifact removed");
                        }
                        Err(e) => {
                            tracing::warn!(path = %entry.path().display(), error = %e, "Failed to remove artifact");
                        }
                    }
                }
            }
        }

        if removed > 0 {
            tracing::info!(removed = removed, retention_days = self.retention_days, "Artifact sweep complete");
        }
        Ok(removed)
    }

    /// Periodic sweep worker
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.sweep_interval);
            loop {
                interval.tick().await;
                if let Err(e) = self.sweep_once().await {
                    tracing::error!(error = %e, "Artifact sweep failed");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    #[tokio::test]
    async fn test_fresh_files_survive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fresh.jpg");
        File::create(&path).unwrap();

        let sweeper = ArtifactSweeper::new(vec![dir.path().to_path_buf()], 1);
        let removed = sweeper.sweep_once().await.unwrap();

        assert_eq!(removed, 0);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_expired_files_removed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.h264");
        File::create(&path).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Retention of zero days expires everything already on disk
        let sweeper = ArtifactSweeper::new(vec![dir.path().to_path_buf()], 0);
        let removed = sweeper.sweep_once().await.unwrap();

        assert_eq!(removed, 1);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_missing_directory_is_not_fatal() {
        let sweeper = ArtifactSweeper::new(vec![PathBuf::from("/nonexistent/sitewatch")], 1);
        assert_eq!(sweeper.sweep_once().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_subdirectories_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("nested");
        std::fs::create_dir(&sub).unwrap();

        let sweeper = ArtifactSweeper::new(vec![dir.path().to_path_buf()], 0);
        sweeper.sweep_once().await.unwrap();
        assert!(sub.exists());
    }
}
