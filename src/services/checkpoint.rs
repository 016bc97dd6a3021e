//! Integer-seconds checkpoint persisted to a plain text file

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

/// File-backed checkpoint holding the committed elapsed seconds
#[derive(Debug, Clone)]
pub struct FileCheckpoint {
    path: PathBuf,
}

impl FileCheckpoint {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the checkpoint; `Ok(None)` when none has been written yet
    pub async fn load(&self) -> Result<Option<u64>, String> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(format!(
                    "Failed to read checkpoint {}: {}",
                    self.path.display(),
                    e
                ))
            }
        };

        contents
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| format!("Corrupt checkpoint {}: {}", self.path.display(), e))
    }

    /// Seed value for a new timer. Missing or unreadable checkpoints start at zero.
    pub async fn load_seed(&self) -> u64 {
        match self.load().await {
            Ok(Some(seconds)) => {
                info!("Restored {}s from {}", seconds, self.path.display());
                seconds
            }
            Ok(None) => {
                info!("No checkpoint at {}, starting from 0s", self.path.display());
                0
            }
            Err(e) => {
                warn!("{}, starting from 0s", e);
                0
            }
        }
    }

    /// Write the checkpoint through a temp file so readers never see a torn value
    pub async fn save(&self, seconds: u64) -> Result<(), String> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| format!("Failed to create {}: {}", parent.display(), e))?;
        }

        let staging = self.staging_path();
        tokio::fs::write(&staging, seconds.to_string())
            .await
            .map_err(|e| format!("Failed to write {}: {}", staging.display(), e))?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .map_err(|e| format!("Failed to replace {}: {}", self.path.display(), e))?;

        debug!("Checkpoint saved: {}s", seconds);
        Ok(())
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
