use log::{info, warn};
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::Result;
use crate::models::Poll;

/// Flat-file poll storage: one JSON array holding every poll, rewritten whole
/// on each save.
#[derive(Debug, Clone)]
pub struct PollStore {
    path: PathBuf,
}

impl PollStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // Bad content is copied here before the file is reset
    fn backup_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".bak");
        PathBuf::from(name)
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// Read every stored poll. A missing file, unreadable content, or anything
    /// other than a JSON array resets the store to `[]` and yields nothing.
    pub async fn load_all(&self) -> Vec<Poll> {
        let content = match fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("Poll storage {} not found, creating it", self.path.display());
                self.reset().await;
                return Vec::new();
            }
            Err(e) => {
                warn!("Failed to read poll storage {}: {}", self.path.display(), e);
                self.reset().await;
                return Vec::new();
            }
        };

        let entries = match serde_json::from_slice::<Value>(&content) {
            Ok(Value::Array(entries)) => entries,
            Ok(_) => {
                warn!("Poll storage {} is not a JSON array, resetting it", self.path.display());
                self.back_up(&content).await;
                self.reset().await;
                return Vec::new();
            }
            Err(e) => {
                warn!("Poll storage {} is not valid JSON ({}), resetting it", self.path.display(), e);
                self.back_up(&content).await;
                self.reset().await;
                return Vec::new();
            }
        };

        let mut polls = Vec::with_capacity(entries.len());
        for (index, entry) in entries.into_iter().enumerate() {
            match serde_json::from_value::<Poll>(entry) {
                Ok(poll) => polls.push(poll),
                Err(e) => warn!("Skipping stored poll #{}: {}", index, e),
            }
        }
        polls
    }

    /// Overwrite the store with `polls`.
    pub async fn save_all(&self, polls: &[Poll]) -> Result<()> {
        let body = serde_json::to_vec(polls)?;
        self.write(&body).await
    }

    async fn write(&self, body: &[u8]) -> Result<()> {
        let temp = self.temp_path();
        fs::write(&temp, body).await?;
        fs::rename(&temp, &self.path).await?;
        Ok(())
    }

    async fn reset(&self) {
        if let Err(e) = self.write(b"[]").await {
            warn!("Failed to reset poll storage {}: {}", self.path.display(), e);
        }
    }

    async fn back_up(&self, content: &[u8]) {
        let backup = self.backup_path();
        match fs::write(&backup, content).await {
            Ok(()) => info!("Saved unreadable poll storage to {}", backup.display()),
            Err(e) => warn!("Failed to back up poll storage to {}: {}", backup.display(), e),
        }
    }
}
