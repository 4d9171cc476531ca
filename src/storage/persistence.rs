use crate::domain::message::Message;
use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Durable home of the message list. Every save replaces the whole list.
#[async_trait]
pub trait Persistence: Send + Sync + std::fmt::Debug {
    /// Loads the last saved list, or an empty one if nothing was saved yet.
    ///
    /// Records that cannot be decoded are skipped.
    ///
    /// # Errors
    /// Returns an error if the saved state exists but cannot be read or is not a list.
    async fn load(&self) -> Result<Vec<Message>>;

    /// Replaces the saved list.
    ///
    /// # Errors
    /// Returns an error if the list cannot be written.
    async fn save(&self, messages: &[Message]) -> Result<()>;
}

/// Pretty-printed JSON array on disk, the same format as export.
#[derive(Debug, Clone)]
pub struct JsonFilePersistence {
    path: PathBuf,
}

impl JsonFilePersistence {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(std::ffi::OsStr::to_os_string).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl Persistence for JsonFilePersistence {
    #[tracing::instrument(level = "debug", skip(self), fields(path = %self.path.display()), err)]
    async fn load(&self) -> Result<Vec<Message>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No saved messages found, starting empty");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }

        let items: Vec<serde_json::Value> = serde_json::from_str(&raw)?;
        let total = items.len();
        let messages: Vec<Message> = items
            .into_iter()
            .filter_map(|item| {
                serde_json::from_value(item)
                    .inspect_err(|e| tracing::warn!(error = %e, "Skipping unreadable saved message"))
                    .ok()
            })
            .collect();
        if messages.len() < total {
            tracing::warn!(dropped = total - messages.len(), "Some saved messages could not be read");
        }
        Ok(messages)
    }

    #[tracing::instrument(level = "debug", skip(self, messages), fields(count = messages.len()), err)]
    async fn save(&self, messages: &[Message]) -> Result<()> {
        let encoded = serde_json::to_vec_pretty(messages)?;
        let temp = self.temp_path();

        tokio::fs::write(&temp, encoded).await?;
        tokio::fs::rename(&temp, &self.path).await?;
        Ok(())
    }
}

/// Keeps the saved list in memory; used when no file is configured and in tests.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    saved: Mutex<Vec<Message>>,
}

impl MemoryPersistence {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_messages(messages: Vec<Message>) -> Self {
        Self { saved: Mutex::new(messages) }
    }

    pub async fn snapshot(&self) -> Vec<Message> {
        self.saved.lock().await.clone()
    }
}

#[async_trait]
impl Persistence for MemoryPersistence {
    async fn load(&self) -> Result<Vec<Message>> {
        Ok(self.saved.lock().await.clone())
    }

    async fn save(&self, messages: &[Message]) -> Result<()> {
        messages.clone_into(&mut *self.saved.lock().await);
        Ok(())
    }
}
