//! Settings Store
//!
//! Persists the assistant instructions and the tool list as one JSON document
//! and keeps the last read or written copy in memory.

use anyhow::{Context, Result};
use async_trait::async_trait;
use romabot_core::settings::Settings;
use std::{io::ErrorKind, path::PathBuf};
use tokio::sync::RwLock;
use tracing::info;

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn load(&self) -> Result<Settings>;
    /// Sanitizes and persists `settings`, returning what was stored.
    async fn save(&self, settings: Settings) -> Result<Settings>;
}

pub struct FileSettingsStore {
    path: PathBuf,
    cache: RwLock<Option<Settings>>,
}

impl FileSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: RwLock::new(None),
        }
    }
}

#[async_trait]
impl SettingsStore for FileSettingsStore {
    async fn load(&self) -> Result<Settings> {
        if let Some(settings) = self.cache.read().await.as_ref() {
            return Ok(settings.clone());
        }

        let settings = match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice::<Settings>(&bytes)
                .with_context(|| format!("Invalid settings file {}", self.path.display()))?,
            Err(e) if e.kind() == ErrorKind::NotFound => Settings::default(),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read {}", self.path.display()));
            }
        };
        *self.cache.write().await = Some(settings.clone());
        Ok(settings)
    }

    async fn save(&self, settings: Settings) -> Result<Settings> {
        let settings = settings.sanitized();
        let mut cache = self.cache.write().await;

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        let json = serde_json::to_vec_pretty(&settings)?;
        tokio::fs::write(&self.path, json)
            .await
            .with_context(|| format!("Failed to write {}", self.path.display()))?;

        info!(
            path = %self.path.display(),
            tools = settings.tools.len(),
            "Settings saved."
        );
        *cache = Some(settings.clone());
        Ok(settings)
    }
}
