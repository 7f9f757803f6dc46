//! JSON file state store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use common::{Error, PersistedState, Result};
use tracing::{debug, info};

use crate::traits::StateStore;

/// Pretty JSON on disk. Saves go to a temporary sibling first and are then
/// renamed over the real file, so a crash never leaves a torn state file.
#[derive(Debug, Clone)]
pub struct JsonStateStore {
    path: PathBuf,
}

impl JsonStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "state".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl StateStore for JsonStateStore {
    /// A missing file is a fresh start; an unreadable one is an error.
    async fn load(&self) -> Result<PersistedState> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No saved state at {}; starting fresh", self.path.display());
                return Ok(PersistedState::default());
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&raw)
            .map_err(|e| Error::State(format!("corrupt state file {}: {}", self.path.display(), e)))
    }

    async fn save(&self, state: &PersistedState) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let body = serde_json::to_vec_pretty(state)?;
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(
            "Saved state: {} weights, {} histories",
            state.weights.len(),
            state.history.len()
        );
        Ok(())
    }
}
