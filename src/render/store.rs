//! Render persistence
//!
//! Writes visualization documents under an identifier-keyed path and hands
//! back a stable retrieval URL. Identifiers are random 128-bit UUIDs, so
//! concurrent saves cannot collide. Writes go through a temp file plus
//! rename: a render either exists completely or not at all.

use crate::error::{Result, VisualdataError};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{info, warn};
use uuid::Uuid;

/// Storage configuration, with env-backed defaults
#[derive(Debug, Clone)]
pub struct RenderStoreConfig {
    /// Directory the documents are written into
    pub dir: PathBuf,
    /// Public base address the retrieval URL is derived from
    pub base_url: String,
}

impl Default for RenderStoreConfig {
    fn default() -> Self {
        Self {
            dir: std::env::var("RENDER_DIR")
                .unwrap_or_else(|_| "storage/renders".to_string())
                .into(),
            base_url: std::env::var("RENDER_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
        }
    }
}

/// A persisted render
#[derive(Debug, Clone, serde::Serialize)]
pub struct StoredRender {
    /// Opaque collision-free identifier
    pub id: String,
    /// Stable retrieval URL: `<base>/renders/<id>.html`
    pub url: String,
    #[serde(skip)]
    pub path: PathBuf,
}

/// Durable store for visualization documents
pub struct RenderStore {
    config: RenderStoreConfig,
}

impl RenderStore {
    /// Open the store, creating the storage directory if needed
    pub fn new(config: RenderStoreConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.dir)
            .map_err(|e| VisualdataError::StorageError(format!("cannot create render dir: {e}")))?;
        Ok(Self { config })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(RenderStoreConfig::default())
    }

    /// Persist a document under a fresh identifier
    pub fn save(&self, document: &str) -> Result<StoredRender> {
        let id = Uuid::new_v4().to_string();
        let path = self.document_path(&id);
        let tmp = self.config.dir.join(format!(".tmp-{id}"));

        std::fs::write(&tmp, document)
            .map_err(|e| VisualdataError::StorageError(format!("render write failed: {e}")))?;
        std::fs::rename(&tmp, &path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp);
            VisualdataError::StorageError(format!("render write failed: {e}"))
        })?;

        let url = format!("{}/renders/{id}.html", self.config.base_url.trim_end_matches('/'));
        info!(id = %id, path = %path.display(), bytes = document.len(), "render persisted");

        Ok(StoredRender { id, url, path })
    }

    /// Read a stored document back
    pub fn fetch(&self, id: &str) -> Result<String> {
        let path = self.checked_path(id)?;
        std::fs::read_to_string(path)
            .map_err(|e| VisualdataError::StorageError(format!("render '{id}' not readable: {e}")))
    }

    /// Remove one render; returns whether it existed
    pub fn delete(&self, id: &str) -> Result<bool> {
        let path = self.checked_path(id)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(VisualdataError::StorageError(format!(
                "cannot delete render '{id}': {e}"
            ))),
        }
    }

    /// Remove every render older than `max_age`; returns the count removed.
    /// Retention is the caller's policy; nothing expires on its own.
    pub fn purge_older_than(&self, max_age: Duration) -> Result<usize> {
        let cutoff = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let mut removed = 0usize;

        for entry in std::fs::read_dir(&self.config.dir)
            .map_err(|e| VisualdataError::StorageError(format!("cannot list render dir: {e}")))?
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable render dir entry");
                    continue;
                }
            };
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("html") {
                continue;
            }
            let modified = entry.metadata().and_then(|m| m.modified());
            if let Ok(modified) = modified {
                if modified < cutoff && std::fs::remove_file(&path).is_ok() {
                    removed += 1;
                }
            }
        }

        if removed > 0 {
            info!(removed, "purged expired renders");
        }
        Ok(removed)
    }

    fn document_path(&self, id: &str) -> PathBuf {
        self.config.dir.join(format!("{id}.html"))
    }

    /// Reject identifiers that could escape the storage directory
    fn checked_path(&self, id: &str) -> Result<PathBuf> {
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(VisualdataError::StorageError(format!(
                "invalid render identifier '{id}'"
            )));
        }
        Ok(self.document_path(id))
    }

    pub fn dir(&self) -> &Path {
        &self.config.dir
    }
}
