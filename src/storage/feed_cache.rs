//! Durable single-slot store for the last fetched feed snapshot.
//!
//! The snapshot is one JSON document. A first run (file absent) and a
//! corrupt file both surface as "no usable cache" to the caller, but they
//! are distinct variants and are logged differently — corruption is worth a
//! warning, a fresh install is not.

use std::path::{Path, PathBuf};
use thiserror::Error;

use super::types::FeedSnapshot;

#[derive(Debug, Error)]
pub enum CacheError {
    /// No snapshot has been saved yet — a valid initial state, not a failure.
    #[error("no cached snapshot")]
    NotFound,

    #[error("cached snapshot is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("failed to access snapshot cache: {0}")]
    Io(#[from] std::io::Error),
}

/// The single cache slot holding the latest [`FeedSnapshot`].
#[derive(Debug, Clone)]
pub struct FeedCache {
    path: PathBuf,
}

impl FeedCache {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serializes the snapshot and atomically replaces the cache slot.
    ///
    /// Every save fully supersedes the previous snapshot; there are no
    /// merge semantics. On failure the previous snapshot is left intact.
    pub fn save(&self, snapshot: &FeedSnapshot) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec(snapshot)?;
        super::atomic_write(&self.path, &bytes)?;
        tracing::debug!(
            path = %self.path.display(),
            posts = snapshot.len(),
            "Saved feed snapshot"
        );
        Ok(())
    }

    /// Loads the last saved snapshot.
    ///
    /// Distinguishes a missing file ([`CacheError::NotFound`], first run)
    /// from unparseable content ([`CacheError::Corrupt`]).
    pub fn load(&self) -> Result<FeedSnapshot, CacheError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "No cached snapshot yet");
                return Err(CacheError::NotFound);
            }
            Err(e) => return Err(CacheError::Io(e)),
        };

        match serde_json::from_str(&content) {
            Ok(snapshot) => Ok(snapshot),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Cached snapshot is corrupt, treating as empty"
                );
                Err(CacheError::Corrupt(e))
            }
        }
    }
}
