//! File-backed cache for enrichment responses
//!
//! Translations and synthesized audio are deterministic for a given request,
//! so responses are stored on disk keyed by a SHA-256 digest of the request.
//! Payloads are JSON files; a corrupt or unreadable entry is a miss.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Content-addressed file cache
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    /// Create a cache rooted at `dir`, creating the directory if needed
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating cache directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.dir.join(format!("{}.json", hex::encode(digest)))
    }

    /// Fetch a cached value; any read or parse failure is a miss
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let path = self.entry_path(key);
        let raw = std::fs::read(&path).ok()?;
        match serde_json::from_slice(&raw) {
            Ok(value) => {
                debug!(path = %path.display(), "cache hit");
                Some(value)
            }
            Err(err) => {
                warn!(path = %path.display(), %err, "discarding corrupt cache entry");
                let _ = std::fs::remove_file(&path);
                None
            }
        }
    }

    /// Store a value; write failures are logged, never propagated
    pub fn put<T: Serialize>(&self, key: &str, value: &T) {
        let path = self.entry_path(key);
        match serde_json::to_vec(value) {
            Ok(raw) => {
                if let Err(err) = std::fs::write(&path, raw) {
                    warn!(path = %path.display(), %err, "failed to write cache entry");
                }
            }
            Err(err) => warn!(%err, "failed to serialize cache entry"),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
