//! Persisted stream-metadata cache.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::descriptor::StreamProps;
use crate::error::ProbeError;

/// On-disk cache of probed stream properties, keyed by the
/// credential-stripped URL. Safe to delete at any time; it only saves the
/// slow re-probe on the next start.
#[derive(Debug)]
pub struct ProbeCache {
    path: PathBuf,
    entries: HashMap<String, StreamProps>,
}

impl ProbeCache {
    /// Open the cache file, starting empty if it is missing or unreadable.
    pub fn open(path: &Path) -> Self {
        let entries = match std::fs::read_to_string(path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Probe cache unreadable, rebuilding: {}", e);
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };

        debug!(entries = entries.len(), path = %path.display(), "probe cache opened");

        Self {
            path: path.to_path_buf(),
            entries,
        }
    }

    /// In-memory cache for tests.
    pub fn ephemeral() -> Self {
        Self {
            path: PathBuf::new(),
            entries: HashMap::new(),
        }
    }

    /// Look up cached properties by credential-stripped URL.
    pub fn get(&self, key: &str) -> Option<&StreamProps> {
        self.entries.get(key)
    }

    /// Store properties and persist the cache file.
    pub fn insert(&mut self, key: String, props: StreamProps) {
        self.entries.insert(key, props);

        if let Err(e) = self.persist() {
            // Read-only filesystems are common on embedded targets; the
            // cache then just lives for this run.
            warn!("Writing probe cache failed: {}", e);
        }
    }

    /// Remove all entries and delete the cache file.
    pub fn clear(&mut self) {
        self.entries.clear();
        if !self.path.as_os_str().is_empty() {
            let _ = std::fs::remove_file(&self.path);
        }
    }

    fn persist(&self) -> Result<(), ProbeError> {
        if self.path.as_os_str().is_empty() {
            return Ok(());
        }

        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }

        let text = serde_json::to_string_pretty(&self.entries)?;
        std::fs::write(&self.path, text)?;
        Ok(())
    }
}
