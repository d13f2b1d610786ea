//! Registry mapping a batch id to the artifact paths it produced.
//!
//! The registry is the only mutable shared state on the request path, so the
//! interface is deliberately tiny: a write-once `put`, a `get`, and a
//! `remove` reserved for the retention sweeper. Request handling never
//! deletes entries. The abstraction is a trait so the in-memory backend can
//! be swapped for a TTL or persistent one without touching handlers.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("conversion `{0}` is already registered")]
    DuplicateId(String),
}

pub trait ConversionRegistry: Send + Sync {
    /// Insert the artifact paths for a finished batch.
    ///
    /// Write-once: inserting an id that already exists fails deterministically
    /// and leaves the existing entry untouched. The entry becomes visible
    /// atomically — readers never observe a partial path list.
    fn put(&self, id: &str, paths: Vec<PathBuf>) -> Result<(), RegistryError>;

    /// Paths registered for `id`, or `None` for an unknown id.
    fn get(&self, id: &str) -> Option<Vec<PathBuf>>;

    /// Drop an entry after its backing directory has been deleted.
    ///
    /// Only the retention sweeper calls this; it keeps the registry from
    /// accumulating entries whose files are gone. Returns whether the id
    /// was present.
    fn remove(&self, id: &str) -> bool;
}

/// Process-local registry. Entries do not survive a restart; neither do the
/// batch directories in any deployment this service targets.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    entries: RwLock<HashMap<String, Vec<PathBuf>>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConversionRegistry for InMemoryRegistry {
    fn put(&self, id: &str, paths: Vec<PathBuf>) -> Result<(), RegistryError> {
        let mut entries = self.entries.write().expect("registry lock poisoned");
        if entries.contains_key(id) {
            return Err(RegistryError::DuplicateId(id.to_string()));
        }
        entries.insert(id.to_string(), paths);
        Ok(())
    }

    fn get(&self, id: &str) -> Option<Vec<PathBuf>> {
        self.entries
            .read()
            .expect("registry lock poisoned")
            .get(id)
            .cloned()
    }

    fn remove(&self, id: &str) -> bool {
        self.entries
            .write()
            .expect("registry lock poisoned")
            .remove(id)
            .is_some()
    }
}
