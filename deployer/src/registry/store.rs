//! Keyed in-memory map mirrored to a JSON file

use std::collections::BTreeMap;
use std::sync::RwLock;

use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::errors::DeployerError;
use crate::filesys::file::File;

/// Values keyed by agent id. Every mutation rewrites the backing file when
/// one is configured, and only becomes visible once that write succeeded.
pub struct JsonStore<V> {
    entries: RwLock<BTreeMap<String, V>>,
    file: Option<File>,
    // One mutation at a time, held across the file write
    write_lock: tokio::sync::Mutex<()>,
}

impl<V> JsonStore<V>
where
    V: Clone + Serialize + DeserializeOwned + Send + Sync,
{
    /// Store without persistence
    pub fn in_memory() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            file: None,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Load from `file`, starting empty when it does not exist
    pub async fn load(file: File) -> Result<Self, DeployerError> {
        let entries: BTreeMap<String, V> = file.read_json_or_default().await?;
        debug!("Loaded {} entries from {}", entries.len(), file.path().display());
        Ok(Self {
            entries: RwLock::new(entries),
            file: Some(file),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.contains_key(key)
    }

    pub fn values(&self) -> Vec<V> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `f` on a copy of the map, persist the copy, then publish it.
    /// On any error the stored state is left unchanged.
    pub async fn mutate<R>(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, V>) -> Result<R, DeployerError>,
    ) -> Result<R, DeployerError> {
        let _guard = self.write_lock.lock().await;
        let mut next = {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            entries.clone()
        };
        let result = f(&mut next)?;

        if let Some(file) = &self.file {
            file.write_json(&next).await?;
        }

        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        *entries = next;
        Ok(result)
    }
}
