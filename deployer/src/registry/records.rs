//! Deployment records

use chrono::Utc;

use crate::errors::DeployerError;
use crate::filesys::file::File;
use crate::models::deployment::DeploymentRecord;
use crate::registry::store::JsonStore;

/// Deployment state per agent, persisted on every change
pub struct RecordStore {
    store: JsonStore<DeploymentRecord>,
}

impl RecordStore {
    pub fn in_memory() -> Self {
        Self {
            store: JsonStore::in_memory(),
        }
    }

    pub async fn load(file: File) -> Result<Self, DeployerError> {
        Ok(Self {
            store: JsonStore::load(file).await?,
        })
    }

    /// Record for `agent_id`; an `Inactive` default when none exists
    pub fn get(&self, agent_id: &str) -> DeploymentRecord {
        self.store
            .get(agent_id)
            .unwrap_or_else(|| DeploymentRecord::new(agent_id))
    }

    pub fn list(&self) -> Vec<DeploymentRecord> {
        self.store.values()
    }

    /// Apply `f` to the agent's record, stamp it and persist. Returns the
    /// updated record.
    pub async fn update<F>(&self, agent_id: &str, f: F) -> Result<DeploymentRecord, DeployerError>
    where
        F: FnOnce(&mut DeploymentRecord) -> Result<(), DeployerError>,
    {
        self.store
            .mutate(|records| {
                let mut record = records
                    .get(agent_id)
                    .cloned()
                    .unwrap_or_else(|| DeploymentRecord::new(agent_id));
                f(&mut record)?;
                record.updated_at = Some(Utc::now());
                records.insert(agent_id.to_string(), record.clone());
                Ok(record)
            })
            .await
    }

    pub async fn remove(&self, agent_id: &str) -> Result<(), DeployerError> {
        self.store
            .mutate(|records| {
                records.remove(agent_id);
                Ok(())
            })
            .await
    }
}
