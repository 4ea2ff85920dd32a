//! Agent configurations

use crate::errors::DeployerError;
use crate::filesys::file::File;
use crate::models::agent::{AgentConfig, AgentUpdate};
use crate::registry::store::JsonStore;

/// Agent configurations keyed by agent id
pub struct AgentStore {
    store: JsonStore<AgentConfig>,
}

impl AgentStore {
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

    /// Add a new agent; the id must be unused
    pub async fn create(&self, config: AgentConfig) -> Result<AgentConfig, DeployerError> {
        config.validate()?;
        self.store
            .mutate(|agents| {
                if agents.contains_key(&config.agent_id) {
                    return Err(DeployerError::ValidationError(format!(
                        "agent {} already exists",
                        config.agent_id
                    )));
                }
                agents.insert(config.agent_id.clone(), config.clone());
                Ok(config)
            })
            .await
    }

    pub fn get(&self, agent_id: &str) -> Result<AgentConfig, DeployerError> {
        self.store
            .get(agent_id)
            .ok_or_else(|| DeployerError::NotFound(format!("agent {agent_id}")))
    }

    pub fn list(&self) -> Vec<AgentConfig> {
        self.store.values()
    }

    pub async fn update(
        &self,
        agent_id: &str,
        update: AgentUpdate,
    ) -> Result<AgentConfig, DeployerError> {
        self.store
            .mutate(|agents| {
                let config = agents
                    .get_mut(agent_id)
                    .ok_or_else(|| DeployerError::NotFound(format!("agent {agent_id}")))?;
                config.apply(update)?;
                Ok(config.clone())
            })
            .await
    }

    pub async fn delete(&self, agent_id: &str) -> Result<AgentConfig, DeployerError> {
        self.store
            .mutate(|agents| {
                agents
                    .remove(agent_id)
                    .ok_or_else(|| DeployerError::NotFound(format!("agent {agent_id}")))
            })
            .await
    }
}
