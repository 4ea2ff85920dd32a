//! Agents running locally that announce themselves with heartbeats

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use api_models::HeartbeatRequest;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::errors::DeployerError;
use crate::models::agent::validate_agent_id;

/// Stale entries are dropped after this many heartbeat timeouts
const PURGE_AFTER_TIMEOUTS: u32 = 3;

#[derive(Debug, Clone)]
struct LocalAgent {
    heartbeat: HeartbeatRequest,
    registered_at: DateTime<Utc>,
    last_heartbeat: DateTime<Utc>,
}

/// Listing entry
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalAgentView {
    #[serde(flatten)]
    pub heartbeat: HeartbeatRequest,
    /// `online` or `offline`
    pub status: &'static str,
    pub registered_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
}

/// Heartbeat registry
pub struct LocalAgentRegistry {
    agents: RwLock<HashMap<String, LocalAgent>>,
    heartbeat_timeout: Duration,
}

impl LocalAgentRegistry {
    pub fn new(heartbeat_timeout: Duration) -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
            heartbeat_timeout,
        }
    }

    /// Register or refresh an agent
    pub fn heartbeat(
        &self,
        heartbeat: HeartbeatRequest,
        now: DateTime<Utc>,
    ) -> Result<(), DeployerError> {
        validate_agent_id(&heartbeat.agent_id)?;
        let mut agents = self.agents.write().unwrap_or_else(|e| e.into_inner());
        match agents.get_mut(&heartbeat.agent_id) {
            Some(agent) => {
                agent.heartbeat = heartbeat;
                agent.last_heartbeat = now;
            }
            None => {
                agents.insert(
                    heartbeat.agent_id.clone(),
                    LocalAgent {
                        heartbeat,
                        registered_at: now,
                        last_heartbeat: now,
                    },
                );
            }
        }
        Ok(())
    }

    /// Unregister an agent. Returns whether it was registered.
    pub fn remove(&self, agent_id: &str) -> bool {
        let mut agents = self.agents.write().unwrap_or_else(|e| e.into_inner());
        agents.remove(agent_id).is_some()
    }

    /// All registered agents, most recent heartbeat first
    pub fn list(&self, now: DateTime<Utc>) -> Vec<LocalAgentView> {
        let agents = self.agents.read().unwrap_or_else(|e| e.into_inner());
        let mut views: Vec<LocalAgentView> = agents
            .values()
            .map(|agent| LocalAgentView {
                heartbeat: agent.heartbeat.clone(),
                status: if self.age_exceeds(agent, now, 1) {
                    "offline"
                } else {
                    "online"
                },
                registered_at: agent.registered_at,
                last_heartbeat: agent.last_heartbeat,
            })
            .collect();
        views.sort_by(|a, b| b.last_heartbeat.cmp(&a.last_heartbeat));
        views
    }

    /// Drop agents silent for several timeouts. Returns how many were removed.
    pub fn purge_stale(&self, now: DateTime<Utc>) -> usize {
        let mut agents = self.agents.write().unwrap_or_else(|e| e.into_inner());
        let before = agents.len();
        agents.retain(|_, agent| !self.age_exceeds(agent, now, PURGE_AFTER_TIMEOUTS));
        before - agents.len()
    }

    pub fn len(&self) -> usize {
        let agents = self.agents.read().unwrap_or_else(|e| e.into_inner());
        agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn age_exceeds(&self, agent: &LocalAgent, now: DateTime<Utc>, timeouts: u32) -> bool {
        (now - agent.last_heartbeat)
            .to_std()
            .map(|age| age > self.heartbeat_timeout * timeouts)
            .unwrap_or(false)
    }
}
