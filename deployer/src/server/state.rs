//! Server state

use std::sync::Arc;

use crate::deploy::Orchestrator;
use crate::registry::LocalAgentRegistry;
use crate::workers::cleanup::CleanupScheduler;
use crate::workers::status_poller::StatusMonitor;

/// Server state shared across handlers
pub struct ServerState {
    pub orchestrator: Arc<Orchestrator>,
    pub monitor: Arc<StatusMonitor>,
    pub local_agents: Arc<LocalAgentRegistry>,
    pub cleanup: Arc<CleanupScheduler>,
}

impl ServerState {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        monitor: Arc<StatusMonitor>,
        local_agents: Arc<LocalAgentRegistry>,
        cleanup: Arc<CleanupScheduler>,
    ) -> Self {
        Self {
            orchestrator,
            monitor,
            local_agents,
            cleanup,
        }
    }
}
