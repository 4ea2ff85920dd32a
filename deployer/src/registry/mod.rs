//! Persistent agent configurations, deployment records and the local
//! heartbeat registry

pub mod agents;
pub mod local_agents;
pub mod records;
pub mod store;

pub use agents::AgentStore;
pub use local_agents::LocalAgentRegistry;
pub use records::RecordStore;
