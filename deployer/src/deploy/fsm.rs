//! Finite State Machine for agent deployment

use crate::errors::DeployerError;
use crate::models::deployment::{DeploymentRecord, DeploymentStatus};

/// Deployment event
#[derive(Debug, Clone)]
pub enum DeploymentEvent {
    /// Start (or restart) a deployment
    Deploy,

    /// Deployment completed successfully
    DeploySuccess,

    /// Deployment failed
    DeployFailed(String),

    /// Re-run a failed deployment. `stuck` allows retrying one that never
    /// finished.
    Retry { stuck: bool },

    /// Abort an in-flight deployment
    Cancel,

    /// Tear down the deployed agent
    Stop,
}

/// Deployment FSM
#[derive(Debug, Clone)]
pub struct DeploymentFsm {
    state: DeploymentStatus,
    error: Option<String>,
    retry_count: u32,
}

impl DeploymentFsm {
    /// Create a new FSM in inactive state
    pub fn new() -> Self {
        Self {
            state: DeploymentStatus::Inactive,
            error: None,
            retry_count: 0,
        }
    }

    /// Resume from a persisted record
    pub fn from_record(record: &DeploymentRecord) -> Self {
        Self {
            state: record.status,
            error: record.last_error.clone(),
            retry_count: record.retry_count,
        }
    }

    /// Copy the machine's state back into `record`
    pub fn write_to(&self, record: &mut DeploymentRecord) {
        record.status = self.state;
        record.last_error = self.error.clone();
        record.retry_count = self.retry_count;
    }

    pub fn state(&self) -> DeploymentStatus {
        self.state
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: DeploymentEvent) -> Result<(), DeployerError> {
        use DeploymentEvent as E;
        use DeploymentStatus as S;

        let new_state = match (&self.state, &event) {
            (S::Inactive | S::Active | S::Error, E::Deploy) => {
                self.error = None;
                S::Deploying
            }

            (S::Deploying, E::DeploySuccess) => {
                self.retry_count = 0;
                S::Active
            }
            (S::Deploying, E::DeployFailed(err)) => {
                self.error = Some(err.clone());
                self.retry_count += 1;
                S::Error
            }

            (S::Error | S::Inactive, E::Retry { .. }) | (S::Deploying, E::Retry { stuck: true }) => {
                self.error = None;
                S::Deploying
            }

            // Cancel and stop are allowed from anywhere
            (_, E::Cancel | E::Stop) => {
                self.error = None;
                S::Inactive
            }

            (state, event) => {
                return Err(DeployerError::InvalidTransition(format!(
                    "{} -> {:?}",
                    state.as_str(),
                    event
                )));
            }
        };

        self.state = new_state;
        Ok(())
    }

    /// Check if deployment can be retried
    pub fn can_retry(&self) -> bool {
        self.state == DeploymentStatus::Error
    }
}

impl Default for DeploymentFsm {
    fn default() -> Self {
        Self::new()
    }
}
