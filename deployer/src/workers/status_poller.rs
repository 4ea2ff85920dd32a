//! Status polling for monitoring sessions
//!
//! A session polls one agent, reconciles the local deployment record with
//! what LiveKit reports, and publishes the result on a watch channel.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::deploy::Orchestrator;
use crate::errors::DeployerError;
use crate::models::deployment::{
    DeploymentRecord, DeploymentStatus, DisplayState, LiveStatus, LogEntry, StatusView,
};

/// Status poller options
#[derive(Debug, Clone)]
pub struct Options {
    /// Polling interval
    pub interval: Duration,

    /// Polling interval while a deployment is in flight
    pub fast_interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            fast_interval: Duration::from_secs(1),
        }
    }
}

/// Opens monitoring sessions
pub struct StatusMonitor {
    orchestrator: Arc<Orchestrator>,
    options: Options,
}

impl StatusMonitor {
    pub fn new(orchestrator: Arc<Orchestrator>, options: Options) -> Self {
        Self {
            orchestrator,
            options,
        }
    }

    /// Start polling `agent_id`
    pub fn open(&self, agent_id: &str) -> MonitorSession {
        let (tx, rx) = watch::channel(None);
        let closed = Arc::new(AtomicBool::new(false));
        let id = Uuid::new_v4();

        let task = {
            let orchestrator = self.orchestrator.clone();
            let options = self.options.clone();
            let agent_id = agent_id.to_string();
            let closed = closed.clone();
            tokio::spawn(async move {
                run(&options, &orchestrator, &agent_id, tx, closed, tokio::time::sleep).await;
            })
        };

        debug!(agent_id = %agent_id, session = %id, "Monitoring session opened");
        MonitorSession {
            id,
            agent_id: agent_id.to_string(),
            rx,
            closed,
            task,
        }
    }

    /// Start polling `agent_id` with an empty log
    pub fn open_fresh(&self, agent_id: &str) -> MonitorSession {
        self.orchestrator.sink().clear(agent_id);
        self.open(agent_id)
    }

    /// One reconcile pass
    pub async fn snapshot(&self, agent_id: &str) -> StatusView {
        snapshot(&self.orchestrator, agent_id).await
    }
}

/// A polling task for one agent. Dropping the session stops it.
pub struct MonitorSession {
    id: Uuid,
    agent_id: String,
    rx: watch::Receiver<Option<StatusView>>,
    closed: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl MonitorSession {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Most recent view, if one has been published. `None` once closed.
    pub fn latest(&self) -> Option<StatusView> {
        if self.is_closed() {
            return None;
        }
        self.rx.borrow().clone()
    }

    /// Wait for the next published view. `None` once the session is closed.
    pub async fn next(&mut self) -> Option<StatusView> {
        loop {
            if self.is_closed() || self.rx.changed().await.is_err() {
                return None;
            }
            if let Some(view) = self.rx.borrow_and_update().clone() {
                return Some(view);
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Stop polling; results still in flight are discarded
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.task.abort();
            debug!(agent_id = %self.agent_id, session = %self.id, "Monitoring session closed");
        }
    }
}

impl Drop for MonitorSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Run the polling loop of one session
pub async fn run<S, F>(
    options: &Options,
    orchestrator: &Orchestrator,
    agent_id: &str,
    tx: watch::Sender<Option<StatusView>>,
    closed: Arc<AtomicBool>,
    sleep_fn: S,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!(agent_id = %agent_id, "Status poller starting...");

    loop {
        let view = snapshot(orchestrator, agent_id).await;
        let interval = if view.local_status == DeploymentStatus::Deploying {
            options.fast_interval
        } else {
            options.interval
        };

        // A late result never reaches a closed session
        if closed.load(Ordering::SeqCst) || tx.send(Some(view)).is_err() {
            debug!(agent_id = %agent_id, "Status poller stopping");
            return;
        }

        sleep_fn(interval).await;
    }
}

async fn snapshot(orchestrator: &Orchestrator, agent_id: &str) -> StatusView {
    let record = orchestrator.records().get(agent_id);
    // Nothing to compare against while the deploy itself is running
    let live = if record.status == DeploymentStatus::Deploying {
        None
    } else {
        Some(orchestrator.get_status(agent_id).await)
    };
    let logs = orchestrator.sink().read(agent_id);
    reconcile(&record, live, logs, Utc::now(), orchestrator.stuck_after())
}

/// Combine the local record with the live check into the state shown to
/// the user
pub fn reconcile(
    record: &DeploymentRecord,
    live: Option<Result<LiveStatus, DeployerError>>,
    logs: Vec<LogEntry>,
    now: DateTime<Utc>,
    stuck_after: Duration,
) -> StatusView {
    let (live, live_error) = match live {
        Some(Ok(live)) => (Some(live), None),
        Some(Err(e)) => (None, Some(e.to_string())),
        None => (None, None),
    };
    let deployed = live.as_ref().map(|l| l.is_deployed);

    let (display_state, message) = match (record.status, deployed) {
        (DeploymentStatus::Deploying, _) => {
            if record.is_stuck(now, stuck_after) {
                (
                    DisplayState::Stuck,
                    Some(format!(
                        "Deployment has not finished after {}s",
                        stuck_after.as_secs()
                    )),
                )
            } else {
                (DisplayState::Deploying, None)
            }
        }
        (DeploymentStatus::Active, Some(true)) => (DisplayState::Active, None),
        (DeploymentStatus::Active, Some(false)) => (
            DisplayState::Inconsistent,
            Some("Marked active but not running in LiveKit".to_string()),
        ),
        (status @ (DeploymentStatus::Inactive | DeploymentStatus::Error), Some(true)) => (
            DisplayState::Inconsistent,
            Some(format!("Running in LiveKit but marked {}", status.as_str())),
        ),
        (status, _) => {
            let state = match status {
                DeploymentStatus::Active => DisplayState::Active,
                DeploymentStatus::Error => DisplayState::Error,
                _ => DisplayState::Inactive,
            };
            let message = match (&live_error, status) {
                (Some(e), _) => Some(format!("Live status unavailable: {}", e)),
                (None, DeploymentStatus::Error) => record.last_error.clone(),
                _ => None,
            };
            (state, message)
        }
    };

    StatusView {
        agent_id: record.agent_id.clone(),
        display_state,
        local_status: record.status,
        cloud_agent_id: record.cloud_agent_id.clone(),
        live,
        logs,
        can_retry: matches!(display_state, DisplayState::Error | DisplayState::Stuck)
            || record.status == DeploymentStatus::Error,
        can_cancel: record.status == DeploymentStatus::Deploying,
        message,
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::deployment::StatusSource;

    fn record(status: DeploymentStatus) -> DeploymentRecord {
        let mut record = DeploymentRecord::new("a1");
        record.status = status;
        record
    }

    fn live(is_deployed: bool) -> Option<Result<LiveStatus, DeployerError>> {
        Some(Ok(LiveStatus {
            is_deployed,
            source: StatusSource::Room,
            cloud_agent_id: None,
            room_name: "agent-a1".to_string(),
            participants: u32::from(is_deployed),
        }))
    }

    const STUCK: Duration = Duration::from_secs(120);

    #[test]
    fn test_active_and_running() {
        let view = reconcile(&record(DeploymentStatus::Active), live(true), vec![], Utc::now(), STUCK);
        assert_eq!(view.display_state, DisplayState::Active);
        assert!(!view.can_retry);
    }

    #[test]
    fn test_active_but_empty_room_is_inconsistent() {
        let view = reconcile(&record(DeploymentStatus::Active), live(false), vec![], Utc::now(), STUCK);
        assert_eq!(view.display_state, DisplayState::Inconsistent);
        assert!(view.message.is_some());
    }

    #[test]
    fn test_inactive_but_running_is_inconsistent() {
        let view = reconcile(&record(DeploymentStatus::Inactive), live(true), vec![], Utc::now(), STUCK);
        assert_eq!(view.display_state, DisplayState::Inconsistent);
    }

    #[test]
    fn test_error_offers_retry() {
        let mut rec = record(DeploymentStatus::Error);
        rec.last_error = Some("exit code Some(1)".to_string());
        let view = reconcile(&rec, live(false), vec![], Utc::now(), STUCK);
        assert_eq!(view.display_state, DisplayState::Error);
        assert!(view.can_retry);
        assert_eq!(view.message.as_deref(), Some("exit code Some(1)"));
    }

    #[test]
    fn test_deploying_turns_stuck() {
        let now = Utc::now();
        let mut rec = record(DeploymentStatus::Deploying);
        rec.deploy_started_at = Some(now - chrono::Duration::seconds(30));
        let view = reconcile(&rec, None, vec![], now, STUCK);
        assert_eq!(view.display_state, DisplayState::Deploying);
        assert!(view.can_cancel);
        assert!(!view.can_retry);

        rec.deploy_started_at = Some(now - chrono::Duration::seconds(121));
        let view = reconcile(&rec, None, vec![], now, STUCK);
        assert_eq!(view.display_state, DisplayState::Stuck);
        assert!(view.can_retry);
    }

    #[test]
    fn test_failed_live_check_falls_back_to_local() {
        let view = reconcile(
            &record(DeploymentStatus::Active),
            Some(Err(DeployerError::RoomServiceError("unavailable".to_string()))),
            vec![],
            Utc::now(),
            STUCK,
        );
        assert_eq!(view.display_state, DisplayState::Active);
        assert!(view.live.is_none());
        assert!(view
            .message
            .as_deref()
            .is_some_and(|m| m.starts_with("Live status unavailable")));
    }
}
