//! Periodic cleanup of old deployment logs and stale local agents

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::deploy::LogSink;
use crate::models::deployment::DeploymentStatus;
use crate::registry::{LocalAgentRegistry, RecordStore};

/// Cleanup worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Time between runs
    pub interval: Duration,

    /// Logs of settled agents older than this are cleared
    pub log_retention: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            log_retention: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Counters of the scheduler
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupStatus {
    pub running: bool,
    pub runs: u64,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_purged_logs: usize,
    pub last_purged_agents: usize,
}

/// What one run removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub purged_logs: usize,
    pub purged_agents: usize,
}

/// Everything a cleanup run touches
#[derive(Clone)]
pub struct CleanupTargets {
    pub sink: Arc<LogSink>,
    pub records: Arc<RecordStore>,
    pub local_agents: Arc<LocalAgentRegistry>,
}

struct Running {
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

/// Owns the cleanup task. Created once by the app; independent instances
/// can be created in tests.
pub struct CleanupScheduler {
    options: Options,
    targets: CleanupTargets,
    stats: Arc<RwLock<CleanupStatus>>,
    running: Mutex<Option<Running>>,
}

impl CleanupScheduler {
    pub fn new(options: Options, targets: CleanupTargets) -> Self {
        Self {
            options,
            targets,
            stats: Arc::new(RwLock::new(CleanupStatus::default())),
            running: Mutex::new(None),
        }
    }

    /// Start the periodic task. Returns `false` when it was already running.
    pub fn start(&self) -> bool {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return false;
        }

        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        let options = self.options.clone();
        let targets = self.targets.clone();
        let stats = self.stats.clone();
        let handle = tokio::spawn(async move {
            run(
                &options,
                &targets,
                &stats,
                tokio::time::sleep,
                Box::pin(async move {
                    let _ = shutdown_rx.recv().await;
                }),
            )
            .await;
        });

        *running = Some(Running {
            shutdown_tx,
            handle,
        });
        info!("Cleanup scheduler started (every {:?})", self.options.interval);
        true
    }

    /// Stop the periodic task and wait for it. Returns `false` when it was
    /// not running.
    pub async fn stop(&self) -> bool {
        let running = {
            let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
            running.take()
        };
        let Some(running) = running else {
            return false;
        };

        let _ = running.shutdown_tx.send(());
        if let Err(e) = running.handle.await {
            warn!("Cleanup task ended abnormally: {}", e);
        }
        info!("Cleanup scheduler stopped");
        true
    }

    pub fn status(&self) -> CleanupStatus {
        let mut status = self.stats.read().unwrap_or_else(|e| e.into_inner()).clone();
        let running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        status.running = running.as_ref().is_some_and(|r| !r.handle.is_finished());
        status
    }

    /// One cleanup pass, outside the schedule
    pub fn run_once(&self, now: DateTime<Utc>) -> CleanupReport {
        let report = cleanup(&self.options, &self.targets, now);
        record_run(&self.stats, report, now);
        report
    }
}

/// Run the cleanup worker
pub async fn run<S, F>(
    options: &Options,
    targets: &CleanupTargets,
    stats: &RwLock<CleanupStatus>,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Cleanup worker starting...");

    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Cleanup worker shutting down...");
                return;
            }
            _ = sleep_fn(options.interval) => {}
        }

        let now = Utc::now();
        let report = cleanup(options, targets, now);
        record_run(stats, report, now);
    }
}

fn cleanup(options: &Options, targets: &CleanupTargets, now: DateTime<Utc>) -> CleanupReport {
    let mut purged_logs = 0;
    for agent_id in targets.sink.agents() {
        let record = targets.records.get(&agent_id);
        // In-flight and failed deployments keep their logs
        if !matches!(
            record.status,
            DeploymentStatus::Inactive | DeploymentStatus::Active
        ) {
            continue;
        }

        let last_activity = [targets.sink.last_append(&agent_id), record.updated_at]
            .into_iter()
            .flatten()
            .max();
        let expired = last_activity
            .and_then(|at| (now - at).to_std().ok())
            .is_some_and(|age| age > options.log_retention);
        if expired {
            targets.sink.clear(&agent_id);
            purged_logs += 1;
        }
    }

    let purged_agents = targets.local_agents.purge_stale(now);
    if purged_logs > 0 || purged_agents > 0 {
        debug!(
            "Cleanup removed {} agent logs and {} stale local agents",
            purged_logs, purged_agents
        );
    }

    CleanupReport {
        purged_logs,
        purged_agents,
    }
}

fn record_run(stats: &RwLock<CleanupStatus>, report: CleanupReport, now: DateTime<Utc>) {
    let mut stats = stats.write().unwrap_or_else(|e| e.into_inner());
    stats.runs += 1;
    stats.last_run_at = Some(now);
    stats.last_purged_logs = report.purged_logs;
    stats.last_purged_agents = report.purged_agents;
}
