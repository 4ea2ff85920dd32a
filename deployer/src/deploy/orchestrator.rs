//! Cloud deployment orchestrator
//!
//! Drives one agent from configuration to a running LiveKit Cloud agent:
//! generate the script, write the workspace, build, `lk agent create`,
//! and extract the cloud id. Every step reports into the deployment log
//! sink. Deploys and stops of the same agent are serialized by a keyed
//! lock; a second concurrent deploy is rejected.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::OwnedMutexGuard;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::deploy::fsm::{DeploymentEvent, DeploymentFsm};
use crate::deploy::locks::{CancelGuard, CancelRegistry, KeyedLocks};
use crate::deploy::log_sink::{LogSink, Redactor};
use crate::deploy::parse::{resolve_cloud_id, ParsedAgentId};
use crate::deploy::project::{write_workspace, ProjectDescriptor};
use crate::deploy::script::ScriptGenerator;
use crate::errors::DeployerError;
use crate::filesys::dir::Dir;
use crate::livekit::cli::{is_absent_output, list_mentions, LiveKitCli};
use crate::livekit::rooms::RoomService;
use crate::models::agent::{room_name_for, AgentConfig};
use crate::models::deployment::{
    DeploymentRecord, DeploymentStatus, IdConfidence, LiveStatus, StatusSource,
};
use crate::process::{
    discard_lines, resolve_tool, CommandSpec, LineSink, OutputLine, ProcessRunner,
};
use crate::registry::{AgentStore, RecordStore};
use crate::storage::credentials::Credentials;
use crate::storage::settings::LiveKitSettings;
use crate::utils::sha256_hash;

const SOURCE_DEPLOY: &str = "deploy";
const SOURCE_BUILD: &str = "build";

/// Orchestrator options
#[derive(Debug, Clone)]
pub struct Options {
    pub livekit: LiveKitSettings,

    /// A deployment in flight for longer than this is reported as stuck
    pub stuck_after: Duration,

    /// Parent of the per-agent working directories
    pub workspaces: Dir,

    pub templates_dir: PathBuf,
}

/// Installed LiveKit CLI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliVersion {
    pub path: PathBuf,
    pub version: String,
}

/// Exclusive right to deploy one agent, held for the whole attempt
pub struct DeployPermit {
    agent_id: String,
    attempt: Uuid,
    _guard: OwnedMutexGuard<()>,
    cancel: CancelGuard,
}

/// Result of a successful deployment pipeline
struct DeployOutcome {
    cloud: ParsedAgentId,
    script_digest: String,
}

pub struct Orchestrator {
    options: Options,
    generator: ScriptGenerator,
    runner: Arc<dyn ProcessRunner>,
    rooms: Option<Arc<dyn RoomService>>,
    credentials: Arc<Credentials>,
    redactor: Redactor,
    sink: Arc<LogSink>,
    agents: Arc<AgentStore>,
    records: Arc<RecordStore>,
    locks: KeyedLocks,
    cancels: CancelRegistry,
}

impl Orchestrator {
    pub fn new(
        options: Options,
        credentials: Arc<Credentials>,
        runner: Arc<dyn ProcessRunner>,
        sink: Arc<LogSink>,
        agents: Arc<AgentStore>,
        records: Arc<RecordStore>,
    ) -> Self {
        Self {
            generator: ScriptGenerator::new(options.templates_dir.clone()),
            redactor: Redactor::new(credentials.secret_values()),
            options,
            runner,
            rooms: None,
            credentials,
            sink,
            agents,
            records,
            locks: KeyedLocks::new(),
            cancels: CancelRegistry::new(),
        }
    }

    /// Enable room checks and fallback room deletion
    pub fn with_room_service(mut self, rooms: Arc<dyn RoomService>) -> Self {
        self.rooms = Some(rooms);
        self
    }

    pub fn sink(&self) -> &Arc<LogSink> {
        &self.sink
    }

    pub fn agents(&self) -> &Arc<AgentStore> {
        &self.agents
    }

    pub fn records(&self) -> &Arc<RecordStore> {
        &self.records
    }

    pub fn stuck_after(&self) -> Duration {
        self.options.stuck_after
    }

    // ================================= DEPLOY ================================= //

    /// Deploy `config` and wait for the outcome
    pub async fn deploy(&self, config: AgentConfig) -> Result<DeploymentRecord, DeployerError> {
        let guard = self.try_lock(&config.agent_id)?;
        let permit = self.begin(&config, DeploymentEvent::Deploy, guard).await?;
        self.run(permit, config).await
    }

    /// Validate, take the agent's lock and mark it deploying, then finish
    /// the deployment in the background. Fails fast with
    /// `AlreadyInProgress` when another deploy holds the lock.
    pub async fn start_deploy(
        self: &Arc<Self>,
        config: AgentConfig,
    ) -> Result<JoinHandle<Result<DeploymentRecord, DeployerError>>, DeployerError> {
        let guard = self.try_lock(&config.agent_id)?;
        let permit = self.begin(&config, DeploymentEvent::Deploy, guard).await?;
        Ok(self.spawn_run(permit, config))
    }

    /// Re-run the deployment of a stored agent. Allowed from `Error`,
    /// `Inactive` and a stuck `Deploying`; a stuck attempt is cancelled
    /// first.
    pub async fn retry(
        self: &Arc<Self>,
        agent_id: &str,
    ) -> Result<JoinHandle<Result<DeploymentRecord, DeployerError>>, DeployerError> {
        let config = self.agents.get(agent_id)?;
        let record = self.records.get(agent_id);
        let stuck = self.is_stuck(&record, Utc::now());

        let guard = if stuck {
            warn!(agent_id = %agent_id, "Retrying stuck deployment");
            self.cancels.cancel(agent_id);
            self.locks.acquire(agent_id).await
        } else {
            self.try_lock(agent_id)?
        };

        let permit = self
            .begin(&config, DeploymentEvent::Retry { stuck }, guard)
            .await?;
        Ok(self.spawn_run(permit, config))
    }

    fn try_lock(&self, agent_id: &str) -> Result<OwnedMutexGuard<()>, DeployerError> {
        self.locks
            .try_acquire(agent_id)
            .ok_or_else(|| DeployerError::AlreadyInProgress(agent_id.to_string()))
    }

    fn spawn_run(
        self: &Arc<Self>,
        permit: DeployPermit,
        config: AgentConfig,
    ) -> JoinHandle<Result<DeploymentRecord, DeployerError>> {
        let this = self.clone();
        tokio::spawn(async move { this.run(permit, config).await })
    }

    async fn begin(
        &self,
        config: &AgentConfig,
        event: DeploymentEvent,
        guard: OwnedMutexGuard<()>,
    ) -> Result<DeployPermit, DeployerError> {
        config.validate()?;
        let agent_id = config.agent_id.clone();
        let attempt = Uuid::new_v4();

        let record = self.records.get(&agent_id);
        let mut fsm = DeploymentFsm::from_record(&record);
        // Holding the lock while the record says deploying means the previous
        // attempt died with the process
        let event = match (record.status, event) {
            (DeploymentStatus::Deploying, DeploymentEvent::Deploy | DeploymentEvent::Retry { .. }) => {
                DeploymentEvent::Retry { stuck: true }
            }
            (_, event) => event,
        };
        fsm.process(event)?;

        self.sink.clear(&agent_id);
        self.sink.info(
            &agent_id,
            format!("Starting deployment of {} ({})", config.agent_name, agent_id),
            SOURCE_DEPLOY,
        );
        info!(agent_id = %agent_id, %attempt, "Deployment started");

        self.records
            .update(&agent_id, |record| {
                fsm.write_to(record);
                record.deploy_started_at = Some(Utc::now());
                Ok(())
            })
            .await?;

        Ok(DeployPermit {
            cancel: self.cancels.register(&agent_id),
            agent_id,
            attempt,
            _guard: guard,
        })
    }

    async fn run(
        &self,
        mut permit: DeployPermit,
        config: AgentConfig,
    ) -> Result<DeploymentRecord, DeployerError> {
        let agent_id = permit.agent_id.clone();

        let result = tokio::select! {
            result = self.execute(&config) => result,
            _ = permit.cancel.cancelled() => Err(DeployerError::Cancelled(agent_id.clone())),
        };

        match result {
            Ok(outcome) => {
                self.sink.info(
                    &agent_id,
                    format!("Agent deployed as {}", outcome.cloud.id),
                    SOURCE_DEPLOY,
                );
                info!(
                    agent_id = %agent_id,
                    attempt = %permit.attempt,
                    cloud_agent_id = %outcome.cloud.id,
                    "Deployment succeeded"
                );
                self.records
                    .update(&agent_id, |record| {
                        let mut fsm = DeploymentFsm::from_record(record);
                        fsm.process(DeploymentEvent::DeploySuccess)?;
                        fsm.write_to(record);
                        record.cloud_agent_id = Some(outcome.cloud.id);
                        record.id_confidence = Some(outcome.cloud.confidence);
                        record.last_deployed_at = Some(Utc::now());
                        record.deploy_started_at = None;
                        record.script_digest = Some(outcome.script_digest);
                        Ok(())
                    })
                    .await
            }
            Err(DeployerError::Cancelled(_)) => {
                self.sink
                    .warn(&agent_id, "Deployment cancelled", SOURCE_DEPLOY);
                info!(agent_id = %agent_id, attempt = %permit.attempt, "Deployment cancelled");
                self.record_inactive(&agent_id).await?;
                Err(DeployerError::Cancelled(agent_id))
            }
            Err(e) => {
                let message = self.redactor.redact(&e.to_string());
                self.sink.error(
                    &agent_id,
                    format!("Deployment failed: {}", message),
                    SOURCE_DEPLOY,
                );
                error!(
                    agent_id = %agent_id,
                    attempt = %permit.attempt,
                    kind = e.kind(),
                    "Deployment failed: {}",
                    message
                );
                self.records
                    .update(&agent_id, |record| {
                        let mut fsm = DeploymentFsm::from_record(record);
                        fsm.process(DeploymentEvent::DeployFailed(message.clone()))?;
                        fsm.write_to(record);
                        record.deploy_started_at = None;
                        Ok(())
                    })
                    .await?;
                Err(e)
            }
        }
    }

    async fn execute(&self, config: &AgentConfig) -> Result<DeployOutcome, DeployerError> {
        let agent_id = config.agent_id.as_str();
        let livekit = &self.options.livekit;

        // 1. Script and workspace
        let template = config.template_name();
        let script = self.generator.generate(config, template).await?;
        self.sink.info(
            agent_id,
            format!("Generated agent script from template '{}'", template),
            SOURCE_DEPLOY,
        );

        let workspace = self.options.workspaces.subdir(agent_id);
        write_workspace(&workspace, &script, &ProjectDescriptor::python(&livekit.subdomain)).await?;
        debug!(agent_id = %agent_id, step = "workspace", "Wrote {}", workspace.path().display());
        self.sink.info(
            agent_id,
            format!("Prepared workspace {}", workspace.path().display()),
            SOURCE_DEPLOY,
        );

        // 2. CLI
        let cli = match self.resolve_cli() {
            Ok(cli) => cli,
            Err(e) => {
                self.sink.error(
                    agent_id,
                    format!(
                        "LiveKit CLI '{}' not found. Install it from https://docs.livekit.io/home/cli/",
                        livekit.cli_name
                    ),
                    SOURCE_DEPLOY,
                );
                return Err(e);
            }
        };

        // 3. Build
        if let Some((program, args)) = livekit.build_command.split_first() {
            self.sink.info(agent_id, "Building agent...", SOURCE_BUILD);
            info!(agent_id = %agent_id, step = "build", "Running build");
            let spec = CommandSpec::new(program)
                .args(args.iter().cloned())
                .cwd(workspace.path())
                .timeout(livekit.build_timeout());
            self.runner
                .run(spec, self.forward_lines(agent_id, SOURCE_BUILD, Some("[build]")))
                .await
                .map_err(|e| match e {
                    DeployerError::ProcessFailed { code, stderr, .. } => {
                        DeployerError::BuildFailure(format!("exit code {:?}: {}", code, stderr))
                    }
                    other => other,
                })?;
            self.sink.info(agent_id, "Build finished", SOURCE_BUILD);
        }

        // 4. Deploy
        self.sink.info(
            agent_id,
            format!("Creating agent in project '{}'", cli.project()),
            SOURCE_DEPLOY,
        );
        info!(agent_id = %agent_id, step = "deploy", "Running agent create");
        let spec = cli
            .create(workspace.path(), livekit.deploy_timeout())
            .envs(agent_env(config))
            .envs(self.credentials.env_overlay());
        let output = self
            .runner
            .run(spec, self.forward_lines(agent_id, SOURCE_DEPLOY, None))
            .await
            .map_err(|e| match e {
                DeployerError::ProcessFailed { code, stderr, .. } => {
                    DeployerError::DeployFailure(format!("exit code {:?}: {}", code, stderr))
                }
                other => other,
            })?;

        // 5. Cloud id
        let cloud = resolve_cloud_id(&output.combined(), agent_id);
        if cloud.confidence == IdConfidence::Fallback {
            warn!(
                agent_id = %agent_id,
                "No cloud agent id in CLI output, falling back to the local id"
            );
            self.sink.warn(
                agent_id,
                "Could not read the cloud agent id from the CLI output; using the local id",
                SOURCE_DEPLOY,
            );
        }

        Ok(DeployOutcome {
            cloud,
            script_digest: sha256_hash(script.as_bytes()),
        })
    }

    /// Line callback writing redacted child output into the sink
    fn forward_lines(
        &self,
        agent_id: &str,
        source: &'static str,
        prefix: Option<&'static str>,
    ) -> LineSink {
        let sink = self.sink.clone();
        let redactor = self.redactor.clone();
        let agent_id = agent_id.to_string();
        Arc::new(move |line: OutputLine| {
            let text = redactor.redact(&line.text);
            let message = match prefix {
                Some(prefix) => format!("{} {}", prefix, text),
                None => text,
            };
            sink.info(&agent_id, message, source);
        })
    }

    fn resolve_cli(&self) -> Result<LiveKitCli, DeployerError> {
        let livekit = &self.options.livekit;
        let path = resolve_tool(&livekit.cli_name, &livekit.cli_paths)?;
        Ok(LiveKitCli::new(path, livekit.project.clone()))
    }

    // ============================== CANCEL / STOP ============================== //

    /// Abort an in-flight deployment (if any) and mark the agent inactive
    pub async fn cancel(&self, agent_id: &str) -> Result<DeploymentRecord, DeployerError> {
        if self.cancels.cancel(agent_id) {
            info!(agent_id = %agent_id, "Cancel requested");
        }
        // Wait for the cancelled attempt to unwind
        let _guard = self.locks.acquire(agent_id).await;
        self.record_inactive(agent_id).await
    }

    /// Tear down the cloud agent and its fallback room. Removing something
    /// that no longer exists is success.
    pub async fn stop(&self, agent_id: &str) -> Result<DeploymentRecord, DeployerError> {
        self.cancels.cancel(agent_id);
        let _guard = self.locks.acquire(agent_id).await;

        let record = self.records.get(agent_id);
        info!(agent_id = %agent_id, "Stopping agent");

        if let (Some(cloud_id), Some(IdConfidence::Parsed)) =
            (&record.cloud_agent_id, record.id_confidence)
        {
            self.delete_cloud_agent(agent_id, cloud_id).await?;
        } else if record.cloud_agent_id.is_some() {
            debug!(agent_id = %agent_id, "Cloud id is a fallback, skipping agent delete");
        }

        if let Some(rooms) = &self.rooms {
            let room = room_name_for(agent_id);
            if let Err(e) = rooms.delete_room(&room).await {
                warn!(agent_id = %agent_id, "Failed to delete room {}: {}", room, e);
                self.sink.warn(
                    agent_id,
                    format!("Could not delete room {}: {}", room, e),
                    SOURCE_DEPLOY,
                );
            }
        }

        self.sink.info(agent_id, "Agent stopped", SOURCE_DEPLOY);
        self.records
            .update(agent_id, |record| {
                let mut fsm = DeploymentFsm::from_record(record);
                fsm.process(DeploymentEvent::Stop)?;
                fsm.write_to(record);
                record.cloud_agent_id = None;
                record.id_confidence = None;
                record.deploy_started_at = None;
                Ok(())
            })
            .await
    }

    async fn delete_cloud_agent(&self, agent_id: &str, cloud_id: &str) -> Result<(), DeployerError> {
        let cli = self.resolve_cli()?;
        let spec = cli.delete(cloud_id, self.options.livekit.query_timeout());

        match self.runner.run(spec, discard_lines()).await {
            Ok(_) => {
                self.sink.info(
                    agent_id,
                    format!("Deleted cloud agent {}", cloud_id),
                    SOURCE_DEPLOY,
                );
                Ok(())
            }
            Err(DeployerError::ProcessFailed { stdout, stderr, .. })
                if is_absent_output(&stdout) || is_absent_output(&stderr) =>
            {
                debug!(agent_id = %agent_id, "Cloud agent {} already gone", cloud_id);
                Ok(())
            }
            Err(e) => {
                let message = self.redactor.redact(&e.to_string());
                self.sink.error(
                    agent_id,
                    format!("Failed to delete cloud agent {}: {}", cloud_id, message),
                    SOURCE_DEPLOY,
                );
                Err(e)
            }
        }
    }

    async fn record_inactive(&self, agent_id: &str) -> Result<DeploymentRecord, DeployerError> {
        self.records
            .update(agent_id, |record| {
                let mut fsm = DeploymentFsm::from_record(record);
                fsm.process(DeploymentEvent::Cancel)?;
                fsm.write_to(record);
                record.deploy_started_at = None;
                Ok(())
            })
            .await
    }

    /// Stop the agent, then forget its configuration, record and logs
    pub async fn remove_agent(&self, agent_id: &str) -> Result<AgentConfig, DeployerError> {
        self.agents.get(agent_id)?;
        self.stop(agent_id).await?;
        let config = self.agents.delete(agent_id).await?;
        self.records.remove(agent_id).await?;
        self.sink.clear(agent_id);
        Ok(config)
    }

    // ================================= STATUS ================================= //

    /// Live state according to LiveKit: the cloud agent list first, then the
    /// agent's room.
    pub async fn get_status(&self, agent_id: &str) -> Result<LiveStatus, DeployerError> {
        let record = self.records.get(agent_id);
        let room_name = room_name_for(agent_id);

        let cloud_error = match self.cloud_listed(agent_id, &record).await {
            Ok(true) => {
                return Ok(LiveStatus {
                    is_deployed: true,
                    source: StatusSource::Cloud,
                    cloud_agent_id: record.cloud_agent_id,
                    room_name,
                    participants: 0,
                })
            }
            Ok(false) => None,
            Err(e) => {
                debug!(agent_id = %agent_id, "Cloud status check failed: {}", e);
                Some(e)
            }
        };

        let Some(rooms) = &self.rooms else {
            return match cloud_error {
                Some(e) => Err(e),
                None => Ok(LiveStatus {
                    is_deployed: false,
                    source: StatusSource::None,
                    cloud_agent_id: record.cloud_agent_id,
                    room_name,
                    participants: 0,
                }),
            };
        };

        let listed = rooms.list_rooms(std::slice::from_ref(&room_name)).await?;
        let participants = listed
            .iter()
            .find(|room| room.name == room_name)
            .map(|room| room.num_participants)
            .unwrap_or(0);

        Ok(LiveStatus {
            // An empty room is not a running agent
            is_deployed: participants > 0,
            source: StatusSource::Room,
            cloud_agent_id: record.cloud_agent_id,
            room_name,
            participants,
        })
    }

    async fn cloud_listed(
        &self,
        agent_id: &str,
        record: &DeploymentRecord,
    ) -> Result<bool, DeployerError> {
        let cli = self.resolve_cli()?;
        let output = self
            .runner
            .run(cli.list(self.options.livekit.query_timeout()), discard_lines())
            .await?;

        let mut ids = vec![agent_id];
        if let Some(cloud_id) = &record.cloud_agent_id {
            ids.push(cloud_id.as_str());
        }
        Ok(list_mentions(&output.stdout, &ids))
    }

    /// Whether `record` has been deploying for longer than the threshold
    pub fn is_stuck(&self, record: &DeploymentRecord, now: DateTime<Utc>) -> bool {
        record.is_stuck(now, self.options.stuck_after)
    }

    /// `<cli> version`
    pub async fn cli_version(&self) -> Result<CliVersion, DeployerError> {
        let cli = self.resolve_cli()?;
        let output = self
            .runner
            .run(cli.version(self.options.livekit.query_timeout()), discard_lines())
            .await?;
        Ok(CliVersion {
            path: cli.program().to_path_buf(),
            version: output.combined().trim().to_string(),
        })
    }
}

/// Agent parameters passed to the deploy subprocess
fn agent_env(config: &AgentConfig) -> Vec<(String, String)> {
    vec![
        ("AGENT_ID".to_string(), config.agent_id.clone()),
        ("AGENT_MODEL".to_string(), config.model.clone()),
        ("AGENT_VOICE".to_string(), config.voice.clone()),
        ("AGENT_TEMPERATURE".to_string(), config.temperature.to_string()),
        ("AGENT_PROMPT".to_string(), config.prompt.clone()),
    ]
}
