//! Application state management

use std::sync::Arc;

use secrecy::ExposeSecret;
use tracing::{info, warn};

use crate::app::options::AppOptions;
use crate::deploy::orchestrator::{self, Orchestrator};
use crate::deploy::script::install_builtin_templates;
use crate::deploy::LogSink;
use crate::errors::DeployerError;
use crate::filesys::dir::Dir;
use crate::livekit::HttpRoomService;
use crate::process::{ProcessRunner, TokioProcessRunner};
use crate::registry::{AgentStore, LocalAgentRegistry, RecordStore};
use crate::server::state::ServerState;
use crate::storage::credentials::Credentials;
use crate::workers::cleanup::{CleanupScheduler, CleanupTargets};
use crate::workers::status_poller::StatusMonitor;

/// Main application state
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,

    pub monitor: Arc<StatusMonitor>,

    /// Agents running outside the cloud, registered by heartbeat
    pub local_agents: Arc<LocalAgentRegistry>,

    pub cleanup: Arc<CleanupScheduler>,
}

impl AppState {
    /// Load the stores and wire the deployment components together
    pub async fn init(
        options: &AppOptions,
        credentials: Credentials,
        runner: Arc<dyn ProcessRunner>,
    ) -> Result<Self, DeployerError> {
        info!("Initializing application state...");

        options.layout.setup().await?;
        let installed =
            install_builtin_templates(&Dir::new(options.templates_dir()), false).await?;
        if installed > 0 {
            info!("Installed {} built-in templates", installed);
        }

        let agents = Arc::new(AgentStore::load(options.layout.agents_file()).await?);
        let records = Arc::new(RecordStore::load(options.layout.deployments_file()).await?);
        let sink = Arc::new(LogSink::default());
        let credentials = Arc::new(credentials);

        let mut orchestrator = Orchestrator::new(
            orchestrator::Options {
                livekit: options.livekit.clone(),
                stuck_after: options.stuck_after,
                workspaces: options.layout.workspaces_dir(),
                templates_dir: options.templates_dir(),
            },
            credentials.clone(),
            runner,
            sink.clone(),
            agents,
            records.clone(),
        );

        match room_service(options, &credentials)? {
            Some(rooms) => orchestrator = orchestrator.with_room_service(Arc::new(rooms)),
            None => warn!("LIVEKIT_URL, LIVEKIT_API_KEY or LIVEKIT_API_SECRET not set, room checks disabled"),
        }
        let orchestrator = Arc::new(orchestrator);

        let monitor = Arc::new(StatusMonitor::new(
            orchestrator.clone(),
            options.poller.clone(),
        ));
        let local_agents = Arc::new(LocalAgentRegistry::new(options.heartbeat_timeout));
        let cleanup = Arc::new(CleanupScheduler::new(
            options.cleanup.clone(),
            CleanupTargets {
                sink,
                records,
                local_agents: local_agents.clone(),
            },
        ));

        Ok(Self {
            orchestrator,
            monitor,
            local_agents,
            cleanup,
        })
    }

    /// State with the real subprocess runner
    pub async fn init_default(options: &AppOptions) -> Result<Self, DeployerError> {
        Self::init(
            options,
            Credentials::from_env(),
            Arc::new(TokioProcessRunner::new()),
        )
        .await
    }

    pub fn server_state(&self) -> ServerState {
        ServerState::new(
            self.orchestrator.clone(),
            self.monitor.clone(),
            self.local_agents.clone(),
            self.cleanup.clone(),
        )
    }

    /// Shutdown application state
    pub async fn shutdown(&self) -> Result<(), DeployerError> {
        info!("Shutting down application state...");
        self.cleanup.stop().await;
        Ok(())
    }
}

fn room_service(
    options: &AppOptions,
    credentials: &Credentials,
) -> Result<Option<HttpRoomService>, DeployerError> {
    let (Some(url), Some(key), Some(secret)) = (
        credentials.livekit_url.as_deref(),
        credentials.livekit_api_key.as_ref(),
        credentials.livekit_api_secret.as_ref(),
    ) else {
        return Ok(None);
    };

    let rooms = HttpRoomService::new(
        url,
        key.expose_secret(),
        secret.clone(),
        options.livekit.query_timeout(),
    )?;
    Ok(Some(rooms))
}
