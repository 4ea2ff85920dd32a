//! HTTP request handlers

use std::convert::Infallible;
use std::str::FromStr;
use std::sync::Arc;

use api_models::{
    ActionResponse, AppendLogRequest, AppendLogResponse, CleanupStatusResponse,
    CliVersionResponse, DeployAccepted, HealthResponse, HeartbeatRequest, LogLine, LogsResponse,
    RemoveLocalAgentRequest, VersionResponse,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    Json,
};
use chrono::Utc;
use futures::stream::{self, Stream};
use serde::Deserialize;
use tracing::{error, info};

use crate::errors::DeployerError;
use crate::models::agent::{validate_agent_id, AgentConfig, AgentUpdate};
use crate::models::deployment::{DeploymentRecord, LogEntry, LogEntryLevel, StatusView};
use crate::registry::local_agents::LocalAgentView;
use crate::server::state::ServerState;
use crate::utils::version_info;

type ApiResult<T> = Result<T, DeployerError>;

fn log_line(entry: &LogEntry) -> LogLine {
    LogLine {
        index: entry.index,
        timestamp: entry.timestamp.clone(),
        message: entry.message.clone(),
        level: entry.level.as_str().to_string(),
        source: entry.source.clone(),
    }
}

fn ok(message: impl Into<String>) -> Json<ActionResponse> {
    Json(ActionResponse {
        success: true,
        message: message.into(),
    })
}

// ================================== SERVICE ================================== //

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "gobid".to_string(),
        version: version.version,
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(VersionResponse {
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
    })
}

// ============================== DEPLOYMENT LOGS ============================== //

pub async fn get_logs_handler(
    State(state): State<Arc<ServerState>>,
    Path(agent_id): Path<String>,
) -> ApiResult<Json<LogsResponse>> {
    validate_agent_id(&agent_id)?;
    let entries = state.orchestrator.sink().read(&agent_id);
    Ok(Json(LogsResponse {
        logs: entries.iter().map(LogEntry::formatted).collect(),
        entries: entries.iter().map(log_line).collect(),
    }))
}

pub async fn append_log_handler(
    State(state): State<Arc<ServerState>>,
    Path(agent_id): Path<String>,
    Json(request): Json<AppendLogRequest>,
) -> ApiResult<(StatusCode, Json<AppendLogResponse>)> {
    validate_agent_id(&agent_id)?;
    if request.message.is_empty() {
        return Err(DeployerError::ValidationError(
            "message must not be empty".to_string(),
        ));
    }
    let level = match request.level.as_deref() {
        Some(level) => LogEntryLevel::from_str(level).map_err(DeployerError::ValidationError)?,
        None => LogEntryLevel::Info,
    };
    let source = request.source.as_deref().unwrap_or("ui");

    let entry = state
        .orchestrator
        .sink()
        .append(&agent_id, request.message, level, source);
    Ok((
        StatusCode::CREATED,
        Json(AppendLogResponse {
            success: true,
            entry: log_line(&entry),
        }),
    ))
}

pub async fn clear_logs_handler(
    State(state): State<Arc<ServerState>>,
    Path(agent_id): Path<String>,
) -> ApiResult<Json<ActionResponse>> {
    validate_agent_id(&agent_id)?;
    state.orchestrator.sink().clear(&agent_id);
    Ok(ok(format!("Cleared logs for {}", agent_id)))
}

// =================================== AGENTS =================================== //

pub async fn list_agents_handler(State(state): State<Arc<ServerState>>) -> Json<Vec<AgentConfig>> {
    Json(state.orchestrator.agents().list())
}

pub async fn create_agent_handler(
    State(state): State<Arc<ServerState>>,
    Json(config): Json<AgentConfig>,
) -> ApiResult<(StatusCode, Json<AgentConfig>)> {
    let config = state.orchestrator.agents().create(config).await?;
    info!("Created agent {}", config.agent_id);
    Ok((StatusCode::CREATED, Json(config)))
}

pub async fn get_agent_handler(
    State(state): State<Arc<ServerState>>,
    Path(agent_id): Path<String>,
) -> ApiResult<Json<AgentConfig>> {
    Ok(Json(state.orchestrator.agents().get(&agent_id)?))
}

pub async fn update_agent_handler(
    State(state): State<Arc<ServerState>>,
    Path(agent_id): Path<String>,
    Json(update): Json<AgentUpdate>,
) -> ApiResult<Json<AgentConfig>> {
    Ok(Json(
        state.orchestrator.agents().update(&agent_id, update).await?,
    ))
}

pub async fn delete_agent_handler(
    State(state): State<Arc<ServerState>>,
    Path(agent_id): Path<String>,
) -> ApiResult<Json<ActionResponse>> {
    state.orchestrator.remove_agent(&agent_id).await?;
    info!("Deleted agent {}", agent_id);
    Ok(ok(format!("Deleted agent {}", agent_id)))
}

// ================================= DEPLOYMENT ================================= //

pub async fn deploy_handler(
    State(state): State<Arc<ServerState>>,
    Path(agent_id): Path<String>,
) -> ApiResult<(StatusCode, Json<DeployAccepted>)> {
    let config = state.orchestrator.agents().get(&agent_id)?;
    let handle = state.orchestrator.start_deploy(config).await?;
    watch_deployment(agent_id.clone(), handle);
    Ok(accepted(agent_id, "Deployment started"))
}

pub async fn retry_handler(
    State(state): State<Arc<ServerState>>,
    Path(agent_id): Path<String>,
) -> ApiResult<(StatusCode, Json<DeployAccepted>)> {
    let handle = state.orchestrator.retry(&agent_id).await?;
    watch_deployment(agent_id.clone(), handle);
    Ok(accepted(agent_id, "Retry started"))
}

fn accepted(agent_id: String, message: &str) -> (StatusCode, Json<DeployAccepted>) {
    (
        StatusCode::ACCEPTED,
        Json(DeployAccepted {
            agent_id,
            status: "deploying".to_string(),
            message: message.to_string(),
        }),
    )
}

/// Outcomes are already in the record and the log sink; only a panicked
/// task needs reporting here
fn watch_deployment(
    agent_id: String,
    handle: tokio::task::JoinHandle<Result<DeploymentRecord, DeployerError>>,
) {
    tokio::spawn(async move {
        if let Err(e) = handle.await {
            error!("Deployment task for {} ended abnormally: {}", agent_id, e);
        }
    });
}

pub async fn cancel_handler(
    State(state): State<Arc<ServerState>>,
    Path(agent_id): Path<String>,
) -> ApiResult<Json<DeploymentRecord>> {
    validate_agent_id(&agent_id)?;
    Ok(Json(state.orchestrator.cancel(&agent_id).await?))
}

pub async fn stop_handler(
    State(state): State<Arc<ServerState>>,
    Path(agent_id): Path<String>,
) -> ApiResult<Json<DeploymentRecord>> {
    validate_agent_id(&agent_id)?;
    Ok(Json(state.orchestrator.stop(&agent_id).await?))
}

pub async fn status_handler(
    State(state): State<Arc<ServerState>>,
    Path(agent_id): Path<String>,
) -> ApiResult<Json<StatusView>> {
    state.orchestrator.agents().get(&agent_id)?;
    Ok(Json(state.monitor.snapshot(&agent_id).await))
}

#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    /// Clear the agent's logs when the session opens
    #[serde(default)]
    pub fresh: bool,
}

pub async fn status_stream_handler(
    State(state): State<Arc<ServerState>>,
    Path(agent_id): Path<String>,
    Query(query): Query<StreamQuery>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    state.orchestrator.agents().get(&agent_id)?;
    let session = if query.fresh {
        state.monitor.open_fresh(&agent_id)
    } else {
        state.monitor.open(&agent_id)
    };

    // The session, and with it the polling task, lives as long as the stream
    let events = stream::unfold(session, |mut session| async move {
        let view = session.next().await?;
        let event = Event::default()
            .event("status")
            .json_data(&view)
            .unwrap_or_else(|e| Event::default().comment(format!("unserializable status: {}", e)));
        Some((Ok(event), session))
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

// ================================ LOCAL AGENTS ================================ //

pub async fn heartbeat_handler(
    State(state): State<Arc<ServerState>>,
    Json(heartbeat): Json<HeartbeatRequest>,
) -> ApiResult<Json<ActionResponse>> {
    let agent_id = heartbeat.agent_id.clone();
    state.local_agents.heartbeat(heartbeat, Utc::now())?;
    Ok(ok(format!("Heartbeat received for {}", agent_id)))
}

pub async fn remove_local_agent_handler(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<RemoveLocalAgentRequest>,
) -> ApiResult<Json<ActionResponse>> {
    if state.local_agents.remove(&request.agent_id) {
        Ok(ok(format!("Removed {}", request.agent_id)))
    } else {
        Err(DeployerError::NotFound(format!(
            "local agent {}",
            request.agent_id
        )))
    }
}

pub async fn list_local_agents_handler(
    State(state): State<Arc<ServerState>>,
) -> Json<Vec<LocalAgentView>> {
    Json(state.local_agents.list(Utc::now()))
}

// =================================== CLEANUP =================================== //

pub async fn cleanup_status_handler(
    State(state): State<Arc<ServerState>>,
) -> Json<CleanupStatusResponse> {
    let status = state.cleanup.status();
    Json(CleanupStatusResponse {
        running: status.running,
        runs: status.runs,
        last_run_at: status.last_run_at.map(|t| t.to_rfc3339()),
        last_purged_logs: status.last_purged_logs,
        last_purged_agents: status.last_purged_agents,
    })
}

pub async fn cleanup_start_handler(
    State(state): State<Arc<ServerState>>,
) -> Json<ActionResponse> {
    let started = state.cleanup.start();
    Json(ActionResponse {
        success: true,
        message: if started {
            "Cleanup scheduler started".to_string()
        } else {
            "Cleanup scheduler already running".to_string()
        },
    })
}

pub async fn cleanup_stop_handler(State(state): State<Arc<ServerState>>) -> Json<ActionResponse> {
    let stopped = state.cleanup.stop().await;
    Json(ActionResponse {
        success: true,
        message: if stopped {
            "Cleanup scheduler stopped".to_string()
        } else {
            "Cleanup scheduler was not running".to_string()
        },
    })
}

// =================================== LIVEKIT =================================== //

pub async fn livekit_version_handler(
    State(state): State<Arc<ServerState>>,
) -> ApiResult<Json<CliVersionResponse>> {
    let version = state.orchestrator.cli_version().await?;
    Ok(Json(CliVersionResponse {
        path: version.path.display().to_string(),
        version: version.version,
    }))
}
