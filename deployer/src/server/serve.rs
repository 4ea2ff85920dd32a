//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::options::ServerOptions;
use crate::errors::DeployerError;
use crate::server::handlers::*;
use crate::server::state::ServerState;

/// All routes of the local API
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        // Health and version
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        // Deployment logs
        .route(
            "/api/deployment-logs/{agent_id}",
            get(get_logs_handler)
                .post(append_log_handler)
                .delete(clear_logs_handler),
        )
        // Agents
        .route(
            "/api/agents",
            get(list_agents_handler).post(create_agent_handler),
        )
        .route(
            "/api/agents/{agent_id}",
            get(get_agent_handler)
                .put(update_agent_handler)
                .delete(delete_agent_handler),
        )
        .route("/api/agents/{agent_id}/deploy", post(deploy_handler))
        .route("/api/agents/{agent_id}/retry", post(retry_handler))
        .route("/api/agents/{agent_id}/cancel", post(cancel_handler))
        .route("/api/agents/{agent_id}/stop", post(stop_handler))
        .route("/api/agents/{agent_id}/status", get(status_handler))
        .route(
            "/api/agents/{agent_id}/status/stream",
            get(status_stream_handler),
        )
        // Local agents
        .route("/api/local-agents", get(list_local_agents_handler))
        .route("/api/local-agents/heartbeat", post(heartbeat_handler))
        .route("/api/local-agents/remove", post(remove_local_agent_handler))
        // Cleanup
        .route("/api/cleanup/status", get(cleanup_status_handler))
        .route("/api/cleanup/start", post(cleanup_start_handler))
        .route("/api/cleanup/stop", post(cleanup_stop_handler))
        // LiveKit
        .route("/api/livekit/version", get(livekit_version_handler))
        // State and middleware
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), DeployerError>>, DeployerError> {
    let app = router(state);

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| DeployerError::ServerError(format!("cannot bind {}: {}", addr, e)))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| DeployerError::ServerError(e.to_string()))
    });

    Ok(handle)
}
