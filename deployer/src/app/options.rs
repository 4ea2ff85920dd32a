//! Application configuration options

use std::path::PathBuf;
use std::time::Duration;

use crate::storage::layout::StorageLayout;
use crate::storage::settings::{LiveKitSettings, Settings};
use crate::workers::{cleanup, status_poller};

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Storage layout paths
    pub layout: StorageLayout,

    /// Overrides the layout's templates directory
    pub templates_dir: Option<PathBuf>,

    /// Server configuration
    pub server: ServerOptions,

    /// LiveKit CLI and project configuration
    pub livekit: LiveKitSettings,

    /// Status poller options
    pub poller: status_poller::Options,

    /// A deployment in flight for longer than this is reported as stuck
    pub stuck_after: Duration,

    /// Start the cleanup scheduler with the service
    pub enable_cleanup: bool,

    /// Cleanup scheduler options
    pub cleanup: cleanup::Options,

    /// A local agent without a heartbeat for this long is offline
    pub heartbeat_timeout: Duration,

    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self::from_settings(StorageLayout::default(), &Settings::default())
    }
}

impl AppOptions {
    pub fn from_settings(layout: StorageLayout, settings: &Settings) -> Self {
        Self {
            layout,
            templates_dir: settings.templates_dir.clone(),
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
            },
            livekit: settings.livekit.clone(),
            poller: status_poller::Options {
                interval: Duration::from_secs(settings.poller.interval_secs.max(1)),
                fast_interval: Duration::from_secs(settings.poller.fast_interval_secs.max(1)),
            },
            stuck_after: Duration::from_secs(settings.poller.stuck_after_secs),
            enable_cleanup: settings.cleanup.enabled,
            cleanup: cleanup::Options {
                interval: Duration::from_secs(settings.cleanup.interval_secs.max(1)),
                log_retention: Duration::from_secs(settings.cleanup.log_retention_secs),
            },
            heartbeat_timeout: Duration::from_secs(settings.cleanup.heartbeat_timeout_secs),
            max_shutdown_delay: Duration::from_secs(30),
        }
    }

    /// Templates directory in effect
    pub fn templates_dir(&self) -> PathBuf {
        self.templates_dir
            .clone()
            .unwrap_or_else(|| self.layout.templates_dir().path().to_path_buf())
    }
}

/// Local HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3027,
        }
    }
}
