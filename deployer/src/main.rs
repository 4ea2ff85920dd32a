//! GOBI Deployer - Entry Point
//!
//! Local service that turns stored voice agent configurations into LiveKit
//! Cloud deployments and reports their status to the GOBI UI.

use std::collections::HashMap;
use std::env;

use gobid::app::options::AppOptions;
use gobid::app::run::run;
use gobid::deploy::script::install_builtin_templates;
use gobid::logs::{init_logging, LogLevel, LogOptions};
use gobid::storage::layout::StorageLayout;
use gobid::storage::settings::Settings;
use gobid::utils::{run_diagnostic, version_info};

use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("Failed to print version: {e}"),
        }
        return;
    }

    let layout = match cli_args.get("base-dir") {
        Some(dir) => StorageLayout::new(dir),
        None => StorageLayout::default(),
    };

    // Write default settings and templates
    if cli_args.contains_key("init") {
        if let Err(e) = init_base_dir(&layout, cli_args.contains_key("force")).await {
            eprintln!("Failed to initialize {}: {e}", layout.base_dir.display());
        }
        return;
    }

    // Retrieve the settings file, falling back to defaults
    let settings_file = layout.settings_file();
    let mut settings = if settings_file.exists().await {
        match settings_file.read_json::<Settings>().await {
            Ok(settings) => settings,
            Err(e) => {
                eprintln!("Unable to read settings file: {e}");
                return;
            }
        }
    } else {
        Settings::default()
    };

    // Run diagnostics
    if cli_args.contains_key("diagnostic") || cli_args.contains_key("diag") {
        run_diagnostic(&layout, &settings).await;
        return;
    }

    // Command line overrides
    if let Some(port) = cli_args.get("port") {
        match port.parse() {
            Ok(port) => settings.server.port = port,
            Err(e) => {
                eprintln!("Invalid --port {port}: {e}");
                return;
            }
        }
    }
    if let Some(level) = cli_args.get("log-level") {
        match level.parse::<LogLevel>() {
            Ok(level) => settings.log_level = level,
            Err(e) => {
                eprintln!("Invalid --log-level {level}: {e}");
                return;
            }
        }
    }

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        json_format: settings.json_logs,
        log_dir: settings
            .log_to_file
            .then(|| layout.logs_dir().path().to_path_buf()),
        ..Default::default()
    };
    if let Err(e) = init_logging(log_options) {
        println!("Failed to initialize logging: {e}");
    }

    // Run the server
    let options = AppOptions::from_settings(layout, &settings);
    info!("Running GOBI deployer {} with options: {:?}", version.version, options);
    let result = run(options, await_shutdown_signal()).await;
    if let Err(e) = result {
        error!("Failed to run the deployer: {e}");
    }
}

async fn init_base_dir(layout: &StorageLayout, force: bool) -> Result<(), gobid::errors::DeployerError> {
    layout.setup().await?;

    let settings_file = layout.settings_file();
    if force || !settings_file.exists().await {
        settings_file.write_json(&Settings::default()).await?;
        println!("Wrote {}", settings_file.path().display());
    }

    let written =
        install_builtin_templates(&layout.templates_dir(), force).await?;
    println!(
        "Installed {} templates into {}",
        written,
        layout.templates_dir().path().display()
    );
    Ok(())
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
                _ => {
                    error!("Unable to install signal handlers, waiting for Ctrl+C only");
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {e}");
        }
        info!("Ctrl+C received, shutting down...");
    }
}
