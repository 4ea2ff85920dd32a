//! Utility functions

use chrono::{DateTime, Local, Utc};
use colored::Colorize;
use serde::{Deserialize, Serialize};

use crate::process::resolve_tool;
use crate::storage::credentials::Credentials;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;

/// Version information for the deployer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Get version information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        build_time: option_env!("BUILD_TIME").unwrap_or("unknown").to_string(),
    }
}

/// Wall-clock `HH:MM:SS` in local time
pub fn clock_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%H:%M:%S").to_string()
}

/// Calculate SHA256 hash of data
pub fn sha256_hash(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    hex::encode(result)
}

// ================================ DIAGNOSTIC ================================= //

/// Print whether the deployer can run on this machine
pub async fn run_diagnostic(layout: &StorageLayout, settings: &Settings) {
    let version = version_info();
    println!("{} {}", "gobid".bold(), version.version);
    println!();

    report(
        "Base directory",
        Ok(layout.base_dir.display().to_string()),
    );
    report(
        "Settings file",
        if layout.settings_file().exists().await {
            Ok(layout.settings_file().path().display().to_string())
        } else {
            Err("missing, defaults in use (run --init)".to_string())
        },
    );

    let cli = resolve_tool(&settings.livekit.cli_name, &settings.livekit.cli_paths)
        .map(|path| path.display().to_string())
        .map_err(|e| e.to_string());
    report("LiveKit CLI", cli);

    let build_tool = match settings.livekit.build_command.first() {
        Some(program) => resolve_tool(program, &[])
            .map(|path| path.display().to_string())
            .map_err(|e| e.to_string()),
        None => Ok("disabled".to_string()),
    };
    report("Build tool", build_tool);

    let credentials = Credentials::from_env();
    report(
        "Room service",
        if credentials.has_room_service() {
            Ok(credentials.livekit_url.clone().unwrap_or_default())
        } else {
            Err("LIVEKIT_URL, LIVEKIT_API_KEY and LIVEKIT_API_SECRET required".to_string())
        },
    );
    report(
        "OpenAI key",
        if credentials.openai_api_key.is_some() {
            Ok("set".to_string())
        } else {
            Err("OPENAI_API_KEY not set".to_string())
        },
    );
}

fn report(check: &str, result: Result<String, String>) {
    match result {
        Ok(detail) => println!("  {} {:<16} {}", "ok".green(), check, detail),
        Err(detail) => println!("  {} {:<16} {}", "!!".red(), check, detail.yellow()),
    }
}

/// Hex encoding utilities
mod hex {
    const HEX_CHARS: &[u8; 16] = b"0123456789abcdef";

    pub fn encode(data: impl AsRef<[u8]>) -> String {
        let data = data.as_ref();
        let mut result = String::with_capacity(data.len() * 2);
        for byte in data {
            result.push(HEX_CHARS[(byte >> 4) as usize] as char);
            result.push(HEX_CHARS[(byte & 0x0f) as usize] as char);
        }
        result
    }
}
