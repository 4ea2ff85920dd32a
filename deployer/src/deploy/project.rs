//! Files written next to the generated agent script

use serde::{Deserialize, Serialize};

use crate::errors::DeployerError;
use crate::filesys::dir::Dir;

/// Script file name inside the workspace
pub const ENTRY_POINT: &str = "agent.py";

/// Project descriptor file name read by the LiveKit CLI
pub const DESCRIPTOR_FILE: &str = "livekit.toml";

const REQUIREMENTS: &[&str] = &[
    "livekit-agents>=0.12",
    "livekit-plugins-openai",
    "livekit-plugins-silero",
    "livekit-plugins-deepgram",
    "livekit-plugins-elevenlabs",
    "livekit-plugins-cartesia",
    "livekit-plugins-assemblyai",
];

/// `livekit.toml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectDescriptor {
    pub project: ProjectSection,
    pub agent: AgentSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSection {
    pub subdomain: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSection {
    /// `python` or `node`
    pub runtime: String,
    pub entry_point: String,
}

impl ProjectDescriptor {
    pub fn python(subdomain: &str) -> Self {
        Self {
            project: ProjectSection {
                subdomain: subdomain.to_string(),
            },
            agent: AgentSection {
                runtime: "python".to_string(),
                entry_point: ENTRY_POINT.to_string(),
            },
        }
    }

    pub fn to_toml(&self) -> Result<String, DeployerError> {
        Ok(toml::to_string(self)?)
    }
}

/// Multi-stage container build for the generated script
pub fn dockerfile() -> String {
    format!(
        "FROM python:3.11-slim AS builder\n\
         WORKDIR /app\n\
         RUN python -m venv /opt/venv\n\
         ENV PATH=\"/opt/venv/bin:$PATH\"\n\
         COPY requirements.txt .\n\
         RUN pip install --no-cache-dir -r requirements.txt\n\
         \n\
         FROM python:3.11-slim\n\
         WORKDIR /app\n\
         COPY --from=builder /opt/venv /opt/venv\n\
         ENV PATH=\"/opt/venv/bin:$PATH\"\n\
         COPY {ENTRY_POINT} .\n\
         CMD [\"python\", \"{ENTRY_POINT}\", \"start\"]\n"
    )
}

pub fn requirements() -> String {
    let mut out = REQUIREMENTS.join("\n");
    out.push('\n');
    out
}

/// Recreate `dir` and write the script, descriptor, Dockerfile and
/// requirements into it
pub async fn write_workspace(
    dir: &Dir,
    script: &str,
    descriptor: &ProjectDescriptor,
) -> Result<(), DeployerError> {
    dir.recreate().await?;
    dir.file(ENTRY_POINT).write_string(script).await?;
    dir.file(DESCRIPTOR_FILE)
        .write_string(&descriptor.to_toml()?)
        .await?;
    dir.file("Dockerfile").write_string(&dockerfile()).await?;
    dir.file("requirements.txt")
        .write_string(&requirements())
        .await?;
    Ok(())
}
