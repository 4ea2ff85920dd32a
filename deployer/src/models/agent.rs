//! Agent configuration models

use serde::{Deserialize, Serialize};

use crate::errors::DeployerError;

/// Template used when an agent does not name one
pub const DEFAULT_TEMPLATE: &str = "default";

/// Configuration of one voice agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    /// Immutable identifier
    pub agent_id: String,

    pub agent_name: String,

    #[serde(default)]
    pub description: String,

    /// LLM model name
    pub model: String,

    /// TTS voice name
    pub voice: String,

    /// Sampling temperature in `[0, 2]`
    pub temperature: f64,

    /// System prompt
    pub prompt: String,

    /// Template tag, `default` when absent
    #[serde(default)]
    pub template: Option<String>,

    #[serde(default)]
    pub customer_name: Option<String>,

    #[serde(default)]
    pub appointment_time: Option<String>,

    #[serde(default)]
    pub stt_provider: Option<String>,

    #[serde(default)]
    pub tts_provider: Option<String>,
}

impl AgentConfig {
    pub fn template_name(&self) -> &str {
        self.template
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(DEFAULT_TEMPLATE)
    }

    /// Room the agent joins, by convention `agent-<agent_id>`
    pub fn room_name(&self) -> String {
        room_name_for(&self.agent_id)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), DeployerError> {
        validate_agent_id(&self.agent_id)?;
        if self.agent_name.trim().is_empty() {
            return Err(DeployerError::ValidationError(
                "agentName must not be empty".to_string(),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(DeployerError::ValidationError(
                "model must not be empty".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(DeployerError::ValidationError(format!(
                "temperature must be within [0, 2], got {}",
                self.temperature
            )));
        }
        if let Some(template) = &self.template {
            if !template
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            {
                return Err(DeployerError::ValidationError(format!(
                    "invalid template name: {template}"
                )));
            }
        }
        Ok(())
    }

    /// Apply an update, keeping the id
    pub fn apply(&mut self, update: AgentUpdate) -> Result<(), DeployerError> {
        let mut next = self.clone();
        if let Some(v) = update.agent_name {
            next.agent_name = v;
        }
        if let Some(v) = update.description {
            next.description = v;
        }
        if let Some(v) = update.model {
            next.model = v;
        }
        if let Some(v) = update.voice {
            next.voice = v;
        }
        if let Some(v) = update.temperature {
            next.temperature = v;
        }
        if let Some(v) = update.prompt {
            next.prompt = v;
        }
        if let Some(v) = update.template {
            next.template = Some(v);
        }
        if let Some(v) = update.customer_name {
            next.customer_name = Some(v);
        }
        if let Some(v) = update.appointment_time {
            next.appointment_time = Some(v);
        }
        if let Some(v) = update.stt_provider {
            next.stt_provider = Some(v);
        }
        if let Some(v) = update.tts_provider {
            next.tts_provider = Some(v);
        }
        next.validate()?;
        *self = next;
        Ok(())
    }
}

/// Room name convention shared by the orchestrator and the generator
pub fn room_name_for(agent_id: &str) -> String {
    format!("agent-{agent_id}")
}

/// Ids end up in paths and room names
pub fn validate_agent_id(agent_id: &str) -> Result<(), DeployerError> {
    if agent_id.is_empty()
        || !agent_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(DeployerError::ValidationError(format!(
            "invalid agent id: {agent_id:?}"
        )));
    }
    Ok(())
}

/// Partial update of an agent's mutable fields
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentUpdate {
    pub agent_name: Option<String>,
    pub description: Option<String>,
    pub model: Option<String>,
    pub voice: Option<String>,
    pub temperature: Option<f64>,
    pub prompt: Option<String>,
    pub template: Option<String>,
    pub customer_name: Option<String>,
    pub appointment_time: Option<String>,
    pub stt_provider: Option<String>,
    pub tts_provider: Option<String>,
}

#[cfg(test)]
pub(crate) fn sample_config(agent_id: &str) -> AgentConfig {
    AgentConfig {
        agent_id: agent_id.to_string(),
        agent_name: "Support Agent".to_string(),
        description: String::new(),
        model: "gpt-4o".to_string(),
        voice: "nova".to_string(),
        temperature: 0.7,
        prompt: "You are helpful.".to_string(),
        template: None,
        customer_name: None,
        appointment_time: None,
        stt_provider: None,
        tts_provider: None,
    }
}
