//! Agent script generation from templates

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::errors::DeployerError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::models::agent::AgentConfig;

/// Every placeholder the generator substitutes
pub const PLACEHOLDERS: &[&str] = &[
    "agent_name",
    "agent_id",
    "agent_description",
    "room_name",
    "model",
    "voice",
    "temperature",
    "system_prompt",
    "stt_model",
    "tts_model",
    "customer_name",
    "appointment_time",
];

/// Templates shipped with the binary
pub const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    ("default", include_str!("../../templates/default.py")),
    ("appointment", include_str!("../../templates/appointment.py")),
];

/// Write the built-in templates into `dir`. Existing files are kept unless
/// `overwrite` is set. Returns how many files were written.
pub async fn install_builtin_templates(dir: &Dir, overwrite: bool) -> Result<usize, DeployerError> {
    dir.create().await?;
    let mut written = 0;
    for (name, contents) in BUILTIN_TEMPLATES {
        let file = dir.file(&format!("{name}.py"));
        if overwrite || !file.exists().await {
            file.write_string(contents).await?;
            written += 1;
        }
    }
    Ok(written)
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([a-z_]+)\}").expect("placeholder regex is valid"))
}

/// Loads templates from a directory and renders them
#[derive(Debug, Clone)]
pub struct ScriptGenerator {
    templates_dir: PathBuf,
}

impl ScriptGenerator {
    pub fn new(templates_dir: impl Into<PathBuf>) -> Self {
        Self {
            templates_dir: templates_dir.into(),
        }
    }

    pub fn templates_dir(&self) -> &Path {
        &self.templates_dir
    }

    /// `<templates_dir>/<name>.py`
    pub fn template_file(&self, template_name: &str) -> File {
        File::new(self.templates_dir.join(format!("{template_name}.py")))
    }

    /// Load `template_name` and render it for `config`
    pub async fn generate(
        &self,
        config: &AgentConfig,
        template_name: &str,
    ) -> Result<String, DeployerError> {
        let file = self.template_file(template_name);
        if !file.exists().await {
            return Err(DeployerError::TemplateMissing(
                file.path().display().to_string(),
            ));
        }
        let template = file.read_string().await?;
        if template.trim().is_empty() {
            return Err(DeployerError::TemplateError(format!(
                "template {template_name} is empty"
            )));
        }
        let script = render(config, &template);
        ensure_substituted(&script)?;
        Ok(script)
    }
}

/// Fail when a known placeholder survived rendering
pub fn ensure_substituted(script: &str) -> Result<(), DeployerError> {
    let leftover = unsubstituted(script);
    if leftover.is_empty() {
        return Ok(());
    }
    Err(DeployerError::TemplateError(format!(
        "unsubstituted placeholders: {}",
        leftover.join(", ")
    )))
}

/// Substitute every placeholder of `template` in a single pass.
///
/// Values are escaped for a Python string literal, including `{` as `\x7b`,
/// so a prompt that itself contains `{model}` is neither expanded again nor
/// left behind as a placeholder. Unknown `{name}` tokens of the template
/// (Python f-string fields) are left untouched.
pub fn render(config: &AgentConfig, template: &str) -> String {
    let values = placeholder_values(config);

    placeholder_regex()
        .replace_all(template, |caps: &Captures| {
            let name = &caps[1];
            match values.get(name) {
                Some(value) => value.clone(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn placeholder_values(config: &AgentConfig) -> HashMap<&'static str, String> {
    let mut values = HashMap::new();
    values.insert("agent_name", escape_string_literal(&config.agent_name));
    values.insert("agent_id", escape_string_literal(&config.agent_id));
    values.insert(
        "agent_description",
        escape_string_literal(&config.description),
    );
    values.insert("room_name", escape_string_literal(&config.room_name()));
    values.insert("model", escape_string_literal(&config.model));
    values.insert("voice", escape_string_literal(&config.voice));
    values.insert("temperature", format_temperature(config.temperature));
    values.insert("system_prompt", escape_string_literal(&config.prompt));
    values.insert(
        "stt_model",
        stt_expression(config.stt_provider.as_deref()).to_string(),
    );
    values.insert(
        "tts_model",
        tts_expression(config.tts_provider.as_deref(), &config.voice),
    );
    values.insert(
        "customer_name",
        escape_string_literal(config.customer_name.as_deref().unwrap_or("Customer")),
    );
    values.insert(
        "appointment_time",
        escape_string_literal(config.appointment_time.as_deref().unwrap_or("TBD")),
    );
    values
}

/// Escape a value placed inside a double-quoted Python string literal
pub fn escape_string_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '{' => out.push_str("\\x7b"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => {}
            c => out.push(c),
        }
    }
    out
}

fn format_temperature(temperature: f64) -> String {
    let t = if temperature.is_finite() {
        temperature.clamp(0.0, 2.0)
    } else {
        0.7
    };
    format!("{t:?}")
}

/// STT plugin expression for a provider
pub fn stt_expression(provider: Option<&str>) -> &'static str {
    match provider.map(|p| p.trim().to_lowercase()).as_deref() {
        Some("deepgram") => r#"deepgram.STT(model="nova-2")"#,
        Some("assemblyai") => "assemblyai.STT()",
        _ => r#"openai.STT(model="whisper-1")"#,
    }
}

/// TTS plugin expression for a provider
pub fn tts_expression(provider: Option<&str>, voice: &str) -> String {
    match provider.map(|p| p.trim().to_lowercase()).as_deref() {
        Some("elevenlabs") => "elevenlabs.TTS()".to_string(),
        Some("cartesia") => "cartesia.TTS()".to_string(),
        _ => format!(
            r#"openai.TTS(model="tts-1", voice="{}")"#,
            escape_string_literal(voice)
        ),
    }
}

/// Known placeholders still present in `text`
pub fn unsubstituted(text: &str) -> Vec<String> {
    placeholder_regex()
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .filter(|name| PLACEHOLDERS.contains(&name.as_str()))
        .collect()
}
