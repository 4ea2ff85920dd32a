//! Extracting the cloud agent id from LiveKit CLI output

use std::sync::OnceLock;

use regex::Regex;

use crate::models::deployment::IdConfidence;

fn agent_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\bCA_[A-Za-z0-9]+\b").expect("agent id regex is valid"))
}

/// Cloud agent id together with how it was obtained
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAgentId {
    pub id: String,
    pub confidence: IdConfidence,
}

/// First `CA_...` token in `output`
pub fn parse_agent_id(output: &str) -> Option<String> {
    agent_id_regex()
        .find(output)
        .map(|m| m.as_str().to_string())
}

/// Id from `output`, or `fallback` marked as such
pub fn resolve_cloud_id(output: &str, fallback: &str) -> ParsedAgentId {
    match parse_agent_id(output) {
        Some(id) => ParsedAgentId {
            id,
            confidence: IdConfidence::Parsed,
        },
        None => ParsedAgentId {
            id: fallback.to_string(),
            confidence: IdConfidence::Fallback,
        },
    }
}
