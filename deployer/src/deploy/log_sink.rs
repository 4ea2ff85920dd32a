//! Per-agent deployment log sink

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use crate::models::deployment::{LogEntry, LogEntryLevel};
use crate::utils::clock_time;

/// Default number of entries kept per agent
pub const DEFAULT_MAX_ENTRIES: usize = 2000;

#[derive(Debug)]
struct AgentLog {
    next_index: u64,
    entries: VecDeque<LogEntry>,
    last_append: DateTime<Utc>,
}

impl AgentLog {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            next_index: 1,
            entries: VecDeque::new(),
            last_append: now,
        }
    }
}

/// Ordered, append-only log buffers keyed by agent id.
///
/// Indices start at 1, increase strictly and are never reassigned until the
/// agent's log is cleared. Reads return a snapshot.
pub struct LogSink {
    logs: RwLock<HashMap<String, AgentLog>>,
    max_entries: usize,
}

impl LogSink {
    pub fn new(max_entries: usize) -> Self {
        Self {
            logs: RwLock::new(HashMap::new()),
            max_entries: max_entries.max(1),
        }
    }

    /// Append one entry
    pub fn append(
        &self,
        agent_id: &str,
        message: impl Into<String>,
        level: LogEntryLevel,
        source: &str,
    ) -> LogEntry {
        let now = Utc::now();
        let mut logs = self.logs.write().unwrap_or_else(|e| e.into_inner());
        let log = logs
            .entry(agent_id.to_string())
            .or_insert_with(|| AgentLog::new(now));

        let entry = LogEntry {
            index: log.next_index,
            timestamp: clock_time(now),
            message: message.into(),
            level,
            source: source.to_string(),
        };
        log.next_index += 1;
        log.last_append = now;
        log.entries.push_back(entry.clone());
        while log.entries.len() > self.max_entries {
            log.entries.pop_front();
        }
        entry
    }

    pub fn info(&self, agent_id: &str, message: impl Into<String>, source: &str) -> LogEntry {
        self.append(agent_id, message, LogEntryLevel::Info, source)
    }

    pub fn warn(&self, agent_id: &str, message: impl Into<String>, source: &str) -> LogEntry {
        self.append(agent_id, message, LogEntryLevel::Warn, source)
    }

    pub fn error(&self, agent_id: &str, message: impl Into<String>, source: &str) -> LogEntry {
        self.append(agent_id, message, LogEntryLevel::Error, source)
    }

    /// Entries of one agent, oldest first
    pub fn read(&self, agent_id: &str) -> Vec<LogEntry> {
        let logs = self.logs.read().unwrap_or_else(|e| e.into_inner());
        logs.get(agent_id)
            .map(|log| log.entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Remove every entry of one agent
    pub fn clear(&self, agent_id: &str) {
        let mut logs = self.logs.write().unwrap_or_else(|e| e.into_inner());
        logs.remove(agent_id);
    }

    pub fn len(&self, agent_id: &str) -> usize {
        let logs = self.logs.read().unwrap_or_else(|e| e.into_inner());
        logs.get(agent_id).map(|log| log.entries.len()).unwrap_or(0)
    }

    /// Agent ids that currently have logs
    pub fn agents(&self) -> Vec<String> {
        let logs = self.logs.read().unwrap_or_else(|e| e.into_inner());
        logs.keys().cloned().collect()
    }

    /// Time of the last append for an agent
    pub fn last_append(&self, agent_id: &str) -> Option<DateTime<Utc>> {
        let logs = self.logs.read().unwrap_or_else(|e| e.into_inner());
        logs.get(agent_id).map(|log| log.last_append)
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

/// Replaces secret values in text before it reaches the sink
#[derive(Debug, Clone, Default)]
pub struct Redactor {
    secrets: Vec<String>,
}

impl Redactor {
    pub fn new(secrets: Vec<String>) -> Self {
        // Short values would mangle ordinary output
        let mut secrets: Vec<String> = secrets.into_iter().filter(|s| s.len() >= 4).collect();
        // Longest first so overlapping secrets are fully masked
        secrets.sort_by_key(|s| std::cmp::Reverse(s.len()));
        Self { secrets }
    }

    pub fn redact(&self, text: &str) -> String {
        let mut out = text.to_string();
        for secret in &self.secrets {
            if out.contains(secret.as_str()) {
                out = out.replace(secret.as_str(), "***");
            }
        }
        out
    }
}
