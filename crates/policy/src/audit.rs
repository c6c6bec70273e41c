//! Audit entry model and the sink every security decision is written to.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_used: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_confirmed: Option<bool>,
}

impl AuditEntry {
    /// New entry stamped with the current time. Sinks restamp on append.
    pub fn new(action: impl Into<String>, severity: Severity) -> Self {
        Self {
            timestamp: Utc::now(),
            agent_id: None,
            action: action.into(),
            tool_used: None,
            details: None,
            severity,
            user_confirmed: None,
        }
    }

    pub fn agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn tool(mut self, tool: impl fmt::Display) -> Self {
        self.tool_used = Some(tool.to_string());
        self
    }

    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn user_confirmed(mut self, confirmed: bool) -> Self {
        self.user_confirmed = Some(confirmed);
        self
    }
}

/// Destination for audit entries.
///
/// Recording is best-effort: implementations swallow their own failures so an
/// audit problem never fails the action being described.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: AuditEntry);
}

/// Keeps entries in memory. Useful for embedding and tests.
#[derive(Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries in append order.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().clone()
    }

    pub fn actions(&self) -> Vec<String> {
        self.entries.lock().iter().map(|e| e.action.clone()).collect()
    }

    pub fn find(&self, action: &str) -> Option<AuditEntry> {
        self.entries
            .lock()
            .iter()
            .rev()
            .find(|e| e.action == action)
            .cloned()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, mut entry: AuditEntry) {
        entry.timestamp = Utc::now();
        self.entries.lock().push(entry);
    }
}
