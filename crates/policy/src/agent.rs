//! Agent records and the inputs used to create or change them.

use crate::registry::{RiskLevel, ToolDescriptor, ToolKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CensorshipMode {
    #[default]
    Default,
    Uncensored,
    Custom,
}

impl CensorshipMode {
    pub const NAMES: [&'static str; 3] = ["default", "uncensored", "custom"];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityLevel {
    Restricted,
    #[default]
    Normal,
    Elevated,
}

impl SecurityLevel {
    pub const NAMES: [&'static str; 3] = ["restricted", "normal", "elevated"];
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentPolicy {
    pub censorship: CensorshipMode,
    pub allow_tools: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_tools: Option<Vec<ToolKey>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_context_tokens: Option<u32>,
    pub security_level: SecurityLevel,
    pub require_confirmation_for: Vec<RiskLevel>,
    pub audit_all_actions: bool,
}

impl Default for AgentPolicy {
    fn default() -> Self {
        Self {
            censorship: CensorshipMode::Default,
            allow_tools: true,
            allowed_tools: None,
            max_context_tokens: None,
            security_level: SecurityLevel::Normal,
            require_confirmation_for: vec![RiskLevel::Dangerous, RiskLevel::Critical],
            audit_all_actions: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    #[serde(rename = "systemPrompt")]
    pub system_prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub tools: Vec<ToolKey>,
    #[serde(default)]
    pub policy: AgentPolicy,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    pub fn declares(&self, key: ToolKey) -> bool {
        self.tools.contains(&key)
    }

    /// Checks the agent's own policy for `descriptor`. The error names the
    /// policy rule that refused it.
    pub fn policy_permits(&self, descriptor: &ToolDescriptor) -> Result<(), &'static str> {
        if !self.policy.allow_tools {
            return Err("agent policy disables tool use");
        }
        if let Some(allowed) = &self.policy.allowed_tools {
            if !allowed.contains(&descriptor.key) {
                return Err("tool is not in the agent's allowed_tools");
            }
        }
        if self.policy.security_level == SecurityLevel::Restricted
            && descriptor.risk_level.is_elevated()
        {
            return Err("restricted agents cannot use dangerous or critical tools");
        }
        Ok(())
    }

    pub fn requires_confirmation_for(&self, risk: RiskLevel) -> bool {
        self.policy.require_confirmation_for.contains(&risk)
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Policy overrides supplied by callers. Unset fields keep the secure default
/// (on create) or the current value (on update).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentPolicyPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub censorship: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_tools: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_tools: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_context_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub require_confirmation_for: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_all_actions: Option<bool>,
}

/// Caller input for a new agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDraft {
    pub name: String,
    #[serde(rename = "systemPrompt", alias = "system_prompt")]
    pub system_prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub policy: AgentPolicyPatch,
}

impl AgentDraft {
    pub fn new(name: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            system_prompt: system_prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub async fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, AgentFileError> {
        let content = tokio::fs::read_to_string(&path).await?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// JSON record for a brand new agent: secure default policy with the
    /// draft's overrides merged on top.
    pub fn into_candidate(self, id: &str, now: DateTime<Utc>) -> Value {
        let mut policy = serde_json::to_value(AgentPolicy::default()).unwrap_or(Value::Null);
        merge_object(&mut policy, serde_json::to_value(&self.policy).unwrap_or(Value::Null));

        let mut record = serde_json::json!({
            "id": id,
            "name": self.name,
            "systemPrompt": self.system_prompt,
            "tools": self.tools,
            "policy": policy,
            "created_at": now,
            "updated_at": now,
        });
        if let Some(model) = self.model {
            record["model"] = Value::String(model);
        }
        record
    }
}

/// Caller input for changing an existing agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(
        rename = "systemPrompt",
        alias = "system_prompt",
        skip_serializing_if = "Option::is_none"
    )]
    pub system_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<AgentPolicyPatch>,
}

impl AgentPatch {
    /// JSON record for `agent` with this patch applied. `id` and `created_at`
    /// never change.
    pub fn apply_to(mut self, agent: &Agent, now: DateTime<Utc>) -> Value {
        let mut record = agent.to_value();
        let policy = self.policy.take();
        merge_object(&mut record, serde_json::to_value(&self).unwrap_or(Value::Null));
        if let Some(policy) = policy {
            merge_object(
                &mut record["policy"],
                serde_json::to_value(policy).unwrap_or(Value::Null),
            );
        }
        record["updated_at"] = serde_json::json!(now);
        record
    }
}

/// Shallow merge of `overrides` into `base`; null overrides are ignored.
fn merge_object(base: &mut Value, overrides: Value) {
    if let (Value::Object(base), Value::Object(overrides)) = (base, overrides) {
        for (key, value) in overrides {
            if !value.is_null() {
                base.insert(key, value);
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AgentFileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_agent() -> Agent {
        let now = Utc::now();
        Agent {
            id: "a1".to_string(),
            name: "Researcher".to_string(),
            system_prompt: "You research.".to_string(),
            model: Some("llama3".to_string()),
            tools: vec![ToolKey::FileRead, ToolKey::FileMove],
            policy: AgentPolicy::default(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_record_field_names() {
        let json = sample_agent().to_value();
        assert_eq!(json["systemPrompt"], "You research.");
        assert_eq!(json["tools"][0], "file.read");
        assert_eq!(json["policy"]["security_level"], "normal");
        assert_eq!(json["policy"]["require_confirmation_for"][0], "dangerous");
        assert!(json.get("created_at").is_some());
    }

    #[test]
    fn test_draft_merges_policy_over_defaults() {
        let mut draft = AgentDraft::new("Writer", "You write.").with_tools(["file.write"]);
        draft.policy.security_level = Some("elevated".to_string());
        draft.policy.audit_all_actions = Some(false);

        let candidate = draft.into_candidate("id-1", Utc::now());
        let agent: Agent = serde_json::from_value(candidate).unwrap();

        assert_eq!(agent.policy.security_level, SecurityLevel::Elevated);
        assert!(!agent.policy.audit_all_actions);
        assert!(agent.policy.allow_tools);
        assert_eq!(agent.policy.censorship, CensorshipMode::Default);
        assert_eq!(agent.tools, vec![ToolKey::FileWrite]);
        assert!(agent.model.is_none());
    }

    #[test]
    fn test_patch_keeps_identity() {
        let agent = sample_agent();
        let later = agent.created_at + chrono::Duration::seconds(5);
        let patch = AgentPatch {
            name: Some("Renamed".to_string()),
            policy: Some(AgentPolicyPatch {
                allow_tools: Some(false),
                ..Default::default()
            }),
            ..Default::default()
        };

        let updated: Agent = serde_json::from_value(patch.apply_to(&agent, later)).unwrap();

        assert_eq!(updated.id, agent.id);
        assert_eq!(updated.created_at, agent.created_at);
        assert_eq!(updated.updated_at, later);
        assert_eq!(updated.name, "Renamed");
        assert_eq!(updated.system_prompt, agent.system_prompt);
        assert!(!updated.policy.allow_tools);
        assert_eq!(updated.policy.security_level, SecurityLevel::Normal);
    }

    #[test]
    fn test_policy_permits() {
        let registry = crate::registry::ToolRegistry::new();
        let mut agent = sample_agent();
        let read = registry.get(ToolKey::FileRead).unwrap();
        let mv = registry.get(ToolKey::FileMove).unwrap();

        assert!(agent.policy_permits(read).is_ok());

        agent.policy.security_level = SecurityLevel::Restricted;
        assert!(agent.policy_permits(read).is_ok());
        assert!(agent.policy_permits(mv).is_err());

        agent.policy.security_level = SecurityLevel::Normal;
        agent.policy.allowed_tools = Some(vec![ToolKey::FileMove]);
        assert!(agent.policy_permits(read).is_err());
        assert!(agent.policy_permits(mv).is_ok());

        agent.policy.allow_tools = false;
        assert!(agent.policy_permits(mv).is_err());
    }

    #[test]
    fn test_draft_from_yaml() {
        let yaml = r#"
name: Summarizer
system_prompt: Summarize things.
model: mistral
tools:
  - model.summarize
policy:
  security_level: restricted
"#;
        let draft: AgentDraft = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(draft.system_prompt, "Summarize things.");
        assert_eq!(draft.tools, vec!["model.summarize"]);
        assert_eq!(draft.policy.security_level.as_deref(), Some("restricted"));
    }
}
