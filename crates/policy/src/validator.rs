//! Shape and tool-list validation for agent records.
//!
//! Validation works on the JSON form of a record so the same checks apply to
//! caller input and to whatever was read back from disk.

use crate::agent::{Agent, CensorshipMode, SecurityLevel};
use crate::registry::{RiskLevel, ToolRegistry};
use crate::security::SecurityContext;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub security_warnings: Vec<String>,
    pub blocked_tools: Vec<String>,
}

impl ValidationReport {
    /// Errors and blocked tools joined for logs and audit details.
    pub fn summary(&self) -> String {
        let mut parts = self.errors.clone();
        parts.extend(
            self.blocked_tools
                .iter()
                .map(|tool| format!("blocked tool: {}", tool)),
        );
        parts.join("; ")
    }
}

pub struct AgentValidator {
    registry: Arc<ToolRegistry>,
    security: Arc<SecurityContext>,
}

impl AgentValidator {
    pub fn new(registry: Arc<ToolRegistry>, security: Arc<SecurityContext>) -> Self {
        Self { registry, security }
    }

    pub fn validate_agent(&self, candidate: &Value) -> ValidationReport {
        let mut report = ValidationReport::default();
        let config = self.security.snapshot();

        match candidate.get("name") {
            Some(Value::String(name)) if !name.trim().is_empty() => {}
            _ => report
                .errors
                .push("Agent name is required and must be a non-empty string".to_string()),
        }

        if !matches!(candidate.get("systemPrompt"), Some(Value::String(_))) {
            report
                .errors
                .push("System prompt is required and must be a string".to_string());
        }

        if let Some(model) = candidate.get("model") {
            if !model.is_string() && !model.is_null() {
                report.errors.push("Model must be a string".to_string());
            }
        }

        match candidate.get("tools") {
            None | Some(Value::Null) => {}
            Some(Value::Array(tools)) => {
                for tool in tools {
                    let Some(key) = tool.as_str() else {
                        report
                            .errors
                            .push(format!("Tool entry must be a string, got {}", tool));
                        continue;
                    };
                    let Some(descriptor) = self.registry.lookup(key) else {
                        report.errors.push(format!("Unknown tool: {}", key));
                        continue;
                    };

                    let permitted = match descriptor.risk_level {
                        RiskLevel::Critical => config.allow_critical_tools,
                        RiskLevel::Dangerous => config.allow_dangerous_tools,
                        RiskLevel::Safe | RiskLevel::Moderate => continue,
                    };

                    if permitted {
                        report.security_warnings.push(format!(
                            "Tool '{}' is {} and is allowed by the current security config",
                            key, descriptor.risk_level
                        ));
                    } else {
                        report.security_warnings.push(format!(
                            "Tool '{}' is {} and {} tools are disabled",
                            key, descriptor.risk_level, descriptor.risk_level
                        ));
                        report.blocked_tools.push(key.to_string());
                    }
                }
            }
            Some(_) => report.errors.push("Tools must be an array".to_string()),
        }

        if let Some(policy) = candidate.get("policy") {
            self.validate_policy(policy, &mut report);
        }

        report.valid = report.errors.is_empty() && report.blocked_tools.is_empty();
        report
    }

    pub fn validate_agent_record(&self, agent: &Agent) -> ValidationReport {
        self.validate_agent(&agent.to_value())
    }

    fn validate_policy(&self, policy: &Value, report: &mut ValidationReport) {
        let Value::Object(policy) = policy else {
            if !policy.is_null() {
                report.errors.push("Policy must be an object".to_string());
            }
            return;
        };

        check_enum(policy.get("censorship"), "censorship", &CensorshipMode::NAMES, report);
        check_enum(
            policy.get("security_level"),
            "security_level",
            &SecurityLevel::NAMES,
            report,
        );

        if let Some(value) = policy.get("allow_tools") {
            if !value.is_boolean() {
                report.errors.push("Policy allow_tools must be a boolean".to_string());
            }
        }

        match policy.get("allowed_tools") {
            None | Some(Value::Null) => {}
            Some(Value::Array(tools)) => {
                for tool in tools {
                    match tool.as_str() {
                        Some(key) if self.registry.lookup(key).is_some() => {}
                        Some(key) => report
                            .errors
                            .push(format!("Unknown tool in allowed_tools: {}", key)),
                        None => report
                            .errors
                            .push("Policy allowed_tools entries must be strings".to_string()),
                    }
                }
            }
            Some(_) => report
                .errors
                .push("Policy allowed_tools must be an array".to_string()),
        }

        match policy.get("max_context_tokens") {
            None | Some(Value::Null) => {}
            Some(value) => {
                if !value.as_u64().is_some_and(|n| n > 0 && n <= u32::MAX as u64) {
                    report
                        .errors
                        .push("Policy max_context_tokens must be a positive integer".to_string());
                }
            }
        }

        match policy.get("require_confirmation_for") {
            None | Some(Value::Null) => {}
            Some(Value::Array(levels)) => {
                for level in levels {
                    if !level.as_str().is_some_and(|l| RiskLevel::parse(l).is_some()) {
                        report.errors.push(format!(
                            "Invalid risk level in require_confirmation_for: {}",
                            level
                        ));
                    }
                }
            }
            Some(_) => report
                .errors
                .push("Policy require_confirmation_for must be an array".to_string()),
        }

        if let Some(value) = policy.get("audit_all_actions") {
            if !value.is_boolean() {
                report
                    .errors
                    .push("Policy audit_all_actions must be a boolean".to_string());
            }
        }
    }
}

fn check_enum(value: Option<&Value>, field: &str, allowed: &[&str], report: &mut ValidationReport) {
    let Some(value) = value else {
        return;
    };
    if !value.as_str().is_some_and(|v| allowed.contains(&v)) {
        report.errors.push(format!(
            "Invalid {}: {} (expected one of: {})",
            field,
            value,
            allowed.join(", ")
        ));
    }
}
