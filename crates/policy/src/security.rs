//! Process-wide security configuration.

use crate::audit::{AuditEntry, AuditSink, Severity};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SecurityConfig {
    pub allow_critical_tools: bool,
    pub allow_dangerous_tools: bool,
    pub require_user_confirmation: bool,
    pub admin_mode: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allow_critical_tools: false,
            allow_dangerous_tools: false,
            require_user_confirmation: true,
            admin_mode: false,
        }
    }
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SecurityConfigPatch {
    pub allow_critical_tools: Option<bool>,
    pub allow_dangerous_tools: Option<bool>,
    pub require_user_confirmation: Option<bool>,
    pub admin_mode: Option<bool>,
}

/// Owner of the live [`SecurityConfig`].
///
/// Readers always get a copy taken under one lock acquisition, so an
/// evaluation never sees half of an update.
pub struct SecurityContext {
    config: RwLock<SecurityConfig>,
    audit: Arc<dyn AuditSink>,
}

impl SecurityContext {
    pub fn new(config: SecurityConfig, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            config: RwLock::new(config),
            audit,
        }
    }

    pub fn snapshot(&self) -> SecurityConfig {
        *self.config.read()
    }

    /// Merge `patch` into the live config and audit exactly what changed.
    ///
    /// Callers are trusted to have authorized the change.
    pub async fn update(&self, patch: SecurityConfigPatch) -> SecurityConfig {
        let (updated, changes) = {
            let mut config = self.config.write();
            let mut changes = Vec::new();

            apply(
                &mut config.allow_critical_tools,
                patch.allow_critical_tools,
                "allowCriticalTools",
                &mut changes,
            );
            apply(
                &mut config.allow_dangerous_tools,
                patch.allow_dangerous_tools,
                "allowDangerousTools",
                &mut changes,
            );
            apply(
                &mut config.require_user_confirmation,
                patch.require_user_confirmation,
                "requireUserConfirmation",
                &mut changes,
            );
            apply(
                &mut config.admin_mode,
                patch.admin_mode,
                "adminMode",
                &mut changes,
            );

            (*config, changes)
        };

        let details = if changes.is_empty() {
            "no changes".to_string()
        } else {
            changes.join(", ")
        };
        info!("Security config updated: {}", details);

        self.audit
            .record(AuditEntry::new("security_config_updated", Severity::High).details(details))
            .await;

        updated
    }
}

fn apply(field: &mut bool, value: Option<bool>, name: &str, changes: &mut Vec<String>) {
    if let Some(value) = value {
        if *field != value {
            changes.push(format!("{}: {} -> {}", name, *field, value));
            *field = value;
        }
    }
}
