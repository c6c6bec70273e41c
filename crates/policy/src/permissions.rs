use crate::registry::{RiskLevel, ToolRegistry};
use crate::security::SecurityContext;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionCheck {
    pub allowed: bool,
    pub requires_confirmation: bool,
    pub reason: String,
}

impl PermissionCheck {
    fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            requires_confirmation: false,
            reason: reason.into(),
        }
    }
}

/// Decides allow / deny / needs-confirmation for a tool from the registry and
/// the current security config.
pub struct PermissionEvaluator {
    registry: Arc<ToolRegistry>,
    security: Arc<SecurityContext>,
}

impl PermissionEvaluator {
    pub fn new(registry: Arc<ToolRegistry>, security: Arc<SecurityContext>) -> Self {
        Self { registry, security }
    }

    pub fn check_tool_permission(&self, tool_key: &str, agent_id: &str) -> PermissionCheck {
        let Some(descriptor) = self.registry.lookup(tool_key) else {
            debug!("Permission check for unknown tool {} (agent {})", tool_key, agent_id);
            return PermissionCheck::deny("Unknown tool");
        };

        let config = self.security.snapshot();

        if descriptor.risk_level == RiskLevel::Critical && !config.allow_critical_tools {
            return PermissionCheck::deny(format!(
                "Tool '{}' is critical and critical tools are disabled",
                tool_key
            ));
        }

        if descriptor.risk_level == RiskLevel::Dangerous && !config.allow_dangerous_tools {
            return PermissionCheck::deny(format!(
                "Tool '{}' is dangerous and dangerous tools are disabled",
                tool_key
            ));
        }

        // Admin mode only ever relaxes confirmation, never the risk gates above.
        let requires_confirmation = !config.admin_mode
            && (descriptor.requires_confirmation || config.require_user_confirmation);

        debug!(
            "Permission check for {} (agent {}): allowed, confirmation={}",
            tool_key, agent_id, requires_confirmation
        );

        PermissionCheck {
            allowed: true,
            requires_confirmation,
            reason: if requires_confirmation {
                "Allowed, user confirmation required".to_string()
            } else {
                "Allowed".to_string()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::registry::ToolKey;
    use crate::security::SecurityConfig;
    use proptest::prelude::*;

    fn evaluator(config: SecurityConfig) -> PermissionEvaluator {
        let security = Arc::new(SecurityContext::new(config, Arc::new(MemoryAuditSink::new())));
        PermissionEvaluator::new(Arc::new(ToolRegistry::new()), security)
    }

    fn all_configs() -> Vec<SecurityConfig> {
        let mut configs = Vec::new();
        for bits in 0..16u8 {
            configs.push(SecurityConfig {
                allow_critical_tools: bits & 1 != 0,
                allow_dangerous_tools: bits & 2 != 0,
                require_user_confirmation: bits & 4 != 0,
                admin_mode: bits & 8 != 0,
            });
        }
        configs
    }

    #[test]
    fn test_unknown_tool_denied() {
        let check =
            evaluator(SecurityConfig::default()).check_tool_permission("file.teleport", "a");
        assert_eq!(
            check,
            PermissionCheck {
                allowed: false,
                requires_confirmation: false,
                reason: "Unknown tool".to_string(),
            }
        );
    }

    #[test]
    fn test_safe_tool_requires_confirmation_by_default() {
        let check = evaluator(SecurityConfig::default()).check_tool_permission("file.read", "a");
        assert!(check.allowed);
        assert!(check.requires_confirmation);
    }

    #[test]
    fn test_safe_tool_without_global_confirmation() {
        let config = SecurityConfig {
            require_user_confirmation: false,
            ..Default::default()
        };
        let eval = evaluator(config);
        assert!(!eval.check_tool_permission("file.read", "a").requires_confirmation);
        // Descriptor-level confirmation still applies.
        assert!(eval.check_tool_permission("file.write", "a").requires_confirmation);
    }

    #[test]
    fn test_critical_denied_regardless_of_admin_mode() {
        for config in all_configs().into_iter().filter(|c| !c.allow_critical_tools) {
            let eval = evaluator(config);
            for key in ToolKey::ALL {
                let descriptor = ToolRegistry::new().get(key).cloned().unwrap();
                if descriptor.risk_level == RiskLevel::Critical {
                    let check = eval.check_tool_permission(&key.to_string(), "a");
                    assert!(!check.allowed, "{key} allowed under {config:?}");
                    assert!(check.reason.contains("critical tools are disabled"));
                }
            }
        }
    }

    #[test]
    fn test_dangerous_denied_when_disabled() {
        let eval = evaluator(SecurityConfig {
            allow_critical_tools: true,
            admin_mode: true,
            ..Default::default()
        });
        let check = eval.check_tool_permission("file.move", "a");
        assert!(!check.allowed);
        assert!(check.reason.contains("dangerous tools are disabled"));
    }

    #[test]
    fn test_admin_mode_suppresses_confirmation_for_dangerous() {
        let eval = evaluator(SecurityConfig {
            allow_dangerous_tools: true,
            admin_mode: true,
            require_user_confirmation: true,
            ..Default::default()
        });
        for key in ToolKey::ALL {
            let risk = ToolRegistry::new().get(key).unwrap().risk_level;
            if risk == RiskLevel::Dangerous {
                let check = eval.check_tool_permission(&key.to_string(), "a");
                assert!(check.allowed);
                assert!(!check.requires_confirmation);
            }
        }
    }

    proptest! {
        #[test]
        fn test_unregistered_keys_never_allowed(key in "[a-z_]{0,12}(\\.[a-z_]{0,16})?") {
            prop_assume!(ToolRegistry::new().lookup(&key).is_none());
            for config in all_configs() {
                let check = evaluator(config).check_tool_permission(&key, "agent");
                prop_assert!(!check.allowed);
            }
        }
    }
}
