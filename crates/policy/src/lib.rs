//! Tool risk registry, security configuration, permission evaluation and
//! agent validation.

pub mod agent;
pub mod audit;
pub mod error;
pub mod permissions;
pub mod registry;
pub mod security;
pub mod validator;

pub use agent::{
    Agent, AgentDraft, AgentFileError, AgentPatch, AgentPolicy, AgentPolicyPatch, CensorshipMode,
    SecurityLevel,
};
pub use audit::{AuditEntry, AuditSink, MemoryAuditSink, Severity};
pub use error::PolicyError;
pub use permissions::{PermissionCheck, PermissionEvaluator};
pub use registry::{RiskLevel, ToolCategory, ToolDescriptor, ToolKey, ToolRegistry};
pub use security::{SecurityConfig, SecurityConfigPatch, SecurityContext};
pub use validator::{AgentValidator, ValidationReport};
