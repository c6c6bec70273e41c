//! Wires the policy, persistence and execution layers from a [`Config`].

use crate::config::Config;
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use toolgate_infra::agent_store::AgentStore;
use toolgate_infra::audit_log::AuditLog;
use toolgate_infra::cipher::{AesGcmCipher, Cipher};
use toolgate_policy::audit::AuditSink;
use toolgate_policy::permissions::PermissionEvaluator;
use toolgate_policy::registry::{ToolCategory, ToolRegistry};
use toolgate_policy::security::SecurityContext;
use toolgate_policy::validator::AgentValidator;
use toolgate_tools::backends::{FileBackend, MemoryBackend, ProcessBackend};
use toolgate_tools::confirmation::ConfirmationGate;
use toolgate_tools::dispatcher::ExecutionDispatcher;
use toolgate_tools::executors::ExecutorSet;

pub struct Toolgate {
    pub config: Config,
    pub registry: Arc<ToolRegistry>,
    pub cipher: Arc<dyn Cipher>,
    pub audit: Arc<AuditLog>,
    pub security: Arc<SecurityContext>,
    pub evaluator: Arc<PermissionEvaluator>,
    pub store: Arc<AgentStore>,
}

impl Toolgate {
    pub async fn open(config: Config) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir).with_context(|| {
            format!("Failed to create data directory {}", config.data_dir.display())
        })?;

        let key = AesGcmCipher::load_or_create_key(config.master_key_path())
            .context("Failed to load the master key")?;
        let cipher: Arc<dyn Cipher> = Arc::new(AesGcmCipher::new(&key));

        let audit = Arc::new(
            AuditLog::open(config.audit_log_path(), cipher.clone())
                .await
                .context("Failed to open the audit log")?,
        );
        let sink: Arc<dyn AuditSink> = audit.clone();

        let registry = Arc::new(ToolRegistry::new());
        let security = Arc::new(SecurityContext::new(config.security, sink.clone()));
        let evaluator = Arc::new(PermissionEvaluator::new(registry.clone(), security.clone()));
        let validator = Arc::new(AgentValidator::new(registry.clone(), security.clone()));
        let store = Arc::new(
            AgentStore::new(config.registry_path(), cipher.clone(), validator, sink)
                .with_lock_timeout(Duration::from_millis(config.lock_timeout_ms)),
        );

        Ok(Self {
            config,
            registry,
            cipher,
            audit,
            security,
            evaluator,
            store,
        })
    }

    pub fn dispatcher(&self, gate: Arc<dyn ConfirmationGate>) -> Result<ExecutionDispatcher> {
        let sandbox = self.config.sandbox_path();
        std::fs::create_dir_all(&sandbox)
            .with_context(|| format!("Failed to create sandbox {}", sandbox.display()))?;

        Ok(ExecutionDispatcher::new(
            self.registry.clone(),
            self.evaluator.clone(),
            self.store.clone(),
            gate,
            Arc::new(self.executors(&sandbox)?),
            self.audit.clone(),
        )
        .with_timeout_ms(self.config.tool_timeout_ms))
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.config.confirmation_timeout_secs)
    }

    fn executors(&self, sandbox: &Path) -> Result<ExecutorSet> {
        Ok(ExecutorSet::new()
            .with(ToolCategory::File, Arc::new(FileBackend::new(sandbox)?))
            .with(ToolCategory::Process, Arc::new(ProcessBackend::new()))
            .with(ToolCategory::Memory, Arc::new(MemoryBackend::new())))
    }
}
