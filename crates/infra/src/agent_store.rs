//! Encrypted, versioned persistence for agent records.
//!
//! The registry is one encrypted JSON document. Mutations are
//! load → mutate → save under a write lock, and a save is refused when the
//! file changed underneath the loaded copy.

use crate::cipher::{Cipher, CipherError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};
use toolgate_policy::agent::{Agent, AgentDraft, AgentPatch};
use toolgate_policy::audit::{AuditEntry, AuditSink, Severity};
use toolgate_policy::validator::{AgentValidator, ValidationReport};
use tracing::{error, info, warn};

pub const REGISTRY_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Encryption error: {0}")]
    Cipher(#[from] CipherError),

    #[error("Agent validation failed: {}", .0.summary())]
    Validation(ValidationReport),

    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Registry changed on disk since it was loaded; refusing to overwrite")]
    StaleWrite,

    #[error("Timed out waiting for the registry write lock")]
    LockTimeout,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRegistry {
    pub version: u32,
    pub agents: BTreeMap<String, Agent>,
    pub active_agent_id: Option<String>,
    pub last_modified: DateTime<Utc>,
    /// `lastModified` found on disk when this copy was loaded; `None` if
    /// there was no readable file.
    #[serde(skip)]
    loaded_stamp: Option<DateTime<Utc>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            version: REGISTRY_VERSION,
            agents: BTreeMap::new(),
            active_agent_id: None,
            last_modified: Utc::now(),
            loaded_stamp: None,
        }
    }

    pub fn active_agent(&self) -> Option<&Agent> {
        self.active_agent_id
            .as_ref()
            .and_then(|id| self.agents.get(id))
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// On-disk form before validation; agents stay raw JSON until they pass.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRegistry {
    #[serde(default = "default_version")]
    version: u32,
    #[serde(default)]
    agents: BTreeMap<String, Value>,
    #[serde(default)]
    active_agent_id: Option<String>,
    #[serde(default)]
    last_modified: Option<DateTime<Utc>>,
}

fn default_version() -> u32 {
    REGISTRY_VERSION
}

pub struct AgentStore {
    registry_path: PathBuf,
    cipher: Arc<dyn Cipher>,
    validator: Arc<AgentValidator>,
    audit: Arc<dyn AuditSink>,
    write_lock: Mutex<()>,
    lock_timeout: Duration,
}

impl AgentStore {
    pub fn new<P: AsRef<Path>>(
        registry_path: P,
        cipher: Arc<dyn Cipher>,
        validator: Arc<AgentValidator>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            registry_path: registry_path.as_ref().to_path_buf(),
            cipher,
            validator,
            audit,
            write_lock: Mutex::new(()),
            lock_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.registry_path
    }

    /// Stamp `lastModified`, encrypt and write the registry.
    ///
    /// Refused with [`StoreError::StaleWrite`] when the file changed since
    /// `registry` was loaded.
    pub async fn save(&self, registry: &mut AgentRegistry) -> Result<(), StoreError> {
        let _guard = self.lock().await?;
        self.commit(registry).await
    }

    /// Save only if the file still carries `expected_last_modified` (the value
    /// seen when `registry` was loaded; `None` if there was no file).
    pub async fn save_checked(
        &self,
        registry: &mut AgentRegistry,
        expected_last_modified: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let _guard = self.lock().await?;
        registry.loaded_stamp = expected_last_modified;
        self.commit(registry).await
    }

    pub async fn get_agent(&self, agent_id: &str) -> Option<Agent> {
        self.load().await.agents.remove(agent_id)
    }

    pub async fn list_agents(&self) -> Vec<Agent> {
        self.load().await.agents.into_values().collect()
    }

    pub async fn active_agent(&self) -> Option<Agent> {
        let mut registry = self.load().await;
        let id = registry.active_agent_id.take()?;
        registry.agents.remove(&id)
    }

    pub async fn create_agent(&self, draft: AgentDraft) -> Result<Agent, StoreError> {
        let _guard = self.lock().await?;
        let mut registry = self.load().await;

        let id = uuid::Uuid::new_v4().to_string();
        let candidate = draft.into_candidate(&id, Utc::now());
        let agent = self.validated(&id, &candidate).await?;

        registry.agents.insert(id.clone(), agent.clone());
        self.commit(&mut registry).await?;

        info!("Created agent {} ({})", agent.name, id);
        self.audit
            .record(
                AuditEntry::new("agent_created", Severity::Medium)
                    .agent(&id)
                    .details(format!("Created agent '{}'", agent.name)),
            )
            .await;
        Ok(agent)
    }

    pub async fn update_agent(
        &self,
        agent_id: &str,
        patch: AgentPatch,
    ) -> Result<Agent, StoreError> {
        let _guard = self.lock().await?;
        let mut registry = self.load().await;

        let Some(existing) = registry.agents.get(agent_id) else {
            return Err(self.not_found("agent_update_failed", agent_id).await);
        };

        let candidate = patch.apply_to(existing, Utc::now());
        let agent = self.validated(agent_id, &candidate).await?;

        registry.agents.insert(agent_id.to_string(), agent.clone());
        self.commit(&mut registry).await?;

        info!("Updated agent {}", agent_id);
        self.audit
            .record(
                AuditEntry::new("agent_updated", Severity::Medium)
                    .agent(agent_id)
                    .details(format!("Updated agent '{}'", agent.name)),
            )
            .await;
        Ok(agent)
    }

    /// Remove an agent. Clears `activeAgentId` only if it pointed at this agent.
    pub async fn delete_agent(&self, agent_id: &str) -> Result<Agent, StoreError> {
        let _guard = self.lock().await?;
        let mut registry = self.load().await;

        let Some(removed) = registry.agents.remove(agent_id) else {
            return Err(self.not_found("agent_delete_failed", agent_id).await);
        };

        let was_active = registry.active_agent_id.as_deref() == Some(agent_id);
        if was_active {
            registry.active_agent_id = None;
        }

        self.commit(&mut registry).await?;

        info!("Deleted agent {}", agent_id);
        let mut details = format!("Deleted agent '{}'", removed.name);
        if was_active {
            details.push_str("; active agent cleared");
        }
        self.audit
            .record(
                AuditEntry::new("agent_deleted", Severity::Medium)
                    .agent(agent_id)
                    .details(details),
            )
            .await;
        Ok(removed)
    }

    /// Copy an agent under a new id as `"<name> (copy)"`. The copy is not
    /// made active.
    pub async fn clone_agent(&self, agent_id: &str) -> Result<Agent, StoreError> {
        let _guard = self.lock().await?;
        let mut registry = self.load().await;

        let Some(source) = registry.agents.get(agent_id) else {
            return Err(self.not_found("agent_clone_failed", agent_id).await);
        };

        let now = Utc::now();
        let new_id = uuid::Uuid::new_v4().to_string();
        let mut copy = source.clone();
        copy.id = new_id.clone();
        copy.name = format!("{} (copy)", source.name);
        copy.created_at = now;
        copy.updated_at = now;

        let agent = self.validated(&new_id, &copy.to_value()).await?;

        registry.agents.insert(new_id.clone(), agent.clone());
        self.commit(&mut registry).await?;

        info!("Cloned agent {} into {}", agent_id, new_id);
        self.audit
            .record(
                AuditEntry::new("agent_cloned", Severity::Medium)
                    .agent(&new_id)
                    .details(format!("Cloned from agent {}", agent_id)),
            )
            .await;
        Ok(agent)
    }

    pub async fn set_active_agent(&self, agent_id: Option<&str>) -> Result<(), StoreError> {
        let _guard = self.lock().await?;
        let mut registry = self.load().await;

        if let Some(id) = agent_id {
            if !registry.agents.contains_key(id) {
                return Err(self.not_found("active_agent_change_failed", id).await);
            }
        }

        let previous = registry.active_agent_id.clone();
        registry.active_agent_id = agent_id.map(str::to_string);
        self.commit(&mut registry).await?;

        let mut entry = AuditEntry::new("active_agent_changed", Severity::Low).details(format!(
            "{} -> {}",
            previous.as_deref().unwrap_or("none"),
            agent_id.unwrap_or("none")
        ));
        if let Some(id) = agent_id {
            entry = entry.agent(id);
        }
        self.audit.record(entry).await;
        Ok(())
    }

    async fn lock(&self) -> Result<MutexGuard<'_, ()>, StoreError> {
        tokio::time::timeout(self.lock_timeout, self.write_lock.lock())
            .await
            .map_err(|_| StoreError::LockTimeout)
    }

    /// Read the registry. Never fails: a missing file gives a fresh registry,
    /// an unreadable one gives a fresh registry plus a critical audit entry.
    pub async fn load(&self) -> AgentRegistry {
        let content = match tokio::fs::read_to_string(&self.registry_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No agent registry at {}, starting fresh", self.registry_path.display());
                self.audit
                    .record(
                        AuditEntry::new("registry_created", Severity::Medium)
                            .details("No registry file found; created an empty registry"),
                    )
                    .await;
                return AgentRegistry::new();
            }
            Err(e) => return self.recover("read", e.to_string()).await,
        };

        let raw = match self.decode(&content) {
            Ok(raw) => raw,
            Err(e) => return self.recover("decode", e.to_string()).await,
        };

        let mut registry = AgentRegistry {
            version: raw.version,
            agents: BTreeMap::new(),
            active_agent_id: raw.active_agent_id,
            last_modified: raw.last_modified.unwrap_or_else(Utc::now),
            loaded_stamp: raw.last_modified,
        };

        for (id, record) in raw.agents {
            match self.accept_loaded(&id, &record) {
                Ok(agent) => {
                    registry.agents.insert(id, agent);
                }
                Err(reason) => {
                    warn!("Dropping invalid agent {} from registry: {}", id, reason);
                    self.audit
                        .record(
                            AuditEntry::new("agent_removed_invalid", Severity::High)
                                .agent(&id)
                                .details(reason),
                        )
                        .await;
                }
            }
        }

        if let Some(active) = &registry.active_agent_id {
            if !registry.agents.contains_key(active) {
                warn!("Active agent {} is not in the registry; clearing", active);
                registry.active_agent_id = None;
            }
        }

        self.audit
            .record(
                AuditEntry::new("registry_loaded", Severity::Low)
                    .details(format!("Loaded {} agents", registry.agents.len())),
            )
            .await;

        registry
    }

    fn decode(&self, content: &str) -> Result<RawRegistry, StoreError> {
        let plaintext = self.cipher.decrypt(content)?;
        Ok(serde_json::from_str(&plaintext)?)
    }

    fn accept_loaded(&self, id: &str, record: &Value) -> Result<Agent, String> {
        let report = self.validator.validate_agent(record);
        if !report.valid {
            return Err(report.summary());
        }
        let agent: Agent = serde_json::from_value(record.clone()).map_err(|e| e.to_string())?;
        if agent.id != id {
            return Err(format!("record id '{}' does not match registry key", agent.id));
        }
        Ok(agent)
    }

    async fn recover(&self, stage: &str, reason: String) -> AgentRegistry {
        error!(
            "Failed to {} agent registry {}: {}; continuing with an empty registry",
            stage,
            self.registry_path.display(),
            reason
        );
        self.audit
            .record(
                AuditEntry::new("registry_load_failed", Severity::Critical).details(format!(
                    "Failed to {} registry: {}; fell back to an empty registry",
                    stage, reason
                )),
            )
            .await;
        AgentRegistry::new()
    }

    async fn validated(&self, agent_id: &str, candidate: &Value) -> Result<Agent, StoreError> {
        let report = self.validator.validate_agent(candidate);
        if !report.valid {
            warn!("Rejected agent {}: {}", agent_id, report.summary());
            self.audit
                .record(
                    AuditEntry::new("agent_validation_failed", Severity::High)
                        .agent(agent_id)
                        .details(report.summary()),
                )
                .await;
            return Err(StoreError::Validation(report));
        }
        Ok(serde_json::from_value(candidate.clone())?)
    }

    async fn not_found(&self, action: &str, agent_id: &str) -> StoreError {
        self.audit
            .record(
                AuditEntry::new(action, Severity::Medium)
                    .agent(agent_id)
                    .details("Agent not found"),
            )
            .await;
        StoreError::AgentNotFound(agent_id.to_string())
    }

    async fn commit(&self, registry: &mut AgentRegistry) -> Result<(), StoreError> {
        let loaded_stamp = registry.loaded_stamp;
        let current = self.disk_stamp().await;
        if current != loaded_stamp {
            warn!(
                "Registry {} changed on disk since load; rejecting write",
                self.registry_path.display()
            );
            self.audit
                .record(AuditEntry::new("registry_stale_write", Severity::High).details(format!(
                    "Loaded lastModified {:?}, found {:?} on disk",
                    loaded_stamp, current
                )))
                .await;
            return Err(StoreError::StaleWrite);
        }
        self.write_registry(registry).await
    }

    async fn disk_stamp(&self) -> Option<DateTime<Utc>> {
        let content = tokio::fs::read_to_string(&self.registry_path).await.ok()?;
        self.decode(&content).ok()?.last_modified
    }

    async fn write_registry(&self, registry: &mut AgentRegistry) -> Result<(), StoreError> {
        registry.last_modified = Utc::now();

        match self.try_write(registry).await {
            Ok(()) => {
                registry.loaded_stamp = Some(registry.last_modified);
                self.audit
                    .record(
                        AuditEntry::new("registry_saved", Severity::Low)
                            .details(format!("Saved {} agents", registry.agents.len())),
                    )
                    .await;
                Ok(())
            }
            Err(e) => {
                error!("Failed to save agent registry: {}", e);
                self.audit
                    .record(
                        AuditEntry::new("registry_save_failed", Severity::Critical)
                            .details(e.to_string()),
                    )
                    .await;
                Err(e)
            }
        }
    }

    async fn try_write(&self, registry: &AgentRegistry) -> Result<(), StoreError> {
        let json = serde_json::to_string(registry)?;
        let encrypted = self.cipher.encrypt(&json)?;

        if let Some(parent) = self.registry_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let temp_path = self.registry_path.with_extension("tmp");
        tokio::fs::write(&temp_path, encrypted.as_bytes()).await?;
        tokio::fs::rename(&temp_path, &self.registry_path).await?;
        Ok(())
    }
}
