use chrono::Utc;
use std::sync::Arc;
use tempfile::TempDir;
use toolgate_infra::agent_store::{AgentRegistry, AgentStore, StoreError};
use toolgate_infra::cipher::{AesGcmCipher, Cipher};
use toolgate_policy::agent::{AgentDraft, AgentPatch};
use toolgate_policy::audit::{MemoryAuditSink, Severity};
use toolgate_policy::registry::{ToolKey, ToolRegistry};
use toolgate_policy::security::{SecurityConfig, SecurityContext};
use toolgate_policy::validator::AgentValidator;

const KEY: [u8; 32] = [42u8; 32];

struct Fixture {
    store: Arc<AgentStore>,
    audit: Arc<MemoryAuditSink>,
}

fn fixture(temp: &TempDir, config: SecurityConfig) -> Fixture {
    let audit = Arc::new(MemoryAuditSink::new());
    let security = Arc::new(SecurityContext::new(config, audit.clone()));
    let validator = Arc::new(AgentValidator::new(Arc::new(ToolRegistry::new()), security));
    let store = AgentStore::new(
        temp.path().join("agents.enc"),
        Arc::new(AesGcmCipher::new(&KEY)),
        validator,
        audit.clone(),
    );
    Fixture {
        store: Arc::new(store),
        audit,
    }
}

fn permissive() -> SecurityConfig {
    SecurityConfig {
        allow_critical_tools: true,
        allow_dangerous_tools: true,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_load_missing_registry() {
    let temp = TempDir::new().unwrap();
    let fx = fixture(&temp, SecurityConfig::default());

    let registry = fx.store.load().await;

    assert!(registry.agents.is_empty());
    assert!(registry.active_agent_id.is_none());
    assert_eq!(registry.version, 1);
    let created = fx.audit.find("registry_created").unwrap();
    assert_eq!(created.severity, Severity::Medium);
}

#[tokio::test]
async fn test_save_then_load_round_trip() {
    let temp = TempDir::new().unwrap();
    let fx = fixture(&temp, SecurityConfig::default());

    let a = fx
        .store
        .create_agent(AgentDraft::new("Alpha", "prompt a").with_tools(["file.read"]))
        .await
        .unwrap();
    fx.store
        .create_agent(AgentDraft::new("Beta", "prompt b"))
        .await
        .unwrap();

    let mut registry = fx.store.load().await;
    registry.active_agent_id = Some(a.id.clone());
    fx.store.save(&mut registry).await.unwrap();

    let loaded = fx.store.load().await;
    assert_eq!(loaded.agents, registry.agents);
    assert_eq!(loaded.active_agent_id, registry.active_agent_id);
    assert_eq!(loaded.last_modified, registry.last_modified);
    assert!(fx.audit.find("registry_saved").is_some());
    assert_eq!(fx.audit.find("registry_loaded").unwrap().severity, Severity::Low);
}

#[tokio::test]
async fn test_registry_file_is_encrypted() {
    let temp = TempDir::new().unwrap();
    let fx = fixture(&temp, SecurityConfig::default());

    fx.store
        .create_agent(AgentDraft::new("Secretive", "hidden prompt"))
        .await
        .unwrap();

    let raw = std::fs::read_to_string(fx.store.path()).unwrap();
    assert!(!raw.contains("Secretive"));
    assert!(!raw.contains("hidden prompt"));
}

#[tokio::test]
async fn test_corrupt_registry_recovers_empty() {
    let temp = TempDir::new().unwrap();
    let fx = fixture(&temp, SecurityConfig::default());
    std::fs::write(fx.store.path(), "definitely not ciphertext").unwrap();

    let registry = fx.store.load().await;

    assert!(registry.agents.is_empty());
    let failure = fx.audit.find("registry_load_failed").unwrap();
    assert_eq!(failure.severity, Severity::Critical);
}

#[tokio::test]
async fn test_foreign_key_registry_recovers_empty() {
    let temp = TempDir::new().unwrap();
    let fx = fixture(&temp, SecurityConfig::default());
    let foreign = AesGcmCipher::new(&[9u8; 32])
        .encrypt(r#"{"version":1,"agents":{},"activeAgentId":null}"#)
        .unwrap();
    std::fs::write(fx.store.path(), foreign).unwrap();

    assert!(fx.store.load().await.agents.is_empty());
    assert!(fx.audit.find("registry_load_failed").is_some());
}

#[tokio::test]
async fn test_corrupt_registry_is_overwritten_by_next_mutation() {
    let temp = TempDir::new().unwrap();
    let fx = fixture(&temp, SecurityConfig::default());
    std::fs::write(fx.store.path(), "garbage").unwrap();

    let agent = fx
        .store
        .create_agent(AgentDraft::new("Fresh", "p"))
        .await
        .unwrap();

    assert!(fx.store.get_agent(&agent.id).await.is_some());
}

#[tokio::test]
async fn test_invalid_agents_dropped_on_load_but_kept_on_disk() {
    let temp = TempDir::new().unwrap();

    let agent_id = {
        let fx = fixture(&temp, permissive());
        let agent = fx
            .store
            .create_agent(
                AgentDraft::new("Operator", "p")
                    .with_tools(["file.read", "system.execute_command"]),
            )
            .await
            .unwrap();
        fx.store.set_active_agent(Some(&agent.id)).await.unwrap();
        agent.id
    };

    let strict = fixture(&temp, SecurityConfig::default());
    let registry = strict.store.load().await;
    assert!(registry.agents.is_empty());
    assert!(registry.active_agent_id.is_none());

    let removed = strict.audit.find("agent_removed_invalid").unwrap();
    assert_eq!(removed.severity, Severity::High);
    assert_eq!(removed.agent_id.as_deref(), Some(agent_id.as_str()));
    assert!(removed.details.unwrap().contains("system.execute_command"));

    let permissive_again = fixture(&temp, permissive());
    assert!(permissive_again.store.get_agent(&agent_id).await.is_some());
}

#[tokio::test]
async fn test_dangling_active_id_cleared_on_load() {
    let temp = TempDir::new().unwrap();
    let fx = fixture(&temp, SecurityConfig::default());
    let json = format!(
        r#"{{"version":1,"agents":{{}},"activeAgentId":"ghost","lastModified":"{}"}}"#,
        Utc::now().to_rfc3339()
    );
    let encrypted = AesGcmCipher::new(&KEY).encrypt(&json).unwrap();
    std::fs::write(fx.store.path(), encrypted).unwrap();

    assert!(fx.store.load().await.active_agent_id.is_none());
}

#[tokio::test]
async fn test_create_applies_secure_defaults() {
    let temp = TempDir::new().unwrap();
    let fx = fixture(&temp, SecurityConfig::default());

    let agent = fx
        .store
        .create_agent(AgentDraft::new("Default", "p"))
        .await
        .unwrap();

    assert!(!agent.id.is_empty());
    assert!(agent.policy.audit_all_actions);
    assert_eq!(agent.created_at, agent.updated_at);
    assert_eq!(
        fx.audit.find("agent_created").unwrap().agent_id.as_deref(),
        Some(agent.id.as_str())
    );
}

#[tokio::test]
async fn test_create_rejects_unknown_tool() {
    let temp = TempDir::new().unwrap();
    let fx = fixture(&temp, SecurityConfig::default());

    let result = fx
        .store
        .create_agent(AgentDraft::new("Bad", "p").with_tools(["file.teleport"]))
        .await;

    match result {
        Err(StoreError::Validation(report)) => {
            assert!(report.errors.iter().any(|e| e.contains("file.teleport")))
        }
        other => panic!("expected validation error, got {:?}", other),
    }
    assert_eq!(
        fx.audit.find("agent_validation_failed").unwrap().severity,
        Severity::High
    );
    assert!(fx.store.list_agents().await.is_empty());
}

#[tokio::test]
async fn test_create_rejects_blocked_tool() {
    let temp = TempDir::new().unwrap();
    let fx = fixture(&temp, SecurityConfig::default());

    let result = fx
        .store
        .create_agent(AgentDraft::new("Mover", "p").with_tools(["file.move"]))
        .await;

    match result {
        Err(StoreError::Validation(report)) => assert_eq!(report.blocked_tools, vec!["file.move"]),
        other => panic!("expected validation error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_update_revalidates() {
    let temp = TempDir::new().unwrap();
    let fx = fixture(&temp, SecurityConfig::default());
    let agent = fx
        .store
        .create_agent(AgentDraft::new("Writer", "p").with_tools(["file.read"]))
        .await
        .unwrap();

    let updated = fx
        .store
        .update_agent(
            &agent.id,
            AgentPatch {
                name: Some("Editor".to_string()),
                tools: Some(vec!["file.read".to_string(), "file.write".to_string()]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.name, "Editor");
    assert_eq!(updated.tools, vec![ToolKey::FileRead, ToolKey::FileWrite]);
    assert!(updated.updated_at >= agent.updated_at);

    let rejected = fx
        .store
        .update_agent(
            &agent.id,
            AgentPatch {
                name: Some(String::new()),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(rejected, Err(StoreError::Validation(_))));
    assert_eq!(fx.store.get_agent(&agent.id).await.unwrap().name, "Editor");
}

#[tokio::test]
async fn test_update_missing_agent() {
    let temp = TempDir::new().unwrap();
    let fx = fixture(&temp, SecurityConfig::default());

    let result = fx.store.update_agent("nope", AgentPatch::default()).await;

    assert!(matches!(result, Err(StoreError::AgentNotFound(_))));
    assert!(fx.audit.find("agent_update_failed").is_some());
}

#[tokio::test]
async fn test_delete_active_agent_clears_active_id() {
    let temp = TempDir::new().unwrap();
    let fx = fixture(&temp, SecurityConfig::default());
    let a = fx.store.create_agent(AgentDraft::new("A", "p")).await.unwrap();
    let b = fx.store.create_agent(AgentDraft::new("B", "p")).await.unwrap();
    fx.store.set_active_agent(Some(&a.id)).await.unwrap();

    fx.store.delete_agent(&a.id).await.unwrap();

    let registry = fx.store.load().await;
    assert!(registry.active_agent_id.is_none());
    assert!(registry.agents.contains_key(&b.id));
    assert!(fx
        .audit
        .find("agent_deleted")
        .unwrap()
        .details
        .unwrap()
        .contains("active agent cleared"));
}

#[tokio::test]
async fn test_delete_other_agent_keeps_active_id() {
    let temp = TempDir::new().unwrap();
    let fx = fixture(&temp, SecurityConfig::default());
    let a = fx.store.create_agent(AgentDraft::new("A", "p")).await.unwrap();
    let b = fx.store.create_agent(AgentDraft::new("B", "p")).await.unwrap();
    fx.store.set_active_agent(Some(&a.id)).await.unwrap();

    fx.store.delete_agent(&b.id).await.unwrap();

    assert_eq!(fx.store.load().await.active_agent_id, Some(a.id.clone()));
    assert_eq!(fx.store.active_agent().await.unwrap().id, a.id);
}

#[tokio::test]
async fn test_clone_agent() {
    let temp = TempDir::new().unwrap();
    let fx = fixture(&temp, SecurityConfig::default());
    let original = fx
        .store
        .create_agent(AgentDraft::new("Original", "p").with_tools(["model.generate"]))
        .await
        .unwrap();
    fx.store.set_active_agent(Some(&original.id)).await.unwrap();

    let copy = fx.store.clone_agent(&original.id).await.unwrap();

    assert_ne!(copy.id, original.id);
    assert_eq!(copy.name, "Original (copy)");
    assert_eq!(copy.tools, original.tools);
    let registry = fx.store.load().await;
    assert_eq!(registry.agents.len(), 2);
    assert_eq!(registry.active_agent_id, Some(original.id));
}

#[tokio::test]
async fn test_set_active_unknown_agent() {
    let temp = TempDir::new().unwrap();
    let fx = fixture(&temp, SecurityConfig::default());

    let result = fx.store.set_active_agent(Some("ghost")).await;

    assert!(matches!(result, Err(StoreError::AgentNotFound(_))));
}

#[tokio::test]
async fn test_concurrent_creates_are_not_lost() {
    let temp = TempDir::new().unwrap();
    let fx = fixture(&temp, SecurityConfig::default());

    let mut handles = Vec::new();
    for i in 0..10 {
        let store = Arc::clone(&fx.store);
        handles.push(tokio::spawn(async move {
            store
                .create_agent(AgentDraft::new(format!("agent-{}", i), "p"))
                .await
                .unwrap()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(fx.store.list_agents().await.len(), 10);
}

#[tokio::test]
async fn test_stale_write_rejected() {
    let temp = TempDir::new().unwrap();
    let fx = fixture(&temp, SecurityConfig::default());
    fx.store.create_agent(AgentDraft::new("First", "p")).await.unwrap();

    let mut stale = fx.store.load().await;
    let seen = Some(stale.last_modified);

    // Someone else writes in between.
    fx.store.create_agent(AgentDraft::new("Second", "p")).await.unwrap();

    stale.agents.clear();
    let result = fx.store.save_checked(&mut stale, seen).await;

    assert!(matches!(result, Err(StoreError::StaleWrite)));
    assert_eq!(
        fx.audit.find("registry_stale_write").unwrap().severity,
        Severity::High
    );
    assert_eq!(fx.store.list_agents().await.len(), 2);
}

#[tokio::test]
async fn test_plain_save_of_stale_copy_rejected() {
    let temp = TempDir::new().unwrap();
    let fx = fixture(&temp, SecurityConfig::default());
    fx.store.create_agent(AgentDraft::new("First", "p")).await.unwrap();

    let mut stale = fx.store.load().await;
    fx.store.create_agent(AgentDraft::new("Second", "p")).await.unwrap();

    let result = fx.store.save(&mut stale).await;

    assert!(matches!(result, Err(StoreError::StaleWrite)));
    let names: Vec<String> = fx
        .store
        .list_agents()
        .await
        .into_iter()
        .map(|a| a.name)
        .collect();
    assert_eq!(names.len(), 2);
    assert!(names.contains(&"Second".to_string()));
}

#[tokio::test]
async fn test_repeated_saves_of_own_copy_succeed() {
    let temp = TempDir::new().unwrap();
    let fx = fixture(&temp, SecurityConfig::default());
    let agent = fx.store.create_agent(AgentDraft::new("Only", "p")).await.unwrap();

    let mut registry = fx.store.load().await;
    registry.active_agent_id = Some(agent.id.clone());
    fx.store.save(&mut registry).await.unwrap();
    registry.active_agent_id = None;
    fx.store.save(&mut registry).await.unwrap();

    assert!(fx.store.load().await.active_agent_id.is_none());
}

#[tokio::test]
async fn test_unloaded_registry_cannot_overwrite_existing_file() {
    let temp = TempDir::new().unwrap();
    let fx = fixture(&temp, SecurityConfig::default());
    fx.store.create_agent(AgentDraft::new("Kept", "p")).await.unwrap();

    let result = fx.store.save(&mut AgentRegistry::new()).await;

    assert!(matches!(result, Err(StoreError::StaleWrite)));
    assert_eq!(fx.store.list_agents().await.len(), 1);
}

#[tokio::test]
async fn test_save_checked_accepts_fresh_stamp() {
    let temp = TempDir::new().unwrap();
    let fx = fixture(&temp, SecurityConfig::default());
    fx.store.create_agent(AgentDraft::new("First", "p")).await.unwrap();

    let mut registry = fx.store.load().await;
    let seen = Some(registry.last_modified);
    registry.agents.clear();

    fx.store.save_checked(&mut registry, seen).await.unwrap();
    assert!(fx.store.list_agents().await.is_empty());
}

#[tokio::test]
async fn test_save_failure_is_audited_and_returned() {
    let temp = TempDir::new().unwrap();
    let blocker = temp.path().join("not_a_dir");
    std::fs::write(&blocker, "file").unwrap();

    let audit = Arc::new(MemoryAuditSink::new());
    let security = Arc::new(SecurityContext::new(SecurityConfig::default(), audit.clone()));
    let validator = Arc::new(AgentValidator::new(Arc::new(ToolRegistry::new()), security));
    let store = AgentStore::new(
        blocker.join("agents.enc"),
        Arc::new(AesGcmCipher::new(&KEY)),
        validator,
        audit.clone(),
    );

    let mut registry = AgentRegistry::new();
    let result = store.save(&mut registry).await;

    assert!(result.is_err());
    assert_eq!(
        audit.find("registry_save_failed").unwrap().severity,
        Severity::Critical
    );
}
