use crate::confirmation::ConfirmationGate;
use crate::error::{DispatchError, ToolError};
use crate::executors::ExecutorSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::time::{timeout, Duration};
use toolgate_infra::agent_store::AgentStore;
use toolgate_policy::agent::Agent;
use toolgate_policy::audit::{AuditEntry, AuditSink, Severity};
use toolgate_policy::permissions::PermissionEvaluator;
use toolgate_policy::registry::{ToolDescriptor, ToolKey, ToolRegistry};
use tracing::{error, info, warn};

pub const DEFAULT_TOOL_TIMEOUT_MS: u64 = 30_000;
const MAX_PARAMS_BYTES: usize = 1_000_000;

/// Result of one call, as seen by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolOutcome {
    fn ok(result: Value) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
        }
    }

    fn failed(error: &DispatchError) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.to_string()),
        }
    }
}

/// Single entry point for running a tool on behalf of an agent.
pub struct ExecutionDispatcher {
    registry: Arc<ToolRegistry>,
    evaluator: Arc<PermissionEvaluator>,
    store: Arc<AgentStore>,
    gate: Arc<dyn ConfirmationGate>,
    executors: Arc<ExecutorSet>,
    audit: Arc<dyn AuditSink>,
    timeout_ms: u64,
}

impl ExecutionDispatcher {
    pub fn new(
        registry: Arc<ToolRegistry>,
        evaluator: Arc<PermissionEvaluator>,
        store: Arc<AgentStore>,
        gate: Arc<dyn ConfirmationGate>,
        executors: Arc<ExecutorSet>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            registry,
            evaluator,
            store,
            gate,
            executors,
            audit,
            timeout_ms: DEFAULT_TOOL_TIMEOUT_MS,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub async fn execute_agent_tool(
        &self,
        agent_id: &str,
        tool_key: &str,
        params: Value,
    ) -> ToolOutcome {
        info!("Dispatching {} for agent {}", tool_key, agent_id);

        match self.dispatch(agent_id, tool_key, params).await {
            Ok(result) => ToolOutcome::ok(result),
            Err(e) => {
                warn!("Tool call {} for agent {} failed: {}", tool_key, agent_id, e);
                ToolOutcome::failed(&e)
            }
        }
    }

    async fn dispatch(
        &self,
        agent_id: &str,
        tool_key: &str,
        params: Value,
    ) -> Result<Value, DispatchError> {
        let parsed = ToolKey::parse(tool_key).ok();

        // 0. Denylist first, so the answer never depends on config or agent state.
        if let Some(reason) = parsed.and_then(ToolKey::hard_disabled_reason) {
            self.audit
                .record(
                    AuditEntry::new("tool_blocked", Severity::High)
                        .agent(agent_id)
                        .tool(tool_key)
                        .details(format!("{} (non-configurable denylist)", reason)),
                )
                .await;
            return Err(DispatchError::HardDisabled(reason));
        }

        // 1. Agent
        let agent = self
            .store
            .get_agent(agent_id)
            .await
            .ok_or_else(|| DispatchError::AgentNotFound(agent_id.to_string()))?;

        if agent.policy.audit_all_actions {
            self.audit
                .record(
                    AuditEntry::new("tool_requested", Severity::Low)
                        .agent(agent_id)
                        .tool(tool_key),
                )
                .await;
        }

        // 2. Agent authorization
        let (key, descriptor) = self.authorize(&agent, tool_key, parsed).await?;

        check_params(&params)?;

        // 3. Global policy
        let check = self.evaluator.check_tool_permission(tool_key, agent_id);
        if !check.allowed {
            self.audit
                .record(
                    AuditEntry::new("tool_blocked", Severity::High)
                        .agent(agent_id)
                        .tool(key)
                        .details(&check.reason),
                )
                .await;
            return Err(DispatchError::PolicyDenied(check.reason));
        }

        // 4. Confirmation
        let needs_confirmation =
            check.requires_confirmation || agent.requires_confirmation_for(descriptor.risk_level);
        let confirmed = if needs_confirmation {
            let approved = self
                .gate
                .request_user_confirmation(&descriptor, &agent.name, &params)
                .await;
            if !approved {
                self.audit
                    .record(
                        AuditEntry::new("tool_denied_by_user", Severity::Medium)
                            .agent(agent_id)
                            .tool(key)
                            .user_confirmed(false),
                    )
                    .await;
                return Err(DispatchError::UserDenied);
            }
            true
        } else {
            false
        };

        // 5-7. Execute and record the outcome
        let details = params.to_string();
        match self.run(key, params).await {
            Ok(result) => {
                info!("Tool {} executed for agent {}", key, agent_id);
                self.audit
                    .record(
                        AuditEntry::new("tool_executed", Severity::Low)
                            .agent(agent_id)
                            .tool(key)
                            .details(details)
                            .user_confirmed(confirmed),
                    )
                    .await;
                Ok(result)
            }
            Err(e) => {
                self.audit
                    .record(
                        AuditEntry::new("tool_execution_failed", Severity::High)
                            .agent(agent_id)
                            .tool(key)
                            .details(e.to_string())
                            .user_confirmed(confirmed),
                    )
                    .await;
                Err(DispatchError::Execution(e))
            }
        }
    }

    async fn authorize(
        &self,
        agent: &Agent,
        tool_key: &str,
        parsed: Option<ToolKey>,
    ) -> Result<(ToolKey, ToolDescriptor), DispatchError> {
        let refusal = match parsed {
            Some(key) if agent.declares(key) => {
                let descriptor = self
                    .registry
                    .get(key)
                    .cloned()
                    .ok_or_else(|| DispatchError::UnknownTool(tool_key.to_string()))?;
                match agent.policy_permits(&descriptor) {
                    Ok(()) => return Ok((key, descriptor)),
                    Err(rule) => rule,
                }
            }
            _ => "tool is not declared by the agent",
        };

        self.audit
            .record(
                AuditEntry::new("tool_access_denied", Severity::Medium)
                    .agent(&agent.id)
                    .tool(tool_key)
                    .details(refusal),
            )
            .await;
        Err(DispatchError::UnauthorizedTool(tool_key.to_string()))
    }

    /// Spawned and bounded by a timeout so a hung or panicking back-end only
    /// fails its own call.
    async fn run(&self, key: ToolKey, params: Value) -> Result<Value, ToolError> {
        let executor = self.executors.route(key)?;
        let mut handle = tokio::spawn(async move { executor.execute(key, params).await });

        match timeout(Duration::from_millis(self.timeout_ms), &mut handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => {
                if join_err.is_panic() {
                    error!("Tool {} panicked", key);
                } else {
                    error!("Tool {} was cancelled", key);
                }
                Err(ToolError::Internal)
            }
            Err(_) => {
                handle.abort();
                warn!("Tool {} timed out after {}ms", key, self.timeout_ms);
                Err(ToolError::Timeout)
            }
        }
    }
}

fn check_params(params: &Value) -> Result<(), DispatchError> {
    if !params.is_object() && !params.is_null() {
        return Err(DispatchError::Validation(
            "parameters must be a JSON object".into(),
        ));
    }
    if params.to_string().len() > MAX_PARAMS_BYTES {
        return Err(DispatchError::Validation("parameters are too large".into()));
    }
    Ok(())
}
