//! Human-in-the-loop confirmation for risky tool calls.
//!
//! Every gate resolves to `false` unless a person explicitly allowed the call.
//! Timeouts, cancellation, closed channels and unreadable input all deny.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use toolgate_policy::registry::{RiskLevel, ToolDescriptor, ToolKey};
use tracing::{info, warn};
use uuid::Uuid;

pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(120);

#[async_trait]
pub trait ConfirmationGate: Send + Sync {
    async fn request_user_confirmation(
        &self,
        tool: &ToolDescriptor,
        agent_name: &str,
        context: &Value,
    ) -> bool;
}

/// What the presentation layer is asked to show.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationRequest {
    pub id: Uuid,
    pub tool_key: ToolKey,
    pub agent_name: String,
    pub description: String,
    pub risk_level: RiskLevel,
    pub context: Value,
}

impl ConfirmationRequest {
    pub fn new(tool: &ToolDescriptor, agent_name: &str, context: &Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            tool_key: tool.key,
            agent_name: agent_name.to_string(),
            description: tool.description.to_string(),
            risk_level: tool.risk_level,
            context: context.clone(),
        }
    }

    pub fn prompt(&self) -> String {
        format!(
            "Agent '{}' wants to run {} ({} risk): {}\nParameters: {}",
            self.agent_name, self.tool_key, self.risk_level, self.description, self.context
        )
    }
}

/// A request waiting for an answer. Dropping it without responding denies.
#[derive(Debug)]
pub struct PendingConfirmation {
    pub request: ConfirmationRequest,
    responder: oneshot::Sender<bool>,
}

impl PendingConfirmation {
    pub fn respond(self, allow: bool) {
        if self.responder.send(allow).is_err() {
            warn!(
                "Confirmation {} answered after the requester gave up",
                self.request.id
            );
        }
    }

    pub fn allow(self) {
        self.respond(true)
    }

    pub fn deny(self) {
        self.respond(false)
    }
}

/// UI-agnostic gate: requests go out over an mpsc channel and come back
/// through a oneshot responder.
///
/// Two levels of cancellation: the shutdown token denies every current and
/// future request, [`ChannelConfirmationGate::cancel_pending`] denies only the
/// requests already waiting.
pub struct ChannelConfirmationGate {
    sender: mpsc::Sender<PendingConfirmation>,
    timeout: Duration,
    shutdown: CancellationToken,
    pending: Mutex<CancellationToken>,
}

impl ChannelConfirmationGate {
    pub fn new(timeout: Duration) -> (Self, mpsc::Receiver<PendingConfirmation>) {
        let (sender, receiver) = mpsc::channel(16);
        let shutdown = CancellationToken::new();
        let gate = Self {
            sender,
            timeout,
            pending: Mutex::new(shutdown.child_token()),
            shutdown,
        };
        (gate, receiver)
    }

    /// Tie the gate to an application-wide shutdown token.
    pub fn with_cancellation(mut self, shutdown: CancellationToken) -> Self {
        self.pending = Mutex::new(shutdown.child_token());
        self.shutdown = shutdown;
        self
    }

    /// The shutdown token. Once cancelled the gate denies everything.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Deny every request currently waiting for an answer. Later requests
    /// are unaffected.
    pub fn cancel_pending(&self) {
        let mut pending = self.pending.lock();
        let previous = std::mem::replace(&mut *pending, self.shutdown.child_token());
        previous.cancel();
    }

    async fn ask(&self, request: ConfirmationRequest) -> Result<bool, &'static str> {
        let (responder, answer) = oneshot::channel();
        self.sender
            .send(PendingConfirmation {
                request,
                responder,
            })
            .await
            .map_err(|_| "no confirmation listener")?;
        answer.await.map_err(|_| "request dropped without an answer")
    }
}

#[async_trait]
impl ConfirmationGate for ChannelConfirmationGate {
    async fn request_user_confirmation(
        &self,
        tool: &ToolDescriptor,
        agent_name: &str,
        context: &Value,
    ) -> bool {
        let request = ConfirmationRequest::new(tool, agent_name, context);
        let id = request.id;
        let cancel = self.pending.lock().child_token();
        info!("Confirmation {} requested for {} by {}", id, tool.key, agent_name);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("Confirmation {} cancelled; denying", id);
                false
            }
            outcome = tokio::time::timeout(self.timeout, self.ask(request)) => match outcome {
                Ok(Ok(allow)) => {
                    info!("Confirmation {} answered: {}", id, if allow { "allow" } else { "deny" });
                    allow
                }
                Ok(Err(reason)) => {
                    warn!("Confirmation {} failed ({}); denying", id, reason);
                    false
                }
                Err(_) => {
                    warn!("Confirmation {} timed out after {:?}; denying", id, self.timeout);
                    false
                }
            }
        }
    }
}

/// Interactive `[y/N]` prompt on stderr/stdin.
pub struct TerminalConfirmationGate {
    timeout: Duration,
}

impl TerminalConfirmationGate {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn prompt(request: &ConfirmationRequest) -> std::io::Result<String> {
        let mut stderr = tokio::io::stderr();
        stderr
            .write_all(format!("⚠️  {}\nAllow? [y/N]: ", request.prompt()).as_bytes())
            .await?;
        stderr.flush().await?;

        let mut reader = BufReader::new(tokio::io::stdin());
        let mut line = String::new();
        reader.read_line(&mut line).await?;
        Ok(line)
    }
}

impl Default for TerminalConfirmationGate {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIRMATION_TIMEOUT)
    }
}

#[async_trait]
impl ConfirmationGate for TerminalConfirmationGate {
    async fn request_user_confirmation(
        &self,
        tool: &ToolDescriptor,
        agent_name: &str,
        context: &Value,
    ) -> bool {
        let request = ConfirmationRequest::new(tool, agent_name, context);

        match tokio::time::timeout(self.timeout, Self::prompt(&request)).await {
            Ok(Ok(answer)) => {
                let answer = answer.trim().to_lowercase();
                answer == "y" || answer == "yes"
            }
            Ok(Err(e)) => {
                warn!("Confirmation {} could not read input: {}", request.id, e);
                false
            }
            Err(_) => {
                warn!("Confirmation {} timed out; denying", request.id);
                false
            }
        }
    }
}

/// Fixed answer, for non-interactive runs and tests.
pub struct StaticConfirmationGate {
    answer: bool,
    asked: AtomicUsize,
}

impl StaticConfirmationGate {
    pub fn new(answer: bool) -> Self {
        Self {
            answer,
            asked: AtomicUsize::new(0),
        }
    }

    pub fn allow() -> Self {
        Self::new(true)
    }

    pub fn deny() -> Self {
        Self::new(false)
    }

    /// How many confirmations were requested so far.
    pub fn times_asked(&self) -> usize {
        self.asked.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConfirmationGate for StaticConfirmationGate {
    async fn request_user_confirmation(
        &self,
        tool: &ToolDescriptor,
        agent_name: &str,
        _context: &Value,
    ) -> bool {
        self.asked.fetch_add(1, Ordering::SeqCst);
        info!(
            "Non-interactive confirmation for {} by {}: {}",
            tool.key,
            agent_name,
            if self.answer { "allow" } else { "deny" }
        );
        self.answer
    }
}
