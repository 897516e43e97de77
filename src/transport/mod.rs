//! Request/response transport to the subject agent.
//!
//! The evaluator only needs two things from a subject: a readiness probe
//! and single-message exchange scoped to a session id. `AgentTransport`
//! captures that seam; `A2aClient` speaks the A2A JSON-RPC protocol.
//! Transport errors are returned, never retried here.

pub mod a2a;
pub mod session;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::TransportError;

pub use a2a::A2aClient;
pub use session::{EvaluationSession, SessionState, SessionStore};

/// How long to wait for a subject to come up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    pub max_attempts: u32,
    /// Pause between failed probes.
    pub interval: Duration,
    pub per_attempt_timeout: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            interval: Duration::from_secs(1),
            per_attempt_timeout: Duration::from_secs(5),
        }
    }
}

impl ReadinessPolicy {
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_per_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.per_attempt_timeout = timeout;
        self
    }
}

/// Structured reply from the subject.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentResponse {
    pub raw: Value,
}

impl AgentResponse {
    pub fn new(raw: Value) -> Self {
        Self { raw }
    }

    /// The payload, unwrapped from a JSON-RPC envelope when present.
    fn payload(&self) -> &Value {
        self.raw.get("result").unwrap_or(&self.raw)
    }

    /// Text of every text-bearing part, in order, joined by spaces.
    ///
    /// Looks at the message parts, then a task's status message, then its
    /// artifacts. Falls back to the serialized response when no part
    /// carries text.
    pub fn reply_text(&self) -> String {
        let payload = self.payload();

        let part_lists = std::iter::once(payload.get("parts"))
            .chain(std::iter::once(
                payload.pointer("/status/message/parts"),
            ))
            .chain(
                payload
                    .get("artifacts")
                    .and_then(Value::as_array)
                    .into_iter()
                    .flatten()
                    .map(|artifact| artifact.get("parts")),
            );

        let texts: Vec<&str> = part_lists
            .flatten()
            .filter_map(Value::as_array)
            .flatten()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect();

        if texts.is_empty() {
            self.raw.to_string()
        } else {
            texts.join(" ")
        }
    }

    /// Context id echoed back by the subject, if any.
    pub fn context_id(&self) -> Option<&str> {
        self.payload().get("contextId").and_then(Value::as_str)
    }
}

/// Client side of the evaluator/subject protocol.
#[async_trait]
pub trait AgentTransport: Send + Sync {
    /// One readiness probe. True when the subject answered successfully.
    async fn probe(&self, endpoint: &str, timeout: Duration) -> bool;

    /// Sends one message within a session and waits for the reply.
    async fn send(
        &self,
        endpoint: &str,
        message: &str,
        session_id: Option<&str>,
        timeout: Duration,
    ) -> Result<AgentResponse, TransportError>;

    /// Probes until the subject answers or attempts run out.
    async fn wait_ready(&self, endpoint: &str, policy: &ReadinessPolicy) -> bool {
        for attempt in 1..=policy.max_attempts {
            if self.probe(endpoint, policy.per_attempt_timeout).await {
                info!(endpoint, attempt, "Agent is ready");
                return true;
            }
            debug!(endpoint, attempt, max = policy.max_attempts, "Agent not ready yet");
            if attempt < policy.max_attempts {
                tokio::time::sleep(policy.interval).await;
            }
        }
        false
    }
}
