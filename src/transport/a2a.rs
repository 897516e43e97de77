//! A2A (agent-to-agent) JSON-RPC client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use super::{AgentResponse, AgentTransport};
use crate::error::TransportError;

/// Path of the agent card every A2A server publishes.
pub const AGENT_CARD_PATH: &str = "/.well-known/agent-card.json";

/// HTTP client for A2A subject agents.
#[derive(Debug, Clone, Default)]
pub struct A2aClient {
    http_client: Client,
}

impl A2aClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing reqwest client.
    pub fn with_client(http_client: Client) -> Self {
        Self { http_client }
    }

    pub fn agent_card_url(endpoint: &str) -> String {
        format!("{}{AGENT_CARD_PATH}", endpoint.trim_end_matches('/'))
    }

    /// Builds a `message/send` request for a single user text message.
    pub fn build_request(message: &str, context_id: Option<&str>) -> Value {
        let mut msg = json!({
            "role": "user",
            "parts": [{"kind": "text", "text": message}],
            "messageId": Uuid::new_v4().to_string(),
        });
        if let Some(context_id) = context_id {
            msg["contextId"] = Value::String(context_id.to_string());
        }

        json!({
            "jsonrpc": "2.0",
            "id": Uuid::new_v4().to_string(),
            "method": "message/send",
            "params": {"message": msg},
        })
    }

    /// Fetches the subject's agent card.
    pub async fn agent_card(&self, endpoint: &str, timeout: Duration) -> Result<Value, TransportError> {
        let url = Self::agent_card_url(endpoint);
        let response = self
            .http_client
            .get(&url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| request_error(endpoint, timeout, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                code: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))
    }
}

fn request_error(endpoint: &str, timeout: Duration, e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout {
            seconds: timeout.as_secs(),
        }
    } else {
        TransportError::Connect {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        }
    }
}

#[async_trait]
impl AgentTransport for A2aClient {
    async fn probe(&self, endpoint: &str, timeout: Duration) -> bool {
        let url = Self::agent_card_url(endpoint);
        match self.http_client.get(&url).timeout(timeout).send().await {
            Ok(response) => response.status() == reqwest::StatusCode::OK,
            Err(e) => {
                debug!(url = %url, error = %e, "Readiness probe failed");
                false
            }
        }
    }

    async fn send(
        &self,
        endpoint: &str,
        message: &str,
        session_id: Option<&str>,
        timeout: Duration,
    ) -> Result<AgentResponse, TransportError> {
        let request = Self::build_request(message, session_id);

        let response = self
            .http_client
            .post(endpoint)
            .timeout(timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| request_error(endpoint, timeout, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            return Err(TransportError::Status {
                code: status.as_u16(),
                body,
            });
        }

        let body: Value = response.json().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout {
                    seconds: timeout.as_secs(),
                }
            } else {
                TransportError::Decode(e.to_string())
            }
        })?;

        if let Some(error) = body.get("error") {
            return Err(TransportError::Rpc {
                code: error.get("code").and_then(Value::as_i64).unwrap_or(0),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string(),
            });
        }

        Ok(AgentResponse::new(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_card_url() {
        assert_eq!(
            A2aClient::agent_card_url("http://localhost:9002/"),
            "http://localhost:9002/.well-known/agent-card.json"
        );
    }

    #[test]
    fn test_build_request_with_context() {
        let request = A2aClient::build_request("Hello", Some("ctx-42"));
        assert_eq!(request["jsonrpc"], "2.0");
        assert_eq!(request["method"], "message/send");

        let message = &request["params"]["message"];
        assert_eq!(message["role"], "user");
        assert_eq!(message["parts"][0]["text"], "Hello");
        assert_eq!(message["contextId"], "ctx-42");
        assert!(message["messageId"].is_string());
    }

    #[test]
    fn test_build_request_without_context() {
        let request = A2aClient::build_request("Hello", None);
        assert!(request["params"]["message"].get("contextId").is_none());
    }

    #[tokio::test]
    async fn test_probe_unreachable_agent() {
        let client = A2aClient::new();
        assert!(
            !client
                .probe("http://127.0.0.1:1", Duration::from_millis(500))
                .await
        );
    }

    #[tokio::test]
    async fn test_send_connection_error() {
        let client = A2aClient::new();
        let result = client
            .send("http://127.0.0.1:1", "hi", None, Duration::from_secs(2))
            .await;
        assert!(matches!(
            result,
            Err(TransportError::Connect { .. }) | Err(TransportError::Timeout { .. })
        ));
    }
}
