//! The evaluator served as an A2A agent.
//!
//! Publishes an agent card at `/.well-known/agent-card.json` and answers
//! JSON-RPC `message/send` requests at `/`. The request text is a tagged
//! evaluation envelope (`<white_agent_url>` plus an optional
//! `<evaluation_config>`); the reply carries progress notes followed by the
//! rendered evaluation report as text parts of one agent message.
//!
//! Runs are serialized: the environment manager tracks a single active
//! instance, so a second request waits for the first run to finish.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::environment::EnvironmentManager;
use crate::evaluator::{parse_evaluation_request, run_directory, Evaluator, EvaluatorConfig};
use crate::selection::TaskSelector;
use crate::transport::a2a::AGENT_CARD_PATH;
use crate::transport::AgentTransport;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 9001;

pub const MISSING_URL_REPLY: &str = "Error: Could not find white_agent_url in the request. \
     Please provide the agent URL in <white_agent_url> tags.";

// JSON-RPC 2.0 error codes
pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentCapabilities {
    pub streaming: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSkill {
    pub id: String,
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub examples: Vec<String>,
}

/// A2A agent card describing the evaluator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCard {
    pub name: String,
    pub description: String,
    pub url: String,
    pub version: String,
    pub default_input_modes: Vec<String>,
    pub default_output_modes: Vec<String>,
    pub capabilities: AgentCapabilities,
    pub skills: Vec<AgentSkill>,
}

impl AgentCard {
    pub fn evaluator(url: impl Into<String>) -> Self {
        Self {
            name: "tac-evaluator".to_string(),
            description: "Evaluates A2A agents on containerized workplace tasks and reports \
                          checkpoint scores."
                .to_string(),
            url: url.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            default_input_modes: vec!["text".to_string()],
            default_output_modes: vec!["text".to_string()],
            capabilities: AgentCapabilities { streaming: false },
            skills: vec![AgentSkill {
                id: "evaluate_agent".to_string(),
                name: "Evaluate agent".to_string(),
                description: "Runs the selected tasks against the agent named in \
                              <white_agent_url> and returns the aggregated scores."
                    .to_string(),
                tags: vec!["evaluation".to_string(), "benchmark".to_string()],
                examples: vec![
                    "<white_agent_url>http://localhost:9002/</white_agent_url>\n\
                     <evaluation_config>{\"task_subset\": \"working\", \"max_tasks\": 3}</evaluation_config>"
                        .to_string(),
                ],
            }],
        }
    }
}

/// Listener address and advertised URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServeConfig {
    pub host: String,
    pub port: u16,
    /// Public host (e.g. a tunnel domain) advertised instead of host:port.
    pub public_host: Option<String>,
    pub https: bool,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            public_host: None,
            https: false,
        }
    }
}

impl ServeConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// URL published in the agent card.
    pub fn card_url(&self) -> String {
        let scheme = if self.https { "https" } else { "http" };
        match self.public_host.as_deref().filter(|h| !h.is_empty()) {
            Some(host) => format!("{scheme}://{host}"),
            None => format!("{scheme}://{}:{}", self.host, self.port),
        }
    }
}

/// Runs evaluations on behalf of incoming requests.
#[derive(Clone)]
pub struct EvaluationService {
    environment: Arc<EnvironmentManager>,
    transport: Arc<dyn AgentTransport>,
    selector: TaskSelector,
    /// Settings shared by every run; the agent URL and output directory are
    /// replaced per request.
    template: EvaluatorConfig,
    /// Parent of per-run output directories. Temporary directories when unset.
    output_root: Option<PathBuf>,
    card: Arc<AgentCard>,
    run_lock: Arc<Mutex<()>>,
}

impl EvaluationService {
    pub fn new(
        environment: Arc<EnvironmentManager>,
        transport: Arc<dyn AgentTransport>,
        template: EvaluatorConfig,
        card: AgentCard,
    ) -> Self {
        Self {
            environment,
            transport,
            selector: TaskSelector::default(),
            template,
            output_root: None,
            card: Arc::new(card),
            run_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn with_selector(mut self, selector: TaskSelector) -> Self {
        self.selector = selector;
        self
    }

    pub fn with_output_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.output_root = Some(root.into());
        self
    }

    pub fn card(&self) -> &AgentCard {
        &self.card
    }

    /// Evaluates the agent named in `text` and returns the reply parts.
    ///
    /// Never fails: request and run errors become reply text.
    pub async fn handle_message(&self, text: &str, context_id: &str) -> Vec<String> {
        let request = match parse_evaluation_request(text, None) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Rejected evaluation request");
                return vec![MISSING_URL_REPLY.to_string()];
            }
        };

        let mut parts = vec![format!(
            "Starting evaluation of agent at {}...",
            request.agent_url
        )];

        let selection = self.selector.select(&request.selection);
        let listing: Vec<String> = selection
            .task_ids()
            .iter()
            .map(|id| format!("  - {id}"))
            .collect();
        parts.push(format!(
            "Selected {} tasks for evaluation:\n{}",
            selection.len(),
            listing.join("\n")
        ));

        let _guard = self.run_lock.lock().await;

        let run_dir = self
            .output_root
            .as_ref()
            .map(|root| root.join(format!("run_{}", Uuid::new_v4().simple())));
        let output_dir = match run_directory(run_dir) {
            Ok(dir) => dir,
            Err(e) => {
                parts.push(format!("Error during evaluation: {e}"));
                return parts;
            }
        };

        info!(
            agent_url = %request.agent_url,
            tasks = selection.len(),
            context_id,
            output_dir = %output_dir.display(),
            "Starting requested evaluation"
        );

        let config = EvaluatorConfig {
            agent_url: request.agent_url.clone(),
            output_dir,
            ..self.template.clone()
        };
        let evaluator = Evaluator::new(config, self.environment.clone(), self.transport.clone());

        match evaluator.evaluate(&selection, Some(context_id)).await {
            Ok(report) => parts.push(report.render()),
            Err(e) => {
                warn!(error = %e, "Requested evaluation aborted");
                parts.push(format!("Error during evaluation: {e}"));
            }
        }
        parts
    }

    /// Handles one JSON-RPC request body and returns the response object.
    pub async fn handle_rpc(&self, body: &str) -> Value {
        let request: Value = match serde_json::from_str(body) {
            Ok(value) => value,
            Err(e) => return rpc_error(Value::Null, PARSE_ERROR, &format!("Parse error: {e}")),
        };
        let id = request.get("id").cloned().unwrap_or(Value::Null);

        let Some(method) = request.get("method").and_then(Value::as_str) else {
            return rpc_error(id, INVALID_REQUEST, "Invalid request: missing method");
        };
        if method != "message/send" {
            return rpc_error(id, METHOD_NOT_FOUND, &format!("Method not found: {method}"));
        }

        let Some(message) = request.pointer("/params/message") else {
            return rpc_error(id, INVALID_PARAMS, "Invalid params: missing message");
        };
        let Some(text) = message_text(message) else {
            return rpc_error(id, INVALID_PARAMS, "Invalid params: message has no text parts");
        };

        let context_id = message
            .get("contextId")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let parts = self.handle_message(&text, &context_id).await;
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": agent_message(&parts, &context_id),
        })
    }
}

/// Joins the text parts of an A2A message, or `None` when there are none.
fn message_text(message: &Value) -> Option<String> {
    let texts: Vec<&str> = message
        .get("parts")?
        .as_array()?
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    if texts.is_empty() {
        None
    } else {
        Some(texts.join("\n"))
    }
}

fn agent_message(parts: &[String], context_id: &str) -> Value {
    let parts: Vec<Value> = parts
        .iter()
        .map(|text| json!({"kind": "text", "text": text}))
        .collect();
    json!({
        "kind": "message",
        "role": "agent",
        "messageId": Uuid::new_v4().to_string(),
        "contextId": context_id,
        "parts": parts,
    })
}

fn rpc_error(id: Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {"code": code, "message": message},
    })
}

async fn agent_card(State(service): State<EvaluationService>) -> Json<AgentCard> {
    Json(service.card().clone())
}

async fn json_rpc(State(service): State<EvaluationService>, body: String) -> Json<Value> {
    Json(service.handle_rpc(&body).await)
}

/// Routes of the evaluator agent.
pub fn router(service: EvaluationService) -> Router {
    Router::new()
        .route(AGENT_CARD_PATH, get(agent_card))
        .route("/", post(json_rpc))
        .with_state(service)
}

/// Serves the evaluator agent on an already bound listener until it fails.
pub async fn serve(listener: TcpListener, service: EvaluationService) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(addr = %addr, url = %service.card().url, "Evaluator agent listening");
    }
    axum::serve(listener, router(service)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use tempfile::TempDir;

    use crate::environment::{
        ContainerRuntime, EnvironmentConfig, HostPlatform, InstanceOutput, LaunchSpec,
    };
    use crate::error::{EnvironmentError, TransportError};
    use crate::transport::{A2aClient, AgentResponse, ReadinessPolicy};

    /// Runtime with every image present and a fixed instruction.
    #[derive(Default)]
    struct StubRuntime {
        removed: std::sync::Mutex<HashSet<String>>,
    }

    #[async_trait]
    impl ContainerRuntime for StubRuntime {
        async fn ping(&self) -> Result<(), EnvironmentError> {
            Ok(())
        }

        async fn image_present(&self, _: &str) -> Result<bool, EnvironmentError> {
            Ok(true)
        }

        async fn pull_image(&self, _: &str, _: Option<&str>) -> Result<(), EnvironmentError> {
            Ok(())
        }

        async fn run(&self, _: &LaunchSpec) -> Result<InstanceOutput, EnvironmentError> {
            Ok(InstanceOutput::success(
                "Send a message saying hello to everyone in the #general channel.",
            ))
        }

        async fn remove(&self, name: &str) -> Result<(), EnvironmentError> {
            self.removed.lock().unwrap().insert(name.to_string());
            Ok(())
        }
    }

    #[derive(Default)]
    struct StubAgent {
        never_ready: bool,
        sends: AtomicUsize,
    }

    #[async_trait]
    impl AgentTransport for StubAgent {
        async fn probe(&self, _: &str, _: Duration) -> bool {
            !self.never_ready
        }

        async fn send(
            &self,
            _: &str,
            _: &str,
            _: Option<&str>,
            _: Duration,
        ) -> Result<AgentResponse, TransportError> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            Ok(AgentResponse::new(json!({
                "result": {"kind": "message", "parts": [{"kind": "text", "text": "Done."}]}
            })))
        }
    }

    fn service(agent: Arc<StubAgent>, dir: &TempDir) -> EvaluationService {
        let environment = EnvironmentManager::new(
            Arc::new(StubRuntime::default()),
            EnvironmentConfig::default().with_workspace_dir(dir.path().join("workspace")),
        )
        .with_platform(HostPlatform::linux_x86());
        let template = EvaluatorConfig::new("", dir.path().join("unused"))
            .with_data_dir(dir.path().join("data"))
            .with_skip_scoring(true)
            .with_readiness(
                ReadinessPolicy::default()
                    .with_max_attempts(1)
                    .with_per_attempt_timeout(Duration::from_millis(100)),
            );
        EvaluationService::new(
            Arc::new(environment),
            agent,
            template,
            AgentCard::evaluator("http://127.0.0.1:9001"),
        )
        .with_output_root(dir.path().join("runs"))
    }

    const REQUEST: &str = "<white_agent_url>http://agent.test</white_agent_url>\n\
         <evaluation_config>{\"task_names\": [\"pm-send-hello-message\"]}</evaluation_config>";

    #[test]
    fn test_card_url() {
        let config = ServeConfig::default();
        assert_eq!(config.bind_addr(), "0.0.0.0:9001");
        assert_eq!(config.card_url(), "http://0.0.0.0:9001");

        let tunneled = ServeConfig {
            public_host: Some("eval.example.org".to_string()),
            https: true,
            ..ServeConfig::default()
        };
        assert_eq!(tunneled.card_url(), "https://eval.example.org");
    }

    #[test]
    fn test_agent_card_serializes_camel_case() {
        let value = serde_json::to_value(AgentCard::evaluator("http://h:1")).unwrap();
        assert_eq!(value["url"], "http://h:1");
        assert_eq!(value["defaultInputModes"][0], "text");
        assert_eq!(value["capabilities"]["streaming"], false);
        assert_eq!(value["skills"][0]["id"], "evaluate_agent");
    }

    #[tokio::test]
    async fn test_rpc_errors() {
        let dir = TempDir::new().unwrap();
        let service = service(Arc::new(StubAgent::default()), &dir);

        let response = service.handle_rpc("{not json").await;
        assert_eq!(response["error"]["code"], PARSE_ERROR);
        assert!(response["id"].is_null());

        let response = service
            .handle_rpc(r#"{"jsonrpc":"2.0","id":7,"method":"tasks/get","params":{}}"#)
            .await;
        assert_eq!(response["error"]["code"], METHOD_NOT_FOUND);
        assert_eq!(response["id"], 7);

        let response = service
            .handle_rpc(r#"{"jsonrpc":"2.0","id":"a","method":"message/send","params":{"message":{"parts":[]}}}"#)
            .await;
        assert_eq!(response["error"]["code"], INVALID_PARAMS);

        let response = service.handle_rpc(r#"{"jsonrpc":"2.0","id":1}"#).await;
        assert_eq!(response["error"]["code"], INVALID_REQUEST);
    }

    #[tokio::test]
    async fn test_missing_url_is_reported_in_reply() {
        let dir = TempDir::new().unwrap();
        let agent = Arc::new(StubAgent::default());
        let parts = service(agent.clone(), &dir)
            .handle_message("<evaluation_config>{}</evaluation_config>", "ctx")
            .await;
        assert_eq!(parts, vec![MISSING_URL_REPLY.to_string()]);
        assert_eq!(agent.sends.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unready_agent_is_reported_in_reply() {
        let dir = TempDir::new().unwrap();
        let agent = Arc::new(StubAgent {
            never_ready: true,
            ..Default::default()
        });
        let parts = service(agent.clone(), &dir).handle_message(REQUEST, "ctx").await;

        assert!(parts[0].contains("http://agent.test"));
        assert!(parts[1].contains("pm-send-hello-message"));
        assert!(parts.last().unwrap().starts_with("Error during evaluation"));
        assert_eq!(agent.sends.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_serves_card_and_message_send_over_http() {
        let dir = TempDir::new().unwrap();
        let agent = Arc::new(StubAgent::default());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(serve(listener, service(agent.clone(), &dir)));

        let client = A2aClient::new();
        assert!(client.probe(&endpoint, Duration::from_secs(5)).await);
        let card = client
            .agent_card(&endpoint, Duration::from_secs(5))
            .await
            .expect("agent card");
        assert_eq!(card["name"], "tac-evaluator");

        let response = client
            .send(&endpoint, REQUEST, Some("ctx-serve"), Duration::from_secs(30))
            .await
            .expect("message/send");
        assert_eq!(response.context_id(), Some("ctx-serve"));

        let reply = response.reply_text();
        assert!(reply.contains("Selected 1 tasks for evaluation"));
        assert!(reply.contains("=== Evaluation Results ==="));
        assert!(reply.contains("Total tasks:    1"));
        assert_eq!(agent.sends.load(Ordering::SeqCst), 1);

        let runs: Vec<_> = std::fs::read_dir(dir.path().join("runs"))
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        assert_eq!(runs.len(), 1);
        assert!(runs[0].join("evaluation_results.json").is_file());
    }
}
