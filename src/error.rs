//! Error types for tac-evaluator operations.
//!
//! Defines error types for the major subsystems:
//! - Task catalog lookups
//! - Isolated environment lifecycle (pull, launch, scoring)
//! - Agent transport
//! - Transcript persistence
//! - Evaluation runs and request envelopes

use thiserror::Error;

/// Errors that can occur during strict catalog lookups.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Unknown task subset '{0}'")]
    UnknownSubset(String),

    #[error("Task '{0}' not found in catalog")]
    UnknownTask(String),
}

/// Errors that can occur while managing isolated task environments.
#[derive(Debug, Error)]
pub enum EnvironmentError {
    #[error("Failed to pull image '{image}': {reason}")]
    ImagePull { image: String, reason: String },

    #[error("Failed to launch instance '{name}': {reason}")]
    Launch { name: String, reason: String },

    #[error("{operation} timed out after {seconds} seconds")]
    Timeout { operation: String, seconds: u64 },

    #[error("Instance exited with non-zero code {code}: {output}")]
    NonZeroExit { code: i64, output: String },

    #[error("Score artifact not found at {0}")]
    MissingArtifact(String),

    #[error("Malformed score artifact: {0}")]
    MalformedArtifact(String),

    #[error("Container daemon not available: {0}")]
    DaemonUnavailable(String),

    #[error("Invalid instruction cache {path}: {source}")]
    InstructionCache {
        path: String,
        source: serde_json::Error,
    },

    #[error("Instruction cache has no backing file")]
    NoCacheFile,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while talking to the subject agent.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to reach agent at {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },

    #[error("Agent request timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Agent returned HTTP {code}: {body}")]
    Status { code: u16, body: String },

    #[error("Failed to decode agent response: {0}")]
    Decode(String),

    #[error("Agent returned JSON-RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
}

/// Errors that can occur while persisting or loading transcripts.
#[derive(Debug, Error)]
pub enum TranscriptError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid transcript data: {0}")]
    InvalidData(String),
}

/// Errors that abort an evaluation run.
///
/// Per-task problems never surface here; they are folded into the task's
/// result record instead.
#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("Agent at {url} did not become ready after {attempts} attempts")]
    AgentNotReady { url: String, attempts: u32 },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Transcript error: {0}")]
    Transcript(#[from] TranscriptError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Setup failed: {0}")]
    Setup(String),
}

/// Errors that can occur while parsing an evaluation request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Evaluation request is missing the agent URL")]
    MissingAgentUrl,

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
