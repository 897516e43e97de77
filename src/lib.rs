//! tac-evaluator: evaluation harness for conversational agents.
//!
//! Selects benchmark tasks, sends each task's instruction to the agent under
//! evaluation, records the exchange as a transcript, scores it inside the
//! task's isolated container image, and aggregates the scores.

pub mod catalog;
pub mod cli;
pub mod environment;
pub mod error;
pub mod evaluator;
pub mod preflight;
pub mod scoring;
pub mod selection;
pub mod server;
pub mod transcript;
pub mod transport;

// Re-export commonly used error types
pub use error::{
    CatalogError, EnvironmentError, EvaluationError, RequestError, TranscriptError,
    TransportError,
};
