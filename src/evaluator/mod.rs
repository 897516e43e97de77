//! Evaluation orchestration: run configuration, the per-task pipeline,
//! result aggregation and request envelopes.

pub mod config;
pub mod orchestrator;
pub mod request;
pub mod result;

pub use config::{run_directory, EvaluatorConfig, DEFAULT_DATA_DIR, RUN_DIR_PREFIX};
pub use orchestrator::{score_file_name, Evaluator};
pub use request::{
    parse_evaluation_request, parse_request_file, selection_from_config, EvaluationRequest,
};
pub use result::{AggregateSummary, EvaluationReport, TaskResult, TaskStatus, REPORT_FILE};
