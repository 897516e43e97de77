//! Evaluation run configuration.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::environment::{ServerContext, INSTRUCTIONS_FILE};
use crate::transport::ReadinessPolicy;

/// Default location of precomputed instructions and transcripts.
pub const DEFAULT_DATA_DIR: &str = "data";

/// Prefix of the run directory created when no output directory is given.
pub const RUN_DIR_PREFIX: &str = "tac_eval_";

/// Settings for one evaluation run against one subject.
#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    /// Base URL of the subject agent.
    pub agent_url: String,
    pub server: ServerContext,
    /// Run output directory; exclusive to this run.
    pub output_dir: PathBuf,
    pub data_dir: PathBuf,
    /// Record transcripts but do not launch scoring instances.
    pub skip_scoring: bool,
    /// Timeout for the single live exchange of a task.
    pub send_timeout: Duration,
    pub readiness: ReadinessPolicy,
}

impl EvaluatorConfig {
    pub fn new(agent_url: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            agent_url: agent_url.into(),
            server: ServerContext::default(),
            output_dir: output_dir.into(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            skip_scoring: false,
            send_timeout: Duration::from_secs(900),
            readiness: ReadinessPolicy::default(),
        }
    }

    pub fn with_server(mut self, server: ServerContext) -> Self {
        self.server = server;
        self
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn with_skip_scoring(mut self, skip: bool) -> Self {
        self.skip_scoring = skip;
        self
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn with_readiness(mut self, policy: ReadinessPolicy) -> Self {
        self.readiness = policy;
        self
    }

    /// Directory of precomputed transcripts, one `<task_id>.json` each.
    pub fn trajectories_dir(&self) -> PathBuf {
        trajectories_dir(&self.data_dir)
    }

    pub fn instructions_path(&self) -> PathBuf {
        self.data_dir.join(INSTRUCTIONS_FILE)
    }
}

pub fn trajectories_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("trajectories")
}

/// Returns `output_dir`, or a fresh kept temporary directory prefixed with
/// [`RUN_DIR_PREFIX`] when none is given.
pub fn run_directory(output_dir: Option<PathBuf>) -> io::Result<PathBuf> {
    match output_dir {
        Some(dir) => Ok(dir),
        None => Ok(tempfile::Builder::new()
            .prefix(RUN_DIR_PREFIX)
            .tempdir()?
            .keep()),
    }
}
