//! Evaluation orchestrator.
//!
//! Drives every selected task through the same pipeline, strictly one at a
//! time:
//!
//! 1. make sure the task image is available (placeholder score if not)
//! 2. obtain the instruction (cache, extraction, or generic fallback)
//! 3. reuse a precomputed transcript, or run one live exchange
//! 4. score the transcript (placeholder score on any scoring failure)
//!
//! Only an unreachable subject aborts a run. Every other problem is folded
//! into that task's result and the run moves on.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use super::config::EvaluatorConfig;
use super::result::{EvaluationReport, TaskResult};
use crate::catalog::TaskDescriptor;
use crate::environment::{EnvironmentManager, ScoreRequest};
use crate::error::EvaluationError;
use crate::scoring::ScoreResult;
use crate::selection::TaskSelection;
use crate::transcript::{
    save_transcript, transcript_file_name, Role, TranscriptArchive, TranscriptRecorder,
};
use crate::transport::{AgentTransport, SessionState, SessionStore};

pub const IMAGE_UNAVAILABLE_ERROR: &str = "Task image not available - evaluation skipped";
pub const IMAGE_UNAVAILABLE_WARNING: &str =
    "Container runtime or image unavailable - used placeholder score";
pub const SCORING_SKIPPED_NOTE: &str = "Scoring skipped";

/// File name of a task's score artifact inside the run output directory.
pub fn score_file_name(task_id: &str) -> String {
    format!("result_{task_id}.json")
}

/// Where a task's transcript came from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum TranscriptSource {
    Precomputed,
    /// Recorded now; the session stays open until scoring finishes.
    Live { context_id: String },
}

pub struct Evaluator {
    config: EvaluatorConfig,
    environment: Arc<EnvironmentManager>,
    transport: Arc<dyn AgentTransport>,
    archive: TranscriptArchive,
    sessions: Arc<SessionStore>,
}

impl Evaluator {
    pub fn new(
        config: EvaluatorConfig,
        environment: Arc<EnvironmentManager>,
        transport: Arc<dyn AgentTransport>,
    ) -> Self {
        let archive = TranscriptArchive::new(config.trajectories_dir());
        Self {
            config,
            environment,
            transport,
            archive,
            sessions: Arc::new(SessionStore::new()),
        }
    }

    pub fn with_archive(mut self, archive: TranscriptArchive) -> Self {
        self.archive = archive;
        self
    }

    pub fn with_session_store(mut self, sessions: Arc<SessionStore>) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    pub fn environment(&self) -> &Arc<EnvironmentManager> {
        &self.environment
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Evaluates a whole selection.
    ///
    /// Fails only when the subject never becomes ready; in that case no task
    /// is attempted. Otherwise returns one result per selected task, in
    /// selection order.
    pub async fn evaluate(
        &self,
        selection: &TaskSelection,
        context_id: Option<&str>,
    ) -> Result<EvaluationReport, EvaluationError> {
        info!(
            tasks = selection.len(),
            agent_url = %self.config.agent_url,
            "Starting evaluation"
        );

        if !self
            .transport
            .wait_ready(&self.config.agent_url, &self.config.readiness)
            .await
        {
            return Err(EvaluationError::AgentNotReady {
                url: self.config.agent_url.clone(),
                attempts: self.config.readiness.max_attempts,
            });
        }

        tokio::fs::create_dir_all(&self.config.output_dir).await?;

        let started = Instant::now();
        let mut results = Vec::with_capacity(selection.len());
        for (index, task) in selection.iter().enumerate() {
            info!(
                task_id = %task.id,
                index = index + 1,
                total = selection.len(),
                "Evaluating task"
            );
            results.push(self.evaluate_task(task, context_id).await);
        }

        let report = EvaluationReport::new(results, started.elapsed(), &self.config.output_dir);
        match report.save().await {
            Ok(path) => info!(path = %path.display(), "Saved evaluation report"),
            Err(e) => warn!(error = %e, "Failed to save evaluation report"),
        }

        info!(
            completed = report.summary.completed,
            failed = report.summary.failed,
            score = report.summary.total_score,
            possible = report.summary.total_possible,
            elapsed_secs = report.total_time_secs,
            "Evaluation finished"
        );
        Ok(report)
    }

    /// Evaluates one task. Never fails: problems end up in the result.
    pub async fn evaluate_task(&self, task: &TaskDescriptor, context_id: Option<&str>) -> TaskResult {
        let started = Instant::now();
        match self.run_pipeline(task, context_id, started).await {
            Ok(result) => {
                info!(
                    task_id = %task.id,
                    score = ?result.evaluation.as_ref().map(|s| (s.achieved(), s.possible())),
                    elapsed_secs = result.elapsed_secs,
                    "Task completed"
                );
                result
            }
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "Task failed");
                TaskResult::failed(task, e.to_string(), started.elapsed())
            }
        }
    }

    async fn run_pipeline(
        &self,
        task: &TaskDescriptor,
        context_id: Option<&str>,
        started: Instant,
    ) -> Result<TaskResult, EvaluationError> {
        let step = Instant::now();
        let available = self.environment.ensure_image(&task.image_ref).await;
        info!(task_id = %task.id, available, elapsed_secs = secs(step), "Image check finished");
        if !available {
            return Ok(TaskResult::completed(
                task,
                ScoreResult::placeholder(IMAGE_UNAVAILABLE_ERROR),
                started.elapsed(),
            )
            .with_warning(IMAGE_UNAVAILABLE_WARNING));
        }

        let step = Instant::now();
        let (instruction, instruction_source) = self
            .environment
            .instruction_for(&task.id, &task.image_ref)
            .await;
        info!(
            task_id = %task.id,
            source = ?instruction_source,
            chars = instruction.len(),
            elapsed_secs = secs(step),
            "Instruction obtained"
        );

        let step = Instant::now();
        let transcript_path = self.config.output_dir.join(transcript_file_name(&task.id));
        let source = self
            .prepare_transcript(task, &instruction, &transcript_path, context_id)
            .await?;
        info!(
            task_id = %task.id,
            source = ?source,
            path = %transcript_path.display(),
            elapsed_secs = secs(step),
            "Transcript ready"
        );

        let step = Instant::now();
        let evaluation = self.score(task, &transcript_path).await;
        info!(task_id = %task.id, elapsed_secs = secs(step), "Scoring finished");

        if let TranscriptSource::Live { context_id } = &source {
            self.sessions.complete(context_id, SessionState::Completed);
        }

        Ok(TaskResult::completed(task, evaluation, started.elapsed()).with_transcript(transcript_path))
    }

    async fn prepare_transcript(
        &self,
        task: &TaskDescriptor,
        instruction: &str,
        transcript_path: &Path,
        context_id: Option<&str>,
    ) -> Result<TranscriptSource, EvaluationError> {
        if self.archive.find(&task.id).is_some() {
            let bytes = self.archive.copy_to(&task.id, transcript_path).await?;
            info!(task_id = %task.id, bytes, "Reusing precomputed transcript");
            return Ok(TranscriptSource::Precomputed);
        }

        let context_id = self
            .live_exchange(task, instruction, transcript_path, context_id)
            .await?;
        Ok(TranscriptSource::Live { context_id })
    }

    /// Sends the instruction once and records both sides of the exchange.
    ///
    /// Returns the context id of the still-open session. The session is
    /// closed as failed if the exchange or the transcript write fails.
    async fn live_exchange(
        &self,
        task: &TaskDescriptor,
        instruction: &str,
        transcript_path: &Path,
        context_id: Option<&str>,
    ) -> Result<String, EvaluationError> {
        let session = self.sessions.create(&task.id, context_id);
        let mut recorder = TranscriptRecorder::new(&task.id);
        recorder.record_message(Role::User, instruction, None);

        info!(
            task_id = %task.id,
            context_id = %session.context_id,
            timeout_secs = self.config.send_timeout.as_secs(),
            "Sending instruction to agent"
        );
        let response = match self
            .transport
            .send(
                &self.config.agent_url,
                instruction,
                Some(&session.context_id),
                self.config.send_timeout,
            )
            .await
        {
            Ok(response) => response,
            Err(e) => {
                self.sessions.complete(&session.context_id, SessionState::Failed);
                return Err(e.into());
            }
        };

        let reply = response.reply_text();
        recorder.record_message(Role::Agent, &reply, None);

        if let Err(e) = save_transcript(&recorder.finish(), transcript_path).await {
            self.sessions.complete(&session.context_id, SessionState::Failed);
            return Err(e.into());
        }
        Ok(session.context_id)
    }

    async fn score(&self, task: &TaskDescriptor, transcript_path: &Path) -> ScoreResult {
        if self.config.skip_scoring {
            info!(task_id = %task.id, "Scoring skipped by configuration");
            return ScoreResult::skipped(SCORING_SKIPPED_NOTE);
        }

        let output_path: PathBuf = self.config.output_dir.join(score_file_name(&task.id));
        let request = ScoreRequest {
            task_id: &task.id,
            image: &task.image_ref,
            transcript_path,
            output_path: &output_path,
            server: &self.config.server,
        };

        match self.environment.score(&request).await {
            Ok(score) => score,
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "Scoring failed, using placeholder score");
                ScoreResult::placeholder(format!("Scoring failed: {e}"))
            }
        }
    }
}

fn secs(since: Instant) -> f64 {
    since.elapsed().as_secs_f64()
}
