//! Per-task results and run-level aggregation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::catalog::TaskDescriptor;
use crate::error::EvaluationError;
use crate::scoring::ScoreResult;

/// File name of the saved report inside the run output directory.
pub const REPORT_FILE: &str = "evaluation_results.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// The pipeline ran to the end; scoring may still have been a placeholder.
    Completed,
    /// The pipeline aborted, e.g. the subject could not be reached.
    Failed,
}

/// Outcome of one task. A completed result carries an evaluation and no
/// error; a failed result carries an error and no evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub image: String,
    pub status: TaskStatus,
    pub elapsed_secs: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<ScoreResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl TaskResult {
    pub fn completed(task: &TaskDescriptor, evaluation: ScoreResult, elapsed: Duration) -> Self {
        Self {
            task_id: task.id.clone(),
            image: task.image_ref.clone(),
            status: TaskStatus::Completed,
            elapsed_secs: elapsed.as_secs_f64(),
            evaluation: Some(evaluation),
            error: None,
            transcript_path: None,
            warning: None,
        }
    }

    pub fn failed(task: &TaskDescriptor, error: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            task_id: task.id.clone(),
            image: task.image_ref.clone(),
            status: TaskStatus::Failed,
            elapsed_secs: elapsed.as_secs_f64(),
            evaluation: None,
            error: Some(error.into()),
            transcript_path: None,
            warning: None,
        }
    }

    pub fn with_transcript(mut self, path: impl Into<PathBuf>) -> Self {
        self.transcript_path = Some(path.into());
        self
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warning = Some(warning.into());
        self
    }

    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }

    /// Exactly one of evaluation/error is set, matching the status.
    pub fn is_consistent(&self) -> bool {
        match self.status {
            TaskStatus::Completed => self.evaluation.is_some() && self.error.is_none(),
            TaskStatus::Failed => self.evaluation.is_none() && self.error.is_some(),
        }
    }

    /// One-line human summary.
    pub fn summary_line(&self) -> String {
        match (&self.status, &self.evaluation) {
            (TaskStatus::Completed, Some(score)) => {
                let mut line = format!(
                    "✓ {}: {}/{} ({:.1}s)",
                    self.task_id,
                    score.achieved(),
                    score.possible(),
                    self.elapsed_secs
                );
                if let Some(reason) = score.error.as_deref().or(score.note.as_deref()) {
                    line.push_str(&format!(" [{reason}]"));
                }
                line
            }
            _ => format!(
                "✗ {}: FAILED - {} ({:.1}s)",
                self.task_id,
                self.error.as_deref().unwrap_or("unknown error"),
                self.elapsed_secs
            ),
        }
    }
}

/// Run-level totals. Only completed tasks contribute points.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateSummary {
    pub total_tasks: usize,
    pub completed: usize,
    pub failed: usize,
    pub total_score: u64,
    pub total_possible: u64,
    /// `total_score / total_possible`, 0.0 when nothing was possible.
    pub overall_score: f64,
}

impl AggregateSummary {
    pub fn from_results(results: &[TaskResult]) -> Self {
        let mut summary = Self {
            total_tasks: results.len(),
            ..Self::default()
        };

        for result in results {
            match result.status {
                TaskStatus::Completed => {
                    summary.completed += 1;
                    if let Some(score) = &result.evaluation {
                        summary.total_score += u64::from(score.achieved());
                        summary.total_possible += u64::from(score.possible());
                    }
                }
                TaskStatus::Failed => summary.failed += 1,
            }
        }

        summary.overall_score = if summary.total_possible > 0 {
            summary.total_score as f64 / summary.total_possible as f64
        } else {
            0.0
        };
        summary
    }
}

/// Everything a run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub summary: AggregateSummary,
    pub tasks: Vec<TaskResult>,
    pub total_time_secs: f64,
    pub output_dir: PathBuf,
}

impl EvaluationReport {
    pub fn new(tasks: Vec<TaskResult>, total_time: Duration, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            summary: AggregateSummary::from_results(&tasks),
            tasks,
            total_time_secs: total_time.as_secs_f64(),
            output_dir: output_dir.into(),
        }
    }

    pub fn report_path(&self) -> PathBuf {
        self.output_dir.join(REPORT_FILE)
    }

    /// Writes the report as pretty JSON into the output directory.
    pub async fn save(&self) -> Result<PathBuf, EvaluationError> {
        let path = self.report_path();
        tokio::fs::create_dir_all(&self.output_dir).await?;
        tokio::fs::write(&path, serde_json::to_string_pretty(self)?).await?;
        Ok(path)
    }

    pub async fn load(path: &Path) -> Result<Self, EvaluationError> {
        let contents = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Human-readable report.
    pub fn render(&self) -> String {
        let s = &self.summary;
        let mut lines = vec![
            "=== Evaluation Results ===".to_string(),
            format!("Total tasks:    {}", s.total_tasks),
            format!("Completed:      {}", s.completed),
            format!("Failed:         {}", s.failed),
            format!("Overall score:  {}/{}", s.total_score, s.total_possible),
            format!("Percentage:     {:.1}%", s.overall_score * 100.0),
            format!("Total time:     {:.1}s", self.total_time_secs),
            format!("Output dir:     {}", self.output_dir.display()),
            String::new(),
            "Task details:".to_string(),
        ];
        lines.extend(self.tasks.iter().map(|t| format!("  {}", t.summary_line())));
        lines.join("\n")
    }
}
