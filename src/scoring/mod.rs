//! Score results produced by task environments.
//!
//! A scoring pass writes a JSON artifact of the form
//! `{"checkpoints": [{"total": 2, "result": 1}], "final_score": {"total": 2, "result": 1}}`.
//! When scoring cannot run, a placeholder worth 1 possible / 0 achieved is
//! used instead and the reason is kept in `error` or `note`, so "could not
//! score" stays distinguishable from a genuine zero.

pub mod strategies;

use serde::{Deserialize, Serialize};

use crate::error::EnvironmentError;

/// One scoring sub-criterion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Points available.
    #[serde(rename = "total")]
    pub possible: u32,
    /// Points earned.
    #[serde(rename = "result")]
    pub achieved: u32,
}

/// Derived total over all checkpoints; same shape as a checkpoint.
pub type FinalScore = Checkpoint;

impl Checkpoint {
    pub fn new(possible: u32, achieved: u32) -> Self {
        Self { possible, achieved }
    }

    pub fn is_valid(&self) -> bool {
        self.achieved <= self.possible
    }

    /// Achieved fraction, 0.0 when nothing is possible.
    pub fn ratio(&self) -> f64 {
        if self.possible == 0 {
            0.0
        } else {
            f64::from(self.achieved) / f64::from(self.possible)
        }
    }

    /// Sums a set of checkpoints, saturating at `u32::MAX`.
    pub fn sum<'a>(checkpoints: impl IntoIterator<Item = &'a Checkpoint>) -> Self {
        checkpoints
            .into_iter()
            .fold(Self::default(), |acc, cp| Self {
                possible: acc.possible.saturating_add(cp.possible),
                achieved: acc.achieved.saturating_add(cp.achieved),
            })
    }

    /// Sums a set of checkpoints, returning `None` on overflow.
    pub fn checked_sum<'a>(checkpoints: impl IntoIterator<Item = &'a Checkpoint>) -> Option<Self> {
        checkpoints
            .into_iter()
            .try_fold(Self::default(), |acc, cp| {
                Some(Self {
                    possible: acc.possible.checked_add(cp.possible)?,
                    achieved: acc.achieved.checked_add(cp.achieved)?,
                })
            })
    }
}

/// Structured score for one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub checkpoints: Vec<Checkpoint>,
    pub final_score: FinalScore,
    /// Set when the score is approximate or scoring was skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Set when scoring could not run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScoreResult {
    /// Builds a result whose final score is the sum of its checkpoints.
    pub fn from_checkpoints(checkpoints: Vec<Checkpoint>) -> Self {
        let final_score = Checkpoint::sum(&checkpoints);
        Self {
            checkpoints,
            final_score,
            note: None,
            error: None,
        }
    }

    fn zero() -> Self {
        Self::from_checkpoints(vec![Checkpoint::new(1, 0)])
    }

    /// Placeholder for a scoring pass that could not run.
    pub fn placeholder(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::zero()
        }
    }

    /// Placeholder for a scoring pass that was intentionally not run.
    pub fn skipped(note: impl Into<String>) -> Self {
        Self {
            note: Some(note.into()),
            ..Self::zero()
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn possible(&self) -> u32 {
        self.final_score.possible
    }

    pub fn achieved(&self) -> u32 {
        self.final_score.achieved
    }

    pub fn ratio(&self) -> f64 {
        self.final_score.ratio()
    }

    /// True for placeholders and results carrying a note or error.
    pub fn is_approximate(&self) -> bool {
        self.note.is_some() || self.error.is_some()
    }

    /// Checks that no checkpoint, nor the final score, exceeds its total.
    pub fn validate(&self) -> Result<(), String> {
        if let Some((i, cp)) = self
            .checkpoints
            .iter()
            .enumerate()
            .find(|(_, cp)| !cp.is_valid())
        {
            return Err(format!(
                "checkpoint {i} achieved {} of {} points",
                cp.achieved, cp.possible
            ));
        }
        if !self.final_score.is_valid() {
            return Err(format!(
                "final score achieved {} of {} points",
                self.final_score.achieved, self.final_score.possible
            ));
        }
        Ok(())
    }

    /// Parses and validates a score artifact.
    ///
    /// A missing `final_score` is derived from the checkpoints.
    pub fn parse_artifact(contents: &str) -> Result<Self, EnvironmentError> {
        #[derive(Deserialize)]
        struct Artifact {
            checkpoints: Vec<Checkpoint>,
            #[serde(default)]
            final_score: Option<FinalScore>,
        }

        let artifact: Artifact = serde_json::from_str(contents)
            .map_err(|e| EnvironmentError::MalformedArtifact(e.to_string()))?;

        let derived = Checkpoint::checked_sum(&artifact.checkpoints).ok_or_else(|| {
            EnvironmentError::MalformedArtifact("checkpoint totals overflow".to_string())
        })?;
        let result = Self {
            checkpoints: artifact.checkpoints,
            final_score: artifact.final_score.unwrap_or(derived),
            note: None,
            error: None,
        };
        result
            .validate()
            .map_err(EnvironmentError::MalformedArtifact)?;
        Ok(result)
    }
}
