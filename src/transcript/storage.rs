//! Transcript persistence.
//!
//! Transcripts are written as pretty JSON. Precomputed transcripts live in
//! an archive directory as `<task_id>.json` and are copied byte for byte
//! into a run's output directory when replayed.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::types::Transcript;
use crate::error::TranscriptError;

/// File name of a task's transcript inside a run output directory.
pub fn transcript_file_name(task_id: &str) -> String {
    format!("traj_{task_id}.json")
}

/// Writes a transcript to `path`, creating parent directories.
pub async fn save_transcript(transcript: &Transcript, path: &Path) -> Result<(), TranscriptError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let json = serde_json::to_string_pretty(transcript)?;
    let mut file = fs::File::create(path).await?;
    file.write_all(json.as_bytes()).await?;
    file.sync_all().await?;

    debug!(path = %path.display(), actions = transcript.actions.len(), "Saved transcript");
    Ok(())
}

/// Reads a transcript back from `path`.
pub async fn load_transcript(path: &Path) -> Result<Transcript, TranscriptError> {
    let contents = fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&contents)?)
}

/// Directory of precomputed transcripts keyed by task identifier.
#[derive(Debug, Clone)]
pub struct TranscriptArchive {
    root: PathBuf,
}

impl TranscriptArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, task_id: &str) -> PathBuf {
        self.root.join(format!("{task_id}.json"))
    }

    /// Location of the precomputed transcript for a task, if one exists.
    pub fn find(&self, task_id: &str) -> Option<PathBuf> {
        let path = self.path_for(task_id);
        path.is_file().then_some(path)
    }

    /// Copies the precomputed transcript verbatim to `dest`.
    pub async fn copy_to(&self, task_id: &str, dest: &Path) -> Result<u64, TranscriptError> {
        let source = self.find(task_id).ok_or_else(|| {
            TranscriptError::InvalidData(format!("no precomputed transcript for {task_id}"))
        })?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(fs::copy(&source, dest).await?)
    }

    /// Imports a transcript file into the archive.
    ///
    /// The task id comes from `task_id`, else the file's `task_name` field,
    /// else the file stem with any `traj_` prefix removed. The stored copy
    /// carries that id in `task_name`.
    pub async fn import(
        &self,
        source: &Path,
        task_id: Option<&str>,
    ) -> Result<(String, PathBuf), TranscriptError> {
        let contents = fs::read_to_string(source).await?;
        let mut value: serde_json::Value = serde_json::from_str(&contents)?;
        let object = value.as_object_mut().ok_or_else(|| {
            TranscriptError::InvalidData(format!("{} is not a JSON object", source.display()))
        })?;

        let task_id = match task_id {
            Some(id) => id.to_string(),
            None => object
                .get("task_name")
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .or_else(|| task_id_from_file_name(source))
                .ok_or_else(|| {
                    TranscriptError::InvalidData(format!(
                        "cannot determine task name for {}",
                        source.display()
                    ))
                })?,
        };

        object.insert(
            "task_name".to_string(),
            serde_json::Value::String(task_id.clone()),
        );

        fs::create_dir_all(&self.root).await?;
        let dest = self.path_for(&task_id);
        fs::write(&dest, serde_json::to_string_pretty(&value)?).await?;

        Ok((task_id, dest))
    }
}

fn task_id_from_file_name(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    let id = stem.strip_prefix("traj_").unwrap_or(stem);
    (!id.is_empty()).then(|| id.to_string())
}
