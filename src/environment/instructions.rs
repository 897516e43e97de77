//! Precomputed task instructions.
//!
//! Instructions are expensive to extract (one instance launch each), so
//! they can be computed ahead of time and stored as a JSON map of
//! `task_id -> instruction` in `task_instructions.json`. The cache is
//! filled explicitly through `load()`; `get()` never touches the disk.

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use tracing::{info, warn};

use super::manager::EnvironmentManager;
use crate::error::EnvironmentError;
use crate::selection::TaskSelection;

/// File name of the instruction cache inside the data directory.
pub const INSTRUCTIONS_FILE: &str = "task_instructions.json";

/// Extracted instructions shorter than this are treated as failures.
pub const MIN_INSTRUCTION_CHARS: usize = 50;

/// Read-through cache of task instructions keyed by task id.
#[derive(Debug, Default)]
pub struct InstructionCache {
    path: Option<PathBuf>,
    entries: RwLock<HashMap<String, String>>,
}

impl InstructionCache {
    /// Cache backed by a JSON file. Nothing is read until `load()`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            entries: RwLock::default(),
        }
    }

    /// Cache with no backing file.
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Loads entries from the backing file and returns how many are cached.
    ///
    /// A missing file is not an error; it simply yields an empty cache.
    pub async fn load(&self) -> Result<usize, EnvironmentError> {
        let Some(path) = &self.path else {
            return Ok(self.len());
        };

        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(self.len()),
            Err(e) => return Err(e.into()),
        };

        let loaded: HashMap<String, String> =
            serde_json::from_str(&contents).map_err(|source| EnvironmentError::InstructionCache {
                path: path.display().to_string(),
                source,
            })?;

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.extend(loaded);
        info!(count = entries.len(), path = %path.display(), "Loaded precomputed instructions");
        Ok(entries.len())
    }

    pub fn get(&self, task_id: &str) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(task_id)
            .cloned()
    }

    pub fn insert(&self, task_id: impl Into<String>, instruction: impl Into<String>) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(task_id.into(), instruction.into());
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes all entries, sorted by task id, to the backing file.
    pub async fn save(&self) -> Result<(), EnvironmentError> {
        let Some(path) = &self.path else {
            return Err(EnvironmentError::NoCacheFile);
        };

        let sorted: BTreeMap<String, String> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(&sorted).map_err(|source| {
            EnvironmentError::InstructionCache {
                path: path.display().to_string(),
                source,
            }
        })?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }
}

/// Outcome of a bulk instruction extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct PrecomputeReport {
    pub stored: Vec<String>,
    pub failed: Vec<String>,
}

/// Extracts instructions for every selected task into the manager's cache.
///
/// Tasks whose image is unavailable, or whose extracted text is shorter than
/// [`MIN_INSTRUCTION_CHARS`], are reported as failed. The caller decides
/// whether to `save()` afterwards.
pub async fn precompute_instructions(
    manager: &EnvironmentManager,
    selection: &TaskSelection,
) -> PrecomputeReport {
    let mut report = PrecomputeReport::default();

    for task in selection {
        if !manager.ensure_image(&task.image_ref).await {
            warn!(task_id = %task.id, "Image unavailable, skipping instruction extraction");
            report.failed.push(task.id.clone());
            continue;
        }

        match manager.try_extract_instruction(&task.image_ref).await {
            Ok(text) if text.chars().count() > MIN_INSTRUCTION_CHARS => {
                manager.instructions().insert(task.id.clone(), text);
                report.stored.push(task.id.clone());
            }
            Ok(text) => {
                warn!(task_id = %task.id, chars = text.len(), "Instruction too short, not cached");
                report.failed.push(task.id.clone());
            }
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "Instruction extraction failed");
                report.failed.push(task.id.clone());
            }
        }
    }

    info!(
        stored = report.stored.len(),
        failed = report.failed.len(),
        "Instruction precomputation finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let dir = TempDir::new().expect("tempdir");
        let cache = InstructionCache::new(dir.path().join(INSTRUCTIONS_FILE));
        assert_eq!(cache.load().await.expect("load"), 0);
        assert!(cache.get("anything").is_none());
    }

    #[tokio::test]
    async fn test_get_before_load_does_not_read_disk() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join(INSTRUCTIONS_FILE);
        std::fs::write(&path, r#"{"hr-mass-survey": "Survey everyone"}"#).expect("write");

        let cache = InstructionCache::new(&path);
        assert!(cache.get("hr-mass-survey").is_none());

        assert_eq!(cache.load().await.expect("load"), 1);
        assert_eq!(cache.get("hr-mass-survey").as_deref(), Some("Survey everyone"));
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("data").join(INSTRUCTIONS_FILE);

        let cache = InstructionCache::new(&path);
        cache.insert("b-task", "second");
        cache.insert("a-task", "first");
        cache.save().await.expect("save");

        let raw = std::fs::read_to_string(&path).expect("read");
        assert!(raw.find("a-task") < raw.find("b-task"));

        let reloaded = InstructionCache::new(&path);
        assert_eq!(reloaded.load().await.expect("load"), 2);
        assert_eq!(reloaded.get("a-task").as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn test_malformed_file_errors() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join(INSTRUCTIONS_FILE);
        std::fs::write(&path, "[not a map]").expect("write");

        let cache = InstructionCache::new(&path);
        let err = cache.load().await.expect_err("should fail");
        assert!(matches!(err, EnvironmentError::InstructionCache { .. }));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_in_memory_cache_cannot_save() {
        let cache = InstructionCache::in_memory();
        cache.insert("t", "x");
        assert_eq!(cache.len(), 1);
        assert!(matches!(cache.save().await, Err(EnvironmentError::NoCacheFile)));
    }
}
