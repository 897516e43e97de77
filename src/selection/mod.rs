//! Task selection.
//!
//! Resolves an evaluation request into an ordered, duplicate-free list of
//! task descriptors. Resolution order: explicit names, then a named subset,
//! then the catalog's default subset. An optional cap draws a uniform random
//! sample, reproducible when a seed is supplied.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::catalog::{dedup, TaskCatalog, TaskDescriptor};

/// What the caller asked to evaluate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionRequest {
    /// Explicit task identifiers; wins over everything else when non-empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub task_names: Vec<String>,
    /// Named subset to draw from.
    #[serde(default, alias = "task_subset", skip_serializing_if = "Option::is_none")]
    pub subset: Option<String>,
    /// Upper bound on the number of tasks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tasks: Option<usize>,
    /// Seed for the down-sampling step.
    #[serde(default, alias = "random_seed", skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl SelectionRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_task_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.task_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_subset(mut self, subset: impl Into<String>) -> Self {
        self.subset = Some(subset.into());
        self
    }

    pub fn with_max_tasks(mut self, max: usize) -> Self {
        self.max_tasks = Some(max);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Where a selection's candidates came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum SelectionSource {
    Explicit,
    Subset(String),
    Default(String),
}

/// Ordered tasks chosen for one evaluation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSelection {
    pub tasks: Vec<TaskDescriptor>,
    pub source: SelectionSource,
}

impl TaskSelection {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TaskDescriptor> {
        self.tasks.iter()
    }

    pub fn task_ids(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.id.as_str()).collect()
    }

    pub fn image_refs(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.image_ref.as_str()).collect()
    }
}

impl<'a> IntoIterator for &'a TaskSelection {
    type Item = &'a TaskDescriptor;
    type IntoIter = std::slice::Iter<'a, TaskDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.tasks.iter()
    }
}

/// Resolves selection requests against a catalog.
#[derive(Debug, Clone, Default)]
pub struct TaskSelector {
    catalog: TaskCatalog,
}

impl TaskSelector {
    pub fn new(catalog: TaskCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &TaskCatalog {
        &self.catalog
    }

    /// Resolves a request into a selection. Never fails.
    pub fn select(&self, request: &SelectionRequest) -> TaskSelection {
        let (candidates, source) = self.candidates(request);

        let ids = match request.max_tasks {
            Some(max) if max < candidates.len() => sample(candidates, max, request.seed),
            _ => candidates,
        };

        debug!(count = ids.len(), source = ?source, "Resolved task selection");

        TaskSelection {
            tasks: ids.iter().map(|id| self.catalog.descriptor(id)).collect(),
            source,
        }
    }

    fn candidates(&self, request: &SelectionRequest) -> (Vec<String>, SelectionSource) {
        let explicit = dedup(
            request
                .task_names
                .iter()
                .map(|name| name.trim())
                .filter(|name| !name.is_empty()),
        );
        if !explicit.is_empty() {
            for name in explicit.iter().filter(|n| !self.catalog.contains(n)) {
                warn!(task_id = %name, "Requested task is not in the catalog, evaluating anyway");
            }
            return (explicit, SelectionSource::Explicit);
        }

        if let Some(name) = &request.subset {
            match self.catalog.subset(name) {
                Some(tasks) => return (tasks.to_vec(), SelectionSource::Subset(name.clone())),
                None => warn!(
                    subset = %name,
                    fallback = %self.catalog.default_subset_name(),
                    "Unknown task subset, using default"
                ),
            }
        }

        (
            self.catalog.default_subset().to_vec(),
            SelectionSource::Default(self.catalog.default_subset_name().to_string()),
        )
    }
}

/// Uniform sample without replacement. Output order is random.
fn sample(mut candidates: Vec<String>, count: usize, seed: Option<u64>) -> Vec<String> {
    let mut rng = match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_rng(&mut rand::rng()),
    };
    candidates.shuffle(&mut rng);
    candidates.truncate(count);
    candidates
}
