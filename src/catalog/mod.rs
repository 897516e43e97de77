//! Task catalog.
//!
//! Static registry mapping task identifiers to categories, curated subsets,
//! and the naming rule that locates each task's environment image.

pub mod taxonomy;

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

/// Registry that hosts every task image.
pub const IMAGE_REGISTRY: &str = "ghcr.io/theagentcompany";

/// Image tag used when none is configured.
pub const DEFAULT_IMAGE_VERSION: &str = "1.0.0";

/// Subset used when a request names nothing usable.
pub const DEFAULT_SUBSET: &str = "working";

/// Subset containing every catalogued task.
pub const ALL_SUBSET: &str = "all";

/// Category assigned to explicitly requested tasks the catalog does not know.
pub const UNCATEGORIZED: &str = "uncategorized";

/// Builds the image reference for a task.
pub fn image_ref(task_id: &str, version: &str) -> String {
    format!("{IMAGE_REGISTRY}/{task_id}-image:{version}")
}

/// One benchmark task as seen by the evaluator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskDescriptor {
    /// Stable task identifier.
    pub id: String,
    /// Category tag (`hr`, `sde`, ...).
    pub category: String,
    /// Fully qualified environment image reference.
    pub image_ref: String,
}

impl TaskDescriptor {
    pub fn new(id: impl Into<String>, category: impl Into<String>, version: &str) -> Self {
        let id = id.into();
        let image_ref = image_ref(&id, version);
        Self {
            id,
            category: category.into(),
            image_ref,
        }
    }
}

/// Registry of known tasks and the named subsets built from them.
#[derive(Debug, Clone)]
pub struct TaskCatalog {
    version: String,
    categories: Vec<(String, Vec<String>)>,
    category_index: HashMap<String, String>,
    subsets: BTreeMap<String, Vec<String>>,
    default_subset: String,
}

impl Default for TaskCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TaskCatalog {
    /// Creates an empty catalog.
    pub fn empty() -> Self {
        Self {
            version: DEFAULT_IMAGE_VERSION.to_string(),
            categories: Vec::new(),
            category_index: HashMap::new(),
            subsets: BTreeMap::new(),
            default_subset: DEFAULT_SUBSET.to_string(),
        }
    }

    /// Creates the catalog from the built-in taxonomy.
    ///
    /// Every category doubles as a subset, alongside `working` and `all`.
    pub fn builtin() -> Self {
        let mut catalog = Self::empty();
        for (category, tasks) in taxonomy::CATEGORIES {
            catalog = catalog.with_category(*category, tasks.iter().copied());
        }
        catalog.with_subset(DEFAULT_SUBSET, taxonomy::WORKING_TASKS.iter().copied())
    }

    /// Sets the image version used for descriptors.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Registers a category and its tasks.
    ///
    /// The category is also exposed as a subset and the `all` subset is
    /// extended with any task not already present.
    pub fn with_category<I, S>(mut self, name: impl Into<String>, tasks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        let tasks = dedup(tasks);

        for task in &tasks {
            self.category_index
                .entry(task.clone())
                .or_insert_with(|| name.clone());
        }

        let all = self.subsets.entry(ALL_SUBSET.to_string()).or_default();
        for task in &tasks {
            if !all.contains(task) {
                all.push(task.clone());
            }
        }

        self.subsets.insert(name.clone(), tasks.clone());
        self.categories.push((name, tasks));
        self
    }

    /// Registers (or replaces) a named subset.
    pub fn with_subset<I, S>(mut self, name: impl Into<String>, tasks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subsets.insert(name.into(), dedup(tasks));
        self
    }

    /// Selects which subset acts as the fallback.
    pub fn with_default_subset(mut self, name: impl Into<String>) -> Self {
        self.default_subset = name.into();
        self
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Number of distinct catalogued tasks.
    pub fn len(&self) -> usize {
        self.category_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.category_index.is_empty()
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.category_index.contains_key(task_id)
    }

    /// Category names in registration order.
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(|(name, _)| name.as_str())
    }

    /// Tasks of one category, if it exists.
    pub fn category_tasks(&self, category: &str) -> Option<&[String]> {
        self.categories
            .iter()
            .find(|(name, _)| name == category)
            .map(|(_, tasks)| tasks.as_slice())
    }

    pub fn category_of(&self, task_id: &str) -> Option<&str> {
        self.category_index.get(task_id).map(String::as_str)
    }

    /// Names of every subset, sorted.
    pub fn subset_names(&self) -> impl Iterator<Item = &str> {
        self.subsets.keys().map(String::as_str)
    }

    /// Members of a named subset, if it exists.
    pub fn subset(&self, name: &str) -> Option<&[String]> {
        self.subsets.get(name).map(Vec::as_slice)
    }

    /// Members of a named subset, failing on unknown names.
    pub fn subset_strict(&self, name: &str) -> Result<&[String], CatalogError> {
        self.subset(name)
            .ok_or_else(|| CatalogError::UnknownSubset(name.to_string()))
    }

    pub fn default_subset_name(&self) -> &str {
        &self.default_subset
    }

    /// Members of the default subset; empty when it is not defined.
    pub fn default_subset(&self) -> &[String] {
        self.subset(&self.default_subset).unwrap_or(&[])
    }

    /// Describes a task. Unknown identifiers are accepted as `uncategorized`.
    pub fn descriptor(&self, task_id: &str) -> TaskDescriptor {
        let category = self.category_of(task_id).unwrap_or(UNCATEGORIZED);
        TaskDescriptor::new(task_id, category, &self.version)
    }

    /// Describes a known task, failing on unknown identifiers.
    pub fn descriptor_strict(&self, task_id: &str) -> Result<TaskDescriptor, CatalogError> {
        if !self.contains(task_id) {
            return Err(CatalogError::UnknownTask(task_id.to_string()));
        }
        Ok(self.descriptor(task_id))
    }
}

/// Removes duplicates while keeping first-occurrence order.
pub(crate) fn dedup<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut out: Vec<String> = Vec::new();
    for item in items {
        let item = item.into();
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_ref() {
        assert_eq!(
            image_ref("pm-send-hello-message", "1.0.0"),
            "ghcr.io/theagentcompany/pm-send-hello-message-image:1.0.0"
        );
    }

    #[test]
    fn test_builtin_catalog() {
        let catalog = TaskCatalog::builtin();
        assert_eq!(catalog.len(), taxonomy::task_count());
        assert_eq!(catalog.subset(ALL_SUBSET).map(<[String]>::len), Some(catalog.len()));
        assert_eq!(catalog.default_subset().len(), taxonomy::WORKING_TASKS.len());
        assert_eq!(catalog.category_of("hr-transfer-group"), Some("hr"));
        assert_eq!(catalog.categories().count(), taxonomy::CATEGORIES.len());
    }

    #[test]
    fn test_category_is_subset() {
        let catalog = TaskCatalog::builtin();
        let qa = catalog.subset("qa").expect("qa subset");
        assert_eq!(qa, ["qa-escalate-emergency", "qa-update-issue-status"]);
    }

    #[test]
    fn test_descriptor_known_and_unknown() {
        let catalog = TaskCatalog::builtin().with_version("2.0.0");

        let known = catalog.descriptor("sde-create-new-repo");
        assert_eq!(known.category, "sde");
        assert_eq!(
            known.image_ref,
            "ghcr.io/theagentcompany/sde-create-new-repo-image:2.0.0"
        );

        let unknown = catalog.descriptor("custom-task");
        assert_eq!(unknown.category, UNCATEGORIZED);
        assert!(catalog.descriptor_strict("custom-task").is_err());
    }

    #[test]
    fn test_subset_dedups() {
        let catalog = TaskCatalog::empty().with_subset("s", ["a", "b", "a", "c", "b"]);
        assert_eq!(catalog.subset("s").expect("subset"), ["a", "b", "c"]);
    }

    #[test]
    fn test_subset_strict_unknown() {
        let catalog = TaskCatalog::builtin();
        assert!(matches!(
            catalog.subset_strict("beginner"),
            Err(CatalogError::UnknownSubset(name)) if name == "beginner"
        ));
    }

    #[test]
    fn test_empty_default_subset() {
        let catalog = TaskCatalog::empty();
        assert!(catalog.default_subset().is_empty());
    }
}
