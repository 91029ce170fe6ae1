use serde::{Deserialize, Serialize};

/// Normalize a file path for ownership comparisons.
///
/// Trims whitespace, converts backslashes and strips any leading `./`.
pub fn normalize_path(path: &str) -> String {
    let mut normalized = path.trim().replace('\\', "/");
    while let Some(rest) = normalized.strip_prefix("./") {
        normalized = rest.to_string();
    }
    normalized
}

/// A unit of delegated work scoped to specific files.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkItem {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub role: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub risks: Vec<String>,
}

impl WorkItem {
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            files: Vec::new(),
            depends_on: Vec::new(),
            role: role.into(),
            risks: Vec::new(),
        }
    }

    pub fn with_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.files.extend(files.into_iter().map(Into::into));
        self
    }

    pub fn depending_on<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn with_risk(mut self, risk: impl Into<String>) -> Self {
        self.risks.push(risk.into());
        self
    }

    /// Normalized, de-duplicated file set in declaration order.
    pub fn normalized_files(&self) -> Vec<String> {
        let mut files: Vec<String> = Vec::with_capacity(self.files.len());
        for file in self.files.iter().map(|f| normalize_path(f)) {
            if !file.is_empty() && !files.contains(&file) {
                files.push(file);
            }
        }
        files
    }

    /// Whether `path` falls inside this item's declared file scope.
    pub fn owns_file(&self, path: &str) -> bool {
        let path = normalize_path(path);
        self.files.iter().any(|f| normalize_path(f) == path)
    }
}

/// Work items that may run concurrently.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Phase {
    /// 1-indexed position in the plan.
    pub number: u32,
    pub items: Vec<WorkItem>,
}

impl Phase {
    pub fn is_parallel(&self) -> bool {
        self.items.len() > 1
    }

    pub fn item_ids(&self) -> Vec<String> {
        self.items.iter().map(|i| i.id.clone()).collect()
    }
}

/// Ordered phases derived from one set of work items. Never patched in place.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionPlan {
    pub phases: Vec<Phase>,
}

impl ExecutionPlan {
    pub fn total_phases(&self) -> usize {
        self.phases.len()
    }

    pub fn total_items(&self) -> usize {
        self.phases.iter().map(|p| p.items.len()).sum()
    }

    pub fn items(&self) -> impl Iterator<Item = &WorkItem> {
        self.phases.iter().flat_map(|p| p.items.iter())
    }

    pub fn item(&self, id: &str) -> Option<&WorkItem> {
        self.items().find(|i| i.id == id)
    }

    /// Phase number holding `id`.
    pub fn phase_of(&self, id: &str) -> Option<u32> {
        self.phases
            .iter()
            .find(|p| p.items.iter().any(|i| i.id == id))
            .map(|p| p.number)
    }

    /// One line per phase, used when briefing roles on the plan.
    pub fn outline(&self) -> String {
        self.phases
            .iter()
            .map(|phase| {
                let ids = phase.item_ids().join(", ");
                format!("Phase {}: {}", phase.number, ids)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
