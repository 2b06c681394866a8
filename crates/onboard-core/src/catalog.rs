//! The onboarding template: nine fixed phases, each with an ordered task
//! list. Loaded once (from disk, or the built-in copy) and shared read-only.

use crate::error::{PortalError, Result};
use crate::link;
use crate::project::is_slug;
use crate::task::find_cycle;
use crate::types::ActionType;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

const BUILTIN: &str = include_str!("catalog/default.yaml");

pub const MIN_PHASE: u8 = 1;
pub const MAX_PHASE: u8 = 9;

/// Reject phase numbers outside `MIN_PHASE..=MAX_PHASE` as caller input.
pub fn check_phase_number(n: u8) -> Result<()> {
    if (MIN_PHASE..=MAX_PHASE).contains(&n) {
        Ok(())
    } else {
        Err(PortalError::Validation(format!(
            "phase {n} is outside {MIN_PHASE}..={MAX_PHASE}"
        )))
    }
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionTemplate {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub label: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskTemplate {
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default = "default_ownership")]
    pub ownership: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<ActionTemplate>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validation: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prerequisites: Vec<String>,
}

fn default_ownership() -> String {
    "Platform Team".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseTemplate {
    pub number: u8,
    pub name: String,
    #[serde(default = "default_duration")]
    pub duration_days: u32,
    /// Whether the schedule waits for this phase before laying out the next.
    #[serde(default)]
    pub sequential: bool,
    /// Phase numbers that must finish before this one is ready.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<u8>,
    #[serde(default)]
    pub tasks: Vec<TaskTemplate>,
}

fn default_duration() -> u32 {
    14
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    pub version: String,
    pub phases: Vec<PhaseTemplate>,
}

impl Catalog {
    /// The catalog compiled into the binary.
    pub fn builtin() -> Result<Self> {
        Self::parse(BUILTIN)
    }

    pub fn builtin_yaml() -> &'static str {
        BUILTIN
    }

    pub fn parse(yaml: &str) -> Result<Self> {
        let mut catalog: Catalog = serde_yaml::from_str(yaml)?;
        catalog.phases.sort_by_key(|p| p.number);
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::parse(&data)
    }

    /// Load `path` if it exists, otherwise fall back to the built-in catalog.
    pub fn load_or_builtin(path: &Path) -> Result<Self> {
        if path.exists() {
            tracing::debug!(path = %path.display(), "loading catalog");
            Self::load(path)
        } else {
            Self::builtin()
        }
    }

    pub fn phase(&self, number: u8) -> Option<&PhaseTemplate> {
        self.phases.iter().find(|p| p.number == number)
    }

    pub fn task(&self, key: &str) -> Option<(&PhaseTemplate, &TaskTemplate)> {
        self.phases
            .iter()
            .find_map(|p| p.tasks.iter().find(|t| t.key == key).map(|t| (p, t)))
    }

    pub fn task_count(&self) -> usize {
        self.phases.iter().map(|p| p.tasks.len()).sum()
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Result<()> {
        let bad = |msg: String| Err(PortalError::Catalog(msg));

        if self.version.trim().is_empty() {
            return bad("version must not be empty".to_string());
        }
        if self.phases.is_empty() {
            return bad("at least one phase is required".to_string());
        }

        let mut numbers = HashSet::new();
        let mut keys = HashSet::new();
        for phase in &self.phases {
            if !(MIN_PHASE..=MAX_PHASE).contains(&phase.number) {
                return bad(format!(
                    "phase number {} outside {MIN_PHASE}..={MAX_PHASE}",
                    phase.number
                ));
            }
            if !numbers.insert(phase.number) {
                return bad(format!("phase number {} appears twice", phase.number));
            }
            if phase.name.trim().is_empty() {
                return bad(format!("phase {} has no name", phase.number));
            }
            // A phase without tasks could never complete.
            if phase.tasks.is_empty() {
                return bad(format!("phase {} has no tasks", phase.number));
            }
            for task in &phase.tasks {
                if !is_slug(&task.key) {
                    return bad(format!(
                        "task key '{}' must be lowercase alphanumeric with hyphens",
                        task.key
                    ));
                }
                if !keys.insert(task.key.as_str()) {
                    return bad(format!("task key '{}' appears twice", task.key));
                }
                if let Some(out) = task
                    .outputs
                    .iter()
                    .find(|o| o.is_empty() || o.contains(['{', '}', ' ']))
                {
                    return bad(format!("task '{}' declares invalid output key '{out}'", task.key));
                }
                if let Some(cmd) = &task.command {
                    link::validate(cmd).or_else(|e| {
                        bad(format!("task '{}' command: {e}", task.key))
                    })?;
                }
                for action in &task.actions {
                    link::validate(&action.url).or_else(|e| {
                        bad(format!("task '{}' action '{}': {e}", task.key, action.label))
                    })?;
                }
            }
        }

        self.validate_phase_dependencies()?;

        let mut graph: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for task in self.phases.iter().flat_map(|p| &p.tasks) {
            if let Some(unknown) = task.prerequisites.iter().find(|k| !keys.contains(k.as_str())) {
                return bad(format!(
                    "task '{}' lists unknown prerequisite '{unknown}'",
                    task.key
                ));
            }
            graph.insert(
                task.key.as_str(),
                task.prerequisites.iter().map(String::as_str).collect(),
            );
        }
        if let Some(cycle) = find_cycle(&graph) {
            return bad(format!("prerequisite cycle: {}", cycle.join(" -> ")));
        }

        Ok(())
    }

    fn validate_phase_dependencies(&self) -> Result<()> {
        let mut graph: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for phase in &self.phases {
            for dep in &phase.depends_on {
                if *dep == phase.number {
                    return Err(PortalError::Catalog(format!(
                        "phase {} depends on itself",
                        phase.number
                    )));
                }
                if self.phase(*dep).is_none() {
                    return Err(PortalError::Catalog(format!(
                        "phase {} depends on unknown phase {dep}",
                        phase.number
                    )));
                }
            }
            graph.insert(
                phase.number.to_string(),
                phase.depends_on.iter().map(u8::to_string).collect(),
            );
        }
        let view: BTreeMap<&str, Vec<&str>> = graph
            .iter()
            .map(|(k, v)| (k.as_str(), v.iter().map(String::as_str).collect()))
            .collect();
        if let Some(cycle) = find_cycle(&view) {
            return Err(PortalError::Catalog(format!(
                "phase dependency cycle: {}",
                cycle.join(" -> ")
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
