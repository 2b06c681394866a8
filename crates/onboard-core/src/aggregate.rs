//! Derived status: task states roll up into phase status, phase states and
//! task counts roll up into project status and percent complete.
//!
//! Nothing here reads storage. Callers hand in the rows of one project and
//! persist whatever changed.

use crate::project::{Phase, Project};
use crate::task::Task;
use crate::types::{PhaseStatus, ProjectStatus, TaskStatus};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Pure rules
// ---------------------------------------------------------------------------

/// A phase with no tasks stays `pending`.
pub fn phase_status(tasks: &[TaskStatus]) -> PhaseStatus {
    if tasks.is_empty() {
        return PhaseStatus::Pending;
    }
    if tasks.iter().all(|s| *s == TaskStatus::Completed) {
        PhaseStatus::Completed
    } else if tasks
        .iter()
        .any(|s| matches!(s, TaskStatus::InProgress | TaskStatus::Completed))
    {
        PhaseStatus::InProgress
    } else {
        PhaseStatus::Pending
    }
}

pub fn project_status(phases: &[PhaseStatus]) -> ProjectStatus {
    if !phases.is_empty() && phases.iter().all(|s| *s == PhaseStatus::Completed) {
        ProjectStatus::Completed
    } else if phases.iter().any(|s| *s != PhaseStatus::Pending) {
        ProjectStatus::Active
    } else {
        ProjectStatus::Draft
    }
}

/// Completed / total as a percentage rounded to one decimal. Zero tasks is 0%.
pub fn percent_complete(tasks: &[Task]) -> f64 {
    if tasks.is_empty() {
        return 0.0;
    }
    let done = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Completed)
        .count();
    let pct = done as f64 / tasks.len() as f64 * 100.0;
    (pct * 10.0).round() / 10.0
}

// ---------------------------------------------------------------------------
// Recompute
// ---------------------------------------------------------------------------

/// Re-derive one phase from its tasks. Returns `true` if anything changed.
pub fn recompute_phase(phase: &mut Phase, tasks: &[Task], now: DateTime<Utc>) -> bool {
    let statuses: Vec<TaskStatus> = tasks
        .iter()
        .filter(|t| t.phase_id == phase.id)
        .map(|t| t.status)
        .collect();
    let next = phase_status(&statuses);

    let mut changed = next != phase.status;
    phase.status = next;

    if next != PhaseStatus::Pending && phase.started_at.is_none() {
        phase.started_at = Some(now);
        changed = true;
    }
    match next {
        PhaseStatus::Completed if phase.completed_at.is_none() => {
            phase.completed_at = Some(now);
            changed = true;
        }
        PhaseStatus::Pending | PhaseStatus::InProgress if phase.completed_at.is_some() => {
            phase.completed_at = None;
            changed = true;
        }
        _ => {}
    }
    changed
}

/// Re-derive every phase, then the project. Returns `true` if the project
/// or any of its phases changed. `cancelled` is sticky; percent complete
/// still tracks the tasks.
pub fn recompute_project(
    project: &mut Project,
    phases: &mut [Phase],
    tasks: &[Task],
    now: DateTime<Utc>,
) -> bool {
    let mut changed = false;
    for phase in phases.iter_mut() {
        changed |= recompute_phase(phase, tasks, now);
    }

    let statuses: Vec<PhaseStatus> = phases.iter().map(|p| p.status).collect();
    let status = if project.status == ProjectStatus::Cancelled {
        ProjectStatus::Cancelled
    } else {
        project_status(&statuses)
    };
    let percent = percent_complete(tasks);

    if status != project.status || percent != project.percent_complete {
        tracing::debug!(
            project = project.id,
            from = %project.status,
            to = %status,
            percent,
            "project recomputed"
        );
        project.status = status;
        project.percent_complete = percent;
        project.updated_at = now;
        changed = true;
    }
    changed
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseProgress {
    pub phase_number: u8,
    pub name: String,
    pub status: PhaseStatus,
    #[serde(flatten)]
    pub progress: Progress,
}

/// Planned against actual dates for one phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseTimeline {
    pub phase_number: u8,
    pub name: String,
    pub target_start: Option<NaiveDate>,
    pub target_end: Option<NaiveDate>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: PhaseStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectStats {
    pub project_id: u64,
    pub status: ProjectStatus,
    pub percent_complete: f64,
    pub summary: String,
    pub by_status: BTreeMap<String, usize>,
    pub by_phase: Vec<PhaseProgress>,
    pub by_ownership: BTreeMap<String, Progress>,
    pub timeline: Vec<PhaseTimeline>,
}

pub fn stats(project: &Project, phases: &[Phase], tasks: &[Task]) -> ProjectStats {
    let mut by_status: BTreeMap<String, usize> = [
        TaskStatus::Pending,
        TaskStatus::Blocked,
        TaskStatus::InProgress,
        TaskStatus::Completed,
    ]
    .iter()
    .map(|s| (s.as_str().to_string(), 0))
    .collect();
    let mut by_ownership: BTreeMap<String, Progress> = BTreeMap::new();

    for t in tasks {
        *by_status.entry(t.status.as_str().to_string()).or_default() += 1;
        let owner = if t.ownership.is_empty() {
            "unassigned"
        } else {
            t.ownership.as_str()
        };
        let entry = by_ownership.entry(owner.to_string()).or_default();
        entry.total += 1;
        if t.status == TaskStatus::Completed {
            entry.completed += 1;
        }
    }

    let by_phase = phases
        .iter()
        .map(|p| PhaseProgress {
            phase_number: p.phase_number,
            name: p.name.clone(),
            status: p.status,
            progress: phase_progress(p, tasks),
        })
        .collect();

    let timeline = phases
        .iter()
        .map(|p| PhaseTimeline {
            phase_number: p.phase_number,
            name: p.name.clone(),
            target_start: p.target_start,
            target_end: p.target_end,
            started_at: p.started_at,
            completed_at: p.completed_at,
            status: p.status,
        })
        .collect();

    ProjectStats {
        project_id: project.id,
        status: project.status,
        percent_complete: project.percent_complete,
        summary: crate::task::summarize(tasks),
        by_status,
        by_phase,
        by_ownership,
        timeline,
    }
}

fn phase_progress(phase: &Phase, tasks: &[Task]) -> Progress {
    let own = tasks.iter().filter(|t| t.phase_id == phase.id);
    Progress {
        completed: own
            .clone()
            .filter(|t| t.status == TaskStatus::Completed)
            .count(),
        total: own.count(),
    }
}

// ---------------------------------------------------------------------------
// Dependency graph
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub phase_id: u64,
    pub phase_number: u8,
    pub name: String,
    pub status: PhaseStatus,
    /// Whole percent, truncated.
    pub percent: u32,
    #[serde(flatten)]
    pub progress: Progress,
}

/// `from` must finish before `to`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: u8,
    pub to: u8,
    pub from_status: PhaseStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyGraph {
    pub project_id: u64,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

/// One node per phase, one edge per dependency between selected phases.
pub fn dependency_graph(project_id: u64, phases: &[Phase], tasks: &[Task]) -> DependencyGraph {
    let nodes = phases
        .iter()
        .map(|p| {
            let progress = phase_progress(p, tasks);
            let percent = if progress.total == 0 {
                0
            } else {
                (progress.completed * 100 / progress.total) as u32
            };
            GraphNode {
                phase_id: p.id,
                phase_number: p.phase_number,
                name: p.name.clone(),
                status: p.status,
                percent,
                progress,
            }
        })
        .collect();

    let status_of: BTreeMap<u8, PhaseStatus> =
        phases.iter().map(|p| (p.phase_number, p.status)).collect();
    let status_of = &status_of;
    let edges = phases
        .iter()
        .flat_map(|p| {
            p.depends_on.iter().filter_map(move |from| {
                status_of.get(from).map(|status| GraphEdge {
                    from: *from,
                    to: p.phase_number,
                    from_status: *status,
                })
            })
        })
        .collect();

    DependencyGraph {
        project_id,
        nodes,
        edges,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
