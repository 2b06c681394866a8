//! Task lifecycle: `pending`/`blocked` → `in_progress` → `completed`, with
//! reopen back to `in_progress`.
//!
//! Operations work on the full task list of one project because starting,
//! completing and reopening all depend on (and may change) other tasks via
//! the prerequisite graph. Prerequisites are task keys, never references.

use crate::error::{PortalError, Result};
use crate::types::{ActionType, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub text: String,
    pub checked: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: u64,
    pub project_id: u64,
    pub phase_id: u64,
    pub phase_number: u8,
    /// Identifier unique within the project; prerequisites refer to it.
    pub key: String,
    pub task_order: u32,
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub ownership: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default)]
    pub prerequisites: Vec<String>,
    #[serde(default)]
    pub expected_outputs: Vec<String>,
    #[serde(default)]
    pub checklist: Vec<ChecklistItem>,
    pub(crate) status: TaskStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub completed_by: Option<String>,
}

impl Task {
    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn unchecked_items(&self) -> Vec<String> {
        self.checklist
            .iter()
            .filter(|i| !i.checked)
            .map(|i| i.text.clone())
            .collect()
    }

    fn label(&self) -> String {
        self.key.clone()
    }
}

/// External-system link attached to a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskAction {
    pub id: u64,
    pub task_id: u64,
    pub project_id: u64,
    pub action_type: ActionType,
    pub label: String,
    pub url_template: String,
    pub is_automated: bool,
}

// ---------------------------------------------------------------------------
// Lookup helpers
// ---------------------------------------------------------------------------

pub fn find(tasks: &[Task], id: u64) -> Result<&Task> {
    tasks
        .iter()
        .find(|t| t.id == id)
        .ok_or_else(|| PortalError::TaskNotFound(id.to_string()))
}

fn find_mut(tasks: &mut [Task], id: u64) -> Result<&mut Task> {
    tasks
        .iter_mut()
        .find(|t| t.id == id)
        .ok_or_else(|| PortalError::TaskNotFound(id.to_string()))
}

/// Prerequisite keys of `task` that are not yet completed. A key with no
/// matching task counts as unmet.
pub fn unmet_prerequisites(tasks: &[Task], task: &Task) -> Vec<String> {
    let completed: HashSet<&str> = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Completed)
        .map(|t| t.key.as_str())
        .collect();
    task.prerequisites
        .iter()
        .filter(|k| !completed.contains(k.as_str()))
        .cloned()
        .collect()
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

/// Status a not-yet-started task should have given its prerequisites.
pub fn initial_status(prerequisites: &[String]) -> TaskStatus {
    if prerequisites.is_empty() {
        TaskStatus::Pending
    } else {
        TaskStatus::Blocked
    }
}

pub fn start_task(tasks: &mut [Task], id: u64, now: DateTime<Utc>) -> Result<()> {
    let task = find(tasks, id)?;
    match task.status {
        TaskStatus::Pending | TaskStatus::Blocked => {}
        other => {
            return Err(PortalError::InvalidTransition {
                from: other.to_string(),
                to: TaskStatus::InProgress.to_string(),
                reason: "only pending or blocked tasks can be started".to_string(),
            })
        }
    }
    let unmet = unmet_prerequisites(tasks, task);
    if !unmet.is_empty() {
        return Err(PortalError::PrerequisiteUnmet {
            task: task.label(),
            unmet,
        });
    }

    let task = find_mut(tasks, id)?;
    task.status = TaskStatus::InProgress;
    task.started_at.get_or_insert(now);
    Ok(())
}

/// Complete an in-progress task. `has_output` reports whether the project
/// already holds a value for an output key.
///
/// Returns the ids of tasks whose status changed as a consequence
/// (dependents moving from `blocked` to `pending`).
pub fn complete_task<F>(
    tasks: &mut [Task],
    id: u64,
    has_output: F,
    by: &str,
    now: DateTime<Utc>,
) -> Result<Vec<u64>>
where
    F: Fn(&str) -> bool,
{
    let task = find(tasks, id)?;
    if task.status != TaskStatus::InProgress {
        return Err(PortalError::InvalidTransition {
            from: task.status.to_string(),
            to: TaskStatus::Completed.to_string(),
            reason: "only in-progress tasks can be completed".to_string(),
        });
    }

    let unmet = unmet_prerequisites(tasks, task);
    if !unmet.is_empty() {
        return Err(PortalError::PrerequisiteUnmet {
            task: task.label(),
            unmet,
        });
    }

    let unchecked = task.unchecked_items();
    if !unchecked.is_empty() {
        return Err(PortalError::ValidationIncomplete {
            task: task.label(),
            unchecked,
        });
    }

    let missing: Vec<String> = task
        .expected_outputs
        .iter()
        .filter(|k| !has_output(k.as_str()))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(PortalError::OutputsMissing {
            task: task.label(),
            missing,
        });
    }

    let task = find_mut(tasks, id)?;
    task.status = TaskStatus::Completed;
    task.completed_at = Some(now);
    task.completed_by = Some(by.to_string());

    Ok(reevaluate(tasks))
}

/// Move a completed task back to `in_progress`.
///
/// Completed tasks that (transitively) depend on it are reopened as well so
/// that no completed task is left with an incomplete prerequisite. Returns
/// the ids of those cascaded reopens, nearest dependents first.
pub fn reopen_task(tasks: &mut [Task], id: u64) -> Result<Vec<u64>> {
    let task = find(tasks, id)?;
    if task.status != TaskStatus::Completed {
        return Err(PortalError::InvalidTransition {
            from: task.status.to_string(),
            to: TaskStatus::InProgress.to_string(),
            reason: "only completed tasks can be reopened".to_string(),
        });
    }

    let mut cascaded = Vec::new();
    let mut queue = VecDeque::from([id]);
    while let Some(current) = queue.pop_front() {
        let key = find(tasks, current)?.key.clone();
        let t = find_mut(tasks, current)?;
        t.status = TaskStatus::InProgress;
        t.completed_at = None;
        t.completed_by = None;

        for dependent in tasks
            .iter()
            .filter(|d| d.status == TaskStatus::Completed && d.prerequisites.contains(&key))
        {
            if !queue.contains(&dependent.id) {
                queue.push_back(dependent.id);
                cascaded.push(dependent.id);
            }
        }
    }

    reevaluate(tasks);
    Ok(cascaded)
}

/// Mark a validation checklist entry. Completed tasks are frozen.
pub fn set_checklist_item(tasks: &mut [Task], id: u64, index: usize, checked: bool) -> Result<()> {
    let task = find_mut(tasks, id)?;
    if task.status == TaskStatus::Completed {
        return Err(PortalError::InvalidTransition {
            from: task.status.to_string(),
            to: task.status.to_string(),
            reason: "reopen the task before changing its checklist".to_string(),
        });
    }
    let len = task.checklist.len();
    let key = task.key.clone();
    let item = task.checklist.get_mut(index).ok_or_else(|| {
        PortalError::Validation(format!(
            "checklist index {index} out of range for task '{key}' ({len} items)"
        ))
    })?;
    item.checked = checked;
    Ok(())
}

/// Re-derive `pending`/`blocked` for every task that has not started.
/// Returns the ids whose status changed.
pub fn reevaluate(tasks: &mut [Task]) -> Vec<u64> {
    let completed: HashSet<String> = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Completed)
        .map(|t| t.key.clone())
        .collect();

    let mut changed = Vec::new();
    for task in tasks.iter_mut() {
        if !matches!(task.status, TaskStatus::Pending | TaskStatus::Blocked) {
            continue;
        }
        let next = if task.prerequisites.iter().all(|k| completed.contains(k)) {
            TaskStatus::Pending
        } else {
            TaskStatus::Blocked
        };
        if next != task.status {
            task.status = next;
            changed.push(task.id);
        }
    }
    changed
}

// ---------------------------------------------------------------------------
// TaskFilter
// ---------------------------------------------------------------------------

/// Cross-project task query. Unset fields match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskFilter {
    #[serde(default)]
    pub project_id: Option<u64>,
    /// Phase number.
    #[serde(default)]
    pub phase: Option<u8>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub ownership: Option<String>,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        self.project_id.map_or(true, |id| id == task.project_id)
            && self.phase.map_or(true, |n| n == task.phase_number)
            && self.status.map_or(true, |s| s == task.status)
            && self
                .ownership
                .as_deref()
                .map_or(true, |o| o == task.ownership)
    }
}

/// Human-readable summary: "3/14 completed, 1 in progress, 2 blocked"
pub fn summarize(tasks: &[Task]) -> String {
    let total = tasks.len();
    let count = |s: TaskStatus| tasks.iter().filter(|t| t.status == s).count();
    format!(
        "{}/{total} completed, {} in progress, {} blocked",
        count(TaskStatus::Completed),
        count(TaskStatus::InProgress),
        count(TaskStatus::Blocked)
    )
}

// ---------------------------------------------------------------------------
// Prerequisite graph
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Visiting,
    Done,
}

/// Find a cycle in a key → prerequisite-keys graph. Returns the keys along
/// the cycle, first key repeated at the end.
pub fn find_cycle<'a>(graph: &BTreeMap<&'a str, Vec<&'a str>>) -> Option<Vec<String>> {
    fn visit<'a>(
        node: &'a str,
        graph: &BTreeMap<&'a str, Vec<&'a str>>,
        marks: &mut HashMap<&'a str, Mark>,
        stack: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        match marks.get(node) {
            Some(Mark::Done) => return None,
            Some(Mark::Visiting) => {
                let start = stack.iter().position(|n| *n == node).unwrap_or(0);
                let mut cycle: Vec<String> = stack[start..].iter().map(|s| s.to_string()).collect();
                cycle.push(node.to_string());
                return Some(cycle);
            }
            None => {}
        }
        marks.insert(node, Mark::Visiting);
        stack.push(node);
        for next in graph.get(node).into_iter().flatten() {
            if let Some(cycle) = visit(*next, graph, marks, stack) {
                return Some(cycle);
            }
        }
        stack.pop();
        marks.insert(node, Mark::Done);
        None
    }

    let mut marks = HashMap::new();
    let mut stack = Vec::new();
    graph
        .keys()
        .find_map(|node| visit(*node, graph, &mut marks, &mut stack))
}

/// Reject prerequisite lists that reference keys outside `tasks` or that
/// form a cycle.
pub fn validate_prerequisites(tasks: &[Task]) -> Result<()> {
    let keys: HashSet<&str> = tasks.iter().map(|t| t.key.as_str()).collect();
    for task in tasks {
        if let Some(unknown) = task.prerequisites.iter().find(|k| !keys.contains(k.as_str())) {
            return Err(PortalError::Validation(format!(
                "task '{}' lists prerequisite '{unknown}' which is not part of the project",
                task.key
            )));
        }
    }

    let graph: BTreeMap<&str, Vec<&str>> = tasks
        .iter()
        .map(|t| {
            (
                t.key.as_str(),
                t.prerequisites.iter().map(String::as_str).collect(),
            )
        })
        .collect();
    if let Some(cycle) = find_cycle(&graph) {
        return Err(PortalError::Validation(format!(
            "prerequisite cycle: {}",
            cycle.join(" -> ")
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn task(id: u64, key: &str, prerequisites: &[&str]) -> Task {
        let prerequisites: Vec<String> = prerequisites.iter().map(|s| s.to_string()).collect();
        Task {
            id,
            project_id: 1,
            phase_id: 1,
            phase_number: 1,
            key: key.to_string(),
            task_order: id as u32,
            name: key.to_string(),
            category: String::new(),
            ownership: String::new(),
            description: String::new(),
            command: None,
            status: initial_status(&prerequisites),
            prerequisites,
            expected_outputs: Vec::new(),
            checklist: Vec::new(),
            started_at: None,
            completed_at: None,
            completed_by: None,
        }
    }

    #[test]
    fn filter_matches_each_field() {
        let mut t = task(1, "a", &[]);
        t.ownership = "DBA".to_string();
        t.phase_number = 2;
        assert!(TaskFilter::default().matches(&t));

        let by_project = TaskFilter { project_id: Some(2), ..Default::default() };
        assert!(!by_project.matches(&t));
        let by_phase = TaskFilter { phase: Some(2), ..Default::default() };
        assert!(by_phase.matches(&t));
        let by_status = TaskFilter { status: Some(TaskStatus::Completed), ..Default::default() };
        assert!(!by_status.matches(&t));
        let by_owner = TaskFilter {
            ownership: Some("DBA".to_string()),
            status: Some(TaskStatus::Pending),
            ..Default::default()
        };
        assert!(by_owner.matches(&t));
    }

    fn no_outputs(_: &str) -> bool {
        false
    }

    fn finish(tasks: &mut [Task], id: u64) -> Vec<u64> {
        start_task(tasks, id, Utc::now()).unwrap();
        complete_task(tasks, id, no_outputs, "tester", Utc::now()).unwrap()
    }

    #[test]
    fn task_lifecycle() {
        let mut tasks = vec![task(1, "a", &[])];
        assert_eq!(tasks[0].status(), TaskStatus::Pending);

        start_task(&mut tasks, 1, Utc::now()).unwrap();
        assert_eq!(tasks[0].status(), TaskStatus::InProgress);
        assert!(tasks[0].started_at.is_some());

        complete_task(&mut tasks, 1, no_outputs, "alex", Utc::now()).unwrap();
        assert_eq!(tasks[0].status(), TaskStatus::Completed);
        assert_eq!(tasks[0].completed_by.as_deref(), Some("alex"));
    }

    #[test]
    fn blocked_task_cannot_start() {
        let mut tasks = vec![task(1, "a", &[]), task(2, "b", &["a"])];
        let err = start_task(&mut tasks, 2, Utc::now()).unwrap_err();
        match err {
            PortalError::PrerequisiteUnmet { task, unmet } => {
                assert_eq!(task, "b");
                assert_eq!(unmet, vec!["a".to_string()]);
            }
            other => panic!("expected PrerequisiteUnmet, got {other:?}"),
        }
        assert_eq!(tasks[1].status(), TaskStatus::Blocked);
    }

    #[test]
    fn completing_prerequisite_unblocks_dependent() {
        let mut tasks = vec![task(1, "a", &[]), task(2, "b", &["a"])];
        assert_eq!(tasks[1].status(), TaskStatus::Blocked);

        let changed = finish(&mut tasks, 1);
        assert_eq!(changed, vec![2]);
        assert_eq!(tasks[1].status(), TaskStatus::Pending);
    }

    #[test]
    fn dependent_with_two_prerequisites_waits_for_both() {
        let mut tasks = vec![task(1, "a", &[]), task(2, "b", &[]), task(3, "c", &["a", "b"])];
        finish(&mut tasks, 1);
        assert_eq!(tasks[2].status(), TaskStatus::Blocked);
        finish(&mut tasks, 2);
        assert_eq!(tasks[2].status(), TaskStatus::Pending);
    }

    #[test]
    fn completion_requires_checklist_then_outputs() {
        let mut t = task(1, "rds", &[]);
        t.checklist = vec![
            ChecklistItem { text: "instance available".into(), checked: true },
            ChecklistItem { text: "encryption on".into(), checked: true },
            ChecklistItem { text: "backups on".into(), checked: false },
        ];
        t.expected_outputs = vec!["rds_endpoint".into()];
        let mut tasks = vec![t];
        start_task(&mut tasks, 1, Utc::now()).unwrap();

        let err = complete_task(&mut tasks, 1, no_outputs, "x", Utc::now()).unwrap_err();
        match err {
            PortalError::ValidationIncomplete { unchecked, .. } => {
                assert_eq!(unchecked, vec!["backups on".to_string()]);
            }
            other => panic!("expected ValidationIncomplete, got {other:?}"),
        }
        assert_eq!(tasks[0].status(), TaskStatus::InProgress);

        set_checklist_item(&mut tasks, 1, 2, true).unwrap();
        let err = complete_task(&mut tasks, 1, no_outputs, "x", Utc::now()).unwrap_err();
        assert!(matches!(err, PortalError::OutputsMissing { ref missing, .. } if missing == &vec!["rds_endpoint".to_string()]));

        complete_task(&mut tasks, 1, |k| k == "rds_endpoint", "x", Utc::now()).unwrap();
        assert_eq!(tasks[0].status(), TaskStatus::Completed);
    }

    #[test]
    fn cannot_complete_a_pending_task() {
        let mut tasks = vec![task(1, "a", &[])];
        let err = complete_task(&mut tasks, 1, no_outputs, "x", Utc::now()).unwrap_err();
        assert!(matches!(err, PortalError::InvalidTransition { .. }));
    }

    #[test]
    fn cannot_start_twice() {
        let mut tasks = vec![task(1, "a", &[])];
        start_task(&mut tasks, 1, Utc::now()).unwrap();
        assert!(matches!(
            start_task(&mut tasks, 1, Utc::now()),
            Err(PortalError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn reopen_cascades_to_completed_dependents() {
        let mut tasks = vec![
            task(1, "a", &[]),
            task(2, "b", &["a"]),
            task(3, "c", &["b"]),
            task(4, "d", &["a"]),
        ];
        finish(&mut tasks, 1);
        finish(&mut tasks, 2);
        finish(&mut tasks, 3);
        assert_eq!(tasks[3].status(), TaskStatus::Pending);

        let cascaded = reopen_task(&mut tasks, 1).unwrap();
        assert_eq!(cascaded, vec![2, 3]);
        assert_eq!(tasks[0].status(), TaskStatus::InProgress);
        assert_eq!(tasks[1].status(), TaskStatus::InProgress);
        assert_eq!(tasks[2].status(), TaskStatus::InProgress);
        assert_eq!(tasks[3].status(), TaskStatus::Blocked);
        assert!(tasks[0].completed_at.is_none());

        for t in &tasks {
            if t.status() == TaskStatus::Completed {
                assert!(unmet_prerequisites(&tasks, t).is_empty());
            }
        }
    }

    #[test]
    fn in_progress_dependent_waits_after_prerequisite_reopens() {
        let mut tasks = vec![task(1, "a", &[]), task(2, "b", &["a"])];
        finish(&mut tasks, 1);
        start_task(&mut tasks, 2, Utc::now()).unwrap();
        reopen_task(&mut tasks, 1).unwrap();

        let err = complete_task(&mut tasks, 2, no_outputs, "x", Utc::now()).unwrap_err();
        assert!(matches!(err, PortalError::PrerequisiteUnmet { .. }));
        assert_eq!(tasks[1].status(), TaskStatus::InProgress);
    }

    #[test]
    fn checklist_frozen_on_completed_task() {
        let mut t = task(1, "a", &[]);
        t.checklist = vec![ChecklistItem { text: "ok".into(), checked: true }];
        let mut tasks = vec![t];
        finish(&mut tasks, 1);
        assert!(set_checklist_item(&mut tasks, 1, 0, false).is_err());
        assert!(matches!(
            set_checklist_item(&mut tasks, 99, 0, false),
            Err(PortalError::TaskNotFound(_))
        ));
    }

    #[test]
    fn checklist_index_out_of_range() {
        let mut tasks = vec![task(1, "a", &[])];
        assert!(matches!(
            set_checklist_item(&mut tasks, 1, 3, true),
            Err(PortalError::Validation(_))
        ));
    }

    #[test]
    fn detects_cycles_and_unknown_keys() {
        let tasks = vec![task(1, "a", &["c"]), task(2, "b", &["a"]), task(3, "c", &["b"])];
        let err = validate_prerequisites(&tasks).unwrap_err().to_string();
        assert!(err.contains("cycle"), "{err}");

        let tasks = vec![task(1, "a", &["zzz"])];
        let err = validate_prerequisites(&tasks).unwrap_err().to_string();
        assert!(err.contains("zzz"), "{err}");

        let tasks = vec![task(1, "a", &[]), task(2, "b", &["a"]), task(3, "c", &["a", "b"])];
        assert!(validate_prerequisites(&tasks).is_ok());
    }

    #[test]
    fn summary_counts() {
        let mut tasks = vec![task(1, "a", &[]), task(2, "b", &["a"]), task(3, "c", &[])];
        finish(&mut tasks, 1);
        start_task(&mut tasks, 3, Utc::now()).unwrap();
        assert_eq!(summarize(&tasks), "1/3 completed, 1 in progress, 0 blocked");
    }
}
