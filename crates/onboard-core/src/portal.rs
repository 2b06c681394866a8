//! The portal: every operator-facing operation, each executed as one
//! database transaction followed by the status recompute it implies.

use crate::aggregate::{self, DependencyGraph, ProjectStats};
use crate::catalog::{check_phase_number, Catalog};
use crate::config::Config;
use crate::db::{self, Bundle, PortalDb};
use crate::deadline::{self, DeadlineDates, PhaseDeadline, TaskDeadline, VarianceReport};
use crate::error::{PortalError, Result};
use crate::instantiate;
use crate::link::{self, ActionLink, Rendered};
use crate::log::{ExecutionLog, LogEntry};
use crate::output::{self, Output, OutputExport};
use crate::project::{Phase, Project, ProjectFilter, ProjectMeta, ProjectUpdate, ScheduleHealth};
use crate::task::{self, Task, TaskFilter};
use crate::types::{LogType, PhaseStatus, ProjectStatus};
use chrono::{DateTime, Utc};
use redb::WriteTransaction;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSummary {
    #[serde(flatten)]
    pub project: Project,
    pub health: ScheduleHealth,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseView {
    #[serde(flatten)]
    pub phase: Phase,
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectDetail {
    #[serde(flatten)]
    pub project: Project,
    pub health: ScheduleHealth,
    pub summary: String,
    pub phases: Vec<PhaseView>,
    pub outputs: Vec<Output>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDetail {
    #[serde(flatten)]
    pub task: Task,
    pub unmet_prerequisites: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rendered_command: Option<Rendered>,
    pub actions: Vec<ActionLink>,
    pub logs: Vec<ExecutionLog>,
}

/// A task row in a cross-project listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskListing {
    pub project_name: String,
    #[serde(flatten)]
    pub task: Task,
}

/// Outcome of a task transition, including the roll-up it caused.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskChange {
    pub task: Task,
    /// Other tasks whose status moved as a consequence.
    pub affected: Vec<u64>,
    pub phase_status: PhaseStatus,
    pub project_status: ProjectStatus,
    pub percent_complete: f64,
}

// ---------------------------------------------------------------------------
// Portal
// ---------------------------------------------------------------------------

pub struct Portal {
    db: PortalDb,
    catalog: Arc<Catalog>,
    default_author: String,
}

impl Portal {
    pub fn new(db: PortalDb, catalog: Arc<Catalog>, default_author: impl Into<String>) -> Self {
        Self {
            db,
            catalog,
            default_author: default_author.into(),
        }
    }

    /// Open the portal rooted at `root`: read the config, load the catalog
    /// once and open the database.
    pub fn open(root: &Path) -> Result<Self> {
        let config = Config::load(root)?;
        let catalog = Catalog::load_or_builtin(&config.catalog_path(root))?;
        let db = PortalDb::open(&config.database_path(root))?;
        tracing::debug!(
            root = %root.display(),
            catalog = %catalog.version,
            "portal opened"
        );
        Ok(Self::new(db, Arc::new(catalog), config.default_author))
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn default_author(&self) -> &str {
        &self.default_author
    }

    fn author<'a>(&'a self, author: Option<&'a str>) -> &'a str {
        author
            .filter(|a| !a.trim().is_empty())
            .unwrap_or(&self.default_author)
    }

    // -----------------------------------------------------------------------
    // Projects
    // -----------------------------------------------------------------------

    /// Create a project from the selected catalog phases. All rows are
    /// written in one transaction or not at all.
    pub fn create_project(&self, meta: ProjectMeta, phases: &[u8]) -> Result<ProjectDetail> {
        let now = Utc::now();
        let id = self.db.write(|tx| {
            let np = instantiate::instantiate(&self.catalog, meta, phases, || db::next_id(tx), now)?;
            db::insert_new(tx, &np)?;
            tracing::info!(
                project = np.project.id,
                name = %np.project.project_name,
                environment = %np.project.environment,
                phases = np.phases.len(),
                tasks = np.tasks.len(),
                "project created"
            );
            Ok(np.project.id)
        })?;
        self.project_detail(id)
    }

    pub fn list_projects(&self, filter: &ProjectFilter) -> Result<Vec<ProjectSummary>> {
        let today = Utc::now().date_naive();
        let mut projects = self.db.read(|r| db::list_projects(r))?;
        projects.retain(|p| filter.matches(p));
        projects.sort_by_key(|p| p.id);
        Ok(projects
            .into_iter()
            .map(|project| ProjectSummary {
                health: project.schedule_health(today),
                project,
            })
            .collect())
    }

    pub fn project(&self, project_id: u64) -> Result<Project> {
        self.db.read(|r| db::load_project(r, project_id))
    }

    pub fn project_detail(&self, project_id: u64) -> Result<ProjectDetail> {
        let (bundle, outputs) = self.db.read(|r| {
            let bundle = db::load_bundle(r, project_id)?;
            let mut outputs = db::outputs(r, project_id)?;
            output::sort_newest_first(&mut outputs);
            Ok((bundle, outputs))
        })?;
        let Bundle {
            project,
            phases,
            tasks,
        } = bundle;

        let summary = task::summarize(&tasks);
        let phases = phases
            .into_iter()
            .map(|phase| PhaseView {
                tasks: tasks
                    .iter()
                    .filter(|t| t.phase_id == phase.id)
                    .cloned()
                    .collect(),
                phase,
            })
            .collect();
        Ok(ProjectDetail {
            health: project.schedule_health(Utc::now().date_naive()),
            project,
            summary,
            phases,
            outputs,
        })
    }

    pub fn update_project(&self, project_id: u64, update: ProjectUpdate) -> Result<Project> {
        let now = Utc::now();
        self.db.write(|tx| {
            let mut project = db::load_project(tx, project_id)?;
            if project.is_cancelled() {
                return Err(PortalError::ProjectClosed(project_id));
            }
            let old_key = project.name_key();
            project.apply_update(update, now)?;
            if project.name_key() != old_key {
                db::claim_name(tx, &project)?;
                db::release_name(tx, &old_key)?;
            }
            db::save_project(tx, &project)?;
            tracing::info!(project = project_id, "project updated");
            Ok(project)
        })
    }

    /// Mark a project cancelled. Cancelling twice is a no-op.
    pub fn cancel_project(&self, project_id: u64) -> Result<Project> {
        let now = Utc::now();
        self.db.write(|tx| {
            let mut project = db::load_project(tx, project_id)?;
            if !project.is_cancelled() {
                project.cancel(now);
                db::save_project(tx, &project)?;
                tracing::info!(project = project_id, "project cancelled");
            }
            Ok(project)
        })
    }

    pub fn delete_project(&self, project_id: u64) -> Result<()> {
        self.db.write(|tx| db::delete_project(tx, project_id))?;
        tracing::info!(project = project_id, "project deleted");
        Ok(())
    }

    pub fn stats(&self, project_id: u64) -> Result<ProjectStats> {
        let bundle = self.db.read(|r| db::load_bundle(r, project_id))?;
        Ok(aggregate::stats(&bundle.project, &bundle.phases, &bundle.tasks))
    }

    /// Phase nodes with progress, and one edge per dependency between the
    /// project's phases.
    pub fn dependency_graph(&self, project_id: u64) -> Result<DependencyGraph> {
        let bundle = self.db.read(|r| db::load_bundle(r, project_id))?;
        Ok(aggregate::dependency_graph(
            project_id,
            &bundle.phases,
            &bundle.tasks,
        ))
    }

    // -----------------------------------------------------------------------
    // Tasks
    // -----------------------------------------------------------------------

    /// Tasks across projects, ordered by project name, phase, then task order.
    pub fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<TaskListing>> {
        if let Some(n) = filter.phase {
            check_phase_number(n)?;
        }
        let bundles = self.db.read(|r| match filter.project_id {
            Some(id) => Ok(vec![db::load_bundle(r, id)?]),
            None => db::list_projects(r)?
                .into_iter()
                .map(|p| db::load_bundle(r, p.id))
                .collect(),
        })?;

        let mut rows: Vec<TaskListing> = bundles
            .into_iter()
            .flat_map(|b| {
                let name = b.project.project_name;
                b.tasks
                    .into_iter()
                    .filter(move |t| filter.matches(t))
                    .map(move |task| TaskListing {
                        project_name: name.clone(),
                        task,
                    })
            })
            .collect();
        rows.sort_by(|a, b| {
            (&a.project_name, a.task.project_id, a.task.phase_number, a.task.task_order).cmp(&(
                &b.project_name,
                b.task.project_id,
                b.task.phase_number,
                b.task.task_order,
            ))
        });
        Ok(rows)
    }

    /// Load the task's project, refuse if it is cancelled, apply `f`, then
    /// recompute and persist, all in one transaction.
    fn mutate_task<F>(&self, task_id: u64, f: F) -> Result<TaskChange>
    where
        F: FnOnce(&WriteTransaction, &mut Bundle, DateTime<Utc>) -> Result<Vec<u64>>,
    {
        let now = Utc::now();
        self.db.write(|tx| {
            let project_id = db::project_of_task(tx, task_id)?;
            let mut bundle = db::load_bundle(tx, project_id)?;
            if bundle.project.is_cancelled() {
                return Err(PortalError::ProjectClosed(project_id));
            }

            let affected = f(tx, &mut bundle, now)?;
            aggregate::recompute_project(
                &mut bundle.project,
                &mut bundle.phases,
                &bundle.tasks,
                now,
            );
            db::save_bundle(tx, &bundle)?;

            let task = task::find(&bundle.tasks, task_id)?.clone();
            let phase_status = bundle
                .phases
                .iter()
                .find(|p| p.id == task.phase_id)
                .map(|p| p.status())
                .ok_or(PortalError::PhaseNotFound(task.phase_id))?;
            Ok(TaskChange {
                task,
                affected,
                phase_status,
                project_status: bundle.project.status(),
                percent_complete: bundle.project.percent_complete(),
            })
        })
    }

    pub fn start_task(&self, task_id: u64) -> Result<TaskChange> {
        self.mutate_task(task_id, |_, bundle, now| {
            task::start_task(&mut bundle.tasks, task_id, now)?;
            tracing::info!(task = task_id, "task started");
            Ok(Vec::new())
        })
    }

    pub fn complete_task(&self, task_id: u64, author: Option<&str>) -> Result<TaskChange> {
        let author = self.author(author);
        self.mutate_task(task_id, |tx, bundle, now| {
            let recorded = db::outputs(tx, bundle.project.id)?;
            let has_output = |key: &str| recorded.iter().any(|o| o.key == key);
            let unblocked =
                task::complete_task(&mut bundle.tasks, task_id, has_output, author, now)?;
            tracing::info!(task = task_id, author, unblocked = unblocked.len(), "task completed");
            Ok(unblocked)
        })
    }

    /// Reopen a completed task. Completed dependents are reopened too; every
    /// reopen is recorded as a note.
    pub fn reopen_task(
        &self,
        task_id: u64,
        author: Option<&str>,
        reason: Option<&str>,
    ) -> Result<TaskChange> {
        let author = self.author(author);
        self.mutate_task(task_id, |tx, bundle, now| {
            let cascaded = task::reopen_task(&mut bundle.tasks, task_id)?;
            let project_id = bundle.project.id;
            let key = task::find(&bundle.tasks, task_id)?.key.clone();

            let note = match reason {
                Some(r) if !r.trim().is_empty() => format!("reopened: {r}"),
                _ => "reopened".to_string(),
            };
            let mut entries = vec![(task_id, note)];
            entries.extend(
                cascaded
                    .iter()
                    .map(|id| (*id, format!("reopened because prerequisite '{key}' was reopened"))),
            );
            for (id, note) in entries {
                let log = LogEntry::note(note).into_log(db::next_id(tx)?, id, project_id, author, now);
                db::append_log(tx, &log)?;
            }
            tracing::info!(task = task_id, cascaded = cascaded.len(), "task reopened");
            Ok(cascaded)
        })
    }

    pub fn check_item(&self, task_id: u64, index: usize, checked: bool) -> Result<TaskChange> {
        self.mutate_task(task_id, |_, bundle, _| {
            task::set_checklist_item(&mut bundle.tasks, task_id, index, checked)?;
            Ok(Vec::new())
        })
    }

    pub fn task_detail(&self, task_id: u64) -> Result<TaskDetail> {
        self.db.read(|r| {
            let project_id = db::project_of_task(r, task_id)?;
            let bundle = db::load_bundle(r, project_id)?;
            let outputs = output::as_map(&db::outputs(r, project_id)?);
            let t = task::find(&bundle.tasks, task_id)?;

            let rendered_command = t
                .command
                .as_deref()
                .map(|c| link::render_for_project(c, &bundle.project, &outputs))
                .transpose()?;
            let actions = db::actions_for_project(r, project_id)?
                .iter()
                .filter(|a| a.task_id == task_id)
                .map(|a| link::build_action_url(a, &bundle.project, &outputs))
                .collect::<Result<Vec<_>>>()?;
            let logs = db::logs_for_project(r, project_id)?
                .into_iter()
                .filter(|l| l.task_id == task_id)
                .collect();

            Ok(TaskDetail {
                unmet_prerequisites: task::unmet_prerequisites(&bundle.tasks, t),
                rendered_command,
                actions,
                logs,
                task: t.clone(),
            })
        })
    }

    /// Append a log entry. Allowed in any task state, including on a
    /// cancelled project.
    pub fn record_log(
        &self,
        task_id: u64,
        entry: LogEntry,
        author: Option<&str>,
    ) -> Result<ExecutionLog> {
        entry.validate()?;
        let author = self.author(author);
        let now = Utc::now();
        self.db.write(|tx| {
            let project_id = db::project_of_task(tx, task_id)?;
            let log = entry.into_log(db::next_id(tx)?, task_id, project_id, author, now);
            db::append_log(tx, &log)?;
            tracing::debug!(task = task_id, kind = %log.log_type, "log recorded");
            Ok(log)
        })
    }

    pub fn task_logs(&self, task_id: u64) -> Result<Vec<ExecutionLog>> {
        self.db.read(|r| {
            let project_id = db::project_of_task(r, task_id)?;
            Ok(db::logs_for_project(r, project_id)?
                .into_iter()
                .filter(|l| l.task_id == task_id)
                .collect())
        })
    }

    /// Record an output produced by a task: upsert it under the task's
    /// phase and append an `output` log entry carrying `{key, value}`.
    pub fn record_output(
        &self,
        task_id: u64,
        key: &str,
        value: &str,
        author: Option<&str>,
    ) -> Result<Output> {
        output::validate_key(key)?;
        let author = self.author(author);
        let now = Utc::now();
        self.db.write(|tx| {
            let project_id = db::project_of_task(tx, task_id)?;
            let bundle = db::load_bundle(tx, project_id)?;
            if bundle.project.is_cancelled() {
                return Err(PortalError::ProjectClosed(project_id));
            }
            let t = task::find(&bundle.tasks, task_id)?;

            let out = upsert_output(tx, project_id, key, value, Some(t.phase_number), now)?;
            let entry = LogEntry {
                log_type: LogType::Output,
                note: format!("{key} = {value}"),
                payload: Some(serde_json::json!({ "key": key, "value": value })),
            };
            let log = entry.into_log(db::next_id(tx)?, task_id, project_id, author, now);
            db::append_log(tx, &log)?;
            Ok(out)
        })
    }

    // -----------------------------------------------------------------------
    // Outputs
    // -----------------------------------------------------------------------

    pub fn set_output(
        &self,
        project_id: u64,
        key: &str,
        value: &str,
        phase_number: Option<u8>,
    ) -> Result<Output> {
        output::validate_key(key)?;
        if let Some(n) = phase_number {
            check_phase_number(n)?;
        }
        let now = Utc::now();
        self.db.write(|tx| {
            let project = db::load_project(tx, project_id)?;
            if project.is_cancelled() {
                return Err(PortalError::ProjectClosed(project_id));
            }
            upsert_output(tx, project_id, key, value, phase_number, now)
        })
    }

    /// Outputs of a project, most recent write first.
    pub fn get_outputs(&self, project_id: u64) -> Result<Vec<Output>> {
        let mut outputs = self.db.read(|r| {
            db::load_project(r, project_id)?;
            db::outputs(r, project_id)
        })?;
        output::sort_newest_first(&mut outputs);
        Ok(outputs)
    }

    pub fn get_output(&self, project_id: u64, key: &str) -> Result<Option<Output>> {
        self.db.read(|r| {
            db::load_project(r, project_id)?;
            db::output(r, project_id, key)
        })
    }

    pub fn export_outputs(&self, project_id: u64) -> Result<OutputExport> {
        let (project, outputs) = self.db.read(|r| {
            Ok((db::load_project(r, project_id)?, db::outputs(r, project_id)?))
        })?;
        Ok(OutputExport::new(&project, outputs, Utc::now()))
    }

    // -----------------------------------------------------------------------
    // Deadlines
    // -----------------------------------------------------------------------

    /// Upsert the deadline a team agreed for a phase. `ownership` defaults
    /// to the platform team.
    pub fn set_phase_deadline(
        &self,
        phase_id: u64,
        ownership: Option<&str>,
        dates: DeadlineDates,
    ) -> Result<PhaseDeadline> {
        let ownership = ownership
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .unwrap_or(deadline::DEFAULT_OWNERSHIP);
        deadline::validate_ownership(ownership)?;
        let now = Utc::now();
        self.db.write(|tx| {
            let project_id = db::project_of_phase(tx, phase_id)?;
            let bundle = db::load_bundle(tx, project_id)?;
            if bundle.project.is_cancelled() {
                return Err(PortalError::ProjectClosed(project_id));
            }
            let phase = bundle
                .phases
                .iter()
                .find(|p| p.id == phase_id)
                .ok_or(PortalError::PhaseNotFound(phase_id))?;
            let row = PhaseDeadline {
                project_id,
                phase_id,
                phase_number: phase.phase_number,
                phase_name: phase.name.clone(),
                ownership: ownership.to_string(),
                variance_days: dates.variance_days(),
                dates,
                updated_at: now,
            };
            db::put_phase_deadline(tx, &row)?;
            tracing::info!(
                project = project_id,
                phase = phase.phase_number,
                ownership,
                variance = ?row.variance_days,
                "phase deadline set"
            );
            Ok(row)
        })
    }

    /// Deadlines of one phase, ordered by owning team.
    pub fn phase_deadlines(&self, phase_id: u64) -> Result<Vec<PhaseDeadline>> {
        self.db.read(|r| {
            let project_id = db::project_of_phase(r, phase_id)?;
            Ok(db::phase_deadlines(r, project_id)?
                .into_iter()
                .filter(|d| d.phase_id == phase_id)
                .collect())
        })
    }

    pub fn set_task_deadline(&self, task_id: u64, dates: DeadlineDates) -> Result<TaskDeadline> {
        let now = Utc::now();
        self.db.write(|tx| {
            let project_id = db::project_of_task(tx, task_id)?;
            let bundle = db::load_bundle(tx, project_id)?;
            if bundle.project.is_cancelled() {
                return Err(PortalError::ProjectClosed(project_id));
            }
            let t = task::find(&bundle.tasks, task_id)?;
            let row = TaskDeadline {
                project_id,
                task_id,
                task_key: t.key.clone(),
                task_name: t.name.clone(),
                ownership: t.ownership.clone(),
                phase_number: t.phase_number,
                variance_days: dates.variance_days(),
                dates,
                updated_at: now,
            };
            db::put_task_deadline(tx, &row)?;
            tracing::info!(
                project = project_id,
                task = %t.key,
                variance = ?row.variance_days,
                "task deadline set"
            );
            Ok(row)
        })
    }

    /// Every deadline of a project with slip counts over its phase deadlines.
    pub fn variance_report(&self, project_id: u64) -> Result<VarianceReport> {
        let (phases, tasks) = self.db.read(|r| {
            db::load_project(r, project_id)?;
            Ok((
                db::phase_deadlines(r, project_id)?,
                db::task_deadlines(r, project_id)?,
            ))
        })?;
        Ok(VarianceReport::new(project_id, phases, tasks))
    }

    // -----------------------------------------------------------------------
    // Links
    // -----------------------------------------------------------------------

    pub fn build_action_link(&self, action_id: u64) -> Result<ActionLink> {
        self.db.read(|r| {
            let action = db::load_action(r, action_id)?;
            let project = db::load_project(r, action.project_id)?;
            let outputs: HashMap<String, String> =
                output::as_map(&db::outputs(r, action.project_id)?);
            link::build_action_url(&action, &project, &outputs)
        })
    }

    // -----------------------------------------------------------------------
    // Recompute
    // -----------------------------------------------------------------------

    pub fn phase(&self, phase_id: u64) -> Result<PhaseView> {
        self.db.read(|r| {
            let project_id = db::project_of_phase(r, phase_id)?;
            let bundle = db::load_bundle(r, project_id)?;
            let phase = bundle
                .phases
                .into_iter()
                .find(|p| p.id == phase_id)
                .ok_or(PortalError::PhaseNotFound(phase_id))?;
            let tasks = bundle
                .tasks
                .into_iter()
                .filter(|t| t.phase_id == phase_id)
                .collect();
            Ok(PhaseView { phase, tasks })
        })
    }

    /// Re-derive one phase from its tasks. Persists only if something
    /// changed, so repeated calls are observably idempotent.
    pub fn recompute_phase(&self, phase_id: u64) -> Result<Phase> {
        let now = Utc::now();
        self.db.write(|tx| {
            let project_id = db::project_of_phase(tx, phase_id)?;
            let mut bundle = db::load_bundle(tx, project_id)?;
            let phase = bundle
                .phases
                .iter_mut()
                .find(|p| p.id == phase_id)
                .ok_or(PortalError::PhaseNotFound(phase_id))?;
            let changed = aggregate::recompute_phase(phase, &bundle.tasks, now);
            let phase = phase.clone();
            if changed {
                db::save_bundle(tx, &bundle)?;
            }
            Ok(phase)
        })
    }

    pub fn recompute_project(&self, project_id: u64) -> Result<Project> {
        let now = Utc::now();
        self.db.write(|tx| {
            let mut bundle = db::load_bundle(tx, project_id)?;
            let changed = aggregate::recompute_project(
                &mut bundle.project,
                &mut bundle.phases,
                &bundle.tasks,
                now,
            );
            if changed {
                db::save_bundle(tx, &bundle)?;
            }
            Ok(bundle.project)
        })
    }
}

fn upsert_output(
    tx: &WriteTransaction,
    project_id: u64,
    key: &str,
    value: &str,
    phase_number: Option<u8>,
    now: DateTime<Utc>,
) -> Result<Output> {
    let mut out = Output {
        project_id,
        key: key.to_string(),
        value: value.to_string(),
        phase_number,
        seq: 0,
        updated_at: now,
    };
    db::put_output(tx, &mut out)?;
    tracing::debug!(project = project_id, key, "output recorded");
    Ok(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
