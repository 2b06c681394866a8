//! Persistent storage for projects and everything they own, using redb.
//!
//! # Table design
//!
//! Projects are keyed by id. Rows owned by a project (phases, tasks,
//! actions, logs, outputs, deadlines) use a composite key:
//! ```text
//! [ project_id: u64 big-endian (8 bytes) | child id (8 bytes BE) or output key (utf-8) ]
//! ```
//! Phase deadlines append the owning team (utf-8) after the phase id.
//! so all rows of one project are a single range scan. Three index tables
//! map a task, phase or action id back to its project. Values are JSON.
//!
//! Every mutation runs inside [`PortalDb::write`]: one write transaction,
//! committed only if the closure succeeds.

use crate::deadline::{PhaseDeadline, TaskDeadline};
use crate::error::{PortalError, Result};
use crate::instantiate::NewProject;
use crate::log::ExecutionLog;
use crate::output::Output;
use crate::project::{Phase, Project};
use crate::task::{Task, TaskAction};
use redb::{Database, ReadTransaction, ReadableTable, TableDefinition, WriteTransaction};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

// ---------------------------------------------------------------------------
// Table definitions
// ---------------------------------------------------------------------------

type RowTable = TableDefinition<'static, u64, &'static [u8]>;
type ChildTable = TableDefinition<'static, &'static [u8], &'static [u8]>;
type IndexTable = TableDefinition<'static, u64, u64>;

const PROJECTS: RowTable = TableDefinition::new("projects");
/// Key: `environment/project_name`, value: project id.
const PROJECT_NAMES: TableDefinition<&str, u64> = TableDefinition::new("project_names");
const PHASES: ChildTable = TableDefinition::new("phases");
const TASKS: ChildTable = TableDefinition::new("tasks");
const TASK_ACTIONS: ChildTable = TableDefinition::new("task_actions");
const EXECUTION_LOGS: ChildTable = TableDefinition::new("execution_logs");
const PROJECT_OUTPUTS: ChildTable = TableDefinition::new("project_outputs");
const PHASE_DEADLINES: ChildTable = TableDefinition::new("phase_deadlines");
const TASK_DEADLINES: ChildTable = TableDefinition::new("task_deadlines");
const TASK_INDEX: IndexTable = TableDefinition::new("task_index");
const PHASE_INDEX: IndexTable = TableDefinition::new("phase_index");
const ACTION_INDEX: IndexTable = TableDefinition::new("action_index");
const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");

/// Every table keyed by `[project_id | ..]`.
const CHILD_TABLES: [ChildTable; 7] = [
    PHASES,
    TASKS,
    TASK_ACTIONS,
    EXECUTION_LOGS,
    PROJECT_OUTPUTS,
    PHASE_DEADLINES,
    TASK_DEADLINES,
];

const ROW_IDS: &str = "rows";
const OUTPUT_WRITES: &str = "output_writes";

pub(crate) fn db_err(e: impl std::fmt::Display) -> PortalError {
    PortalError::Db(e.to_string())
}

// ---------------------------------------------------------------------------
// Key helpers
// ---------------------------------------------------------------------------

fn child_key(project_id: u64, child_id: u64) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&project_id.to_be_bytes());
    key[8..].copy_from_slice(&child_id.to_be_bytes());
    key
}

fn output_key(project_id: u64, key: &str) -> Vec<u8> {
    let mut k = Vec::with_capacity(8 + key.len());
    k.extend_from_slice(&project_id.to_be_bytes());
    k.extend_from_slice(key.as_bytes());
    k
}

fn phase_deadline_key(project_id: u64, phase_id: u64, ownership: &str) -> Vec<u8> {
    let mut k = child_key(project_id, phase_id).to_vec();
    k.extend_from_slice(ownership.as_bytes());
    k
}

/// `[start, end)` covering every child key of `project_id`.
fn project_bounds(project_id: u64) -> ([u8; 8], [u8; 8]) {
    (
        project_id.to_be_bytes(),
        project_id.saturating_add(1).to_be_bytes(),
    )
}

// ---------------------------------------------------------------------------
// Generic table access
// ---------------------------------------------------------------------------

fn scan_project<T: DeserializeOwned>(
    table: &impl ReadableTable<&'static [u8], &'static [u8]>,
    project_id: u64,
) -> Result<Vec<T>> {
    let (start, end) = project_bounds(project_id);
    let mut rows = Vec::new();
    for entry in table
        .range(start.as_slice()..end.as_slice())
        .map_err(db_err)?
    {
        let (_, v) = entry.map_err(db_err)?;
        rows.push(serde_json::from_slice(v.value())?);
    }
    Ok(rows)
}

fn get_child<T: DeserializeOwned>(
    table: &impl ReadableTable<&'static [u8], &'static [u8]>,
    key: &[u8],
) -> Result<Option<T>> {
    match table.get(key).map_err(db_err)? {
        Some(v) => Ok(Some(serde_json::from_slice(v.value())?)),
        None => Ok(None),
    }
}

fn get_row<T: DeserializeOwned>(
    table: &impl ReadableTable<u64, &'static [u8]>,
    id: u64,
) -> Result<Option<T>> {
    match table.get(id).map_err(db_err)? {
        Some(v) => Ok(Some(serde_json::from_slice(v.value())?)),
        None => Ok(None),
    }
}

fn scan_rows<T: DeserializeOwned>(table: &impl ReadableTable<u64, &'static [u8]>) -> Result<Vec<T>> {
    let mut rows = Vec::new();
    for entry in table.iter().map_err(db_err)? {
        let (_, v) = entry.map_err(db_err)?;
        rows.push(serde_json::from_slice(v.value())?);
    }
    Ok(rows)
}

fn get_index(table: &impl ReadableTable<u64, u64>, id: u64) -> Result<Option<u64>> {
    Ok(table.get(id).map_err(db_err)?.map(|v| v.value()))
}

fn get_named(table: &impl ReadableTable<&'static str, u64>, name: &str) -> Result<Option<u64>> {
    Ok(table.get(name).map_err(db_err)?.map(|v| v.value()))
}

/// Read access shared by read and write transactions, so that a mutation
/// loads its rows inside the same transaction it commits.
pub trait Reader {
    fn project_row(&self, id: u64) -> Result<Option<Project>>;
    fn all_projects(&self) -> Result<Vec<Project>>;
    fn project_rows<T: DeserializeOwned>(&self, table: ChildTable, project_id: u64) -> Result<Vec<T>>;
    fn child_row<T: DeserializeOwned>(&self, table: ChildTable, key: &[u8]) -> Result<Option<T>>;
    fn owner(&self, index: IndexTable, id: u64) -> Result<Option<u64>>;
    fn name_owner(&self, name_key: &str) -> Result<Option<u64>>;
}

impl Reader for ReadTransaction {
    fn project_row(&self, id: u64) -> Result<Option<Project>> {
        get_row(&self.open_table(PROJECTS).map_err(db_err)?, id)
    }

    fn all_projects(&self) -> Result<Vec<Project>> {
        scan_rows(&self.open_table(PROJECTS).map_err(db_err)?)
    }

    fn project_rows<T: DeserializeOwned>(&self, table: ChildTable, project_id: u64) -> Result<Vec<T>> {
        scan_project(&self.open_table(table).map_err(db_err)?, project_id)
    }

    fn child_row<T: DeserializeOwned>(&self, table: ChildTable, key: &[u8]) -> Result<Option<T>> {
        get_child(&self.open_table(table).map_err(db_err)?, key)
    }

    fn owner(&self, index: IndexTable, id: u64) -> Result<Option<u64>> {
        get_index(&self.open_table(index).map_err(db_err)?, id)
    }

    fn name_owner(&self, name_key: &str) -> Result<Option<u64>> {
        get_named(&self.open_table(PROJECT_NAMES).map_err(db_err)?, name_key)
    }
}

impl Reader for WriteTransaction {
    fn project_row(&self, id: u64) -> Result<Option<Project>> {
        get_row(&self.open_table(PROJECTS).map_err(db_err)?, id)
    }

    fn all_projects(&self) -> Result<Vec<Project>> {
        scan_rows(&self.open_table(PROJECTS).map_err(db_err)?)
    }

    fn project_rows<T: DeserializeOwned>(&self, table: ChildTable, project_id: u64) -> Result<Vec<T>> {
        scan_project(&self.open_table(table).map_err(db_err)?, project_id)
    }

    fn child_row<T: DeserializeOwned>(&self, table: ChildTable, key: &[u8]) -> Result<Option<T>> {
        get_child(&self.open_table(table).map_err(db_err)?, key)
    }

    fn owner(&self, index: IndexTable, id: u64) -> Result<Option<u64>> {
        get_index(&self.open_table(index).map_err(db_err)?, id)
    }

    fn name_owner(&self, name_key: &str) -> Result<Option<u64>> {
        get_named(&self.open_table(PROJECT_NAMES).map_err(db_err)?, name_key)
    }
}

// ---------------------------------------------------------------------------
// PortalDb
// ---------------------------------------------------------------------------

pub struct PortalDb {
    db: Database,
}

impl PortalDb {
    /// Open or create the database at `path`, creating every table.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path).map_err(db_err)?;
        let wt = db.begin_write().map_err(db_err)?;
        for table in [PROJECTS] {
            wt.open_table(table).map_err(db_err)?;
        }
        for table in CHILD_TABLES {
            wt.open_table(table).map_err(db_err)?;
        }
        for table in [TASK_INDEX, PHASE_INDEX, ACTION_INDEX] {
            wt.open_table(table).map_err(db_err)?;
        }
        wt.open_table(PROJECT_NAMES).map_err(db_err)?;
        wt.open_table(SEQUENCES).map_err(db_err)?;
        wt.commit().map_err(db_err)?;
        Ok(Self { db })
    }

    /// Run `f` in one write transaction. Commits on `Ok`, aborts on `Err`.
    pub fn write<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&WriteTransaction) -> Result<T>,
    {
        let wt = self.db.begin_write().map_err(db_err)?;
        match f(&wt) {
            Ok(value) => {
                wt.commit().map_err(db_err)?;
                Ok(value)
            }
            Err(e) => {
                wt.abort().map_err(db_err)?;
                Err(e)
            }
        }
    }

    pub fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&ReadTransaction) -> Result<T>,
    {
        let rt = self.db.begin_read().map_err(db_err)?;
        f(&rt)
    }
}

// ---------------------------------------------------------------------------
// Bundle: a project with its phases and tasks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Bundle {
    pub project: Project,
    pub phases: Vec<Phase>,
    pub tasks: Vec<Task>,
}

pub fn load_project(r: &impl Reader, project_id: u64) -> Result<Project> {
    r.project_row(project_id)?
        .ok_or(PortalError::ProjectNotFound(project_id))
}

pub fn load_bundle(r: &impl Reader, project_id: u64) -> Result<Bundle> {
    let project = load_project(r, project_id)?;
    let mut phases: Vec<Phase> = r.project_rows(PHASES, project_id)?;
    phases.sort_by_key(|p| p.phase_number);
    let mut tasks: Vec<Task> = r.project_rows(TASKS, project_id)?;
    tasks.sort_by_key(|t| (t.phase_number, t.task_order));
    Ok(Bundle {
        project,
        phases,
        tasks,
    })
}

pub fn list_projects(r: &impl Reader) -> Result<Vec<Project>> {
    r.all_projects()
}

pub fn project_of_task(r: &impl Reader, task_id: u64) -> Result<u64> {
    r.owner(TASK_INDEX, task_id)?
        .ok_or_else(|| PortalError::TaskNotFound(task_id.to_string()))
}

pub fn project_of_phase(r: &impl Reader, phase_id: u64) -> Result<u64> {
    r.owner(PHASE_INDEX, phase_id)?
        .ok_or(PortalError::PhaseNotFound(phase_id))
}

pub fn load_action(r: &impl Reader, action_id: u64) -> Result<TaskAction> {
    let project_id = r
        .owner(ACTION_INDEX, action_id)?
        .ok_or(PortalError::ActionNotFound(action_id))?;
    r.child_row(TASK_ACTIONS, &child_key(project_id, action_id))?
        .ok_or(PortalError::ActionNotFound(action_id))
}

pub fn actions_for_project(r: &impl Reader, project_id: u64) -> Result<Vec<TaskAction>> {
    r.project_rows(TASK_ACTIONS, project_id)
}

pub fn logs_for_project(r: &impl Reader, project_id: u64) -> Result<Vec<ExecutionLog>> {
    r.project_rows(EXECUTION_LOGS, project_id)
}

/// Outputs of a project in key order.
pub fn outputs(r: &impl Reader, project_id: u64) -> Result<Vec<Output>> {
    r.project_rows(PROJECT_OUTPUTS, project_id)
}

pub fn output(r: &impl Reader, project_id: u64, key: &str) -> Result<Option<Output>> {
    r.child_row(PROJECT_OUTPUTS, &output_key(project_id, key))
}

/// Phase deadlines of a project in `(phase id, ownership)` key order.
pub fn phase_deadlines(r: &impl Reader, project_id: u64) -> Result<Vec<PhaseDeadline>> {
    r.project_rows(PHASE_DEADLINES, project_id)
}

pub fn task_deadlines(r: &impl Reader, project_id: u64) -> Result<Vec<TaskDeadline>> {
    r.project_rows(TASK_DEADLINES, project_id)
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

fn next_in(tx: &WriteTransaction, sequence: &str) -> Result<u64> {
    let mut table = tx.open_table(SEQUENCES).map_err(db_err)?;
    let next = get_named(&table, sequence)?.unwrap_or(0) + 1;
    table.insert(sequence, next).map_err(db_err)?;
    Ok(next)
}

/// Allocate a row id. Ids are unique across every table.
pub fn next_id(tx: &WriteTransaction) -> Result<u64> {
    next_in(tx, ROW_IDS)
}

fn put_child<T: Serialize>(tx: &WriteTransaction, table: ChildTable, key: &[u8], row: &T) -> Result<()> {
    let bytes = serde_json::to_vec(row)?;
    let mut t = tx.open_table(table).map_err(db_err)?;
    t.insert(key, bytes.as_slice()).map_err(db_err)?;
    Ok(())
}

fn put_project(tx: &WriteTransaction, project: &Project) -> Result<()> {
    let bytes = serde_json::to_vec(project)?;
    let mut t = tx.open_table(PROJECTS).map_err(db_err)?;
    t.insert(project.id, bytes.as_slice()).map_err(db_err)?;
    Ok(())
}

fn put_index(tx: &WriteTransaction, index: IndexTable, ids: &[u64], project_id: u64) -> Result<()> {
    let mut t = tx.open_table(index).map_err(db_err)?;
    for id in ids {
        t.insert(*id, project_id).map_err(db_err)?;
    }
    Ok(())
}

/// Claim `environment/project_name` for `project_id`. Fails if another
/// project already holds it.
pub fn claim_name(tx: &WriteTransaction, project: &Project) -> Result<()> {
    let key = project.name_key();
    if let Some(owner) = tx.name_owner(&key)? {
        if owner != project.id {
            return Err(PortalError::DuplicateProject {
                name: project.project_name.clone(),
                environment: project.environment.to_string(),
            });
        }
    }
    let mut t = tx.open_table(PROJECT_NAMES).map_err(db_err)?;
    t.insert(key.as_str(), project.id).map_err(db_err)?;
    Ok(())
}

pub fn release_name(tx: &WriteTransaction, name_key: &str) -> Result<()> {
    let mut t = tx.open_table(PROJECT_NAMES).map_err(db_err)?;
    t.remove(name_key).map_err(db_err)?;
    Ok(())
}

/// Persist a freshly instantiated project and all of its rows.
pub fn insert_new(tx: &WriteTransaction, np: &NewProject) -> Result<()> {
    let pid = np.project.id;
    claim_name(tx, &np.project)?;
    put_project(tx, &np.project)?;
    {
        let mut t = tx.open_table(PHASES).map_err(db_err)?;
        for phase in &np.phases {
            let bytes = serde_json::to_vec(phase)?;
            t.insert(child_key(pid, phase.id).as_slice(), bytes.as_slice())
                .map_err(db_err)?;
        }
    }
    {
        let mut t = tx.open_table(TASKS).map_err(db_err)?;
        for task in &np.tasks {
            let bytes = serde_json::to_vec(task)?;
            t.insert(child_key(pid, task.id).as_slice(), bytes.as_slice())
                .map_err(db_err)?;
        }
    }
    {
        let mut t = tx.open_table(TASK_ACTIONS).map_err(db_err)?;
        for action in &np.actions {
            let bytes = serde_json::to_vec(action)?;
            t.insert(child_key(pid, action.id).as_slice(), bytes.as_slice())
                .map_err(db_err)?;
        }
    }
    let phase_ids: Vec<u64> = np.phases.iter().map(|p| p.id).collect();
    let task_ids: Vec<u64> = np.tasks.iter().map(|t| t.id).collect();
    let action_ids: Vec<u64> = np.actions.iter().map(|a| a.id).collect();
    put_index(tx, PHASE_INDEX, &phase_ids, pid)?;
    put_index(tx, TASK_INDEX, &task_ids, pid)?;
    put_index(tx, ACTION_INDEX, &action_ids, pid)?;
    Ok(())
}

/// Write back the project row and every phase and task row of `bundle`.
pub fn save_bundle(tx: &WriteTransaction, bundle: &Bundle) -> Result<()> {
    let pid = bundle.project.id;
    put_project(tx, &bundle.project)?;
    {
        let mut t = tx.open_table(PHASES).map_err(db_err)?;
        for phase in &bundle.phases {
            let bytes = serde_json::to_vec(phase)?;
            t.insert(child_key(pid, phase.id).as_slice(), bytes.as_slice())
                .map_err(db_err)?;
        }
    }
    let mut t = tx.open_table(TASKS).map_err(db_err)?;
    for task in &bundle.tasks {
        let bytes = serde_json::to_vec(task)?;
        t.insert(child_key(pid, task.id).as_slice(), bytes.as_slice())
            .map_err(db_err)?;
    }
    Ok(())
}

pub fn save_project(tx: &WriteTransaction, project: &Project) -> Result<()> {
    put_project(tx, project)
}

pub fn append_log(tx: &WriteTransaction, log: &ExecutionLog) -> Result<()> {
    put_child(tx, EXECUTION_LOGS, &child_key(log.project_id, log.id), log)
}

/// Upsert by `(project_id, key)`, stamping a fresh write sequence.
pub fn put_output(tx: &WriteTransaction, output: &mut Output) -> Result<()> {
    output.seq = next_in(tx, OUTPUT_WRITES)?;
    put_child(
        tx,
        PROJECT_OUTPUTS,
        &output_key(output.project_id, &output.key),
        output,
    )
}

/// Upsert by `(phase, ownership)`.
pub fn put_phase_deadline(tx: &WriteTransaction, deadline: &PhaseDeadline) -> Result<()> {
    let key = phase_deadline_key(deadline.project_id, deadline.phase_id, &deadline.ownership);
    put_child(tx, PHASE_DEADLINES, &key, deadline)
}

/// Upsert by task.
pub fn put_task_deadline(tx: &WriteTransaction, deadline: &TaskDeadline) -> Result<()> {
    let key = child_key(deadline.project_id, deadline.task_id);
    put_child(tx, TASK_DEADLINES, &key, deadline)
}

fn remove_project_range(tx: &WriteTransaction, table: ChildTable, project_id: u64) -> Result<usize> {
    let (start, end) = project_bounds(project_id);
    let mut t = tx.open_table(table).map_err(db_err)?;
    let mut keys: Vec<Vec<u8>> = Vec::new();
    for entry in t.range(start.as_slice()..end.as_slice()).map_err(db_err)? {
        let (k, _) = entry.map_err(db_err)?;
        keys.push(k.value().to_vec());
    }
    for k in &keys {
        t.remove(k.as_slice()).map_err(db_err)?;
    }
    Ok(keys.len())
}

fn remove_index(tx: &WriteTransaction, index: IndexTable, ids: &[u64]) -> Result<()> {
    let mut t = tx.open_table(index).map_err(db_err)?;
    for id in ids {
        t.remove(*id).map_err(db_err)?;
    }
    Ok(())
}

/// Remove a project and every row it owns.
pub fn delete_project(tx: &WriteTransaction, project_id: u64) -> Result<()> {
    let bundle = load_bundle(tx, project_id)?;
    let actions = actions_for_project(tx, project_id)?;

    let phase_ids: Vec<u64> = bundle.phases.iter().map(|p| p.id).collect();
    let task_ids: Vec<u64> = bundle.tasks.iter().map(|t| t.id).collect();
    let action_ids: Vec<u64> = actions.iter().map(|a| a.id).collect();
    remove_index(tx, PHASE_INDEX, &phase_ids)?;
    remove_index(tx, TASK_INDEX, &task_ids)?;
    remove_index(tx, ACTION_INDEX, &action_ids)?;

    for table in CHILD_TABLES {
        remove_project_range(tx, table, project_id)?;
    }
    release_name(tx, &bundle.project.name_key())?;
    let mut t = tx.open_table(PROJECTS).map_err(db_err)?;
    t.remove(project_id).map_err(db_err)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
