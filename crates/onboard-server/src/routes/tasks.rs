use axum::extract::{Path, Query, State};
use axum::Json;
use onboard_core::deadline::{DeadlineDates, TaskDeadline};
use onboard_core::log::{ExecutionLog, LogEntry};
use onboard_core::output::Output;
use onboard_core::portal::{TaskChange, TaskDetail, TaskListing};
use onboard_core::task::TaskFilter;
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Deserialize, Default)]
pub struct CompleteBody {
    #[serde(default)]
    pub author: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct ReopenBody {
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Deserialize)]
pub struct CheckBody {
    #[serde(default = "default_checked")]
    pub checked: bool,
}

fn default_checked() -> bool {
    true
}

#[derive(Deserialize)]
pub struct LogBody {
    #[serde(flatten)]
    pub entry: LogEntry,
    #[serde(default)]
    pub author: Option<String>,
}

#[derive(Deserialize)]
pub struct OutputBody {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub author: Option<String>,
}

/// GET /api/tasks?project_id=&phase=&status=&ownership=
pub async fn list_tasks(
    State(app): State<AppState>,
    Query(filter): Query<TaskFilter>,
) -> Result<Json<Vec<TaskListing>>, AppError> {
    Ok(Json(app.run(move |p| p.list_tasks(&filter)).await?))
}

/// GET /api/tasks/:id: task with rendered command, action links and logs.
pub async fn get_task(
    State(app): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<TaskDetail>, AppError> {
    Ok(Json(app.run(move |p| p.task_detail(id)).await?))
}

/// POST /api/tasks/:id/start
pub async fn start_task(
    State(app): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<TaskChange>, AppError> {
    Ok(Json(app.run(move |p| p.start_task(id)).await?))
}

/// POST /api/tasks/:id/complete
pub async fn complete_task(
    State(app): State<AppState>,
    Path(id): Path<u64>,
    body: Option<Json<CompleteBody>>,
) -> Result<Json<TaskChange>, AppError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let change = app
        .run(move |p| p.complete_task(id, body.author.as_deref()))
        .await?;
    Ok(Json(change))
}

/// POST /api/tasks/:id/reopen
pub async fn reopen_task(
    State(app): State<AppState>,
    Path(id): Path<u64>,
    body: Option<Json<ReopenBody>>,
) -> Result<Json<TaskChange>, AppError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let change = app
        .run(move |p| p.reopen_task(id, body.author.as_deref(), body.reason.as_deref()))
        .await?;
    Ok(Json(change))
}

/// PUT /api/tasks/:id/checklist/:index
pub async fn check_item(
    State(app): State<AppState>,
    Path((id, index)): Path<(u64, usize)>,
    Json(body): Json<CheckBody>,
) -> Result<Json<TaskChange>, AppError> {
    Ok(Json(app.run(move |p| p.check_item(id, index, body.checked)).await?))
}

/// GET /api/tasks/:id/logs
pub async fn list_logs(
    State(app): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<Vec<ExecutionLog>>, AppError> {
    Ok(Json(app.run(move |p| p.task_logs(id)).await?))
}

/// POST /api/tasks/:id/logs: append a note, output or error entry.
pub async fn add_log(
    State(app): State<AppState>,
    Path(id): Path<u64>,
    Json(body): Json<LogBody>,
) -> Result<Json<ExecutionLog>, AppError> {
    let log = app
        .run(move |p| p.record_log(id, body.entry, body.author.as_deref()))
        .await?;
    Ok(Json(log))
}

/// POST /api/tasks/:id/outputs: record an output produced by this task.
pub async fn record_output(
    State(app): State<AppState>,
    Path(id): Path<u64>,
    Json(body): Json<OutputBody>,
) -> Result<Json<Output>, AppError> {
    let out = app
        .run(move |p| p.record_output(id, &body.key, &body.value, body.author.as_deref()))
        .await?;
    Ok(Json(out))
}

/// POST /api/tasks/:id/deadline
pub async fn set_deadline(
    State(app): State<AppState>,
    Path(id): Path<u64>,
    Json(dates): Json<DeadlineDates>,
) -> Result<Json<TaskDeadline>, AppError> {
    Ok(Json(app.run(move |p| p.set_task_deadline(id, dates)).await?))
}
