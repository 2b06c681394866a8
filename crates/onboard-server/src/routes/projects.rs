use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use onboard_core::aggregate::{DependencyGraph, ProjectStats};
use onboard_core::deadline::VarianceReport;
use onboard_core::portal::{ProjectDetail, ProjectSummary};
use onboard_core::project::{Project, ProjectFilter, ProjectMeta, ProjectUpdate};
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateProjectBody {
    #[serde(flatten)]
    pub meta: ProjectMeta,
    pub phases: Vec<u8>,
}

/// GET /api/projects: list projects, optionally filtered by
/// `environment`, `status` and `domain`.
pub async fn list_projects(
    State(app): State<AppState>,
    Query(filter): Query<ProjectFilter>,
) -> Result<Json<Vec<ProjectSummary>>, AppError> {
    let projects = app.run(move |p| p.list_projects(&filter)).await?;
    Ok(Json(projects))
}

/// POST /api/projects: instantiate a project from the selected phases.
pub async fn create_project(
    State(app): State<AppState>,
    Json(body): Json<CreateProjectBody>,
) -> Result<(StatusCode, Json<ProjectDetail>), AppError> {
    let detail = app
        .run(move |p| p.create_project(body.meta, &body.phases))
        .await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

/// GET /api/projects/:id: project with phases, tasks and outputs.
pub async fn get_project(
    State(app): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<ProjectDetail>, AppError> {
    Ok(Json(app.run(move |p| p.project_detail(id)).await?))
}

/// PUT /api/projects/:id: edit project metadata.
pub async fn update_project(
    State(app): State<AppState>,
    Path(id): Path<u64>,
    Json(update): Json<ProjectUpdate>,
) -> Result<Json<Project>, AppError> {
    Ok(Json(app.run(move |p| p.update_project(id, update)).await?))
}

/// DELETE /api/projects/:id
pub async fn delete_project(
    State(app): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<serde_json::Value>, AppError> {
    app.run(move |p| p.delete_project(id)).await?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}

/// POST /api/projects/:id/cancel
pub async fn cancel_project(
    State(app): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<Project>, AppError> {
    Ok(Json(app.run(move |p| p.cancel_project(id)).await?))
}

/// POST /api/projects/:id/recompute
pub async fn recompute_project(
    State(app): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<Project>, AppError> {
    Ok(Json(app.run(move |p| p.recompute_project(id)).await?))
}

/// GET /api/projects/:id/stats
pub async fn get_stats(
    State(app): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<ProjectStats>, AppError> {
    Ok(Json(app.run(move |p| p.stats(id)).await?))
}

/// GET /api/projects/:id/graph: phase dependency graph with progress.
pub async fn get_graph(
    State(app): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<DependencyGraph>, AppError> {
    Ok(Json(app.run(move |p| p.dependency_graph(id)).await?))
}

/// GET /api/projects/:id/variance: deadlines and slip counts.
pub async fn get_variance(
    State(app): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<VarianceReport>, AppError> {
    Ok(Json(app.run(move |p| p.variance_report(id)).await?))
}
