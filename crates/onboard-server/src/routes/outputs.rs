use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use onboard_core::output::{ExportFormat, Output};
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct SetOutputBody {
    pub value: String,
    #[serde(default)]
    pub phase_number: Option<u8>,
}

#[derive(Deserialize)]
pub struct ExportQuery {
    #[serde(default)]
    pub format: Option<String>,
}

/// GET /api/projects/:id/outputs: most recent write first.
pub async fn list_outputs(
    State(app): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<Vec<Output>>, AppError> {
    Ok(Json(app.run(move |p| p.get_outputs(id)).await?))
}

/// GET /api/projects/:id/outputs/:key
pub async fn get_output(
    State(app): State<AppState>,
    Path((id, key)): Path<(u64, String)>,
) -> Result<Json<Output>, AppError> {
    let lookup = key.clone();
    match app.run(move |p| p.get_output(id, &lookup)).await? {
        Some(out) => Ok(Json(out)),
        None => Err(AppError::not_found(format!(
            "output '{key}' is not set on project {id}"
        ))),
    }
}

/// PUT /api/projects/:id/outputs/:key: upsert, last write wins.
pub async fn set_output(
    State(app): State<AppState>,
    Path((id, key)): Path<(u64, String)>,
    Json(body): Json<SetOutputBody>,
) -> Result<Json<Output>, AppError> {
    let out = app
        .run(move |p| p.set_output(id, &key, &body.value, body.phase_number))
        .await?;
    Ok(Json(out))
}

/// GET /api/projects/:id/export?format=json|yaml
pub async fn export_outputs(
    State(app): State<AppState>,
    Path(id): Path<u64>,
    Query(q): Query<ExportQuery>,
) -> Result<Response, AppError> {
    let format: ExportFormat = match q.format.as_deref() {
        Some(f) => f.parse()?,
        None => ExportFormat::Json,
    };
    let export = app.run(move |p| p.export_outputs(id)).await?;
    let body = export.render(format)?;
    let content_type = match format {
        ExportFormat::Json => "application/json",
        ExportFormat::Yaml => "application/yaml",
    };
    Ok(([(header::CONTENT_TYPE, content_type)], body).into_response())
}
