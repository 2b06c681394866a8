use axum::extract::{Path, State};
use axum::Json;
use onboard_core::deadline::{DeadlineDates, PhaseDeadline};
use onboard_core::portal::PhaseView;
use onboard_core::project::Phase;
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct PhaseDeadlineBody {
    /// Owning team; the platform team when absent.
    #[serde(default)]
    pub ownership: Option<String>,
    #[serde(flatten)]
    pub dates: DeadlineDates,
}

/// GET /api/phases/:id
pub async fn get_phase(
    State(app): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<PhaseView>, AppError> {
    Ok(Json(app.run(move |p| p.phase(id)).await?))
}

/// POST /api/phases/:id/recompute
pub async fn recompute_phase(
    State(app): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<Phase>, AppError> {
    Ok(Json(app.run(move |p| p.recompute_phase(id)).await?))
}

/// POST /api/phases/:id/deadline: upsert one team's deadline.
pub async fn set_deadline(
    State(app): State<AppState>,
    Path(id): Path<u64>,
    Json(body): Json<PhaseDeadlineBody>,
) -> Result<Json<PhaseDeadline>, AppError> {
    let deadline = app
        .run(move |p| p.set_phase_deadline(id, body.ownership.as_deref(), body.dates))
        .await?;
    Ok(Json(deadline))
}

/// GET /api/phases/:id/deadlines
pub async fn list_deadlines(
    State(app): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<Vec<PhaseDeadline>>, AppError> {
    Ok(Json(app.run(move |p| p.phase_deadlines(id)).await?))
}
