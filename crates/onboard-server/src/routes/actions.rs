use axum::extract::{Path, State};
use axum::Json;
use onboard_core::link::ActionLink;

use crate::error::AppError;
use crate::state::AppState;

/// GET /api/actions/:id/link: resolved URL for one task action.
pub async fn get_link(
    State(app): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<ActionLink>, AppError> {
    let link = app.run(move |p| p.build_action_link(id)).await?;
    Ok(Json(link))
}
