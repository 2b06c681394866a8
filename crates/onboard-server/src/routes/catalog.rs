use axum::extract::State;
use axum::Json;
use onboard_core::catalog::Catalog;

use crate::state::AppState;

/// GET /api/catalog: the phase and task template the portal was started with.
pub async fn get_catalog(State(app): State<AppState>) -> Json<Catalog> {
    Json(app.portal.catalog().clone())
}
