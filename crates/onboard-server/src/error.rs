use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use onboard_core::PortalError;

/// Carries an explicit 404 for lookups that are absent rather than unknown
/// ids (an output key with no value, for example).
#[derive(Debug)]
struct NotFoundError(String);

impl std::fmt::Display for NotFoundError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for NotFoundError {}

// ---------------------------------------------------------------------------
// AppError: unified error type for HTTP responses
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(PortalError::Validation(msg.into()).into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self(NotFoundError(msg.into()).into())
    }
}

pub fn status_for(err: &PortalError) -> StatusCode {
    match err {
        PortalError::Validation(_) | PortalError::Template(_) => StatusCode::BAD_REQUEST,
        PortalError::ProjectNotFound(_)
        | PortalError::PhaseNotFound(_)
        | PortalError::TaskNotFound(_)
        | PortalError::ActionNotFound(_) => StatusCode::NOT_FOUND,
        PortalError::DuplicateProject { .. }
        | PortalError::PrerequisiteUnmet { .. }
        | PortalError::ProjectClosed(_) => StatusCode::CONFLICT,
        PortalError::InvalidTransition { .. }
        | PortalError::ValidationIncomplete { .. }
        | PortalError::OutputsMissing { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        PortalError::NotInitialized
        | PortalError::Catalog(_)
        | PortalError::Db(_)
        | PortalError::Io(_)
        | PortalError::Yaml(_)
        | PortalError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = if self.0.downcast_ref::<NotFoundError>().is_some() {
            StatusCode::NOT_FOUND
        } else if let Some(e) = self.0.downcast_ref::<PortalError>() {
            status_for(e)
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };

        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
