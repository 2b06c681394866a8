use crate::error::AppError;
use onboard_core::Portal;
use std::sync::Arc;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub portal: Arc<Portal>,
}

impl AppState {
    pub fn new(portal: Arc<Portal>) -> Self {
        Self { portal }
    }

    /// Run a portal operation on the blocking pool. Every operation is a
    /// synchronous database transaction.
    pub async fn run<T, F>(&self, f: F) -> Result<T, AppError>
    where
        F: FnOnce(&Portal) -> onboard_core::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let portal = self.portal.clone();
        let result = tokio::task::spawn_blocking(move || f(&portal))
            .await
            .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;
        Ok(result)
    }
}
