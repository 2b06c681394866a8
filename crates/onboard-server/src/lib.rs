pub mod error;
pub mod routes;
pub mod state;

use axum::routing::{get, post, put};
use axum::Router;
use onboard_core::Portal;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(portal: Arc<Portal>) -> Router {
    let app_state = state::AppState::new(portal);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Catalog
        .route("/api/catalog", get(routes::catalog::get_catalog))
        // Projects
        .route(
            "/api/projects",
            get(routes::projects::list_projects).post(routes::projects::create_project),
        )
        .route(
            "/api/projects/{id}",
            get(routes::projects::get_project)
                .put(routes::projects::update_project)
                .delete(routes::projects::delete_project),
        )
        .route(
            "/api/projects/{id}/cancel",
            post(routes::projects::cancel_project),
        )
        .route(
            "/api/projects/{id}/recompute",
            post(routes::projects::recompute_project),
        )
        .route("/api/projects/{id}/stats", get(routes::projects::get_stats))
        .route("/api/projects/{id}/graph", get(routes::projects::get_graph))
        .route(
            "/api/projects/{id}/variance",
            get(routes::projects::get_variance),
        )
        // Outputs
        .route(
            "/api/projects/{id}/outputs",
            get(routes::outputs::list_outputs),
        )
        .route(
            "/api/projects/{id}/outputs/{key}",
            get(routes::outputs::get_output).put(routes::outputs::set_output),
        )
        .route(
            "/api/projects/{id}/export",
            get(routes::outputs::export_outputs),
        )
        // Phases
        .route("/api/phases/{id}", get(routes::phases::get_phase))
        .route(
            "/api/phases/{id}/recompute",
            post(routes::phases::recompute_phase),
        )
        .route(
            "/api/phases/{id}/deadline",
            post(routes::phases::set_deadline),
        )
        .route(
            "/api/phases/{id}/deadlines",
            get(routes::phases::list_deadlines),
        )
        // Tasks
        .route("/api/tasks", get(routes::tasks::list_tasks))
        .route("/api/tasks/{id}", get(routes::tasks::get_task))
        .route("/api/tasks/{id}/start", post(routes::tasks::start_task))
        .route(
            "/api/tasks/{id}/complete",
            post(routes::tasks::complete_task),
        )
        .route("/api/tasks/{id}/reopen", post(routes::tasks::reopen_task))
        .route(
            "/api/tasks/{id}/checklist/{index}",
            put(routes::tasks::check_item),
        )
        .route(
            "/api/tasks/{id}/logs",
            get(routes::tasks::list_logs).post(routes::tasks::add_log),
        )
        .route(
            "/api/tasks/{id}/outputs",
            post(routes::tasks::record_output),
        )
        .route(
            "/api/tasks/{id}/deadline",
            post(routes::tasks::set_deadline),
        )
        // Actions
        .route("/api/actions/{id}/link", get(routes::actions::get_link))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

/// Open the portal under `root` and serve the API until the process exits.
pub async fn serve(root: PathBuf, port: u16, open_browser: bool) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    serve_on(root, listener, open_browser).await
}

/// Serve on a pre-bound listener so the caller can read the actual port
/// first (useful when `port = 0` and the OS picks a free port).
pub async fn serve_on(
    root: PathBuf,
    listener: tokio::net::TcpListener,
    open_browser: bool,
) -> anyhow::Result<()> {
    let portal = tokio::task::spawn_blocking(move || Portal::open(&root)).await??;
    let actual_port = listener.local_addr()?.port();
    let app = build_router(Arc::new(portal));

    tracing::info!("onboarding portal listening on http://localhost:{actual_port}");

    if open_browser {
        let url = format!("http://localhost:{actual_port}/api/projects");
        let _ = open::that(&url);
    }

    axum::serve(listener, app).await?;
    Ok(())
}
