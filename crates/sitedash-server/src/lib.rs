pub mod auth;
pub mod error;
pub mod jobs;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use sitedash_core::config::DashboardConfig;
use sitedash_core::runner::ProcessRunner;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve_on()` and by the integration tests.
pub fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(routes::me::index))
        .route("/api/me", get(routes::me::get_me))
        // Events (SSE)
        .route("/api/events", get(routes::events::sse_events))
        // Builds
        .route(
            "/api/builds",
            get(routes::builds::list_builds).post(routes::builds::create_build),
        )
        .route("/api/builds/{id}", get(routes::builds::get_build))
        // Deploys
        .route(
            "/api/builds/{id}/deploy/preview",
            post(routes::deploy::deploy_preview),
        )
        .route(
            "/api/builds/{id}/deploy/production",
            post(routes::deploy::deploy_production),
        )
        // Audit
        .route("/api/audit", get(routes::audit::list_audit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Start the dashboard server on a pre-bound listener.
///
/// Accepting a bound `TcpListener` lets the caller read the actual port
/// before starting (useful when `port = 0` and the OS picks a free port).
pub async fn serve_on(
    config: DashboardConfig,
    listener: tokio::net::TcpListener,
    open_browser: bool,
) -> anyhow::Result<()> {
    let actual_port = listener.local_addr()?.port();
    let app_state = tokio::task::spawn_blocking(move || {
        AppState::open(config, Arc::new(ProcessRunner))
    })
    .await??;
    let app = build_router(app_state);

    tracing::info!("sitedash listening on http://localhost:{actual_port}");

    if open_browser {
        let url = format!("http://localhost:{actual_port}");
        let _ = open::that(&url);
    }

    axum::serve(listener, app).await?;
    Ok(())
}
