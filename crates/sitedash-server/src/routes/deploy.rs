use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use sitedash_core::build::{BuildRecord, Slot};
use sitedash_core::deploy::{deploy_target, password_matches, DeployCoordinator, DeployOutcome};
use tracing::warn;

use crate::auth::CurrentUser;
use crate::error::AppError;
use crate::state::AppState;

/// POST /api/builds/{id}/deploy/preview
pub async fn deploy_preview(
    State(app): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<u64>,
) -> Result<Json<BuildRecord>, AppError> {
    let user = user.ok_or_else(AppError::unauthorized)?;
    let task_app = app.clone();
    let result = tokio::task::spawn_blocking(move || {
        let target = deploy_target(&task_app.config, task_app.runner.as_ref())?;
        DeployCoordinator::new(&task_app.db, &task_app.config, target.as_ref()).deploy(
            id,
            Slot::Preview,
            &user,
        )
    })
    .await
    .map_err(AppError::join)?;
    // The record changed even when the publish failed.
    app.notify();
    Ok(Json(result?))
}

#[derive(Debug, Deserialize)]
pub struct ProductionBody {
    #[serde(default)]
    pub password: String,
}

/// POST /api/builds/{id}/deploy/production — `{ "deployed": bool }`.
///
/// Anonymous callers, a wrong password and unknown builds all come back as
/// `false` without touching any record.
pub async fn deploy_production(
    State(app): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<u64>,
    Json(body): Json<ProductionBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let Some(user) = user else {
        return Ok(Json(serde_json::json!({ "deployed": false })));
    };
    if !password_matches(&body.password, &app.config.deploy_password) {
        warn!(build_id = id, user = %user, "production deploy declined: wrong password");
        return Ok(Json(serde_json::json!({ "deployed": false })));
    }
    let task_app = app.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        let target = deploy_target(&task_app.config, task_app.runner.as_ref())?;
        DeployCoordinator::new(&task_app.db, &task_app.config, target.as_ref())
            .deploy_production(id, &body.password, &user)
    })
    .await
    .map_err(AppError::join)?;
    app.notify();
    let deployed = matches!(outcome?, DeployOutcome::Deployed(_));
    Ok(Json(serde_json::json!({ "deployed": deployed })))
}
