use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use sitedash_core::build::BuildRecord;
use sitedash_core::DashError;

use crate::auth::CurrentUser;
use crate::error::AppError;
use crate::jobs;
use crate::state::AppState;

/// Records shown in the dashboard's history.
const HISTORY_LEN: usize = 10;

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// `all` for everyone's builds; anything else means the caller's own.
    pub scope: Option<String>,
}

/// GET /api/builds — latest records, newest first. Anonymous callers get `[]`.
pub async fn list_builds(
    State(app): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<BuildRecord>>, AppError> {
    let Some(user) = user else {
        return Ok(Json(Vec::new()));
    };
    let everyone = query.scope.as_deref() == Some("all");
    let db = app.db.clone();
    let records = tokio::task::spawn_blocking(move || {
        db.latest(HISTORY_LEN, (!everyone).then_some(user.as_str()))
    })
    .await
    .map_err(AppError::join)??;
    Ok(Json(records))
}

#[derive(Debug, Deserialize)]
pub struct CreateBuildBody {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub source: Option<String>,
}

/// POST /api/builds — start a rebuild. `null` when anonymous or when a job
/// is already running.
pub async fn create_build(
    State(app): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<CreateBuildBody>,
) -> Result<Json<Option<BuildRecord>>, AppError> {
    let Some(user) = user else {
        return Ok(Json(None));
    };
    let record = jobs::start_build(&app, body.message, user, body.source).await?;
    Ok(Json(record))
}

/// GET /api/builds/{id} — 401 when anonymous.
pub async fn get_build(
    State(app): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<u64>,
) -> Result<Json<BuildRecord>, AppError> {
    user.ok_or_else(AppError::unauthorized)?;
    let db = app.db.clone();
    let record = tokio::task::spawn_blocking(move || db.get(id))
        .await
        .map_err(AppError::join)??
        .ok_or(DashError::BuildNotFound(id))?;
    Ok(Json(record))
}
