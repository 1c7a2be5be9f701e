use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use sitedash_core::audit::AuditLogEntry;

use crate::auth::CurrentUser;
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct AuditQuery {
    pub limit: Option<usize>,
}

/// GET /api/audit — newest audit entries first.
pub async fn list_audit(
    State(app): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<AuditLogEntry>>, AppError> {
    user.ok_or_else(AppError::unauthorized)?;
    let limit = query.limit.unwrap_or(50).min(500);
    let db = app.db.clone();
    let entries = tokio::task::spawn_blocking(move || db.audit_entries(limit))
        .await
        .map_err(AppError::join)??;
    Ok(Json(entries))
}
