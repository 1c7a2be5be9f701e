use axum::extract::State;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;

use crate::auth::CurrentUser;
use crate::error::AppError;
use crate::state::AppState;

/// GET / — send anonymous visitors to the CMS login, everyone else to `/api/me`.
pub async fn index(State(app): State<AppState>, CurrentUser(user): CurrentUser) -> Response {
    match user {
        Some(_) => Redirect::to("/api/me").into_response(),
        None => Redirect::to(&login_url(&app.config.cms_url)).into_response(),
    }
}

fn login_url(cms_url: &str) -> String {
    format!("{}/login/?next=/", cms_url.trim_end_matches('/'))
}

/// GET /api/me — the caller, whether a build is running, and the URLs the
/// dashboard links to.
pub async fn get_me(
    State(app): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = user.ok_or_else(AppError::unauthorized)?;
    Ok(Json(serde_json::json!({
        "user": user,
        "building": app.guard.is_running(),
        "preview_url": app.config.preview_url,
        "production_url": app.config.production_url,
        "cms_url": app.config.cms_url,
    })))
}
