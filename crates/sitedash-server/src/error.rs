use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use sitedash_core::DashError;

/// Sentinel carried through the `anyhow::Error` chain for requests without a
/// CMS identity.
#[derive(Debug)]
struct UnauthorizedError;

impl std::fmt::Display for UnauthorizedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unauthorized")
    }
}

impl std::error::Error for UnauthorizedError {}

/// Unified error type for HTTP responses.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    /// 401 for anonymous callers.
    pub fn unauthorized() -> Self {
        Self(UnauthorizedError.into())
    }

    /// Blocking task panicked or was cancelled.
    pub fn join(e: tokio::task::JoinError) -> Self {
        Self(anyhow::anyhow!("task join error: {e}"))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.0.downcast_ref::<UnauthorizedError>().is_some() {
            let body = serde_json::json!({ "error": "unauthorized" });
            return (StatusCode::UNAUTHORIZED, axum::Json(body)).into_response();
        }

        let (status, message) = match self.0.downcast_ref::<DashError>() {
            Some(e) => match e {
                DashError::BuildNotFound(_) => (StatusCode::NOT_FOUND, e.to_string()),
                DashError::NotDeployable { .. } => (StatusCode::CONFLICT, e.to_string()),
                // The publish failure detail stays in the server log.
                DashError::DeployFailed { .. } => {
                    (StatusCode::BAD_GATEWAY, "deploy failed".to_string())
                }
                DashError::Config(_) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
                DashError::CommandSpawnFailed { .. }
                | DashError::CommandFailed { .. }
                | DashError::MissingOutput(_)
                | DashError::Store(_)
                | DashError::Io(_)
                | DashError::Yaml(_)
                | DashError::Json(_) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            },
            None => (StatusCode::INTERNAL_SERVER_ERROR, self.0.to_string()),
        };

        let body = serde_json::json!({ "error": message });
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
