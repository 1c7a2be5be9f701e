use sitedash_core::build::{BuildRecord, NewBuild};
use sitedash_core::pipeline::execute_build;
use tracing::{error, info};

use crate::error::AppError;
use crate::state::AppState;

/// Start a build in the background unless one is already running.
///
/// Returns the freshly created `working` record, or `None` when the guard is
/// held (no record, no audit entry). The permit travels with the blocking
/// task, so the guard frees up however the pipeline ends.
pub async fn start_build(
    app: &AppState,
    message: String,
    user: String,
    source: Option<String>,
) -> Result<Option<BuildRecord>, AppError> {
    let Some(permit) = app.guard.try_acquire() else {
        info!(user = %user, "build requested while another is running, ignoring");
        return Ok(None);
    };

    let db = app.db.clone();
    let record = tokio::task::spawn_blocking(move || {
        db.create(&NewBuild::new(message, user), source.as_deref())
    })
    .await
    .map_err(AppError::join)??;
    app.notify();

    let id = record.id;
    let task_app = app.clone();
    tokio::task::spawn_blocking(move || {
        let _permit = permit;
        if let Err(e) = execute_build(
            &task_app.db,
            &task_app.config,
            task_app.runner.as_ref(),
            id,
        ) {
            error!(build_id = id, error = %e, "could not finalize build record");
        }
        task_app.notify();
    });

    Ok(Some(record))
}
