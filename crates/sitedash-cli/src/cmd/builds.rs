use crate::output::{print_builds, print_json};
use anyhow::{bail, Context, Result};
use sitedash_core::build::{BuildStatus, NewBuild};
use sitedash_core::config::DashboardConfig;
use sitedash_core::db::BuildDb;
use sitedash_core::pipeline::execute_build;
use sitedash_core::runner::ProcessRunner;

pub fn open_db(config: &DashboardConfig) -> Result<BuildDb> {
    let path = config.db_path();
    BuildDb::open(&path).with_context(|| format!("failed to open {}", path.display()))
}

// ---------------------------------------------------------------------------
// builds
// ---------------------------------------------------------------------------

pub fn list(config: &DashboardConfig, limit: usize, user: Option<&str>, json: bool) -> Result<()> {
    let records = open_db(config)?.latest(limit, user)?;
    if json {
        print_json(&records)
    } else {
        print_builds(&records);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// build
// ---------------------------------------------------------------------------

/// Run the whole pipeline in this process. The server's single-flight guard
/// lives in the server process, so this must not run next to `serve` on the
/// same work directory; redb's file lock refuses the second open anyway.
pub fn build(
    config: &DashboardConfig,
    message: String,
    user: String,
    source: Option<String>,
    json: bool,
) -> Result<()> {
    let db = open_db(config)?;
    let record = db.create(&NewBuild::new(message, user), source.as_deref())?;
    let status = execute_build(&db, config, &ProcessRunner, record.id)?;
    let record = db.get(record.id)?.context("build record vanished")?;

    if json {
        print_json(&record)?;
    } else {
        println!("build {} finished: {}", record.id, record.status);
    }
    if status == BuildStatus::Error {
        bail!("build {} failed; see the log above", record.id);
    }
    Ok(())
}
