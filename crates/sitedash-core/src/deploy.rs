//! Publishing artifacts to the preview and production slots.
//!
//! `DeployCoordinator::deploy` is the only code that changes slot occupancy.
//! The artifact is published first; only when that succeeded are the slot
//! flags recomputed, in one store transaction (see `BuildDb::occupy_slot`).

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use sha2::{Digest, Sha256};
use tracing::{error, info, warn};

use crate::audit::AuditLogEntry;
use crate::build::{BuildRecord, BuildStatus, Slot};
use crate::config::{DashboardConfig, DeployMode};
use crate::db::BuildDb;
use crate::error::{DashError, Result};
use crate::io;
use crate::runner::{CommandRunner, Invocation};

// ---------------------------------------------------------------------------
// DeployTarget
// ---------------------------------------------------------------------------

/// Where a slot's content lives.
pub trait DeployTarget: Send + Sync {
    fn publish(&self, artifact: &Path, slot: Slot) -> Result<()>;
}

/// Slots are directories on this machine, replaced wholesale on each deploy.
#[derive(Debug, Clone)]
pub struct LocalTarget {
    pub preview: PathBuf,
    pub production: PathBuf,
}

impl LocalTarget {
    pub fn path_for(&self, slot: Slot) -> &Path {
        match slot {
            Slot::Preview => &self.preview,
            Slot::Production => &self.production,
        }
    }
}

impl DeployTarget for LocalTarget {
    fn publish(&self, artifact: &Path, slot: Slot) -> Result<()> {
        let dest = self.path_for(slot);
        info!("copying {} to {}", artifact.display(), dest.display());
        io::replace_dir(artifact, dest)
    }
}

/// Slots are Cloudflare Pages projects, pushed with `wrangler`.
pub struct CloudflareTarget<'a> {
    pub runner: &'a dyn CommandRunner,
    pub cwd: PathBuf,
    pub preview_project: String,
    pub production_project: String,
    pub preview_branch: String,
    pub production_branch: String,
    pub env: Vec<(String, String)>,
}

impl CloudflareTarget<'_> {
    pub fn invocation(&self, artifact: &Path, slot: Slot) -> Invocation {
        let (project, branch) = match slot {
            Slot::Preview => (&self.preview_project, &self.preview_branch),
            Slot::Production => (&self.production_project, &self.production_branch),
        };
        Invocation::new("npx", &self.cwd)
            .args(["wrangler", "pages", "deploy"])
            .arg(artifact.display().to_string())
            .args(["--project-name", project.as_str(), "--branch", branch.as_str()])
            .envs(&self.env)
    }
}

impl DeployTarget for CloudflareTarget<'_> {
    fn publish(&self, artifact: &Path, slot: Slot) -> Result<()> {
        if !artifact.is_dir() {
            return Err(DashError::MissingOutput(artifact.display().to_string()));
        }
        self.runner.run_checked(&self.invocation(artifact, slot))
    }
}

/// Build the target selected by `config.deploy_mode`.
pub fn deploy_target<'a>(
    config: &DashboardConfig,
    runner: &'a dyn CommandRunner,
) -> Result<Box<dyn DeployTarget + 'a>> {
    match config.deploy_mode {
        DeployMode::Local => {
            let (Some(preview), Some(production)) = (&config.preview_path, &config.production_path)
            else {
                return Err(DashError::Config(
                    "local deploy mode needs preview_path and production_path".into(),
                ));
            };
            Ok(Box::new(LocalTarget {
                preview: preview.clone(),
                production: production.clone(),
            }))
        }
        DeployMode::Cloudflare => {
            let (Some(preview), Some(production)) =
                (&config.preview_project, &config.production_project)
            else {
                return Err(DashError::Config(
                    "cloudflare deploy mode needs preview_project and production_project".into(),
                ));
            };
            let mut env = config.command_env();
            if let Some(token) = &config.cloudflare_api_token {
                env.push(("CLOUDFLARE_API_TOKEN".into(), token.clone()));
            }
            if let Some(account) = &config.cloudflare_account_id {
                env.push(("CLOUDFLARE_ACCOUNT_ID".into(), account.clone()));
            }
            Ok(Box::new(CloudflareTarget {
                runner,
                cwd: config.work_dir.clone(),
                preview_project: preview.clone(),
                production_project: production.clone(),
                preview_branch: config.cloudflare_branch_preview.clone(),
                production_branch: config.cloudflare_branch_production.clone(),
                env,
            }))
        }
    }
}

// ---------------------------------------------------------------------------
// Password gate
// ---------------------------------------------------------------------------

/// Compare a submitted deploy password with the configured one in time
/// independent of where they differ. An empty configured password never
/// matches.
pub fn password_matches(given: &str, expected: &str) -> bool {
    if expected.is_empty() {
        return false;
    }
    let a = Sha256::digest(given.as_bytes());
    let b = Sha256::digest(expected.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

// ---------------------------------------------------------------------------
// DeployCoordinator
// ---------------------------------------------------------------------------

static PREVIEW_LOCK: Mutex<()> = Mutex::new(());
static PRODUCTION_LOCK: Mutex<()> = Mutex::new(());

/// Serializes publish-and-flag for one slot, so the slot's content and its
/// flagged occupant always come from the same deploy.
fn lock_slot(slot: Slot) -> MutexGuard<'static, ()> {
    let lock = match slot {
        Slot::Preview => &PREVIEW_LOCK,
        Slot::Production => &PRODUCTION_LOCK,
    };
    lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeployOutcome {
    Deployed(BuildRecord),
    /// Wrong password or unknown build; nothing was changed.
    Declined,
}

pub struct DeployCoordinator<'a> {
    db: &'a BuildDb,
    config: &'a DashboardConfig,
    target: &'a dyn DeployTarget,
}

impl<'a> DeployCoordinator<'a> {
    pub fn new(db: &'a BuildDb, config: &'a DashboardConfig, target: &'a dyn DeployTarget) -> Self {
        Self { db, config, target }
    }

    /// Publish build `id` to `slot` and make it the slot's only occupant.
    ///
    /// On a publish failure the record is set to `inactive` and
    /// `DeployFailed` is returned; no other record is touched.
    pub fn deploy(&self, id: u64, slot: Slot, user: &str) -> Result<BuildRecord> {
        let record = self.db.get(id)?.ok_or(DashError::BuildNotFound(id))?;
        if !record.status.is_deployable() {
            return Err(DashError::NotDeployable {
                id,
                status: record.status.to_string(),
            });
        }
        let prior = record.status;
        self.db.set_status(id, BuildStatus::Working)?;
        info!(build_id = id, %slot, user = %user, "deploy started");

        let _slot = lock_slot(slot);
        let artifact = self.config.artifact_dir(id);
        if let Err(e) = self.target.publish(&artifact, slot) {
            error!(build_id = id, %slot, error = %e, "deploy failed");
            self.db.set_status(id, BuildStatus::Inactive)?;
            return Err(DashError::DeployFailed {
                slot: slot.to_string(),
                reason: e.to_string(),
            });
        }

        let updated = match self.db.occupy_slot(
            id,
            slot,
            prior,
            AuditLogEntry::publish(user, id, slot),
        ) {
            Ok(record) => record,
            Err(e) => {
                error!(build_id = id, %slot, error = %e, "recording deploy failed");
                if let Err(restore) = self.db.set_status(id, prior) {
                    error!(build_id = id, error = %restore, "could not restore build status");
                }
                return Err(e);
            }
        };
        info!(build_id = id, %slot, status = %updated.status, "deploy finished");
        Ok(updated)
    }

    pub fn authorize_production(&self, password: &str) -> bool {
        password_matches(password, &self.config.deploy_password)
    }

    /// Production deploy behind the shared deploy password.
    pub fn deploy_production(&self, id: u64, password: &str, user: &str) -> Result<DeployOutcome> {
        if !self.authorize_production(password) {
            warn!(build_id = id, user = %user, "production deploy declined: wrong password");
            return Ok(DeployOutcome::Declined);
        }
        match self.deploy(id, Slot::Production, user) {
            Ok(record) => Ok(DeployOutcome::Deployed(record)),
            Err(DashError::BuildNotFound(_)) => Ok(DeployOutcome::Declined),
            Err(e) => Err(e),
        }
    }
}
