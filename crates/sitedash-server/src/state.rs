use std::sync::Arc;

use sitedash_core::config::DashboardConfig;
use sitedash_core::db::BuildDb;
use sitedash_core::guard::BuildGuard;
use sitedash_core::runner::CommandRunner;
use tokio::sync::broadcast;
use tracing::warn;

use crate::auth::CmsProbe;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<DashboardConfig>,
    pub db: Arc<BuildDb>,
    pub guard: BuildGuard,
    pub runner: Arc<dyn CommandRunner>,
    pub probe: CmsProbe,
    pub event_tx: broadcast::Sender<()>,
}

impl AppState {
    /// Open the store under `config.work_dir` and, when `recover_stale` is
    /// set, fail records a previous process left in `working`.
    pub fn open(
        config: DashboardConfig,
        runner: Arc<dyn CommandRunner>,
    ) -> sitedash_core::Result<Self> {
        let db = BuildDb::open(&config.db_path())?;
        if config.recover_stale {
            let recovered = db.startup_recovery()?;
            if recovered > 0 {
                warn!(recovered, "marked interrupted builds as error");
            }
        }
        for w in config.validate() {
            warn!(level = ?w.level, "config: {}", w.message);
        }
        let (tx, _) = broadcast::channel(64);
        Ok(Self {
            probe: CmsProbe::new(config.cms_admin_url()),
            config: Arc::new(config),
            db: Arc::new(db),
            guard: BuildGuard::new(),
            runner,
            event_tx: tx,
        })
    }

    /// Tell SSE subscribers that a record changed.
    pub fn notify(&self) {
        let _ = self.event_tx.send(());
    }
}
