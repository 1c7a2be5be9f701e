use crate::error::{DashError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// DeployMode
// ---------------------------------------------------------------------------

/// How artifacts reach a hosting slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployMode {
    /// Replace a directory on the local filesystem.
    #[default]
    Local,
    /// Push to a Cloudflare Pages project with wrangler.
    Cloudflare,
}

impl std::str::FromStr for DeployMode {
    type Err = DashError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(DeployMode::Local),
            "cloudflare" => Ok(DeployMode::Cloudflare),
            other => Err(DashError::Config(format!("unknown deploy mode '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// DashboardConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Holds the source checkout, the artifact directories and the database.
    pub work_dir: PathBuf,
    pub repo_url: String,
    pub install_command: Vec<String>,
    pub build_command: Vec<String>,
    /// Script run in the checkout before the build, e.g. to materialize
    /// auxiliary content.
    pub prebuild_script: Option<Vec<String>>,
    /// Staged content data copied into the checkout before each build.
    pub content_dir: Option<PathBuf>,
    /// Destination of `content_dir`, relative to the checkout.
    pub content_target: PathBuf,
    /// Build output directory, relative to the checkout.
    pub output_dir: PathBuf,
    /// Number of artifact directories kept after a successful build.
    pub retention: usize,

    pub deploy_mode: DeployMode,
    pub preview_path: Option<PathBuf>,
    pub production_path: Option<PathBuf>,
    pub preview_project: Option<String>,
    pub production_project: Option<String>,
    pub cloudflare_branch_preview: String,
    pub cloudflare_branch_production: String,
    pub cloudflare_account_id: Option<String>,
    #[serde(skip_serializing)]
    pub cloudflare_api_token: Option<String>,
    #[serde(skip_serializing)]
    pub deploy_password: String,

    /// Proxy handed to every external command.
    pub proxy: Option<String>,

    /// CMS admin page probed to resolve the caller's identity. A value
    /// starting with `/` is joined onto `hosted_url`.
    pub cms_url: String,
    pub hosted_url: Option<String>,
    pub preview_url: Option<String>,
    pub production_url: Option<String>,

    /// Fail records left `working` by a previous process on startup.
    pub recover_stale: bool,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("working"),
            repo_url: String::new(),
            install_command: vec!["npm".into(), "install".into()],
            build_command: vec!["npm".into(), "run".into(), "build".into()],
            prebuild_script: None,
            content_dir: None,
            content_target: PathBuf::from("data"),
            output_dir: PathBuf::from("dist"),
            retention: 10,
            deploy_mode: DeployMode::Local,
            preview_path: None,
            production_path: None,
            preview_project: None,
            production_project: None,
            cloudflare_branch_preview: "preview".into(),
            cloudflare_branch_production: "main".into(),
            cloudflare_account_id: None,
            cloudflare_api_token: None,
            deploy_password: String::new(),
            proxy: None,
            cms_url: "/admin/".into(),
            hosted_url: None,
            preview_url: None,
            production_url: None,
            recover_stale: true,
        }
    }
}

impl DashboardConfig {
    /// Load from a YAML file; missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let cfg: DashboardConfig = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(path, data.as_bytes())
    }

    /// Overlay values from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    /// Overlay values from `lookup`, which maps an environment variable name
    /// to its value. Empty values are ignored.
    pub fn apply_vars<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("SITEDASH_WORK_DIR") {
            self.work_dir = PathBuf::from(v);
        }
        if let Some(v) = get("WEBSITE_REPO") {
            self.repo_url = v;
        }
        if let Some(v) = get("DEPLOY_MODE") {
            self.deploy_mode = v.parse()?;
        }
        if let Some(v) = get("PREVIEW_PATH") {
            self.preview_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("PROD_PATH") {
            self.production_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("PREVIEW_PROJECT") {
            self.preview_project = Some(v);
        }
        if let Some(v) = get("PROD_PROJECT") {
            self.production_project = Some(v);
        }
        if let Some(v) = get("CLOUDFLARE_ACCOUNT_ID") {
            self.cloudflare_account_id = Some(v);
        }
        if let Some(v) = get("CLOUDFLARE_API_TOKEN") {
            self.cloudflare_api_token = Some(v);
        }
        if let Some(v) = get("DEPLOY_PASSWORD") {
            self.deploy_password = v;
        }
        if let Some(v) = get("PROXY") {
            self.proxy = Some(v);
        }
        if let Some(v) = get("WAGTAIL_PATH") {
            self.cms_url = v;
        }
        if let Some(v) = get("HOSTED") {
            self.hosted_url = Some(v);
        }
        if let Some(v) = get("PREVIEW_URL") {
            self.preview_url = Some(v);
        }
        if let Some(v) = get("PROD_URL") {
            self.production_url = Some(v);
        }
        if let Some(v) = get("SITEDASH_RETENTION") {
            self.retention = v
                .trim()
                .parse()
                .map_err(|_| DashError::Config(format!("SITEDASH_RETENTION must be a number, got '{v}'")))?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Derived paths
    // -----------------------------------------------------------------------

    pub fn checkout_dir(&self) -> PathBuf {
        self.work_dir.join("repo")
    }

    pub fn builds_dir(&self) -> PathBuf {
        self.work_dir.join("builds")
    }

    pub fn artifact_dir(&self, build_id: u64) -> PathBuf {
        self.builds_dir().join(build_id.to_string())
    }

    pub fn db_path(&self) -> PathBuf {
        self.work_dir.join("sitedash.redb")
    }

    /// Absolute CMS admin URL used for the identity probe.
    pub fn cms_admin_url(&self) -> String {
        match (&self.hosted_url, self.cms_url.starts_with('/')) {
            (Some(host), true) => format!("{}{}", host.trim_end_matches('/'), self.cms_url),
            _ => self.cms_url.clone(),
        }
    }

    /// Environment handed to every external command.
    pub fn command_env(&self) -> Vec<(String, String)> {
        match &self.proxy {
            Some(proxy) => ["ALL_PROXY", "HTTP_PROXY", "HTTPS_PROXY"]
                .iter()
                .map(|k| (k.to_string(), proxy.clone()))
                .collect(),
            None => Vec::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut warn = |level: WarnLevel, message: String| {
            warnings.push(ConfigWarning { level, message })
        };

        if self.repo_url.trim().is_empty() {
            warn(
                WarnLevel::Error,
                "repo_url is empty: builds cannot clone the website (set WEBSITE_REPO)".into(),
            );
        }
        if self.build_command.is_empty() {
            warn(WarnLevel::Error, "build_command is empty".into());
        }
        if self.install_command.is_empty() {
            warn(WarnLevel::Warning, "install_command is empty".into());
        }
        if self.retention == 0 {
            warn(
                WarnLevel::Warning,
                "retention is 0: every artifact is deleted right after its build".into(),
            );
        }
        if self.deploy_password.is_empty() {
            warn(
                WarnLevel::Warning,
                "deploy_password is empty: production deploys are always declined".into(),
            );
        }
        match self.deploy_mode {
            DeployMode::Local => {
                if self.preview_path.is_none() {
                    warn(WarnLevel::Error, "local deploy mode without preview_path".into());
                }
                if self.production_path.is_none() {
                    warn(WarnLevel::Error, "local deploy mode without production_path".into());
                }
            }
            DeployMode::Cloudflare => {
                if self.preview_project.is_none() {
                    warn(WarnLevel::Error, "cloudflare deploy mode without preview_project".into());
                }
                if self.production_project.is_none() {
                    warn(
                        WarnLevel::Error,
                        "cloudflare deploy mode without production_project".into(),
                    );
                }
                if self.cloudflare_api_token.is_none() {
                    warn(
                        WarnLevel::Warning,
                        "cloudflare deploy mode without CLOUDFLARE_API_TOKEN; wrangler must already be logged in"
                            .into(),
                    );
                }
            }
        }
        warnings
    }
}
