use anyhow::Context;
use sitedash_core::config::DashboardConfig;
use std::path::Path;

/// Effective configuration: defaults, then the YAML file when one is
/// given, then environment variables.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<DashboardConfig> {
    let mut config = match path {
        Some(p) => DashboardConfig::load(p)
            .with_context(|| format!("failed to load config from {}", p.display()))?,
        None => DashboardConfig::default(),
    };
    config
        .apply_env()
        .context("invalid configuration in environment")?;
    Ok(config)
}
