use crate::output::print_json;
use crate::settings;
use anyhow::{bail, Context};
use clap::Subcommand;
use sitedash_core::config::{DashboardConfig, WarnLevel};
use std::path::{Path, PathBuf};

/// Written by `config init` when no `--config` path is given.
const DEFAULT_CONFIG_FILE: &str = "sitedash.yaml";

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Print the effective configuration (secrets omitted)
    Show,

    /// Validate the config for common mistakes
    Validate,

    /// Write a config file from the defaults and the current environment
    /// (secrets are left to the environment)
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub fn run(config: &DashboardConfig, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Show => show(config, json),
        ConfigSubcommand::Validate => validate(config, json),
        ConfigSubcommand::Init { .. } => bail!("config init runs before a config is loaded"),
    }
}

/// `config init` runs without loading a file, since the file is what it
/// creates.
pub fn init(path: Option<&Path>, force: bool) -> anyhow::Result<()> {
    let path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    let config = settings::load_config(None)?;
    config
        .save(&path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn show(config: &DashboardConfig, json: bool) -> anyhow::Result<()> {
    if json {
        print_json(config)
    } else {
        print!("{}", serde_yaml::to_string(config)?);
        Ok(())
    }
}

fn validate(config: &DashboardConfig, json: bool) -> anyhow::Result<()> {
    let warnings = config.validate();

    if json {
        print_json(&serde_json::json!({ "warnings": warnings }))?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config validation found errors");
    }
    Ok(())
}
