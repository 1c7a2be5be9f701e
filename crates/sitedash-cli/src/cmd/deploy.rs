use crate::cmd::builds::open_db;
use crate::output::print_json;
use anyhow::{bail, Result};
use sitedash_core::build::Slot;
use sitedash_core::config::DashboardConfig;
use sitedash_core::deploy::{deploy_target, password_matches, DeployCoordinator, DeployOutcome};
use sitedash_core::runner::ProcessRunner;

pub fn run(
    config: &DashboardConfig,
    id: u64,
    slot: &str,
    password: Option<&str>,
    user: &str,
    json: bool,
) -> Result<()> {
    let slot: Slot = slot.parse().map_err(anyhow::Error::msg)?;
    let password = password.unwrap_or_default();
    if slot == Slot::Production && !password_matches(password, &config.deploy_password) {
        bail!("production deploy of build {id} declined (wrong password)");
    }
    let db = open_db(config)?;
    let runner = ProcessRunner;
    let target = deploy_target(config, &runner)?;
    let coordinator = DeployCoordinator::new(&db, config, target.as_ref());

    let record = match slot {
        Slot::Preview => coordinator.deploy(id, slot, user)?,
        Slot::Production => {
            match coordinator.deploy_production(id, password, user)? {
                DeployOutcome::Deployed(record) => record,
                DeployOutcome::Declined => {
                    bail!("production deploy of build {id} declined (unknown build)")
                }
            }
        }
    };

    if json {
        print_json(&record)?;
    } else {
        println!("build {} is now {}", record.id, record.status);
    }
    Ok(())
}
