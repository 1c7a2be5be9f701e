use crate::cmd::builds::open_db;
use crate::output::{print_audit, print_json};
use anyhow::Result;
use sitedash_core::config::DashboardConfig;

pub fn run(config: &DashboardConfig, limit: usize, json: bool) -> Result<()> {
    let entries = open_db(config)?.audit_entries(limit)?;
    if json {
        print_json(&entries)
    } else {
        print_audit(&entries);
        Ok(())
    }
}
