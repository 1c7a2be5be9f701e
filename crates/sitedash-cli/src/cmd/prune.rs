use crate::output::print_json;
use anyhow::Result;
use sitedash_core::config::DashboardConfig;
use sitedash_core::retention::prune_artifacts;

pub fn run(config: &DashboardConfig, keep: Option<usize>, json: bool) -> Result<()> {
    let keep = keep.unwrap_or(config.retention);
    let removed = prune_artifacts(&config.builds_dir(), keep)?;

    if json {
        print_json(&serde_json::json!({ "kept": keep, "removed": removed }))
    } else if removed.is_empty() {
        println!("Nothing to prune.");
        Ok(())
    } else {
        let ids: Vec<String> = removed.iter().map(u64::to_string).collect();
        println!("Removed artifacts: {}", ids.join(", "));
        Ok(())
    }
}
