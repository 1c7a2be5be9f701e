use std::path::Path;

use tracing::info;

use crate::error::Result;

/// Delete artifact directories beyond the newest `keep`.
///
/// Only directories whose names are all ASCII digits count as artifacts;
/// they are ranked by numeric value, newest (largest) first. Everything else
/// in `builds_dir` is left alone. Returns the removed ids, largest first.
pub fn prune_artifacts(builds_dir: &Path, keep: usize) -> Result<Vec<u64>> {
    if !builds_dir.exists() {
        return Ok(Vec::new());
    }

    let mut ids = Vec::new();
    for entry in std::fs::read_dir(builds_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
            continue;
        }
        if let Ok(id) = name.parse::<u64>() {
            ids.push((id, entry.path()));
        }
    }
    ids.sort_by(|a, b| b.0.cmp(&a.0));

    let mut removed = Vec::new();
    for (id, path) in ids.into_iter().skip(keep) {
        crate::io::remove_dir_if_exists(&path)?;
        removed.push(id);
    }
    if !removed.is_empty() {
        info!(removed = ?removed, "pruned old artifacts");
    }
    Ok(removed)
}
