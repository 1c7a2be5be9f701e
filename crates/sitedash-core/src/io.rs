use crate::error::Result;
use std::io::Write;
use std::path::Path;

/// Write `data` to `path` through a synced tempfile renamed into place, so
/// readers see either the old file or the whole new one.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::Builder::new().prefix(".write.").tempfile_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Create a directory and all parents, idempotent.
pub fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)?;
    Ok(())
}

/// Recursively copy the contents of `src` into `dst`, overwriting files that
/// already exist. Symlinks are copied as the files they point to.
pub fn copy_dir_all(src: &Path, dst: &Path) -> Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        if std::fs::metadata(&from)?.is_dir() {
            copy_dir_all(&from, &to)?;
        } else {
            std::fs::copy(&from, &to)?;
        }
    }
    Ok(())
}

/// Remove a directory tree, treating "already gone" as success.
pub fn remove_dir_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Replace `dest` with a copy of `src`.
///
/// The copy is staged in a fresh hidden sibling directory, then swapped in
/// with renames. A failed copy leaves `dest` as it was, and concurrent calls
/// never share a staging directory, so `dest` always holds one whole copy.
pub fn replace_dir(src: &Path, dest: &Path) -> Result<()> {
    let parent = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "slot".to_string());

    let staging = tempfile::Builder::new()
        .prefix(&format!(".{name}.staging."))
        .tempdir_in(parent)?;
    let staged = staging.path().join("content");
    copy_dir_all(src, &staged)?;

    let retired = tempfile::Builder::new()
        .prefix(&format!(".{name}.old."))
        .tempdir_in(parent)?;
    let previous = retired.path().join("content");
    match std::fs::rename(dest, &previous) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    if let Err(e) = std::fs::rename(&staged, dest) {
        // Put the previous content back before reporting.
        if previous.exists() {
            let _ = std::fs::rename(&previous, dest);
        }
        return Err(e.into());
    }
    Ok(())
}
