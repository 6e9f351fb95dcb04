//! Tar archives of cached workspace paths

use crate::cache::CacheError;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Reject absolute paths and anything escaping the workspace
fn checked_relative(path: &str) -> Result<PathBuf, CacheError> {
    let relative = PathBuf::from(path);
    let escapes = relative.components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    if path.trim().is_empty() || escapes {
        return Err(CacheError::InvalidPath(path.to_string()));
    }
    Ok(relative)
}

/// Entry name used when the cached path is a single file
const FILE_ENTRY: &str = "__cached_file__";

/// Entries are stored relative to the cached path, so a blob can be
/// restored under a different path than the one it was saved from
fn pack_blocking(workspace: &Path, relative: &Path) -> Result<Vec<u8>, CacheError> {
    let source = workspace.join(relative);
    if !source.exists() {
        return Err(CacheError::MissingPath(source));
    }

    let mut builder = tar::Builder::new(Vec::new());
    builder.follow_symlinks(false);
    if source.is_dir() {
        builder.append_dir_all("", &source)?;
    } else {
        builder.append_path_with_name(&source, FILE_ENTRY)?;
    }
    Ok(builder.into_inner()?)
}

fn unpack_blocking(workspace: &Path, relative: &Path, blob: &[u8]) -> Result<(), CacheError> {
    let dest = workspace.join(relative);
    let mut archive = tar::Archive::new(blob);
    archive.set_preserve_mtime(true);

    for entry in archive.entries()? {
        let mut entry = entry?;
        if entry.path()?.as_ref() == Path::new(FILE_ENTRY) {
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)?;
            }
            entry.unpack(&dest)?;
        } else {
            std::fs::create_dir_all(&dest)?;
            // unpack_in refuses entries escaping `dest`
            if !entry.unpack_in(&dest)? {
                debug!("Skipped cache entry outside {}", dest.display());
            }
        }
    }
    Ok(())
}

/// Archive `path` (relative to `workspace`) into a blob
pub async fn pack(workspace: &Path, path: &str) -> Result<Vec<u8>, CacheError> {
    let relative = checked_relative(path)?;
    let workspace = workspace.to_path_buf();
    tokio::task::spawn_blocking(move || pack_blocking(&workspace, &relative))
        .await
        .map_err(|e| CacheError::Task(e.to_string()))?
}

/// Restore a blob produced by [`pack`] at `path` (relative to `workspace`)
pub async fn unpack(workspace: &Path, path: &str, blob: Vec<u8>) -> Result<(), CacheError> {
    let relative = checked_relative(path)?;
    let workspace = workspace.to_path_buf();
    tokio::task::spawn_blocking(move || unpack_blocking(&workspace, &relative, &blob))
        .await
        .map_err(|e| CacheError::Task(e.to_string()))?
}
