//! Cache key helpers

use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};

/// Directories never descended into by `**/` patterns
const SKIPPED_DIRS: &[&str] = &[".git", "target"];

/// Hash the contents of every file matched by `patterns`.
///
/// `**/<name>` matches a file name anywhere below `workspace`; any other
/// pattern is a workspace-relative path. Matches are sorted and deduplicated
/// so the result only depends on file contents and locations. Returns an
/// empty string when nothing matched.
pub fn hash_files(workspace: &Path, patterns: &[String]) -> io::Result<String> {
    let mut files = Vec::new();
    for pattern in patterns {
        match pattern.strip_prefix("**/") {
            Some(name) => collect_named(workspace, name, &mut files)?,
            None => {
                let candidate = workspace.join(pattern);
                if candidate.is_file() {
                    files.push(candidate);
                }
            }
        }
    }

    files.sort();
    files.dedup();

    if files.is_empty() {
        return Ok(String::new());
    }

    let mut hasher = Sha256::new();
    for file in &files {
        let contents = std::fs::read(file)?;
        hasher.update(Sha256::digest(&contents));
    }

    Ok(hex::encode(hasher.finalize()))
}

fn collect_named(dir: &Path, name: &str, out: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        let file_name = entry.file_name();

        if file_type.is_dir() {
            if SKIPPED_DIRS.iter().any(|skip| file_name == *skip) {
                continue;
            }
            collect_named(&path, name, out)?;
        } else if file_type.is_file() && file_name == name {
            out.push(path);
        }
    }
    Ok(())
}

/// Whether a stored key is a candidate for a fallback prefix
pub fn matches_prefix(key: &str, prefix: &str) -> bool {
    !prefix.is_empty() && key.starts_with(prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_prefix() {
        assert!(matches_prefix("cargo-ubuntu-abc", "cargo-ubuntu-"));
        assert!(matches_prefix("cargo-ubuntu-abc", "cargo-"));
        assert!(!matches_prefix("npm-abc", "cargo-"));
        assert!(!matches_prefix("cargo-abc", ""));
    }

    #[test]
    fn test_hash_skips_target_and_git() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Cargo.lock"), "root").unwrap();
        let before = hash_files(dir.path(), &["**/Cargo.lock".to_string()]).unwrap();

        std::fs::create_dir_all(dir.path().join("target/debug")).unwrap();
        std::fs::write(dir.path().join("target/debug/Cargo.lock"), "build").unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join(".git/Cargo.lock"), "git").unwrap();

        let after = hash_files(dir.path(), &["**/Cargo.lock".to_string()]).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_relative_pattern_and_dedup() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Cargo.lock"), "root").unwrap();

        let single = hash_files(dir.path(), &["Cargo.lock".to_string()]).unwrap();
        let both = hash_files(
            dir.path(),
            &["Cargo.lock".to_string(), "**/Cargo.lock".to_string()],
        )
        .unwrap();
        assert_eq!(single, both);
        assert_eq!(single.len(), 64);
    }

    #[test]
    fn test_missing_relative_path_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let hash = hash_files(dir.path(), &["nope/Cargo.lock".to_string()]).unwrap();
        assert!(hash.is_empty());
    }
}
