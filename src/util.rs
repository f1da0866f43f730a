//! Shared utility functions.

use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};
use sha2::{Digest, Sha256};
use tokio::task::spawn_blocking;
use walkdir::WalkDir;

use crate::{Error, Result};

pub async fn blocking<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    spawn_blocking(f)
        .await
        .map_err(|e| Error::TaskJoin(e.to_string()))?
}

/// Hex SHA-256 of `bytes`.
pub fn fingerprint(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Match options shared by every glob in the crate: `*` never crosses `/`,
/// dot files are matched like any other file.
pub fn match_options() -> MatchOptions {
    MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    }
}

/// `path` relative to `base`, with `/` separators.
pub fn relative_slash(path: &Path, base: &Path) -> Option<String> {
    let rel = path.strip_prefix(base).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

/// Every file under `root` whose root-relative path matches one of
/// `patterns` and none of `exclude`. Sorted so callers get a stable order.
pub fn collect_files(root: &Path, patterns: &[String], exclude: &[String]) -> Result<Vec<PathBuf>> {
    let include = compile_patterns(patterns)?;
    let exclude = compile_patterns(exclude)?;
    let options = match_options();

    if !root.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry.map_err(|e| Error::Io(std::io::Error::other(e.to_string())))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(rel) = relative_slash(entry.path(), root) else {
            continue;
        };
        if include.iter().any(|p| p.matches_with(&rel, options))
            && !exclude.iter().any(|p| p.matches_with(&rel, options))
        {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

pub fn compile_patterns(patterns: &[String]) -> Result<Vec<Pattern>> {
    patterns
        .iter()
        .map(|p| Pattern::new(p).map_err(Error::from))
        .collect()
}

/// Write `bytes` to `path`, creating parent directories.
pub async fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_blocking_success() {
        assert_eq!(blocking(|| Ok::<_, Error>(42)).await.unwrap(), 42);
    }

    #[test]
    fn test_fingerprint_is_stable() {
        assert_eq!(fingerprint(b"abc"), fingerprint(b"abc"));
        assert_ne!(fingerprint(b"abc"), fingerprint(b"abd"));
        assert_eq!(fingerprint(b"").len(), 64);
    }

    #[test]
    fn test_relative_slash() {
        let rel = relative_slash(Path::new("/p/app/styles/main.scss"), Path::new("/p/app"));
        assert_eq!(rel.as_deref(), Some("styles/main.scss"));
        assert!(relative_slash(Path::new("/other/x"), Path::new("/p/app")).is_none());
    }

    #[test]
    fn test_collect_files_include_exclude() {
        let dir = tempfile::TempDir::new().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("styles")).unwrap();
        std::fs::write(root.join("index.html"), "<p>").unwrap();
        std::fs::write(root.join("robots.txt"), "").unwrap();
        std::fs::write(root.join(".htaccess"), "").unwrap();
        std::fs::write(root.join("styles/main.scss"), "").unwrap();

        let top = collect_files(root, &["*".to_string()], &["*.html".to_string()]).unwrap();
        let names: Vec<String> = top
            .iter()
            .map(|p| relative_slash(p, root).unwrap())
            .collect();
        assert_eq!(names, vec![".htaccess", "robots.txt"]);

        let all_html = collect_files(root, &["**/*.html".to_string()], &[]).unwrap();
        assert_eq!(all_html.len(), 1);
    }

    #[test]
    fn test_collect_files_missing_root() {
        let files = collect_files(Path::new("/definitely/not/here"), &["*".to_string()], &[]).unwrap();
        assert!(files.is_empty());
    }
}
