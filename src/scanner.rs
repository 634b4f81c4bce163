//! Directory scanning for catalog source files.
//!
//! Walks each source directory lazily and yields regular files whose name
//! matches one of the wanted globs. Two exclusion mechanisms run first:
//!
//! - **Unwanted patterns**: static globs (`.git`, `*.lock`, ...) matched
//!   against both the path relative to the scan root and the bare file
//!   name. Matching directories are pruned.
//! - **Ignore files**: every directory containing one of the configured
//!   ignore files (default `.gitignore`) has it parsed once and applied
//!   to all of its descendants, whether or not the tree is a git repo.
//!
//! Traversal order is whatever the filesystem yields. Callers must not
//! rely on it beyond progress reporting.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::config::CatalogConfig;

/// Exclusion rules for a scan.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub unwanted_patterns: Vec<String>,
    pub ignore_file_names: Vec<String>,
}

impl From<&CatalogConfig> for ScanOptions {
    fn from(config: &CatalogConfig) -> Self {
        Self {
            unwanted_patterns: config.unwanted_patterns.clone(),
            ignore_file_names: config.ignore_file_names.clone(),
        }
    }
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self::from(&CatalogConfig::default())
    }
}

pub fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

fn is_unwanted(unwanted: &GlobSet, root: &Path, path: &Path) -> bool {
    let relative = path.strip_prefix(root).unwrap_or(path);
    if !relative.as_os_str().is_empty() && unwanted.is_match(relative) {
        return true;
    }
    path.file_name()
        .map(|name| unwanted.is_match(Path::new(name)))
        .unwrap_or(false)
}

/// Lazily yield the wanted files under `root`.
pub fn scan_directory(
    root: &Path,
    wanted: &GlobSet,
    options: &ScanOptions,
) -> Result<impl Iterator<Item = PathBuf>> {
    if !root.is_dir() {
        bail!("Source directory does not exist: {}", root.display());
    }

    let unwanted = build_globset(&options.unwanted_patterns)?;

    let mut builder = WalkBuilder::new(root);
    builder
        .hidden(false)
        .parents(false)
        .ignore(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .require_git(false)
        .follow_links(false);
    for name in &options.ignore_file_names {
        builder.add_custom_ignore_filename(name);
    }

    let prune_root = root.to_path_buf();
    let prune_set = unwanted.clone();
    builder.filter_entry(move |entry| {
        entry.depth() == 0 || !is_unwanted(&prune_set, &prune_root, entry.path())
    });

    let wanted = wanted.clone();
    let walk = builder.build().filter_map(move |entry| match entry {
        Ok(entry) => {
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            if !is_file {
                return None;
            }
            let matched = entry
                .path()
                .file_name()
                .map(|name| wanted.is_match(Path::new(name)))
                .unwrap_or(false);
            matched.then(|| entry.into_path())
        }
        Err(e) => {
            warn!(error = %e, "skipping unreadable path");
            None
        }
    });
    Ok(walk)
}

/// Scan several roots in order. Every root must exist.
pub fn scan_directories(
    roots: &[PathBuf],
    wanted: &GlobSet,
    options: &ScanOptions,
) -> Result<impl Iterator<Item = PathBuf>> {
    let mut walks = Vec::with_capacity(roots.len());
    for root in roots {
        walks.push(scan_directory(root, wanted, options)?);
    }
    Ok(walks.into_iter().flatten())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn names(paths: impl Iterator<Item = PathBuf>) -> Vec<String> {
        let mut names: Vec<String> = paths
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    fn wanted() -> GlobSet {
        build_globset(&["*.py".to_string(), "*.yaml".to_string()]).unwrap()
    }

    #[test]
    fn yields_only_wanted_files() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.py"), "").unwrap();
        fs::write(tmp.path().join("b.yaml"), "").unwrap();
        fs::write(tmp.path().join("c.txt"), "").unwrap();
        fs::create_dir_all(tmp.path().join("nested/deeper")).unwrap();
        fs::write(tmp.path().join("nested/deeper/d.py"), "").unwrap();

        let found = scan_directory(tmp.path(), &wanted(), &ScanOptions::default()).unwrap();
        assert_eq!(names(found), vec!["a.py", "b.yaml", "d.py"]);
    }

    #[test]
    fn ignore_files_apply_to_descendants() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("pkg/generated")).unwrap();
        fs::write(tmp.path().join("pkg/.gitignore"), "generated/\nskip_*.py\n").unwrap();
        fs::write(tmp.path().join("pkg/keep.py"), "").unwrap();
        fs::write(tmp.path().join("pkg/skip_me.py"), "").unwrap();
        fs::write(tmp.path().join("pkg/generated/out.py"), "").unwrap();
        fs::write(tmp.path().join("top.py"), "").unwrap();

        let found = scan_directory(tmp.path(), &wanted(), &ScanOptions::default()).unwrap();
        assert_eq!(names(found), vec!["keep.py", "top.py"]);
    }

    #[test]
    fn unwanted_patterns_prune_directories() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join(".git/hooks")).unwrap();
        fs::create_dir_all(tmp.path().join("pkg/__pycache__")).unwrap();
        fs::write(tmp.path().join(".git/hooks/hook.py"), "").unwrap();
        fs::write(tmp.path().join("pkg/__pycache__/cached.py"), "").unwrap();
        fs::write(tmp.path().join("pkg/tool.py"), "").unwrap();

        let found = scan_directory(tmp.path(), &wanted(), &ScanOptions::default()).unwrap();
        assert_eq!(names(found), vec!["tool.py"]);
    }

    #[test]
    fn missing_root_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope");
        assert!(scan_directory(&missing, &wanted(), &ScanOptions::default()).is_err());
    }

    #[test]
    fn scans_multiple_roots() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("one")).unwrap();
        fs::create_dir_all(tmp.path().join("two")).unwrap();
        fs::write(tmp.path().join("one/a.py"), "").unwrap();
        fs::write(tmp.path().join("two/b.py"), "").unwrap();
        let roots = vec![tmp.path().join("one"), tmp.path().join("two")];
        let found = scan_directories(&roots, &wanted(), &ScanOptions::default()).unwrap();
        assert_eq!(names(found), vec!["a.py", "b.py"]);
    }
}
