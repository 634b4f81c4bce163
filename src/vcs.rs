//! Source versioning.
//!
//! Each indexed file gets a [`VersionDescriptor`]; the whole catalog gets
//! one for the repository as a whole. Two implementations:
//!
//! | Type | Identifier | Dirty when |
//! |------|-----------|------------|
//! | [`GitVersionControl`] | last commit touching the path | modified, untracked, or never committed |
//! | [`ContentHashVersion`] | SHA-256 of the file contents | never (catalog-level version is always dirty) |
//!
//! Git is driven through the `git` executable.

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

use agent_catalog_core::models::{VersionDescriptor, VersionSystem};

pub trait VersionControl: Send + Sync {
    /// True if `path` differs from what its last commit recorded.
    fn is_dirty(&self, path: &Path) -> Result<bool>;

    /// The last commit touching `path`, if any.
    fn commit_identifier(&self, path: &Path) -> Result<Option<String>>;

    /// Version of the whole source tree.
    fn head_version(&self) -> Result<VersionDescriptor>;

    /// Version of one source file.
    fn path_version(&self, path: &Path) -> Result<VersionDescriptor> {
        match self.commit_identifier(path)? {
            None => Ok(VersionDescriptor::dirty(None)),
            Some(commit) if self.is_dirty(path)? => Ok(VersionDescriptor::dirty(Some(commit))),
            Some(commit) => Ok(VersionDescriptor::committed(commit)),
        }
    }
}

/// Walk up from `start` to the directory containing `.git`.
pub fn find_repo_root(start: &Path) -> Option<PathBuf> {
    let start = std::fs::canonicalize(start).ok()?;
    start
        .ancestors()
        .find(|dir| dir.join(".git").exists())
        .map(Path::to_path_buf)
}

/// Pick git when `start` is inside a repository, content hashes otherwise.
pub fn detect(start: &Path) -> Box<dyn VersionControl> {
    match find_repo_root(start) {
        Some(root) => {
            let git = GitVersionControl { root };
            debug!(root = %git.root().display(), "versioning sources with git");
            Box::new(git)
        }
        None => {
            debug!(start = %start.display(), "no git repository, versioning sources by content hash");
            Box::new(ContentHashVersion)
        }
    }
}

pub struct GitVersionControl {
    root: PathBuf,
}

impl GitVersionControl {
    pub fn open(root: &Path) -> Result<Self> {
        let root = std::fs::canonicalize(root)
            .with_context(|| format!("Failed to resolve repository root: {}", root.display()))?;
        if !root.join(".git").exists() {
            bail!("Not a git repository: {}", root.display());
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn git(&self, args: &[&str], path: Option<&Path>) -> Result<std::process::Output> {
        let mut cmd = Command::new("git");
        cmd.args(args).current_dir(&self.root);
        if let Some(path) = path {
            let absolute = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
            cmd.arg("--").arg(absolute);
        }
        cmd.output()
            .with_context(|| format!("Failed to execute 'git {}'. Is git installed?", args.join(" ")))
    }
}

impl VersionControl for GitVersionControl {
    fn is_dirty(&self, path: &Path) -> Result<bool> {
        let output = self.git(&["status", "--porcelain"], Some(path))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("git status failed: {}", stderr.trim());
        }
        Ok(!String::from_utf8_lossy(&output.stdout).trim().is_empty())
    }

    fn commit_identifier(&self, path: &Path) -> Result<Option<String>> {
        let output = self.git(&["log", "-1", "--format=%H"], Some(path))?;
        // `git log` fails in a repository without commits.
        if !output.status.success() {
            return Ok(None);
        }
        let sha = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(if sha.is_empty() { None } else { Some(sha) })
    }

    fn head_version(&self) -> Result<VersionDescriptor> {
        let output = self.git(&["rev-parse", "HEAD"], None)?;
        if !output.status.success() {
            return Ok(VersionDescriptor::dirty(None));
        }
        let head = String::from_utf8_lossy(&output.stdout).trim().to_string();

        let status = self.git(&["status", "--porcelain"], None)?;
        if !status.status.success() {
            let stderr = String::from_utf8_lossy(&status.stderr);
            bail!("git status failed: {}", stderr.trim());
        }
        if String::from_utf8_lossy(&status.stdout).trim().is_empty() {
            Ok(VersionDescriptor::committed(head))
        } else {
            Ok(VersionDescriptor::dirty(Some(head)))
        }
    }
}

/// Versions files by content, for trees outside version control.
pub struct ContentHashVersion;

impl VersionControl for ContentHashVersion {
    fn is_dirty(&self, _path: &Path) -> Result<bool> {
        Ok(false)
    }

    fn commit_identifier(&self, path: &Path) -> Result<Option<String>> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(Some(format!("{:x}", hasher.finalize())))
    }

    fn head_version(&self) -> Result<VersionDescriptor> {
        Ok(VersionDescriptor::new(
            None,
            true,
            VersionSystem::Raw,
            chrono::Utc::now(),
        )?)
    }

    fn path_version(&self, path: &Path) -> Result<VersionDescriptor> {
        match self.commit_identifier(path)? {
            Some(hash) => Ok(VersionDescriptor::raw(hash)),
            None => Ok(VersionDescriptor::new(None, true, VersionSystem::Raw, chrono::Utc::now())?),
        }
    }
}
