//! Schema and library version comparison.
//!
//! Schema versions are plain semantic versions (`0.0.0`). Library versions
//! use the `git describe --long` shape, e.g. `v0.2.0-0-g6f9305e` or
//! `v0.1.0-beta2-17-gf63950e`: a release tag, the number of commits since
//! that tag, and the abbreviated commit hash.
//!
//! Two library versions on the same tag compare by commit count; versions
//! on different tags compare by the tag's semantic version.

use std::cmp::Ordering;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{CatalogError, Result};

static LIB_VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([\d\.\-a-zA-Z]+)-(\d+)-(g[0-9a-f]+)$").expect("static regex is valid")
});

static SEMVER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)\.(\d+)\.(\d+)(?:-([0-9A-Za-z\.\-]+))?(?:\+[0-9A-Za-z\.\-]+)?$")
        .expect("static regex is valid")
});

/// A parsed `git describe --long` library version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibVersion {
    pub tag: String,
    pub commits: u64,
    pub hash: String,
}

impl LibVersion {
    pub fn parse(s: &str) -> Result<Self> {
        let caps = LIB_VERSION_RE
            .captures(s)
            .ok_or_else(|| CatalogError::Validation(format!("invalid library version: {}", s)))?;
        let commits = caps[2]
            .parse::<u64>()
            .map_err(|e| CatalogError::Validation(format!("invalid library version {}: {}", s, e)))?;
        Ok(Self {
            tag: caps[1].to_string(),
            commits,
            hash: caps[3].to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SemVer {
    major: u64,
    minor: u64,
    patch: u64,
    pre: Vec<String>,
}

impl SemVer {
    fn parse(s: &str) -> Result<Self> {
        let caps = SEMVER_RE
            .captures(s)
            .ok_or_else(|| CatalogError::Validation(format!("invalid semantic version: {}", s)))?;
        let num = |i: usize| {
            caps[i]
                .parse::<u64>()
                .map_err(|e| CatalogError::Validation(format!("invalid semantic version {}: {}", s, e)))
        };
        Ok(Self {
            major: num(1)?,
            minor: num(2)?,
            patch: num(3)?,
            pre: caps
                .get(4)
                .map(|m| m.as_str().split('.').map(str::to_string).collect())
                .unwrap_or_default(),
        })
    }
}

impl Ord for SemVer {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| match (self.pre.is_empty(), other.pre.is_empty()) {
                (true, true) => Ordering::Equal,
                // A pre-release sorts before its release.
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => compare_pre_release(&self.pre, &other.pre),
            })
    }
}

impl PartialOrd for SemVer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn compare_pre_release(a: &[String], b: &[String]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
            (Ok(nx), Ok(ny)) => nx.cmp(&ny),
            (Ok(_), Err(_)) => Ordering::Less,
            (Err(_), Ok(_)) => Ordering::Greater,
            (Err(_), Err(_)) => x.cmp(y),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}

/// Compare two semantic versions such as catalog schema versions.
pub fn compare_semantic(a: &str, b: &str) -> Result<Ordering> {
    Ok(SemVer::parse(a)?.cmp(&SemVer::parse(b)?))
}

/// Compare two catalog schema versions.
pub fn compare_schema_versions(a: &str, b: &str) -> Result<Ordering> {
    compare_semantic(a, b)
}

/// Compare two library versions.
pub fn compare_lib_versions(a: &str, b: &str) -> Result<Ordering> {
    let a = LibVersion::parse(a)?;
    let b = LibVersion::parse(b)?;
    if a.tag == b.tag {
        return Ok(a.commits.cmp(&b.commits));
    }
    compare_semantic(
        a.tag.strip_prefix('v').unwrap_or(&a.tag),
        b.tag.strip_prefix('v').unwrap_or(&b.tag),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lib_versions() {
        let v = LibVersion::parse("v0.1.0-beta2-17-gf63950e").unwrap();
        assert_eq!(v.tag, "v0.1.0-beta2");
        assert_eq!(v.commits, 17);
        assert_eq!(v.hash, "gf63950e");

        assert!(LibVersion::parse("0.1.0").is_err());
        assert!(LibVersion::parse("v0.1.0-x-g12").is_err());
    }

    #[test]
    fn same_tag_compares_commit_count() {
        assert_eq!(
            compare_lib_versions("v0.2.0-3-gabc", "v0.2.0-10-gdef").unwrap(),
            Ordering::Less
        );
        assert_eq!(
            compare_lib_versions("v0.2.0-3-gabc", "v0.2.0-3-gdef").unwrap(),
            Ordering::Equal
        );
    }

    #[test]
    fn different_tags_compare_semantically() {
        assert_eq!(
            compare_lib_versions("v0.10.0-0-g0", "v0.9.0-50-g1").unwrap(),
            Ordering::Greater
        );
        assert_eq!(
            compare_lib_versions("v0.1.0-alpha-4-g6f9305e", "v0.1.0-0-g6f9305e").unwrap(),
            Ordering::Less
        );
        assert_eq!(
            compare_lib_versions("v0.1.0-beta2-1-g1", "v0.1.0-beta10-1-g1").unwrap(),
            Ordering::Greater
        );
    }

    #[test]
    fn schema_versions() {
        assert_eq!(compare_schema_versions("0.0.0", "0.0.1").unwrap(), Ordering::Less);
        assert_eq!(compare_schema_versions("1.0.0", "0.9.9").unwrap(), Ordering::Greater);
        assert_eq!(compare_schema_versions("1.0.0", "1.0.0").unwrap(), Ordering::Equal);
        assert!(compare_schema_versions("one", "1.0.0").is_err());
    }
}
