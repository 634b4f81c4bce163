//! Source indexers and the glob registry that dispatches to them.
//!
//! An indexer turns one source file into zero or more *bare* descriptors
//! (no embedding yet) plus keep-going errors. Slow work such as embedding
//! happens later in the builder.
//!
//! | Pattern | Indexer | Catalog |
//! |---------|---------|---------|
//! | `*.py` | [`SourceIndexer::Python`] | tool |
//! | `*.sqlpp` | [`SourceIndexer::Sqlpp`] | tool |
//! | `*.yaml` | [`SourceIndexer::Yaml`] | tool |
//! | `*.prompt` | [`SourceIndexer::RawPrompt`] | prompt |
//! | `*.jinja` | [`SourceIndexer::JinjaPrompt`] | prompt |
//!
//! Patterns are matched against the file name in registry order; the first
//! match wins.

mod prompt;
mod python;
mod sqlpp;
mod yaml;

use std::path::Path;

use globset::{Glob, GlobMatcher, GlobSet};

use agent_catalog_core::models::{CatalogKind, RecordDescriptor, RecordKind, VersionDescriptor};
use agent_catalog_core::CatalogError;

use crate::scanner::build_globset;

/// Resolves the version of one source file.
pub type PathVersionFn<'a> = dyn Fn(&Path) -> anyhow::Result<VersionDescriptor> + Send + Sync + 'a;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceIndexer {
    Python,
    Sqlpp,
    Yaml,
    RawPrompt,
    JinjaPrompt,
}

impl SourceIndexer {
    /// The catalog this indexer's descriptors belong to.
    pub fn catalog_kind(&self) -> CatalogKind {
        match self {
            SourceIndexer::RawPrompt | SourceIndexer::JinjaPrompt => CatalogKind::Prompt,
            _ => CatalogKind::Tool,
        }
    }

    /// Produce bare descriptors for `path`, plus keep-going errors.
    pub fn start_descriptors(
        &self,
        path: &Path,
        get_path_version: &PathVersionFn,
    ) -> (Vec<CatalogError>, Vec<RecordDescriptor>) {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => return (vec![CatalogError::extraction(path, e)], Vec::new()),
        };
        let version = match get_path_version(path) {
            Ok(version) => version,
            Err(e) => {
                return (
                    vec![CatalogError::extraction(
                        path,
                        format!("cannot determine version: {:#}", e),
                    )],
                    Vec::new(),
                )
            }
        };

        let result = match self {
            SourceIndexer::Python => {
                let (mut errors, descriptors) = python::start_descriptors(path, &text, &version);
                errors.extend(check_names(path, &descriptors));
                return (errors, keep_valid_names(descriptors));
            }
            SourceIndexer::Sqlpp => sqlpp::start_descriptors(path, &text, &version),
            SourceIndexer::Yaml => yaml::start_descriptors(path, &text, &version),
            SourceIndexer::RawPrompt => {
                prompt::start_descriptors(path, &text, &version, RecordKind::RawPrompt)
            }
            SourceIndexer::JinjaPrompt => {
                prompt::start_descriptors(path, &text, &version, RecordKind::JinjaPrompt)
            }
        };

        match result {
            Ok(descriptors) => {
                let errors = check_names(path, &descriptors);
                (errors, keep_valid_names(descriptors))
            }
            Err(e) => (vec![e], Vec::new()),
        }
    }
}

fn check_names(path: &Path, descriptors: &[RecordDescriptor]) -> Vec<CatalogError> {
    descriptors
        .iter()
        .filter(|d| !agent_catalog_core::models::is_valid_identifier(&d.name))
        .map(|d| CatalogError::extraction(path, format!("name '{}' is not a valid identifier", d.name)))
        .collect()
}

fn keep_valid_names(descriptors: Vec<RecordDescriptor>) -> Vec<RecordDescriptor> {
    descriptors
        .into_iter()
        .filter(|d| agent_catalog_core::models::is_valid_identifier(&d.name))
        .collect()
}

/// Convert a JSON-schema field given either as a JSON string or as a YAML
/// mapping into a JSON value.
pub(crate) fn schema_value(
    path: &Path,
    field: &str,
    value: serde_yaml::Value,
) -> Result<serde_json::Value, CatalogError> {
    match value {
        serde_yaml::Value::String(s) => serde_json::from_str(&s).map_err(|e| {
            CatalogError::extraction(path, format!("{} is not a valid JSON schema: {}", field, e))
        }),
        serde_yaml::Value::Mapping(_) => serde_json::to_value(&value)
            .map_err(|e| CatalogError::extraction(path, format!("{}: {}", field, e))),
        _ => Err(CatalogError::extraction(
            path,
            format!("{} must be a JSON string or a YAML mapping", field),
        )),
    }
}

/// Ordered glob → indexer table.
pub struct IndexerRegistry {
    entries: Vec<(String, GlobMatcher, SourceIndexer)>,
    kind: Option<CatalogKind>,
}

impl IndexerRegistry {
    /// All five indexers in their default order.
    pub fn new() -> anyhow::Result<Self> {
        let table = [
            ("*.py", SourceIndexer::Python),
            ("*.sqlpp", SourceIndexer::Sqlpp),
            ("*.yaml", SourceIndexer::Yaml),
            ("*.prompt", SourceIndexer::RawPrompt),
            ("*.jinja", SourceIndexer::JinjaPrompt),
        ];
        let mut entries = Vec::with_capacity(table.len());
        for (pattern, indexer) in table {
            entries.push((pattern.to_string(), Glob::new(pattern)?.compile_matcher(), indexer));
        }
        Ok(Self {
            entries,
            kind: None,
        })
    }

    /// Only the indexers feeding the `kind` catalog.
    pub fn for_kind(kind: CatalogKind) -> anyhow::Result<Self> {
        let mut registry = Self::new()?;
        registry.entries.retain(|(_, _, indexer)| indexer.catalog_kind() == kind);
        registry.kind = Some(kind);
        Ok(registry)
    }

    pub fn patterns(&self) -> Vec<String> {
        self.entries.iter().map(|(p, _, _)| p.clone()).collect()
    }

    /// Glob set of every registered pattern, for the scanner.
    pub fn globset(&self) -> anyhow::Result<GlobSet> {
        build_globset(&self.patterns())
    }

    /// First indexer whose pattern matches the file name.
    pub fn dispatch(&self, path: &Path) -> Option<SourceIndexer> {
        let name = path.file_name()?;
        self.entries
            .iter()
            .find(|(_, matcher, _)| matcher.is_match(Path::new(name)))
            .map(|(_, _, indexer)| *indexer)
    }

    /// Dispatch and index `path`, dropping descriptors of other catalog kinds.
    pub fn start_descriptors(
        &self,
        path: &Path,
        get_path_version: &PathVersionFn,
    ) -> (Vec<CatalogError>, Vec<RecordDescriptor>) {
        let Some(indexer) = self.dispatch(path) else {
            return (Vec::new(), Vec::new());
        };
        let (errors, mut descriptors) = indexer.start_descriptors(path, get_path_version);
        if let Some(kind) = self.kind {
            descriptors.retain(|d| d.record_kind().catalog_kind() == kind);
        }
        (errors, descriptors)
    }
}
