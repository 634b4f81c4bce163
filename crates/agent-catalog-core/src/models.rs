//! Catalog data types.
//!
//! These types are shared by the indexer, both catalog implementations,
//! and the CLI. They serialize to the JSON layout of the local catalog
//! file and of the documents written to a remote store.
//!
//! # Identity
//!
//! Every [`RecordDescriptor`] has two keys:
//!
//! | Key | Shape | Used for |
//! |-----|-------|----------|
//! | [`identifier`](RecordDescriptor::identifier) | `source:name:git_<commit>[_dirty]` | sort order, remote document keys |
//! | [`source_name`](RecordDescriptor::source_name) | `source:name` | matching across snapshots, chain de-duplication |

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, Result};

/// Schema version of the catalog JSON layout written by this crate.
pub const CATALOG_SCHEMA_VERSION: &str = "0.0.0";

/// Versioning scheme that produced a [`VersionDescriptor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionSystem {
    /// Identifier is a git commit hash.
    #[default]
    Git,
    /// Identifier is a content hash of the file itself.
    Raw,
}

/// Point-in-time identity of a source artifact or of a whole catalog.
///
/// Immutable once constructed. A descriptor that is not dirty always
/// carries an identifier; this holds for values built with the
/// constructors below and for values read back from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "VersionRecord")]
pub struct VersionDescriptor {
    identifier: Option<String>,
    is_dirty: bool,
    version_system: VersionSystem,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<BTreeMap<String, String>>,
    timestamp: DateTime<Utc>,
}

#[derive(Deserialize)]
struct VersionRecord {
    #[serde(default)]
    identifier: Option<String>,
    #[serde(default)]
    is_dirty: bool,
    #[serde(default)]
    version_system: VersionSystem,
    #[serde(default)]
    metadata: Option<BTreeMap<String, String>>,
    #[serde(default = "Utc::now")]
    timestamp: DateTime<Utc>,
}

impl TryFrom<VersionRecord> for VersionDescriptor {
    type Error = CatalogError;

    fn try_from(r: VersionRecord) -> Result<Self> {
        let mut v =
            VersionDescriptor::new(r.identifier, r.is_dirty, r.version_system, r.timestamp)?;
        v.metadata = r.metadata;
        Ok(v)
    }
}

impl VersionDescriptor {
    /// Build a descriptor, rejecting a clean version without an identifier.
    pub fn new(
        identifier: Option<String>,
        is_dirty: bool,
        version_system: VersionSystem,
        timestamp: DateTime<Utc>,
    ) -> Result<Self> {
        if identifier.is_none() && !is_dirty {
            return Err(CatalogError::Validation(
                "a non-dirty version descriptor must have an identifier".to_string(),
            ));
        }
        Ok(Self {
            identifier,
            is_dirty,
            version_system,
            metadata: None,
            timestamp,
        })
    }

    /// A clean git version at `commit`, stamped now.
    pub fn committed(commit: impl Into<String>) -> Self {
        Self {
            identifier: Some(commit.into()),
            is_dirty: false,
            version_system: VersionSystem::Git,
            metadata: None,
            timestamp: Utc::now(),
        }
    }

    /// A dirty git version, optionally anchored at the last known commit.
    pub fn dirty(commit: Option<String>) -> Self {
        Self {
            identifier: commit,
            is_dirty: true,
            version_system: VersionSystem::Git,
            metadata: None,
            timestamp: Utc::now(),
        }
    }

    /// A clean content-hash version, for sources outside version control.
    pub fn raw(hash: impl Into<String>) -> Self {
        Self {
            identifier: Some(hash.into()),
            is_dirty: false,
            version_system: VersionSystem::Raw,
            metadata: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty
    }

    pub fn version_system(&self) -> VersionSystem {
        self.version_system
    }

    pub fn metadata(&self) -> Option<&BTreeMap<String, String>> {
        self.metadata.as_ref()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Version component of a record identifier: `git_<id>[_dirty]` or `<id>[_dirty]`.
    pub fn suffix(&self) -> String {
        let mut suffix = self.identifier.clone().unwrap_or_default();
        if self.is_dirty {
            suffix.push_str("_dirty");
        }
        match self.version_system {
            VersionSystem::Git => format!("git_{}", suffix),
            VersionSystem::Raw => suffix,
        }
    }
}

/// The two kinds of catalog kept per project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogKind {
    Tool,
    Prompt,
}

impl CatalogKind {
    pub const ALL: [CatalogKind; 2] = [CatalogKind::Tool, CatalogKind::Prompt];

    pub fn as_str(&self) -> &'static str {
        match self {
            CatalogKind::Tool => "tool",
            CatalogKind::Prompt => "prompt",
        }
    }

    /// File name of the local catalog, e.g. `tool-catalog.json`.
    pub fn file_name(&self) -> String {
        format!("{}-catalog.json", self.as_str())
    }
}

impl fmt::Display for CatalogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CatalogKind {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tool" | "tools" => Ok(CatalogKind::Tool),
            "prompt" | "prompts" => Ok(CatalogKind::Prompt),
            other => Err(CatalogError::Validation(format!(
                "unknown catalog kind '{}', expected tool or prompt",
                other
            ))),
        }
    }
}

/// Discriminant of [`DescriptorKind`], as written in the `record_kind` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    PythonFunction,
    SqlppQuery,
    SemanticSearch,
    HttpRequest,
    RawPrompt,
    JinjaPrompt,
    ModelInput,
}

impl RecordKind {
    pub fn catalog_kind(&self) -> CatalogKind {
        match self {
            RecordKind::RawPrompt | RecordKind::JinjaPrompt => CatalogKind::Prompt,
            _ => CatalogKind::Tool,
        }
    }
}

/// Source of a decorated Python tool function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PythonContent {
    pub func_content: String,
    pub line_start: usize,
    pub line_end: usize,
}

/// Target collection and index of a semantic-search tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorSearchTarget {
    pub bucket: String,
    pub scope: String,
    pub collection: String,
    pub index: String,
    pub vector_field: String,
    pub text_field: String,
    pub embedding_model: String,
    #[serde(default = "default_num_candidates")]
    pub num_candidates: u32,
}

fn default_num_candidates() -> u32 {
    3
}

/// One operation of an OpenAPI specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpOperation {
    pub path: String,
    pub method: String,
}

/// Where the OpenAPI specification behind an HTTP tool lives.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HttpSpecification {
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// A tool lookup attached to a prompt: by exact name or by query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSearch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub annotations: Option<String>,
    #[serde(default = "default_tool_search_limit")]
    pub limit: i64,
}

fn default_tool_search_limit() -> i64 {
    1
}

/// Kind-specific payload of a record, tagged by `record_kind`.
///
/// The catalog carries these fields through load, merge, and publish but
/// only the indexer that produced them interprets them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record_kind", rename_all = "snake_case")]
pub enum DescriptorKind {
    PythonFunction {
        contents: PythonContent,
    },
    SqlppQuery {
        query: String,
        input: serde_json::Value,
        #[serde(default)]
        output: Option<serde_json::Value>,
    },
    SemanticSearch {
        input: serde_json::Value,
        vector_search: VectorSearchTarget,
    },
    HttpRequest {
        operation: HttpOperation,
        specification: HttpSpecification,
    },
    RawPrompt {
        prompt: String,
        #[serde(default)]
        tools: Vec<ToolSearch>,
    },
    JinjaPrompt {
        prompt: String,
        #[serde(default)]
        tools: Vec<ToolSearch>,
    },
    ModelInput {
        input: serde_json::Value,
    },
}

impl DescriptorKind {
    pub fn record_kind(&self) -> RecordKind {
        match self {
            DescriptorKind::PythonFunction { .. } => RecordKind::PythonFunction,
            DescriptorKind::SqlppQuery { .. } => RecordKind::SqlppQuery,
            DescriptorKind::SemanticSearch { .. } => RecordKind::SemanticSearch,
            DescriptorKind::HttpRequest { .. } => RecordKind::HttpRequest,
            DescriptorKind::RawPrompt { .. } => RecordKind::RawPrompt,
            DescriptorKind::JinjaPrompt { .. } => RecordKind::JinjaPrompt,
            DescriptorKind::ModelInput { .. } => RecordKind::ModelInput,
        }
    }
}

/// One catalog entry: a tool or a prompt.
///
/// Created bare (no embedding) by an indexer, completed by the embedding
/// step, then persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordDescriptor {
    pub name: String,
    pub description: String,
    pub source: PathBuf,
    pub version: VersionDescriptor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
    #[serde(flatten)]
    pub kind: DescriptorKind,
}

impl RecordDescriptor {
    pub fn record_kind(&self) -> RecordKind {
        self.kind.record_kind()
    }

    /// Version-dependent key: `source:name:<version suffix>`.
    pub fn identifier(&self) -> String {
        format!(
            "{}:{}:{}",
            self.source.display(),
            self.name,
            self.version.suffix()
        )
    }

    /// Version-independent key: `source:name`.
    pub fn source_name(&self) -> String {
        format!("{}:{}", self.source.display(), self.name)
    }

    /// Check the description against the index-time limits.
    pub fn validate(&self, max_description_words: usize) -> Result<()> {
        if !is_valid_identifier(&self.name) {
            return Err(CatalogError::Validation(format!(
                "name '{}' in {} is not a valid identifier",
                self.name,
                self.source.display()
            )));
        }
        if self.description.trim().is_empty() {
            return Err(CatalogError::Validation(format!(
                "description for '{}' ({}) is empty",
                self.name,
                self.source.display()
            )));
        }
        let words = self.description.split_whitespace().count();
        if words > max_description_words {
            return Err(CatalogError::Validation(format!(
                "description for '{}' ({}) has {} words, more than the limit of {}",
                self.name,
                self.source.display(),
                words,
                max_description_words
            )));
        }
        Ok(())
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

fn default_project() -> String {
    "main".to_string()
}

/// The persisted snapshot of one catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogDescriptor {
    pub schema_version: String,
    pub library_version: String,
    pub kind: CatalogKind,
    pub embedding_model: String,
    pub version: VersionDescriptor,
    pub source_dirs: Vec<String>,
    #[serde(default = "default_project")]
    pub project: String,
    #[serde(default)]
    pub items: Vec<RecordDescriptor>,
}

/// Schema and library versions of the running tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaVersion {
    pub schema_version: String,
    pub library_version: String,
}

impl MetaVersion {
    /// Versions for a build whose package version is `pkg_version`.
    pub fn for_package(pkg_version: &str) -> Self {
        Self {
            schema_version: CATALOG_SCHEMA_VERSION.to_string(),
            library_version: format!("v{}-0-g0", pkg_version),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn python_tool(name: &str, version: VersionDescriptor) -> RecordDescriptor {
        RecordDescriptor {
            name: name.to_string(),
            description: "adds two numbers".to_string(),
            source: PathBuf::from("tools/math.py"),
            version,
            embedding: None,
            annotations: None,
            kind: DescriptorKind::PythonFunction {
                contents: PythonContent {
                    func_content: "def add(a, b):\n    return a + b\n".to_string(),
                    line_start: 3,
                    line_end: 5,
                },
            },
        }
    }

    #[test]
    fn clean_version_requires_identifier() {
        let err = VersionDescriptor::new(None, false, VersionSystem::Git, Utc::now());
        assert!(matches!(err, Err(CatalogError::Validation(_))));
        assert!(VersionDescriptor::new(None, true, VersionSystem::Git, Utc::now()).is_ok());
    }

    #[test]
    fn clean_version_without_identifier_rejected_on_decode() {
        let json = r#"{"identifier": null, "is_dirty": false, "timestamp": "2024-01-01T00:00:00Z"}"#;
        assert!(serde_json::from_str::<VersionDescriptor>(json).is_err());
    }

    #[test]
    fn identifier_includes_version_suffix() {
        let clean = python_tool("add", VersionDescriptor::committed("abc123"));
        assert_eq!(clean.identifier(), "tools/math.py:add:git_abc123");

        let dirty = python_tool("add", VersionDescriptor::dirty(Some("abc123".into())));
        assert_eq!(dirty.identifier(), "tools/math.py:add:git_abc123_dirty");

        let raw = python_tool("add", VersionDescriptor::raw("f00d"));
        assert_eq!(raw.identifier(), "tools/math.py:add:f00d");

        assert_eq!(clean.source_name(), "tools/math.py:add");
    }

    #[test]
    fn record_kind_is_written_as_tag() {
        let record = python_tool("add", VersionDescriptor::committed("abc123"));
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["record_kind"], "python_function");
        assert_eq!(value["contents"]["line_start"], 3);

        let back: RecordDescriptor = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn unknown_fields_are_ignored_on_decode() {
        let record = python_tool("add", VersionDescriptor::committed("abc123"));
        let mut value = serde_json::to_value(&record).unwrap();
        value["catalog_identifier"] = serde_json::json!("abc123");
        let back: RecordDescriptor = serde_json::from_value(value).unwrap();
        assert_eq!(back.name, "add");
    }

    #[test]
    fn validate_rejects_empty_and_long_descriptions() {
        let mut record = python_tool("add", VersionDescriptor::committed("abc123"));
        assert!(record.validate(256).is_ok());

        record.description = "   ".to_string();
        assert!(matches!(record.validate(256), Err(CatalogError::Validation(_))));

        record.description = "word ".repeat(10);
        assert!(record.validate(10).is_ok());
        assert!(record.validate(9).is_err());
    }

    #[test]
    fn identifier_rule() {
        assert!(is_valid_identifier("get_user"));
        assert!(is_valid_identifier("_private1"));
        assert!(!is_valid_identifier("1abc"));
        assert!(!is_valid_identifier("has-dash"));
        assert!(!is_valid_identifier(""));
    }

    #[test]
    fn prompts_belong_to_prompt_catalog() {
        assert_eq!(RecordKind::JinjaPrompt.catalog_kind(), CatalogKind::Prompt);
        assert_eq!(RecordKind::SqlppQuery.catalog_kind(), CatalogKind::Tool);
        assert_eq!("prompts".parse::<CatalogKind>().unwrap(), CatalogKind::Prompt);
    }
}
