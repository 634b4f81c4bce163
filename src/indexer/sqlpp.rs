//! `*.sqlpp` indexer: one SQL++ query per file.
//!
//! The first `/* ... */` comment holds YAML metadata:
//!
//! ```sql
//! /*
//! name: get_nearby_airports
//! description: >
//!     Find airports within a radius of the given coordinates.
//! input: >
//!     { "type": "object", "properties": { "lat": { "type": "number" } } }
//! annotations:
//!     domain: travel
//! */
//! SELECT a.* FROM airports a WHERE ...;
//! ```
//!
//! `input` and `output` are JSON schemas, given inline as a string or as a
//! YAML mapping.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use tracing::warn;

use agent_catalog_core::models::{DescriptorKind, RecordDescriptor, VersionDescriptor};
use agent_catalog_core::CatalogError;

use super::schema_value;

static COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*(.*?)\*/").expect("static regex is valid"));

#[derive(Debug, Deserialize)]
struct SqlppMetadata {
    name: String,
    description: String,
    input: serde_yaml::Value,
    #[serde(default)]
    output: Option<serde_yaml::Value>,
    #[serde(default)]
    annotations: Option<BTreeMap<String, String>>,
}

pub fn start_descriptors(
    path: &Path,
    text: &str,
    version: &VersionDescriptor,
) -> Result<Vec<RecordDescriptor>, CatalogError> {
    let mut comments = COMMENT_RE.captures_iter(text);
    let Some(first) = comments.next() else {
        return Err(CatalogError::extraction(
            path,
            "malformed input, no multi-line comment found",
        ));
    };
    if comments.next().is_some() {
        warn!(path = %path.display(), "more than one multi-line comment found, using the first");
    }

    let metadata: SqlppMetadata = serde_yaml::from_str(&first[1])
        .map_err(|e| CatalogError::extraction(path, format!("bad front matter: {}", e)))?;

    let input = schema_value(path, "input", metadata.input)?;
    let output = metadata
        .output
        .map(|v| schema_value(path, "output", v))
        .transpose()?;

    Ok(vec![RecordDescriptor {
        name: metadata.name.trim().to_string(),
        description: metadata.description.trim().to_string(),
        source: path.to_path_buf(),
        version: version.clone(),
        embedding: None,
        annotations: metadata.annotations,
        kind: DescriptorKind::SqlppQuery {
            query: text.to_string(),
            input,
            output,
        },
    }])
}
