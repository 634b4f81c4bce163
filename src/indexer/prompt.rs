//! `*.prompt` and `*.jinja` indexer.
//!
//! A prompt file is YAML front matter between `---` fences, then the prompt
//! body:
//!
//! ```text
//! ---
//! record_kind: raw_prompt
//! name: route_finding_prompt
//! description: Instructions for planning a route between two airports.
//! annotations:
//!   organization: sales
//! tools:
//!   - name: find_direct_routes
//!   - query: "finding routes with one layover"
//!     limit: 2
//! ---
//! You are a helpful travel agent...
//! ```
//!
//! Each tool reference names exactly one of `name` or `query`. A front
//! matter `record_kind` wins over the file extension.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use agent_catalog_core::annotation::AnnotationPredicate;
use agent_catalog_core::models::{
    DescriptorKind, RecordDescriptor, RecordKind, ToolSearch, VersionDescriptor,
};
use agent_catalog_core::CatalogError;

static FRONT_MATTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*---[ \t]*\r?\n(.*?)\r?\n---[ \t]*(?:\r?\n|$)(.*)$")
        .expect("static regex is valid")
});

#[derive(Debug, Deserialize)]
struct PromptMetadata {
    name: String,
    description: String,
    #[serde(default)]
    record_kind: Option<RecordKind>,
    #[serde(default)]
    annotations: Option<BTreeMap<String, String>>,
    #[serde(default)]
    tools: Vec<ToolSearch>,
}

fn check_tool_search(path: &Path, search: &ToolSearch) -> Result<(), CatalogError> {
    match (&search.name, &search.query) {
        (None, None) => {
            return Err(CatalogError::extraction(
                path,
                "a tool reference needs either a name or a query",
            ))
        }
        (Some(_), Some(_)) => {
            return Err(CatalogError::extraction(
                path,
                "a tool reference cannot give both a name and a query",
            ))
        }
        _ => {}
    }
    if search.limit < 0 {
        return Err(CatalogError::extraction(
            path,
            "a tool reference limit must be >= 0",
        ));
    }
    if let Some(annotations) = &search.annotations {
        AnnotationPredicate::parse(annotations)
            .map_err(|e| CatalogError::extraction(path, e))?;
    }
    Ok(())
}

/// Index one prompt file. `default_kind` comes from the file extension.
pub fn start_descriptors(
    path: &Path,
    text: &str,
    version: &VersionDescriptor,
    default_kind: RecordKind,
) -> Result<Vec<RecordDescriptor>, CatalogError> {
    let caps = FRONT_MATTER_RE.captures(text).ok_or_else(|| {
        CatalogError::extraction(path, "malformed input, no front matter found")
    })?;
    let metadata: PromptMetadata = serde_yaml::from_str(&caps[1])
        .map_err(|e| CatalogError::extraction(path, format!("bad front matter: {}", e)))?;
    let prompt = caps[2].to_string();

    for search in &metadata.tools {
        check_tool_search(path, search)?;
    }

    let kind = match metadata.record_kind.unwrap_or(default_kind) {
        RecordKind::RawPrompt => DescriptorKind::RawPrompt {
            prompt,
            tools: metadata.tools,
        },
        RecordKind::JinjaPrompt => DescriptorKind::JinjaPrompt {
            prompt,
            tools: metadata.tools,
        },
        other => {
            return Err(CatalogError::extraction(
                path,
                format!("record_kind {:?} is not a prompt kind", other),
            ))
        }
    };

    Ok(vec![RecordDescriptor {
        name: metadata.name.trim().to_string(),
        description: metadata.description.trim().to_string(),
        source: path.to_path_buf(),
        version: version.clone(),
        embedding: None,
        annotations: metadata.annotations,
        kind,
    }])
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROMPT: &str = r#"---
record_kind: raw_prompt
name: route_finding_prompt
description: >
    Instructions for planning a route between two airports.
annotations:
    organization: sales
tools:
    - name: find_direct_routes
    - query: "finding routes with one layover"
      annotations: 'gdpr_2016_compliant = "true"'
      limit: 2
---
You are a helpful travel agent.
Plan the route --- carefully.
"#;

    fn run(text: &str, kind: RecordKind) -> Result<Vec<RecordDescriptor>, CatalogError> {
        start_descriptors(
            Path::new("prompts/route.prompt"),
            text,
            &VersionDescriptor::committed("abc"),
            kind,
        )
    }

    #[test]
    fn splits_front_matter_from_body() {
        let items = run(PROMPT, RecordKind::RawPrompt).unwrap();
        let item = &items[0];
        assert_eq!(item.name, "route_finding_prompt");
        assert_eq!(item.record_kind(), RecordKind::RawPrompt);
        match &item.kind {
            DescriptorKind::RawPrompt { prompt, tools } => {
                assert_eq!(
                    prompt,
                    "You are a helpful travel agent.\nPlan the route --- carefully.\n"
                );
                assert_eq!(tools.len(), 2);
                assert_eq!(tools[0].limit, 1);
                assert_eq!(tools[1].limit, 2);
            }
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn extension_decides_kind_without_front_matter_kind() {
        let text = "---\nname: greet\ndescription: Say hello.\n---\nHello {{ name }}!\n";
        let items = run(text, RecordKind::JinjaPrompt).unwrap();
        assert_eq!(items[0].record_kind(), RecordKind::JinjaPrompt);
    }

    #[test]
    fn tool_reference_needs_exactly_one_of_name_or_query() {
        let both = "---\nname: p\ndescription: d\ntools:\n  - name: a\n    query: b\n---\nbody\n";
        assert!(run(both, RecordKind::RawPrompt).is_err());
        let neither = "---\nname: p\ndescription: d\ntools:\n  - limit: 3\n---\nbody\n";
        assert!(run(neither, RecordKind::RawPrompt).is_err());
    }

    #[test]
    fn bad_annotation_query_is_rejected() {
        let text = "---\nname: p\ndescription: d\ntools:\n  - query: q\n    annotations: 'not a predicate'\n---\nbody\n";
        assert!(run(text, RecordKind::RawPrompt).is_err());
    }

    #[test]
    fn missing_front_matter_is_extraction_error() {
        let err = run("just a prompt", RecordKind::RawPrompt).unwrap_err();
        assert!(err.is_keep_going());
    }
}
