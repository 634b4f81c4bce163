//! `*.yaml` indexer: declarative tools.
//!
//! The `record_kind` field selects the shape:
//!
//! | `record_kind` | Descriptors |
//! |---------------|-------------|
//! | `semantic_search` | one, searching a vector index |
//! | `http_request` | one per listed OpenAPI operation |
//!
//! Files without `record_kind`, or with any other value, are skipped with a
//! warning. For HTTP tools each operation takes its name from the
//! `operationId` and its description from the `description` (or `summary`)
//! of the referenced OpenAPI document, resolved relative to the YAML file.
//! An operation may also spell out `name` and `description` itself, which
//! is required when the document is only reachable by URL.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use agent_catalog_core::models::{
    DescriptorKind, HttpOperation, HttpSpecification, RecordDescriptor, VectorSearchTarget,
    VersionDescriptor,
};
use agent_catalog_core::CatalogError;

use super::schema_value;

#[derive(Debug, Deserialize)]
struct SemanticSearchMetadata {
    name: String,
    description: String,
    input: serde_yaml::Value,
    #[serde(default)]
    annotations: Option<BTreeMap<String, String>>,
    vector_search: VectorSearchTarget,
    #[serde(default)]
    num_candidates: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OperationMetadata {
    path: String,
    method: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenApiMetadata {
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    url: Option<String>,
    operations: Vec<OperationMetadata>,
}

#[derive(Debug, Deserialize)]
struct HttpRequestMetadata {
    open_api: OpenApiMetadata,
    #[serde(default)]
    annotations: Option<BTreeMap<String, String>>,
}

pub fn start_descriptors(
    path: &Path,
    text: &str,
    version: &VersionDescriptor,
) -> Result<Vec<RecordDescriptor>, CatalogError> {
    let doc: serde_yaml::Value = serde_yaml::from_str(text)
        .map_err(|e| CatalogError::extraction(path, format!("malformed YAML: {}", e)))?;

    let record_kind = doc.get("record_kind").and_then(|v| v.as_str());
    match record_kind {
        Some("semantic_search") => semantic_search(path, doc, version),
        Some("http_request") => http_request(path, doc, version),
        other => {
            warn!(
                path = %path.display(),
                record_kind = ?other,
                "YAML file without a known record_kind, not indexing"
            );
            Ok(Vec::new())
        }
    }
}

fn semantic_search(
    path: &Path,
    doc: serde_yaml::Value,
    version: &VersionDescriptor,
) -> Result<Vec<RecordDescriptor>, CatalogError> {
    let metadata: SemanticSearchMetadata = serde_yaml::from_value(doc)
        .map_err(|e| CatalogError::extraction(path, e))?;

    let input = schema_value(path, "input", metadata.input)?;
    if input.as_object().map_or(true, |o| o.is_empty()) {
        return Err(CatalogError::extraction(
            path,
            "semantic_search cannot have an empty input",
        ));
    }

    let mut vector_search = metadata.vector_search;
    if let Some(n) = metadata.num_candidates {
        vector_search.num_candidates = n;
    }

    Ok(vec![RecordDescriptor {
        name: metadata.name.trim().to_string(),
        description: metadata.description.trim().to_string(),
        source: path.to_path_buf(),
        version: version.clone(),
        embedding: None,
        annotations: metadata.annotations,
        kind: DescriptorKind::SemanticSearch {
            input,
            vector_search,
        },
    }])
}

fn http_request(
    path: &Path,
    doc: serde_yaml::Value,
    version: &VersionDescriptor,
) -> Result<Vec<RecordDescriptor>, CatalogError> {
    let metadata: HttpRequestMetadata = serde_yaml::from_value(doc)
        .map_err(|e| CatalogError::extraction(path, e))?;
    let open_api = metadata.open_api;
    if open_api.filename.is_none() && open_api.url.is_none() {
        return Err(CatalogError::extraction(
            path,
            "open_api must give a filename or a url",
        ));
    }

    let spec_doc = match &open_api.filename {
        Some(filename) => Some(load_openapi(path, filename)?),
        None => None,
    };

    let mut descriptors = Vec::with_capacity(open_api.operations.len());
    for operation in open_api.operations {
        let method = operation.method.to_lowercase();
        let resolved = spec_doc
            .as_ref()
            .and_then(|spec| spec.get("paths"))
            .and_then(|paths| paths.get(operation.path.as_str()))
            .and_then(|item| item.get(method.as_str()));

        let name = operation
            .name
            .or_else(|| yaml_str(resolved, "operationId"))
            .ok_or_else(|| {
                CatalogError::extraction(
                    path,
                    format!(
                        "no operationId for {} {}",
                        operation.method.to_uppercase(),
                        operation.path
                    ),
                )
            })?;
        let description = operation
            .description
            .or_else(|| yaml_str(resolved, "description"))
            .or_else(|| yaml_str(resolved, "summary"))
            .unwrap_or_default();

        descriptors.push(RecordDescriptor {
            name: name.trim().to_string(),
            description: description.trim().to_string(),
            source: path.to_path_buf(),
            version: version.clone(),
            embedding: None,
            annotations: metadata.annotations.clone(),
            kind: DescriptorKind::HttpRequest {
                operation: HttpOperation {
                    path: operation.path,
                    method,
                },
                specification: HttpSpecification {
                    filename: open_api.filename.clone(),
                    url: open_api.url.clone(),
                },
            },
        });
    }
    Ok(descriptors)
}

fn load_openapi(source: &Path, filename: &str) -> Result<serde_yaml::Value, CatalogError> {
    let spec_path = source
        .parent()
        .map(|dir| dir.join(filename))
        .unwrap_or_else(|| Path::new(filename).to_path_buf());
    let text = std::fs::read_to_string(&spec_path).map_err(|e| {
        CatalogError::extraction(
            source,
            format!("cannot read OpenAPI document {}: {}", spec_path.display(), e),
        )
    })?;
    serde_yaml::from_str(&text).map_err(|e| {
        CatalogError::extraction(
            source,
            format!("malformed OpenAPI document {}: {}", spec_path.display(), e),
        )
    })
}

fn yaml_str(value: Option<&serde_yaml::Value>, key: &str) -> Option<String> {
    value?.get(key)?.as_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn version() -> VersionDescriptor {
        VersionDescriptor::committed("abc")
    }

    #[test]
    fn semantic_search_tool() {
        let text = r#"
record_kind: semantic_search
name: get_travel_blog_snippets
description: >
    Find travel blog snippets about a destination.
input: >
    { "type": "object", "properties": { "query": { "type": "string" } } }
annotations:
    gdpr_2016_compliant: "true"
vector_search:
    bucket: travel-sample
    scope: inventory
    collection: article
    index: articles-index
    vector_field: vec
    text_field: text
    embedding_model: sentence-transformers/all-MiniLM-L12-v2
"#;
        let items = start_descriptors(Path::new("tools/blogs.yaml"), text, &version()).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "get_travel_blog_snippets");
        match &items[0].kind {
            DescriptorKind::SemanticSearch { vector_search, input } => {
                assert_eq!(vector_search.num_candidates, 3);
                assert_eq!(vector_search.collection, "article");
                assert_eq!(input["type"], "object");
            }
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn unknown_record_kind_is_skipped() {
        let items =
            start_descriptors(Path::new("x.yaml"), "record_kind: something_else\n", &version())
                .unwrap();
        assert!(items.is_empty());
        let items = start_descriptors(Path::new("x.yaml"), "name: foo\n", &version()).unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn http_request_resolves_operations_from_openapi_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("rewards.json"),
            r#"{
  "openapi": "3.0.0",
  "paths": {
    "/create": {
      "post": { "operationId": "create_new_member", "description": "Create a new rewards member." }
    },
    "/rewards/{member_id}": {
      "get": { "operationId": "get_member_rewards", "summary": "Look up a member's rewards." }
    }
  }
}"#,
        )
        .unwrap();
        let source = tmp.path().join("rewards.yaml");
        let text = r#"
record_kind: http_request
open_api:
  filename: rewards.json
  operations:
    - path: /create
      method: post
    - path: /rewards/{member_id}
      method: GET
annotations:
  team: loyalty
"#;
        let items = start_descriptors(&source, text, &version()).unwrap();
        let names: Vec<&str> = items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["create_new_member", "get_member_rewards"]);
        assert_eq!(items[1].description, "Look up a member's rewards.");
        assert_eq!(
            items[0].annotations.as_ref().unwrap().get("team").map(String::as_str),
            Some("loyalty")
        );
        match &items[1].kind {
            DescriptorKind::HttpRequest { operation, specification } => {
                assert_eq!(operation.method, "get");
                assert_eq!(specification.filename.as_deref(), Some("rewards.json"));
            }
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn http_request_with_unknown_operation_fails() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("api.yaml"), "openapi: 3.0.0\npaths: {}\n").unwrap();
        let text = "record_kind: http_request\nopen_api:\n  filename: api.yaml\n  operations:\n    - path: /missing\n      method: get\n";
        let err = start_descriptors(&tmp.path().join("tool.yaml"), text, &version()).unwrap_err();
        assert!(err.to_string().contains("no operationId"));
    }

    #[test]
    fn http_request_by_url_needs_inline_names() {
        let text = r#"
record_kind: http_request
open_api:
  url: https://example.com/openapi.json
  operations:
    - path: /ping
      method: get
      name: ping_service
      description: Check that the service is up.
"#;
        let items = start_descriptors(Path::new("ping.yaml"), text, &version()).unwrap();
        assert_eq!(items[0].name, "ping_service");
        match &items[0].kind {
            DescriptorKind::HttpRequest { specification, .. } => {
                assert_eq!(specification.url.as_deref(), Some("https://example.com/openapi.json"));
            }
            other => panic!("unexpected kind {:?}", other),
        }
    }
}
