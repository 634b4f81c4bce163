//! In-memory catalog backed by a local JSON snapshot.
//!
//! Vector search is brute-force cosine similarity over every candidate's
//! stored embedding. Sorting is stable, so items with equal similarity
//! keep their catalog order and repeated queries return the same ranking.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::embedding::{cosine_similarity, EmbeddingModel};
use crate::error::{CatalogError, Result};
use crate::models::{CatalogDescriptor, RecordDescriptor, VersionDescriptor};

use super::{apply_limit, Catalog, FindRequest, SearchResult, EXACT_MATCH_DELTA};

/// A fully materialized catalog.
pub struct CatalogMem {
    descriptor: CatalogDescriptor,
    model: Option<Arc<dyn EmbeddingModel>>,
}

impl std::fmt::Debug for CatalogMem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogMem")
            .field("kind", &self.descriptor.kind)
            .field("items", &self.descriptor.items.len())
            .field("model", &self.model.as_ref().map(|m| m.name().to_string()))
            .finish()
    }
}

impl CatalogMem {
    pub fn new(descriptor: CatalogDescriptor) -> Self {
        Self {
            descriptor,
            model: None,
        }
    }

    /// Read a catalog snapshot from `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let descriptor: CatalogDescriptor = serde_json::from_str(&content)?;
        debug!(
            path = %path.display(),
            items = descriptor.items.len(),
            "loaded catalog"
        );
        Ok(Self::new(descriptor))
    }

    /// Attach the model used to encode queries.
    ///
    /// Fails if the model differs from the one that embedded this catalog.
    pub fn with_model(mut self, model: Arc<dyn EmbeddingModel>) -> Result<Self> {
        if model.name() != self.descriptor.embedding_model {
            return Err(CatalogError::Compatibility(format!(
                "The {} catalog was built with embedding model '{}' but '{}' was requested.",
                self.descriptor.kind,
                self.descriptor.embedding_model,
                model.name()
            )));
        }
        self.model = Some(model);
        Ok(self)
    }

    /// Write the snapshot to `path`, items sorted by identifier.
    ///
    /// The file is written beside the target and renamed into place, so a
    /// concurrent reader sees either the old or the new snapshot.
    pub fn dump(&self, path: &Path) -> Result<()> {
        let mut sorted = self.descriptor.clone();
        sorted.items.sort_by_key(|item| item.identifier());

        let mut json = serde_json::to_string_pretty(&sorted)?;
        json.push('\n');

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "catalog.json".to_string());
        let tmp = path.with_file_name(format!(".{}.{}.tmp", file_name, std::process::id()));
        std::fs::write(&tmp, json)?;
        if let Err(e) = std::fs::rename(&tmp, path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    pub fn descriptor(&self) -> &CatalogDescriptor {
        &self.descriptor
    }

    pub fn items(&self) -> &[RecordDescriptor] {
        &self.descriptor.items
    }

    pub fn into_descriptor(self) -> CatalogDescriptor {
        self.descriptor
    }

    fn find_by_name(&self, name: &str, limit: i64) -> Vec<SearchResult> {
        let mut results: Vec<SearchResult> = self
            .descriptor
            .items
            .iter()
            .filter(|item| item.name == name)
            .map(|item| SearchResult {
                entry: item.clone(),
                delta: EXACT_MATCH_DELTA,
            })
            .collect();
        apply_limit(&mut results, limit);
        results
    }
}

#[async_trait]
impl Catalog for CatalogMem {
    async fn find(&self, request: &FindRequest) -> Result<Vec<SearchResult>> {
        if let Some(name) = &request.name {
            return Ok(self.find_by_name(name, request.limit));
        }
        let query = request.require_query()?;

        let candidates: Vec<&RecordDescriptor> = self
            .descriptor
            .items
            .iter()
            .filter(|item| match &request.annotations {
                Some(predicate) => predicate.matches(item.annotations.as_ref()),
                None => true,
            })
            .collect();
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let model = self.model.as_ref().ok_or_else(|| {
            CatalogError::Validation("no embedding model attached to the catalog".to_string())
        })?;
        let query_vec = model.encode(query).await?;

        let mut results: Vec<SearchResult> = candidates
            .into_iter()
            .filter_map(|item| match &item.embedding {
                Some(embedding) => Some(SearchResult {
                    entry: item.clone(),
                    delta: cosine_similarity(&query_vec, embedding),
                }),
                None => {
                    debug!(item = %item.identifier(), "skipping item without embedding");
                    None
                }
            })
            .collect();

        results.sort_by(|a, b| {
            b.delta
                .partial_cmp(&a.delta)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        apply_limit(&mut results, request.limit);
        Ok(results)
    }

    async fn version(&self) -> Result<VersionDescriptor> {
        Ok(self.descriptor.version.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::AnnotationPredicate;
    use crate::models::{CatalogKind, DescriptorKind, CATALOG_SCHEMA_VERSION};
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Maps known texts to fixed vectors and counts calls.
    struct StubModel {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingModel for StubModel {
        fn name(&self) -> &str {
            "stub"
        }
        async fn encode(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(match text {
                "weather" => vec![1.0, 0.0],
                _ => vec![0.0, 1.0],
            })
        }
    }

    fn item(name: &str, embedding: Vec<f32>, annotations: &[(&str, &str)]) -> RecordDescriptor {
        RecordDescriptor {
            name: name.to_string(),
            description: format!("the {} tool", name),
            source: PathBuf::from(format!("src/{}.sqlpp", name)),
            version: VersionDescriptor::committed("c0ffee"),
            embedding: Some(embedding),
            annotations: if annotations.is_empty() {
                None
            } else {
                Some(
                    annotations
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect::<BTreeMap<_, _>>(),
                )
            },
            kind: DescriptorKind::SqlppQuery {
                query: "SELECT 1;".to_string(),
                input: serde_json::json!({}),
                output: None,
            },
        }
    }

    fn catalog(items: Vec<RecordDescriptor>) -> (CatalogMem, Arc<StubModel>) {
        let model = Arc::new(StubModel {
            calls: AtomicUsize::new(0),
        });
        let descriptor = CatalogDescriptor {
            schema_version: CATALOG_SCHEMA_VERSION.to_string(),
            library_version: "v0.2.0-0-g0".to_string(),
            kind: CatalogKind::Tool,
            embedding_model: "stub".to_string(),
            version: VersionDescriptor::committed("c0ffee"),
            source_dirs: vec!["src".to_string()],
            project: "main".to_string(),
            items,
        };
        let mem = CatalogMem::new(descriptor).with_model(model.clone()).unwrap();
        (mem, model)
    }

    #[tokio::test]
    async fn name_lookup_skips_embedding() {
        let (mem, model) = catalog(vec![
            item("forecast", vec![1.0, 0.0], &[]),
            item("geocode", vec![0.0, 1.0], &[]),
        ]);
        let results = mem.find(&FindRequest::by_name("geocode")).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].entry.name, "geocode");
        assert_eq!(results[0].delta, 1.0);
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);

        let missing = mem.find(&FindRequest::by_name("nope")).await.unwrap();
        assert!(missing.is_empty());
    }

    #[tokio::test]
    async fn vector_search_orders_by_similarity_with_stable_ties() {
        let (mem, _) = catalog(vec![
            item("a", vec![0.0, 1.0], &[]),
            item("b", vec![1.0, 0.0], &[]),
            item("c", vec![2.0, 0.0], &[]),
            item("d", vec![0.7, 0.7], &[]),
        ]);
        let results = mem.find(&FindRequest::by_query("weather")).await.unwrap();
        let names: Vec<_> = results.iter().map(|r| r.entry.name.as_str()).collect();
        assert_eq!(names, vec!["b", "c", "d", "a"]);

        let limited = mem
            .find(&FindRequest::by_query("weather").with_limit(2))
            .await
            .unwrap();
        assert_eq!(limited.len(), 2);

        let unlimited = mem
            .find(&FindRequest::by_query("weather").with_limit(-1))
            .await
            .unwrap();
        assert_eq!(unlimited.len(), 4);
    }

    #[tokio::test]
    async fn annotation_pruning_excludes_unannotated() {
        let (mem, model) = catalog(vec![
            item("plain", vec![1.0, 0.0], &[]),
            item("eu", vec![1.0, 0.0], &[("region", "eu")]),
            item("us", vec![1.0, 0.0], &[("region", "us")]),
        ]);
        let predicate = AnnotationPredicate::parse(r#"region="eu""#).unwrap();
        let results = mem
            .find(&FindRequest::by_query("weather").with_annotations(predicate))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].entry.name, "eu");

        let none = AnnotationPredicate::parse(r#"region="apac""#).unwrap();
        let calls_before = model.calls.load(Ordering::SeqCst);
        let results = mem
            .find(&FindRequest::by_query("weather").with_annotations(none))
            .await
            .unwrap();
        assert!(results.is_empty());
        assert_eq!(model.calls.load(Ordering::SeqCst), calls_before);
    }

    #[test]
    fn model_mismatch_is_a_compatibility_error() {
        struct Other;
        #[async_trait]
        impl EmbeddingModel for Other {
            fn name(&self) -> &str {
                "other"
            }
            async fn encode(&self, _text: &str) -> Result<Vec<f32>> {
                Ok(vec![])
            }
        }
        let (mem, _) = catalog(vec![]);
        let err = CatalogMem::new(mem.into_descriptor())
            .with_model(Arc::new(Other))
            .unwrap_err();
        assert!(matches!(err, CatalogError::Compatibility(_)));
        assert!(err.to_string().contains("agentc clean"));
    }

    #[test]
    fn dump_sorts_items_and_loads_back() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join(".agent-catalog").join("tool-catalog.json");
        let (mem, _) = catalog(vec![
            item("zeta", vec![1.0, 0.0], &[]),
            item("alpha", vec![0.0, 1.0], &[]),
        ]);
        mem.dump(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.ends_with('\n'));

        let loaded = CatalogMem::load(&path).unwrap();
        let names: Vec<_> = loaded.items().iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
        assert_eq!(loaded.descriptor().embedding_model, "stub");

        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn load_rejects_malformed_json() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("tool-catalog.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            CatalogMem::load(&path),
            Err(CatalogError::Decode(_))
        ));
    }
}
