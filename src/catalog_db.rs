//! Remote catalog backed by a [`DocumentStore`].
//!
//! # Layout
//!
//! | Collection | Key | Contents |
//! |------------|-----|----------|
//! | `{bucket}__{kind}_catalog` | `{identifier}_{snapshot}` | one item per published snapshot |
//! | `{bucket}__{kind}_metadata` | `{snapshot}` | catalog header, publish annotations, `version_timestamp` |
//!
//! Item documents carry their vector in `embedding_{dim}` instead of
//! `embedding`, plus `catalog_identifier` naming the snapshot they were
//! published with. The vector index is `v1_agent_catalog_{kind}_index`.
//!
//! Reads degrade: a store failure or timeout, including while resolving
//! `__LATEST__`, is logged and turned into an empty result. Asking for the
//! latest snapshot when none was published is still an error. Writes
//! ([`CatalogDb::publish`]) fail hard.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, error, info};

use agent_catalog_core::catalog::{
    apply_limit, Catalog, FindRequest, SearchResult, EXACT_MATCH_DELTA, LATEST_SNAPSHOT_VERSION,
};
use agent_catalog_core::embedding::EmbeddingModel;
use agent_catalog_core::models::{
    CatalogDescriptor, CatalogKind, RecordDescriptor, VersionDescriptor,
};
use agent_catalog_core::{CatalogError, Result};

use crate::store::{DocumentStore, Filter};

/// Candidates requested from the vector index per query.
pub const VECTOR_QUERY_K: usize = 10;

pub fn items_collection(bucket: &str, kind: CatalogKind) -> String {
    format!("{}__{}_catalog", bucket, kind)
}

pub fn metadata_collection(bucket: &str, kind: CatalogKind) -> String {
    format!("{}__{}_metadata", bucket, kind)
}

pub fn index_name(kind: CatalogKind) -> String {
    format!("v1_agent_catalog_{}_index", kind)
}

fn vector_field_name(dims: usize) -> String {
    format!("embedding_{}", dims)
}

fn store_error(e: anyhow::Error) -> CatalogError {
    CatalogError::Store(format!("{:#}", e))
}

/// Turn a stored item document back into a descriptor.
fn decode_item(mut doc: Value) -> Result<RecordDescriptor> {
    if let Some(obj) = doc.as_object_mut() {
        obj.remove("catalog_identifier");
        let vector_key = obj
            .keys()
            .find(|k| k.starts_with("embedding_"))
            .cloned();
        if let Some(key) = vector_key {
            if let Some(vector) = obj.remove(&key) {
                obj.insert("embedding".to_string(), vector);
            }
        }
    }
    Ok(serde_json::from_value(doc)?)
}

/// A catalog handle bound to one store, bucket, kind, and embedding model.
pub struct CatalogDb {
    store: Arc<dyn DocumentStore>,
    bucket: String,
    kind: CatalogKind,
    model: Arc<dyn EmbeddingModel>,
    timeout: Duration,
}

impl std::fmt::Debug for CatalogDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogDb")
            .field("bucket", &self.bucket)
            .field("kind", &self.kind)
            .field("model", &self.model.name())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl CatalogDb {
    /// Open the remote catalog for `kind`.
    ///
    /// Fails with [`CatalogError::NotFound`] when nothing has been
    /// published yet, and with [`CatalogError::Compatibility`] when the
    /// latest snapshot was embedded with a different model.
    pub async fn connect(
        store: Arc<dyn DocumentStore>,
        bucket: &str,
        kind: CatalogKind,
        model: Arc<dyn EmbeddingModel>,
        timeout: Duration,
    ) -> Result<Self> {
        let items = items_collection(bucket, kind);
        if !store.collection_exists(&items).await.map_err(store_error)? {
            return Err(CatalogError::NotFound(format!(
                "remote {} catalog '{}'. Run `agentc publish` first.",
                kind, items
            )));
        }

        let db = Self {
            store,
            bucket: bucket.to_string(),
            kind,
            model,
            timeout,
        };
        if let Some(metadata) = db.latest_metadata().await? {
            let published = metadata
                .get("embedding_model")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if published != db.model.name() {
                return Err(CatalogError::Compatibility(format!(
                    "The remote {} catalog was published with embedding model '{}' but '{}' was requested.",
                    kind,
                    published,
                    db.model.name()
                )));
            }
        }
        Ok(db)
    }

    pub fn kind(&self) -> CatalogKind {
        self.kind
    }

    /// The newest metadata document, bounded by the read timeout.
    async fn latest_metadata(&self) -> Result<Option<Value>> {
        match tokio::time::timeout(self.timeout, self.query_latest_metadata()).await {
            Ok(result) => result,
            Err(_) => Err(CatalogError::Store(format!(
                "metadata lookup timed out after {:?}",
                self.timeout
            ))),
        }
    }

    async fn query_latest_metadata(&self) -> Result<Option<Value>> {
        let collection = metadata_collection(&self.bucket, self.kind);
        if !self
            .store
            .collection_exists(&collection)
            .await
            .map_err(store_error)?
        {
            return Ok(None);
        }
        let statement = format!(
            "SELECT body FROM \"{}\" \
             ORDER BY json_extract(body, '$.version_timestamp') DESC LIMIT 1",
            collection
        );
        let rows = self
            .store
            .query(&statement, &[])
            .await
            .map_err(store_error)?;
        Ok(rows.into_iter().next())
    }

    /// Resolve the snapshot filter of a request. `None` means all snapshots.
    async fn resolve_snapshot(&self, snapshot: Option<&str>) -> Result<Option<String>> {
        match snapshot {
            Some(LATEST_SNAPSHOT_VERSION) => {
                let version = self.version().await?;
                Ok(version.identifier().map(str::to_string))
            }
            Some(other) => Ok(Some(other.to_string())),
            None => Ok(None),
        }
    }

    /// Every item of the latest published snapshot, ordered by key.
    pub async fn items(&self) -> Result<Vec<RecordDescriptor>> {
        let version = self.version().await?;
        let snapshot = version.identifier().ok_or_else(|| {
            CatalogError::Store("latest snapshot has no identifier".to_string())
        })?;
        let statement = format!(
            "SELECT body FROM \"{}\" \
             WHERE json_extract(body, '$.catalog_identifier') = ? ORDER BY key",
            items_collection(&self.bucket, self.kind)
        );
        let params = [snapshot.to_string()];
        let rows = tokio::time::timeout(self.timeout, self.store.query(&statement, &params))
            .await
            .map_err(|_| {
                CatalogError::Store(format!("item listing timed out after {:?}", self.timeout))
            })?
            .map_err(store_error)?;
        rows.into_iter().map(decode_item).collect()
    }

    async fn find_by_name(
        &self,
        name: &str,
        snapshot: Option<&str>,
    ) -> anyhow::Result<Vec<SearchResult>> {
        let mut statement = format!(
            "SELECT body FROM \"{}\" WHERE json_extract(body, '$.name') = ?",
            items_collection(&self.bucket, self.kind)
        );
        let mut params = vec![name.to_string()];
        if let Some(snapshot) = snapshot {
            statement.push_str(" AND json_extract(body, '$.catalog_identifier') = ?");
            params.push(snapshot.to_string());
        }
        statement.push_str(" ORDER BY key");

        let rows = self.store.query(&statement, &params).await?;
        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            results.push(SearchResult {
                entry: decode_item(row)?,
                delta: EXACT_MATCH_DELTA,
            });
        }
        Ok(results)
    }

    async fn find_by_vector(
        &self,
        query_vec: &[f32],
        filter: Option<Filter>,
    ) -> anyhow::Result<Vec<SearchResult>> {
        let hits = self
            .store
            .vector_query(
                &items_collection(&self.bucket, self.kind),
                &index_name(self.kind),
                &vector_field_name(query_vec.len()),
                query_vec,
                VECTOR_QUERY_K,
                filter.as_ref(),
            )
            .await?;

        let mut results = Vec::with_capacity(hits.len());
        for hit in hits {
            results.push(SearchResult {
                entry: decode_item(hit.body)?,
                delta: hit.score,
            });
        }
        Ok(results)
    }

    fn request_filter(request: &FindRequest, snapshot: Option<&str>) -> Option<Filter> {
        let annotations = request.annotations.as_ref().map(|predicate| {
            let (clause, params) = predicate.to_sql("body");
            Filter::new(clause, params)
        });
        let snapshot = snapshot.map(|s| {
            Filter::new(
                "json_extract(body, '$.catalog_identifier') = ?",
                vec![s.to_string()],
            )
        });
        match (annotations, snapshot) {
            (Some(a), Some(s)) => Some(a.and(s)),
            (a, s) => a.or(s),
        }
    }

    async fn with_timeout<T>(
        &self,
        what: &str,
        fut: impl std::future::Future<Output = anyhow::Result<Vec<T>>>,
    ) -> Vec<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(results)) => results,
            Ok(Err(e)) => {
                error!(kind = %self.kind, "remote {} failed: {:#}", what, e);
                Vec::new()
            }
            Err(_) => {
                error!(
                    kind = %self.kind,
                    timeout_secs = self.timeout.as_secs(),
                    "remote {} timed out", what
                );
                Vec::new()
            }
        }
    }

    /// Publish `catalog` as a new snapshot. Returns the number of items written.
    pub async fn publish(
        store: &dyn DocumentStore,
        bucket: &str,
        catalog: &CatalogDescriptor,
        annotations: &BTreeMap<String, String>,
    ) -> Result<usize> {
        if catalog.version.is_dirty() {
            return Err(CatalogError::Validation(format!(
                "the {} catalog was built from uncommitted changes; commit and re-index before publishing",
                catalog.kind
            )));
        }
        let snapshot = catalog
            .version
            .identifier()
            .ok_or_else(|| CatalogError::Validation("catalog version has no identifier".into()))?
            .to_string();

        let mut dims = None;
        for item in &catalog.items {
            let Some(embedding) = &item.embedding else {
                return Err(CatalogError::Validation(format!(
                    "'{}' has no embedding; re-index before publishing",
                    item.identifier()
                )));
            };
            match dims {
                None => dims = Some(embedding.len()),
                Some(d) if d != embedding.len() => {
                    return Err(CatalogError::Validation(format!(
                        "'{}' has a {}-dimensional embedding, expected {}",
                        item.identifier(),
                        embedding.len(),
                        d
                    )))
                }
                Some(_) => {}
            }
        }

        let items = items_collection(bucket, catalog.kind);
        let metadata = metadata_collection(bucket, catalog.kind);
        store.ensure_collection(&items).await.map_err(store_error)?;
        store.ensure_collection(&metadata).await.map_err(store_error)?;
        if let Some(dims) = dims {
            store
                .create_vector_index(&items, &index_name(catalog.kind), &vector_field_name(dims))
                .await
                .map_err(store_error)?;
        }

        let mut header = serde_json::to_value(catalog)?;
        if let Some(obj) = header.as_object_mut() {
            obj.remove("items");
            obj.insert("annotations".to_string(), json!(annotations));
            obj.insert(
                "version_timestamp".to_string(),
                json!(catalog.version.timestamp().timestamp_millis()),
            );
        }
        store
            .upsert(&metadata, &snapshot, &header)
            .await
            .map_err(store_error)?;

        for item in &catalog.items {
            let mut doc = serde_json::to_value(item)?;
            if let Some(obj) = doc.as_object_mut() {
                if let Some(vector) = obj.remove("embedding") {
                    let field = vector_field_name(item.embedding.as_ref().map_or(0, Vec::len));
                    obj.insert(field, vector);
                }
                obj.insert("catalog_identifier".to_string(), json!(snapshot));
            }
            let key = format!("{}_{}", item.identifier(), snapshot);
            store
                .upsert(&items, &key, &doc)
                .await
                .map_err(store_error)?;
            debug!(key = %key, "published item");
        }

        info!(
            kind = %catalog.kind,
            snapshot = %snapshot,
            items = catalog.items.len(),
            "published catalog"
        );
        Ok(catalog.items.len())
    }
}

#[async_trait]
impl Catalog for CatalogDb {
    async fn find(&self, request: &FindRequest) -> Result<Vec<SearchResult>> {
        // No published snapshot is a hard error; an unreachable store is not.
        let snapshot = match self.resolve_snapshot(request.snapshot.as_deref()).await {
            Ok(snapshot) => snapshot,
            Err(CatalogError::Store(message)) => {
                error!(kind = %self.kind, "remote snapshot lookup failed: {}", message);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let mut results = if let Some(name) = &request.name {
            self.with_timeout("name lookup", self.find_by_name(name, snapshot.as_deref()))
                .await
        } else {
            let query = request.require_query()?;
            let query_vec = self.model.encode(query).await?;
            let filter = Self::request_filter(request, snapshot.as_deref());
            self.with_timeout("vector search", self.find_by_vector(&query_vec, filter))
                .await
        };
        apply_limit(&mut results, request.limit);
        Ok(results)
    }

    async fn version(&self) -> Result<VersionDescriptor> {
        let metadata = self.latest_metadata().await?.ok_or_else(|| {
            CatalogError::NotFound(format!("no published {} catalog snapshot", self.kind))
        })?;
        let version = metadata.get("version").cloned().ok_or_else(|| {
            CatalogError::Store("catalog metadata has no version field".to_string())
        })?;
        Ok(serde_json::from_value(version)?)
    }
}
