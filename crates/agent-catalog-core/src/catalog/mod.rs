//! The search contract shared by every catalog.
//!
//! | Implementation | Backing |
//! |----------------|---------|
//! | [`CatalogMem`](mem::CatalogMem) | a local JSON snapshot held in memory |
//! | [`CatalogChain`](chain::CatalogChain) | an ordered list of other catalogs |
//! | `CatalogDb` (app crate) | a remote document store with a vector index |
//!
//! A [`FindRequest`] either names an item exactly (`name`) or asks a
//! natural-language `query`. Exact-name hits carry `delta = 1.0` and never
//! touch the embedding model.

pub mod chain;
pub mod mem;

use async_trait::async_trait;

use crate::annotation::AnnotationPredicate;
use crate::error::{CatalogError, Result};
use crate::models::{RecordDescriptor, VersionDescriptor};

pub use chain::CatalogChain;
pub use mem::CatalogMem;

/// Snapshot value that resolves to the most recently published version.
pub const LATEST_SNAPSHOT_VERSION: &str = "__LATEST__";

/// Delta assigned to exact-name matches.
pub const EXACT_MATCH_DELTA: f32 = 1.0;

/// A catalog entry paired with its similarity to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub entry: RecordDescriptor,
    pub delta: f32,
}

/// Bundles all inputs for a single `find` call.
#[derive(Debug, Clone, Default)]
pub struct FindRequest {
    /// Natural-language query, for vector search.
    pub query: Option<String>,
    /// Exact item name; takes precedence over `query`.
    pub name: Option<String>,
    /// Snapshot to search; only meaningful for remote catalogs.
    pub snapshot: Option<String>,
    /// Maximum results; `<= 0` means no limit.
    pub limit: i64,
    /// Only consider items whose annotations satisfy this predicate.
    pub annotations: Option<AnnotationPredicate>,
}

impl FindRequest {
    pub fn by_query(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            ..Default::default()
        }
    }

    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_annotations(mut self, predicate: AnnotationPredicate) -> Self {
        self.annotations = Some(predicate);
        self
    }

    pub fn with_snapshot(mut self, snapshot: impl Into<String>) -> Self {
        self.snapshot = Some(snapshot.into());
        self
    }

    /// The query text, or an error when neither a name nor a query was given.
    pub fn require_query(&self) -> Result<&str> {
        self.query.as_deref().ok_or_else(|| {
            CatalogError::Validation("either a name or a query must be given".to_string())
        })
    }
}

/// Truncate to `limit` when it is positive.
pub fn apply_limit<T>(results: &mut Vec<T>, limit: i64) {
    if limit > 0 {
        results.truncate(limit as usize);
    }
}

#[async_trait]
pub trait Catalog: Send + Sync {
    /// Search the catalog. Results are ordered by descending delta.
    async fn find(&self, request: &FindRequest) -> Result<Vec<SearchResult>>;

    /// Version of the snapshot this catalog serves.
    async fn version(&self) -> Result<VersionDescriptor>;
}
