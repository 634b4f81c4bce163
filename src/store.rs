//! Document store abstraction behind the remote catalog.
//!
//! A store holds named collections of JSON documents keyed by string,
//! answers SQL statements over them, and runs nearest-neighbour queries
//! against a registered vector index. Statements address a collection by
//! its quoted name and read documents through the `body` column:
//!
//! ```sql
//! SELECT body FROM "travel__tool_catalog" WHERE json_extract(body, '$.name') = ?
//! ```
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`ensure_collection`](DocumentStore::ensure_collection) | Create a collection if missing |
//! | [`collection_exists`](DocumentStore::collection_exists) | Probe for a collection |
//! | [`create_vector_index`](DocumentStore::create_vector_index) | Register a vector index over a field |
//! | [`upsert`](DocumentStore::upsert) | Insert or replace one document |
//! | [`query`](DocumentStore::query) | Run a statement with bound parameters |
//! | [`vector_query`](DocumentStore::vector_query) | k-nearest-neighbour search |

use anyhow::{bail, Result};
use async_trait::async_trait;

/// A boolean SQL expression over the `body` column, with its parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub clause: String,
    pub params: Vec<String>,
}

impl Filter {
    pub fn new(clause: impl Into<String>, params: Vec<String>) -> Self {
        Self {
            clause: clause.into(),
            params,
        }
    }

    /// Conjunction of two filters.
    pub fn and(self, other: Filter) -> Filter {
        let mut params = self.params;
        params.extend(other.params);
        Filter {
            clause: format!("({}) AND ({})", self.clause, other.clause),
            params,
        }
    }
}

/// A document returned by a vector query, with its relevance score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDocument {
    pub score: f32,
    pub body: serde_json::Value,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn ensure_collection(&self, collection: &str) -> Result<()>;

    async fn collection_exists(&self, collection: &str) -> Result<bool>;

    /// Register (or re-register) `index` over the vector in `field`.
    async fn create_vector_index(&self, collection: &str, index: &str, field: &str) -> Result<()>;

    async fn upsert(&self, collection: &str, key: &str, doc: &serde_json::Value) -> Result<()>;

    /// Run `statement`, binding `params` in order. The statement must
    /// select a `body` column; each row is decoded as JSON.
    async fn query(&self, statement: &str, params: &[String]) -> Result<Vec<serde_json::Value>>;

    /// The `k` documents of `collection` whose `field` is closest to
    /// `vector`, best first. Fails if `index` is not registered for that
    /// collection and field.
    async fn vector_query(
        &self,
        collection: &str,
        index: &str,
        field: &str,
        vector: &[f32],
        k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<ScoredDocument>>;
}

/// Collection names are inlined into statements; only `[A-Za-z0-9_]` is allowed.
pub fn check_collection_name(name: &str) -> Result<()> {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        bail!("invalid collection name: '{}'", name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_combine_params_in_order() {
        let a = Filter::new("json_extract(body, '$.a') = ?", vec!["1".into()]);
        let b = Filter::new("json_extract(body, '$.b') = ?", vec!["2".into()]);
        let both = a.and(b);
        assert_eq!(
            both.clause,
            "(json_extract(body, '$.a') = ?) AND (json_extract(body, '$.b') = ?)"
        );
        assert_eq!(both.params, vec!["1", "2"]);
    }

    #[test]
    fn collection_names_are_restricted() {
        assert!(check_collection_name("travel__tool_catalog").is_ok());
        assert!(check_collection_name("bad\"name").is_err());
        assert!(check_collection_name("").is_err());
    }
}
