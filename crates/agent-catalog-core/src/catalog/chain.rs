//! Ordered composition of catalogs.
//!
//! Children are searched in order and results are de-duplicated by
//! `source:name`, so an item found by an earlier catalog shadows the same
//! item in a later one regardless of its delta. With `[local, remote]`
//! this makes local edits override what was published.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{CatalogError, Result};
use crate::models::VersionDescriptor;

use super::{apply_limit, Catalog, FindRequest, SearchResult};

pub struct CatalogChain {
    chain: Vec<Arc<dyn Catalog>>,
}

impl CatalogChain {
    pub fn new(chain: Vec<Arc<dyn Catalog>>) -> Self {
        Self { chain }
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }
}

#[async_trait]
impl Catalog for CatalogChain {
    async fn find(&self, request: &FindRequest) -> Result<Vec<SearchResult>> {
        let mut seen = HashSet::new();
        let mut results = Vec::new();
        for catalog in &self.chain {
            for result in catalog.find(request).await? {
                if seen.insert(result.entry.source_name()) {
                    results.push(result);
                }
            }
        }
        apply_limit(&mut results, request.limit);
        Ok(results)
    }

    async fn version(&self) -> Result<VersionDescriptor> {
        match self.chain.first() {
            Some(first) => first.version().await,
            None => Err(CatalogError::NotFound(
                "catalog chain has no catalogs".to_string(),
            )),
        }
    }
}
