//! Search facade over the local and remote catalogs.
//!
//! For each kind the provider holds up to two catalogs. When both exist a
//! search goes through `CatalogChain([local, remote])`, so local edits
//! shadow what was published; otherwise whichever exists answers. Query
//! results then pass through the refiner (if any), and the search is
//! recorded to the activity sink (if any).

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::{debug, error, warn};

use agent_catalog_core::catalog::{Catalog, CatalogChain, CatalogMem, FindRequest, SearchResult};
use agent_catalog_core::embedding::EmbeddingModel;
use agent_catalog_core::models::CatalogKind;
use agent_catalog_core::refiner::ClosestClusterRefiner;
use agent_catalog_core::{CatalogError, Result};

use crate::activity::{ActivityRecord, ActivitySink, LocalSink, RemoteSink};
use crate::catalog_db::CatalogDb;
use crate::config::Config;
use crate::embedding;
use crate::secrets::SecretsProvider;
use crate::sqlite_store::SqliteStore;
use crate::store::DocumentStore;

#[derive(Default)]
struct KindCatalogs {
    local: Option<Arc<CatalogMem>>,
    remote: Option<Arc<CatalogDb>>,
}

impl KindCatalogs {
    fn catalog(&self) -> Option<Arc<dyn Catalog>> {
        match (&self.local, &self.remote) {
            (Some(local), Some(remote)) => Some(Arc::new(CatalogChain::new(vec![
                local.clone() as Arc<dyn Catalog>,
                remote.clone() as Arc<dyn Catalog>,
            ]))),
            (Some(local), None) => Some(local.clone() as Arc<dyn Catalog>),
            (None, Some(remote)) => Some(remote.clone() as Arc<dyn Catalog>),
            (None, None) => None,
        }
    }
}

pub struct Provider {
    model: Arc<dyn EmbeddingModel>,
    tools: KindCatalogs,
    prompts: KindCatalogs,
    refiner: Option<ClosestClusterRefiner>,
    sink: Option<ActivitySink>,
}

impl Provider {
    pub fn new(model: Arc<dyn EmbeddingModel>) -> Self {
        Self {
            model,
            tools: KindCatalogs::default(),
            prompts: KindCatalogs::default(),
            refiner: None,
            sink: None,
        }
    }

    fn slot(&mut self, kind: CatalogKind) -> &mut KindCatalogs {
        match kind {
            CatalogKind::Tool => &mut self.tools,
            CatalogKind::Prompt => &mut self.prompts,
        }
    }

    /// Serve `catalog` locally. Its kind decides which searches it answers.
    pub fn with_local(mut self, catalog: CatalogMem) -> Result<Self> {
        let kind = catalog.descriptor().kind;
        let catalog = catalog.with_model(self.model.clone())?;
        self.slot(kind).local = Some(Arc::new(catalog));
        Ok(self)
    }

    pub fn with_remote(mut self, catalog: CatalogDb) -> Self {
        let kind = catalog.kind();
        self.slot(kind).remote = Some(Arc::new(catalog));
        self
    }

    pub fn with_refiner(mut self, refiner: ClosestClusterRefiner) -> Self {
        self.refiner = Some(refiner);
        self
    }

    pub fn with_sink(mut self, sink: ActivitySink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn has_catalog(&self, kind: CatalogKind) -> bool {
        let slot = match kind {
            CatalogKind::Tool => &self.tools,
            CatalogKind::Prompt => &self.prompts,
        };
        slot.local.is_some() || slot.remote.is_some()
    }

    /// Build a provider from the configuration: every local catalog file
    /// that exists, every remote catalog that has been published, and the
    /// configured refiner and activity sinks. `secrets` is only read while
    /// the embedding model is built.
    pub async fn from_config(
        config: &Config,
        secrets: &SecretsProvider,
        use_local: bool,
        use_remote: bool,
    ) -> anyhow::Result<Self> {
        let model = embedding::create_model(&config.embedding, secrets)?;
        let mut provider = Provider::new(model.clone());

        if use_local {
            for kind in CatalogKind::ALL {
                let path = config.catalog_file(kind);
                if path.exists() {
                    provider = provider.with_local(CatalogMem::load(&path)?)?;
                } else {
                    debug!(kind = %kind, path = %path.display(), "no local catalog");
                }
            }
        }

        let mut remote_store: Option<Arc<dyn DocumentStore>> = None;
        if let Some(remote) = &config.remote {
            let store: Arc<dyn DocumentStore> = Arc::new(SqliteStore::open(&remote.db_path).await?);
            if use_remote {
                for kind in CatalogKind::ALL {
                    match CatalogDb::connect(
                        store.clone(),
                        &remote.bucket,
                        kind,
                        model.clone(),
                        Duration::from_secs(remote.timeout_secs),
                    )
                    .await
                    {
                        Ok(db) => provider = provider.with_remote(db),
                        Err(CatalogError::NotFound(what)) => {
                            debug!(kind = %kind, "no remote catalog: {}", what)
                        }
                        Err(CatalogError::Store(message)) => {
                            error!(kind = %kind, "remote catalog unavailable: {}", message)
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
            }
            remote_store = Some(store);
        }

        if config.refiner.enabled {
            let mut refiner = ClosestClusterRefiner::default();
            if let Some(k) = config.refiner.no_more_than_k {
                refiner = refiner.with_limit(k);
            }
            provider = provider.with_refiner(refiner);
        }

        let mut sinks = Vec::new();
        if let Some(path) = &config.activity.log_path {
            sinks.push(ActivitySink::Local(LocalSink::new(path)));
        }
        if config.activity.remote {
            match (&remote_store, &config.remote) {
                (Some(store), Some(remote)) => sinks.push(ActivitySink::Remote(
                    RemoteSink::new(store.clone(), &remote.bucket).await?,
                )),
                _ => warn!("activity.remote is set but no [remote] store is configured"),
            }
        }
        provider.sink = match sinks.len() {
            0 => None,
            1 => sinks.pop(),
            _ => Some(ActivitySink::Broadcast(sinks)),
        };

        Ok(provider)
    }

    /// Search the catalogs of `kind`.
    pub async fn find(&self, kind: CatalogKind, request: &FindRequest) -> Result<Vec<SearchResult>> {
        let slot = match kind {
            CatalogKind::Tool => &self.tools,
            CatalogKind::Prompt => &self.prompts,
        };
        let catalog = slot.catalog().ok_or_else(|| {
            CatalogError::NotFound(format!(
                "{} catalog. Run `agentc index` or `agentc publish` first.",
                kind
            ))
        })?;

        let mut results = catalog.find(request).await?;
        if request.name.is_none() {
            if let Some(refiner) = &self.refiner {
                results = refiner.refine(results);
            }
        }

        if let Some(sink) = &self.sink {
            let record = ActivityRecord::new(
                format!("find_{}s", kind),
                json!({
                    "query": request.query,
                    "name": request.name,
                    "snapshot": request.snapshot,
                    "limit": request.limit,
                    "annotations": request.annotations.as_ref().map(|a| a.to_string()),
                    "results": results
                        .iter()
                        .map(|r| r.entry.identifier())
                        .collect::<Vec<_>>(),
                }),
            );
            let record = match catalog.version().await {
                Ok(version) => record.with_catalog_version(version),
                Err(_) => record,
            };
            if let Err(e) = sink.accept(&record).await {
                warn!("could not record search activity: {}", e);
            }
        }
        Ok(results)
    }

    pub async fn find_tools(&self, request: &FindRequest) -> Result<Vec<SearchResult>> {
        self.find(CatalogKind::Tool, request).await
    }

    pub async fn find_prompts(&self, request: &FindRequest) -> Result<Vec<SearchResult>> {
        self.find(CatalogKind::Prompt, request).await
    }
}
