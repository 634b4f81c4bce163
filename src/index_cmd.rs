//! `agentc index` and `agentc clean`.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use agent_catalog_core::models::{CatalogKind, MetaVersion};

use crate::builder::{self, IndexOptions};
use crate::config::Config;
use crate::embedding;
use crate::progress::ProgressMode;
use crate::scanner::ScanOptions;
use crate::secrets::SecretsProvider;
use crate::vcs;

/// Flags of `agentc index`.
#[derive(Debug, Clone)]
pub struct IndexArgs {
    /// Overrides `catalog.source_dirs` when non-empty.
    pub dirs: Vec<PathBuf>,
    /// Kinds to build; empty means all.
    pub kinds: Vec<CatalogKind>,
    pub dry_run: bool,
    pub max_errs: Option<i64>,
    pub progress: ProgressMode,
}

pub fn selected_kinds(kinds: &[CatalogKind]) -> Vec<CatalogKind> {
    if kinds.is_empty() {
        CatalogKind::ALL.to_vec()
    } else {
        kinds.to_vec()
    }
}

/// Sets the returned flag on Ctrl-C so a running build stops cleanly.
fn cancel_on_ctrl_c() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let handle = flag.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping after the current item");
            handle.store(true, Ordering::Relaxed);
        }
    });
    flag
}

pub async fn run_index(config: &Config, secrets: &SecretsProvider, args: IndexArgs) -> Result<()> {
    let dirs = if args.dirs.is_empty() {
        config.catalog.source_dirs.clone()
    } else {
        args.dirs
    };
    let start = dirs.first().cloned().unwrap_or_else(|| PathBuf::from("."));
    let versioning = vcs::detect(&start);
    let catalog_version = versioning.head_version()?;
    let get_path_version = |path: &Path| versioning.path_version(path);

    let reporter = args.progress.reporter();
    let cancel = cancel_on_ctrl_c();
    let model = if args.dry_run {
        None
    } else {
        Some(embedding::create_model(&config.embedding, secrets)?)
    };

    for kind in selected_kinds(&args.kinds) {
        let options = IndexOptions {
            kind,
            catalog_path: config.catalog_file(kind),
            source_dirs: dirs.clone(),
            scan: ScanOptions::from(&config.catalog),
            max_errs: args.max_errs.unwrap_or(config.catalog.max_errs),
            max_description_words: config.catalog.max_description_words,
            meta_version: MetaVersion::for_package(env!("CARGO_PKG_VERSION")),
            catalog_version: catalog_version.clone(),
            project: config.catalog.project.clone(),
            cancel: Some(cancel.clone()),
        };

        match &model {
            None => {
                let start = builder::index_catalog_start(
                    &options,
                    &config.embedding.model_name(),
                    &get_path_version,
                    reporter.as_ref(),
                )
                .with_context(|| format!("Failed to index the {} catalog", kind))?;
                println!("index {} (dry-run)", kind);
                println!("  items: {}", start.catalog.items.len());
                println!("  to embed: {}", start.uninitialized.len());
                println!(
                    "  reused: {}",
                    start.catalog.items.len() - start.uninitialized.len()
                );
            }
            Some(model) => {
                let catalog = builder::index_catalog(
                    &options,
                    model.clone(),
                    &get_path_version,
                    reporter.as_ref(),
                )
                .await
                .with_context(|| format!("Failed to index the {} catalog", kind))?;
                catalog.dump(&options.catalog_path).with_context(|| {
                    format!("Failed to write {}", options.catalog_path.display())
                })?;
                info!(kind = %kind, path = %options.catalog_path.display(), "catalog written");

                println!("index {}", kind);
                println!("  items: {}", catalog.items().len());
                println!("  version: {}", catalog.descriptor().version.suffix());
                println!("  catalog: {}", options.catalog_path.display());
            }
        }
    }
    Ok(())
}

/// Delete the local catalog files for `kinds`.
pub fn run_clean(config: &Config, kinds: &[CatalogKind]) -> Result<()> {
    for kind in selected_kinds(kinds) {
        let path = config.catalog_file(kind);
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to remove {}", path.display()))?;
            println!("removed {}", path.display());
        } else {
            println!("no {} catalog at {}", kind, path.display());
        }
    }
    Ok(())
}
