//! `agentc ls`: list what a catalog holds.
//!
//! The local catalog is listed when it exists; otherwise, or with `--db`,
//! the latest snapshot published to the remote store.

use anyhow::{bail, Result};
use std::sync::Arc;
use std::time::Duration;

use agent_catalog_core::catalog::{Catalog, CatalogMem};
use agent_catalog_core::models::{CatalogKind, RecordDescriptor};
use agent_catalog_core::CatalogError;

use crate::catalog_db::CatalogDb;
use crate::config::Config;
use crate::embedding;
use crate::index_cmd::selected_kinds;
use crate::secrets::SecretsProvider;
use crate::sqlite_store::SqliteStore;
use crate::store::DocumentStore;

const RULE_WIDTH: usize = 40;

pub async fn run_ls(
    config: &Config,
    secrets: &SecretsProvider,
    kinds: &[CatalogKind],
    db: bool,
) -> Result<()> {
    if db && config.remote.is_none() {
        bail!("No [remote] section in config; --db has nothing to list.");
    }

    for kind in selected_kinds(kinds) {
        let path = config.catalog_file(kind);
        let listing = if !db && path.exists() {
            let catalog = CatalogMem::load(&path)?;
            let origin = format!("local, {}", catalog.descriptor().version.suffix());
            Some((origin, catalog.into_descriptor().items))
        } else {
            remote_items(config, secrets, kind).await?
        };

        let rule = "-".repeat(RULE_WIDTH);
        println!("{}", rule);
        match listing {
            Some((origin, items)) => {
                println!("{} ({})", kind.as_str().to_uppercase(), origin);
                println!("{}", rule);
                print_items(&items);
            }
            None => {
                println!("{}", kind.as_str().to_uppercase());
                println!("{}", rule);
                println!("not indexed");
            }
        }
        println!("{}", rule);
    }
    Ok(())
}

/// Items of the latest remote snapshot, or `None` when nothing was published.
async fn remote_items(
    config: &Config,
    secrets: &SecretsProvider,
    kind: CatalogKind,
) -> Result<Option<(String, Vec<RecordDescriptor>)>> {
    let Some(remote) = &config.remote else {
        return Ok(None);
    };
    let store: Arc<dyn DocumentStore> = Arc::new(SqliteStore::open(&remote.db_path).await?);
    let model = embedding::create_model(&config.embedding, secrets)?;
    let db = match CatalogDb::connect(
        store,
        &remote.bucket,
        kind,
        model,
        Duration::from_secs(remote.timeout_secs),
    )
    .await
    {
        Ok(db) => db,
        Err(CatalogError::NotFound(_)) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let version = match db.version().await {
        Ok(version) => version,
        Err(CatalogError::NotFound(_)) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let items = db.items().await?;
    let origin = format!("remote {}, {}", remote.bucket, version.suffix());
    Ok(Some((origin, items)))
}

fn print_items(items: &[RecordDescriptor]) {
    if items.is_empty() {
        println!("(empty)");
    }
    for (i, item) in items.iter().enumerate() {
        println!("{}. {}", i + 1, item.name);
        println!("\t{}", item.description.replace('\n', " ").trim());
    }
}
