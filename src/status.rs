//! Catalog status overview.
//!
//! Summarizes what each local catalog holds (version, item count, embedding
//! model, age) and, when a remote store is configured, the latest
//! published snapshot. Used by `agentc status`.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use agent_catalog_core::catalog::{Catalog, CatalogMem};
use agent_catalog_core::models::{CatalogKind, VersionDescriptor};

use crate::catalog_db::CatalogDb;
use crate::config::Config;
use crate::embedding;
use crate::index_cmd::selected_kinds;
use crate::secrets::SecretsProvider;
use crate::sqlite_store::SqliteStore;
use crate::store::DocumentStore;

pub async fn run_status(
    config: &Config,
    secrets: &SecretsProvider,
    kinds: &[CatalogKind],
) -> Result<()> {
    println!("Agent Catalog Status");
    println!("====================");
    println!();
    println!("  Catalog dir: {}", config.catalog.path.display());
    match embedding::model_dims(&config.embedding) {
        Some(dims) => println!(
            "  Model:       {} ({} dims)",
            config.embedding.model_name(),
            dims
        ),
        None => println!("  Model:       {}", config.embedding.model_name()),
    }

    let remote = match &config.remote {
        Some(remote) => {
            let store: Arc<dyn DocumentStore> = Arc::new(SqliteStore::open(&remote.db_path).await?);
            println!(
                "  Remote:      {} (bucket {})",
                remote.db_path.display(),
                remote.bucket
            );
            Some((store, remote))
        }
        None => None,
    };

    for kind in selected_kinds(kinds) {
        println!();
        println!("  {} catalog", kind);
        println!("  {}", "-".repeat(40));

        let path = config.catalog_file(kind);
        if path.exists() {
            let catalog = CatalogMem::load(&path)?;
            let descriptor = catalog.descriptor();
            println!("  local:       {}", path.display());
            println!("    version:   {}", describe_version(&descriptor.version));
            println!("    items:     {}", descriptor.items.len());
            println!("    model:     {}", descriptor.embedding_model);
            println!(
                "    built:     {}",
                format_ts_relative(descriptor.version.timestamp().timestamp())
            );
        } else {
            println!("  local:       not indexed");
        }

        if let Some((store, remote)) = &remote {
            let status = match embedding::create_model(&config.embedding, secrets) {
                Ok(model) => match CatalogDb::connect(
                    store.clone(),
                    &remote.bucket,
                    kind,
                    model,
                    Duration::from_secs(remote.timeout_secs),
                )
                .await
                {
                    Ok(db) => match db.version().await {
                        Ok(version) => describe_version(&version),
                        Err(e) => e.to_string(),
                    },
                    Err(e) => e.to_string(),
                },
                Err(e) => format!("unavailable ({})", e),
            };
            println!("  remote:      {}", status);
        }
    }
    println!();
    Ok(())
}

fn describe_version(version: &VersionDescriptor) -> String {
    match (version.identifier(), version.is_dirty()) {
        (Some(id), false) => id.to_string(),
        (Some(id), true) => format!("{} (dirty)", id),
        (None, _) => "uncommitted".to_string(),
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
