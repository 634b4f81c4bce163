//! `agentc publish`: push local catalogs to the remote store.

use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;

use agent_catalog_core::catalog::CatalogMem;
use agent_catalog_core::models::CatalogKind;

use crate::catalog_db::CatalogDb;
use crate::config::Config;
use crate::index_cmd::selected_kinds;
use crate::sqlite_store::SqliteStore;

/// Parse a `key=value` pair for `--annotation` arguments.
pub fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{}'", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

pub async fn run_publish(
    config: &Config,
    kinds: &[CatalogKind],
    annotations: Vec<(String, String)>,
) -> Result<()> {
    let Some(remote) = &config.remote else {
        bail!("No [remote] section in config; nothing to publish to.");
    };
    let annotations: BTreeMap<String, String> = annotations.into_iter().collect();
    let store = SqliteStore::open(&remote.db_path).await?;

    for kind in selected_kinds(kinds) {
        let path = config.catalog_file(kind);
        if !path.exists() {
            if kinds.is_empty() {
                println!("publish {}: no local catalog, skipped", kind);
                continue;
            }
            bail!(
                "No local {} catalog at {}. Run `agentc index` first.",
                kind,
                path.display()
            );
        }

        let catalog = CatalogMem::load(&path)?;
        let written = CatalogDb::publish(&store, &remote.bucket, catalog.descriptor(), &annotations)
            .await
            .with_context(|| format!("Failed to publish the {} catalog", kind))?;

        println!("publish {}", kind);
        println!("  snapshot: {}", catalog.descriptor().version.suffix());
        println!("  items: {}", written);
        println!("  bucket: {}", remote.bucket);
    }
    Ok(())
}
