//! Activity records and where they go.
//!
//! Every catalog search made through the [`Provider`](crate::provider::Provider)
//! produces one [`ActivityRecord`]. A sink writes it to a JSON-lines file,
//! to the `{bucket}__activity` collection of the remote store, or to
//! several sinks at once.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use agent_catalog_core::models::VersionDescriptor;
use agent_catalog_core::{CatalogError, Result};

use crate::store::DocumentStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    /// What happened, e.g. `find_tools`.
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_version: Option<VersionDescriptor>,
    pub content: serde_json::Value,
}

impl ActivityRecord {
    pub fn new(kind: impl Into<String>, content: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            kind: kind.into(),
            catalog_version: None,
            content,
        }
    }

    pub fn with_catalog_version(mut self, version: VersionDescriptor) -> Self {
        self.catalog_version = Some(version);
        self
    }

    fn key(&self) -> String {
        format!("{}/{}", self.timestamp.to_rfc3339(), self.id)
    }
}

/// Appends one JSON object per line.
#[derive(Debug, Clone)]
pub struct LocalSink {
    path: PathBuf,
}

impl LocalSink {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    fn accept(&self, record: &ActivityRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }
}

/// Upserts records into the store's activity collection.
#[derive(Clone)]
pub struct RemoteSink {
    store: Arc<dyn DocumentStore>,
    collection: String,
}

impl std::fmt::Debug for RemoteSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteSink")
            .field("collection", &self.collection)
            .finish()
    }
}

impl RemoteSink {
    pub async fn new(store: Arc<dyn DocumentStore>, bucket: &str) -> Result<Self> {
        let collection = format!("{}__activity", bucket);
        store
            .ensure_collection(&collection)
            .await
            .map_err(|e| CatalogError::Store(format!("{:#}", e)))?;
        Ok(Self { store, collection })
    }

    async fn accept(&self, record: &ActivityRecord) -> Result<()> {
        let doc = serde_json::to_value(record)?;
        self.store
            .upsert(&self.collection, &record.key(), &doc)
            .await
            .map_err(|e| CatalogError::Store(format!("{:#}", e)))
    }
}

#[derive(Debug, Clone)]
pub enum ActivitySink {
    Local(LocalSink),
    Remote(RemoteSink),
    /// Forwards to every child. All children are tried even after a failure.
    Broadcast(Vec<ActivitySink>),
}

impl ActivitySink {
    pub async fn accept(&self, record: &ActivityRecord) -> Result<()> {
        match self {
            ActivitySink::Local(sink) => sink.accept(record),
            ActivitySink::Remote(sink) => sink.accept(record).await,
            ActivitySink::Broadcast(children) => {
                let mut failures = Vec::new();
                for child in children {
                    if let Err(e) = Box::pin(child.accept(record)).await {
                        failures.push(e.to_string());
                    }
                }
                if failures.is_empty() {
                    debug!(sinks = children.len(), kind = %record.kind, "activity recorded");
                    Ok(())
                } else {
                    Err(CatalogError::Sink(failures.join("; ")))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite_store::SqliteStore;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn local_sink_appends_lines() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("logs/activity.jsonl");
        let sink = ActivitySink::Local(LocalSink::new(&path));

        sink.accept(&ActivityRecord::new("find_tools", json!({"query": "a"})))
            .await
            .unwrap();
        sink.accept(&ActivityRecord::new("find_tools", json!({"query": "b"})))
            .await
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let records: Vec<ActivityRecord> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].content["query"], "b");
    }

    #[tokio::test]
    async fn remote_sink_writes_to_activity_collection() {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let sink = RemoteSink::new(store.clone(), "travel").await.unwrap();
        ActivitySink::Remote(sink)
            .accept(&ActivityRecord::new("find_prompts", json!({"name": "greet"})))
            .await
            .unwrap();

        let rows = store
            .query("SELECT body FROM \"travel__activity\"", &[])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["kind"], "find_prompts");
    }

    #[tokio::test]
    async fn broadcast_reports_every_failure() {
        let tmp = TempDir::new().unwrap();
        // A directory cannot be opened for appending.
        let blocked = tmp.path().join("blocked");
        std::fs::create_dir_all(&blocked).unwrap();
        let good = tmp.path().join("ok.jsonl");

        let sink = ActivitySink::Broadcast(vec![
            ActivitySink::Local(LocalSink::new(&blocked)),
            ActivitySink::Local(LocalSink::new(&good)),
            ActivitySink::Local(LocalSink::new(&blocked)),
        ]);
        let err = sink
            .accept(&ActivityRecord::new("find_tools", json!({})))
            .await
            .unwrap_err();

        match err {
            CatalogError::Sink(message) => assert_eq!(message.matches("IO error").count(), 2),
            other => panic!("unexpected error: {other}"),
        }
        assert!(good.exists());
    }
}
