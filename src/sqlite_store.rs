//! SQLite-backed [`DocumentStore`] implementation.
//!
//! Each collection is a table `(key TEXT PRIMARY KEY, body TEXT NOT NULL)`
//! holding JSON text; statements use SQLite's JSON1 functions. Vector
//! indexes are recorded in `__vector_indexes` and searched by brute-force
//! cosine similarity over the filtered rows.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::cmp::Ordering;
use std::path::Path;

use agent_catalog_core::embedding::cosine_similarity;

use crate::db;
use crate::store::{check_collection_name, DocumentStore, Filter, ScoredDocument};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Wrap `pool`, creating the index registry if needed.
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS __vector_indexes (
                collection TEXT NOT NULL,
                name TEXT NOT NULL,
                field TEXT NOT NULL,
                PRIMARY KEY (collection, name)
            )
            "#,
        )
        .execute(&pool)
        .await?;
        Ok(Self { pool })
    }

    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect(path)
            .await
            .with_context(|| format!("Failed to open store at {}", path.display()))?;
        Self::new(pool).await
    }

    pub async fn in_memory() -> Result<Self> {
        Self::new(db::connect_in_memory().await?).await
    }
}

fn vector_field(doc: &serde_json::Value, field: &str) -> Option<Vec<f32>> {
    let values = doc.get(field)?.as_array()?;
    values.iter().map(|v| v.as_f64().map(|f| f as f32)).collect()
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn ensure_collection(&self, collection: &str) -> Result<()> {
        check_collection_name(collection)?;
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" (key TEXT PRIMARY KEY, body TEXT NOT NULL)",
            collection
        ))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn collection_exists(&self, collection: &str) -> Result<bool> {
        let row = sqlx::query("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(collection)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn create_vector_index(&self, collection: &str, index: &str, field: &str) -> Result<()> {
        check_collection_name(collection)?;
        sqlx::query(
            r#"
            INSERT INTO __vector_indexes (collection, name, field) VALUES (?, ?, ?)
            ON CONFLICT(collection, name) DO UPDATE SET field = excluded.field
            "#,
        )
        .bind(collection)
        .bind(index)
        .bind(field)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert(&self, collection: &str, key: &str, doc: &serde_json::Value) -> Result<()> {
        check_collection_name(collection)?;
        sqlx::query(&format!(
            "INSERT INTO \"{}\" (key, body) VALUES (?, ?) \
             ON CONFLICT(key) DO UPDATE SET body = excluded.body",
            collection
        ))
        .bind(key)
        .bind(serde_json::to_string(doc)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn query(&self, statement: &str, params: &[String]) -> Result<Vec<serde_json::Value>> {
        let mut query = sqlx::query(statement);
        for param in params {
            query = query.bind(param);
        }
        let rows = query.fetch_all(&self.pool).await?;

        let mut docs = Vec::with_capacity(rows.len());
        for row in rows {
            let body: String = row.try_get("body")?;
            docs.push(serde_json::from_str(&body)?);
        }
        Ok(docs)
    }

    async fn vector_query(
        &self,
        collection: &str,
        index: &str,
        field: &str,
        vector: &[f32],
        k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<ScoredDocument>> {
        check_collection_name(collection)?;
        let indexed_field: Option<String> = sqlx::query_scalar(
            "SELECT field FROM __vector_indexes WHERE collection = ? AND name = ?",
        )
        .bind(collection)
        .bind(index)
        .fetch_optional(&self.pool)
        .await?;
        match indexed_field {
            Some(f) if f == field => {}
            Some(f) => bail!("vector index '{}' covers field '{}', not '{}'", index, f, field),
            None => bail!("vector index '{}' not found on {}", index, collection),
        }

        let mut statement = format!("SELECT key, body FROM \"{}\"", collection);
        let mut params: Vec<String> = Vec::new();
        if let Some(filter) = filter {
            statement.push_str(" WHERE ");
            statement.push_str(&filter.clause);
            params.extend(filter.params.iter().cloned());
        }
        statement.push_str(" ORDER BY key");

        let docs = self.query(&statement, &params).await?;
        let mut scored: Vec<ScoredDocument> = docs
            .into_iter()
            .filter_map(|body| {
                let stored = vector_field(&body, field)?;
                Some(ScoredDocument {
                    score: cosine_similarity(vector, &stored),
                    body,
                })
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }
}
