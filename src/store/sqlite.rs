//! SQLite-backed [`DocumentStore`] implementation.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use uuid::Uuid;

use super::{DocumentStore, StoredAnalysis};
use crate::models::AnalysisDocument;
use crate::prompts::PromptMapping;

pub struct SqliteDocumentStore {
    pool: SqlitePool,
}

impl SqliteDocumentStore {
    /// Open the database at `path`, creating the file and schema if missing.
    pub async fn connect(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS analyses (
                id TEXT PRIMARY KEY,
                timestamp TEXT NOT NULL,
                prompt TEXT NOT NULL,
                model_output TEXT NOT NULL,
                image BLOB NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS prompts (
                category TEXT PRIMARY KEY,
                prompt TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert or overwrite one prompt row. Operator tooling only; the
    /// relay itself never writes remote prompts.
    pub async fn put_prompt(&self, category: &str, prompt: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO prompts (category, prompt) VALUES (?, ?)
             ON CONFLICT(category) DO UPDATE SET prompt = excluded.prompt",
        )
        .bind(category)
        .bind(prompt)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn insert_analysis(&self, doc: &AnalysisDocument) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO analyses (id, timestamp, prompt, model_output, image)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(doc.timestamp.to_rfc3339())
        .bind(&doc.prompt)
        .bind(&doc.model_output)
        .bind(doc.image_bytes.as_slice())
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    async fn get_analysis(&self, id: &str) -> Result<Option<StoredAnalysis>> {
        let row = sqlx::query(
            "SELECT id, timestamp, prompt, model_output, image FROM analyses WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let row = match row {
            Some(row) => row,
            None => return Ok(None),
        };

        let raw_ts: String = row.get("timestamp");
        let timestamp = DateTime::parse_from_rfc3339(&raw_ts)
            .map(|dt| dt.with_timezone(&Utc))
            .with_context(|| format!("invalid timestamp in analyses row {id}"))?;

        Ok(Some(StoredAnalysis {
            id: row.get("id"),
            document: AnalysisDocument {
                timestamp,
                prompt: row.get("prompt"),
                model_output: row.get("model_output"),
                image_bytes: row.get("image"),
            },
        }))
    }

    async fn find_prompt(&self, category: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT prompt FROM prompts WHERE category = ?")
            .bind(category)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get("prompt")))
    }

    async fn list_prompts(&self) -> Result<PromptMapping> {
        let rows = sqlx::query("SELECT category, prompt FROM prompts")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|r| (r.get("category"), r.get("prompt")))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open_store(tmp: &TempDir) -> SqliteDocumentStore {
        SqliteDocumentStore::connect(&tmp.path().join("store.sqlite"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn insert_then_get_round_trips() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;

        let doc = AnalysisDocument {
            timestamp: Utc::now(),
            prompt: "describe this".to_string(),
            model_output: "a bowl of ramen".to_string(),
            image_bytes: vec![0xff, 0xd8, 0xff],
        };

        let id = store.insert_analysis(&doc).await.unwrap();
        let stored = store.get_analysis(&id).await.unwrap().unwrap();
        assert_eq!(stored.id, id);
        assert_eq!(stored.document.prompt, doc.prompt);
        assert_eq!(stored.document.model_output, doc.model_output);
        assert_eq!(stored.document.image_bytes, doc.image_bytes);
    }

    #[tokio::test]
    async fn unknown_analysis_id_is_none() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        assert!(store.get_analysis("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn prompt_rows_round_trip() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;

        assert!(store.find_prompt("Special").await.unwrap().is_none());

        store.put_prompt("Special", "special prompt").await.unwrap();
        store.put_prompt("Other", "other prompt").await.unwrap();
        store.put_prompt("Special", "updated prompt").await.unwrap();

        assert_eq!(
            store.find_prompt("Special").await.unwrap().as_deref(),
            Some("updated prompt")
        );

        let all = store.list_prompts().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all.get("Other").map(String::as_str), Some("other prompt"));
    }
}
