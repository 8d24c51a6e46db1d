//! Persistence fan-out for completed analyses.
//!
//! Each successful analysis goes to up to three sinks: the ordered history
//! log (one JSON array file), a standalone snapshot file named by
//! epoch-millisecond timestamp, and (when enabled) the external document
//! store. Sinks are independent: a failure in one is logged and swallowed,
//! never preventing the others and never reaching the request handler.
//!
//! The log file is rewritten whole on every append, so all read-modify-write
//! cycles are serialized through one async mutex; concurrent requests cannot
//! lose each other's entries. The external write happens after the log
//! append and merges the assigned id back into the entry, so a log read in
//! between may transiently show `externalId: null`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use base64::Engine as _;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::warn;

use crate::models::{AnalysisDocument, HistoryEntry};
use crate::store::DocumentStore;

pub struct Recorder {
    log_path: PathBuf,
    snapshot_dir: PathBuf,
    store: Option<Arc<dyn DocumentStore>>,
    client: reqwest::Client,
    /// Serializes the log's read-modify-write cycle across requests.
    log_lock: Mutex<()>,
}

impl Recorder {
    pub fn new(
        log_path: PathBuf,
        snapshot_dir: PathBuf,
        store: Option<Arc<dyn DocumentStore>>,
        fetch_timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(fetch_timeout).build()?;
        Ok(Self {
            log_path,
            snapshot_dir,
            store,
            client,
            log_lock: Mutex::new(()),
        })
    }

    /// Record one completed analysis in every sink. Never fails; every sink
    /// error is logged and swallowed.
    pub async fn record(
        &self,
        image_ref: &str,
        model_output: &str,
        prompt_used: &str,
        store_enabled: bool,
    ) {
        let entry = HistoryEntry {
            timestamp: Utc::now(),
            image_ref: image_ref.to_string(),
            prompt_used: prompt_used.to_string(),
            model_output: model_output.to_string(),
            external_id: None,
        };

        let (log_result, snapshot_result) =
            tokio::join!(self.append_log(&entry), self.write_snapshot(&entry));
        if let Err(e) = log_result {
            warn!(error = %e, "history log append failed");
        }
        if let Err(e) = snapshot_result {
            warn!(error = %e, "snapshot write failed");
        }

        if store_enabled {
            if let Some(store) = &self.store {
                if let Err(e) = self.record_external(store.as_ref(), &entry).await {
                    warn!(error = %e, "external store write failed");
                }
            }
        }
    }

    async fn append_log(&self, entry: &HistoryEntry) -> Result<()> {
        let _guard = self.log_lock.lock().await;
        let mut entries = self.read_log_or_empty().await;
        entries.push(entry.clone());
        self.write_log(&entries).await
    }

    async fn read_log_or_empty(&self) -> Vec<HistoryEntry> {
        match tokio::fs::read_to_string(&self.log_path).await {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(error = %e, "history log unreadable, starting a new one");
                Vec::new()
            }),
            Err(_) => Vec::new(),
        }
    }

    async fn write_log(&self, entries: &[HistoryEntry]) -> Result<()> {
        if let Some(parent) = self.log_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(entries)?;
        tokio::fs::write(&self.log_path, json)
            .await
            .with_context(|| format!("failed to write {}", self.log_path.display()))
    }

    async fn write_snapshot(&self, entry: &HistoryEntry) -> Result<()> {
        tokio::fs::create_dir_all(&self.snapshot_dir).await?;
        let name = format!("analysis_{}.json", entry.timestamp.timestamp_millis());
        let path = self.snapshot_dir.join(name);
        let json = serde_json::to_string_pretty(entry)?;
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("failed to write {}", path.display()))
    }

    /// Fetch the image bytes, insert the external document, and merge the
    /// assigned id back into the already-written log entry.
    async fn record_external(&self, store: &dyn DocumentStore, entry: &HistoryEntry) -> Result<()> {
        let image_bytes = self.image_bytes(&entry.image_ref).await?;
        let doc = AnalysisDocument {
            timestamp: entry.timestamp,
            prompt: entry.prompt_used.clone(),
            model_output: entry.model_output.clone(),
            image_bytes,
        };
        let id = store.insert_analysis(&doc).await?;
        self.set_external_id(entry, &id).await
    }

    async fn set_external_id(&self, entry: &HistoryEntry, id: &str) -> Result<()> {
        let _guard = self.log_lock.lock().await;
        let mut entries = self.read_log_or_empty().await;
        let found = entries
            .iter_mut()
            .rev()
            .find(|e| e.timestamp == entry.timestamp && e.image_ref == entry.image_ref);
        if let Some(found) = found {
            found.external_id = Some(id.to_string());
            self.write_log(&entries).await?;
        }
        Ok(())
    }

    /// Raw bytes for the external document: remote URLs are fetched, data
    /// URIs decoded, anything else treated as a local file path.
    async fn image_bytes(&self, image_ref: &str) -> Result<Vec<u8>> {
        if image_ref.starts_with("http://") || image_ref.starts_with("https://") {
            let response = self
                .client
                .get(image_ref)
                .send()
                .await
                .with_context(|| format!("failed to fetch image {}", image_ref))?;
            anyhow::ensure!(
                response.status().is_success(),
                "image fetch returned {}",
                response.status()
            );
            Ok(response.bytes().await?.to_vec())
        } else if let Some(uri) = image_ref.strip_prefix("data:") {
            let payload = uri
                .split_once("base64,")
                .map(|(_, payload)| payload)
                .ok_or_else(|| anyhow::anyhow!("data URI is not base64-encoded"))?;
            base64::engine::general_purpose::STANDARD
                .decode(payload)
                .context("invalid base64 image payload")
        } else {
            tokio::fs::read(image_ref)
                .await
                .with_context(|| format!("failed to read image file {}", image_ref))
        }
    }
}

/// Read the full history log, or `None` when no log exists yet.
pub async fn read_history(log_path: &Path) -> Result<Option<Vec<HistoryEntry>>> {
    match tokio::fs::read_to_string(log_path).await {
        Ok(raw) => Ok(Some(
            serde_json::from_str(&raw).context("history log is not valid JSON")?,
        )),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).context("failed to read history log"),
    }
}
