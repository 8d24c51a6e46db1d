//! Core data types shared across the relay.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One recorded analysis. Appended to the history log and written as a
/// standalone snapshot file; never mutated afterwards, except for the
/// best-effort `external_id` merge when the document store assigns one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "imageRef")]
    pub image_ref: String,
    #[serde(rename = "promptUsed")]
    pub prompt_used: String,
    #[serde(rename = "modelOutput")]
    pub model_output: String,
    #[serde(rename = "externalId")]
    pub external_id: Option<String>,
}

/// Document written to the external store when persistence is enabled.
#[derive(Debug, Clone)]
pub struct AnalysisDocument {
    pub timestamp: DateTime<Utc>,
    pub prompt: String,
    pub model_output: String,
    pub image_bytes: Vec<u8>,
}
