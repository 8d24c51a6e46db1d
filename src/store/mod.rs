//! External document-store seam.
//!
//! The [`DocumentStore`] trait is the relay's only view of the optional
//! document-oriented collaborator: insert an analysis, read one back, and
//! look up remote prompt templates. Implementations must be `Send + Sync`
//! to be shared across request handlers.
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`insert_analysis`](DocumentStore::insert_analysis) | Persist one analysis document |
//! | [`get_analysis`](DocumentStore::get_analysis) | Fetch a stored analysis by id |
//! | [`find_prompt`](DocumentStore::find_prompt) | Prompt text for one category |
//! | [`list_prompts`](DocumentStore::list_prompts) | All category → prompt pairs |
//!
//! The relay never writes prompts through this seam; the remote mapping is
//! read-only from its perspective.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::AnalysisDocument;
use crate::prompts::PromptMapping;

/// A stored analysis together with its assigned identifier.
#[derive(Debug, Clone)]
pub struct StoredAnalysis {
    pub id: String,
    pub document: AnalysisDocument,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert one analysis document, returning the assigned identifier.
    async fn insert_analysis(&self, doc: &AnalysisDocument) -> Result<String>;

    /// Fetch a stored analysis by identifier.
    async fn get_analysis(&self, id: &str) -> Result<Option<StoredAnalysis>>;

    /// Prompt text for one category, `None` when the store has no entry.
    async fn find_prompt(&self, category: &str) -> Result<Option<String>>;

    /// All category → prompt pairs held by the store.
    async fn list_prompts(&self) -> Result<PromptMapping>;
}
