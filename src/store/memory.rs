//! In-memory [`DocumentStore`] for tests.
//!
//! `HashMap` behind `std::sync::RwLock`; identifiers are v4 UUIDs like the
//! SQLite implementation's.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use super::{DocumentStore, StoredAnalysis};
use crate::models::AnalysisDocument;
use crate::prompts::PromptMapping;

pub struct MemoryDocumentStore {
    analyses: RwLock<HashMap<String, AnalysisDocument>>,
    prompts: RwLock<PromptMapping>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            analyses: RwLock::new(HashMap::new()),
            prompts: RwLock::new(PromptMapping::new()),
        }
    }

    /// Seed one prompt row for a test scenario.
    pub fn put_prompt(&self, category: &str, prompt: &str) {
        self.prompts
            .write()
            .unwrap()
            .insert(category.to_string(), prompt.to_string());
    }

    pub fn analysis_count(&self) -> usize {
        self.analyses.read().unwrap().len()
    }
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn insert_analysis(&self, doc: &AnalysisDocument) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        self.analyses.write().unwrap().insert(id.clone(), doc.clone());
        Ok(id)
    }

    async fn get_analysis(&self, id: &str) -> Result<Option<StoredAnalysis>> {
        Ok(self.analyses.read().unwrap().get(id).map(|doc| StoredAnalysis {
            id: id.to_string(),
            document: doc.clone(),
        }))
    }

    async fn find_prompt(&self, category: &str) -> Result<Option<String>> {
        Ok(self.prompts.read().unwrap().get(category).cloned())
    }

    async fn list_prompts(&self) -> Result<PromptMapping> {
        Ok(self.prompts.read().unwrap().clone())
    }
}
