//! Prompt template storage and resolution.
//!
//! Two mappings from category name to prompt text exist: a local,
//! file-backed one (authoritative, always populated with at least the
//! built-in entries) and a remote one in the document store (optional,
//! read-only from here). [`PromptResolver::resolve`] tries an ordered list
//! of candidate sources and always produces usable text:
//!
//! ```text
//! remote (when enabled) ──miss/error──▶ local ──miss/error──▶ built-in default
//! ```
//!
//! A miss at one source never substitutes a different category; it moves to
//! the next source for the *same* category. Store failures are logged and
//! treated as misses; no error reaches the caller of the resolver.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::warn;

use crate::config::RuntimeConfig;
use crate::store::DocumentStore;

pub const DEFAULT_CATEGORY: &str = "NutritionAnalysis";
pub const GENERAL_CATEGORY: &str = "GeneralAnalysis";

const NUTRITION_PROMPT: &str = "You are a food analyzer. You will analyze the main components (carbs, fat, protein, etc) from this image and give back an estimation in grams of each and total calories. Be precise and concise.";
const GENERAL_PROMPT: &str = "Describe what you see in this image with detailed information.";

/// Category name → prompt text.
pub type PromptMapping = BTreeMap<String, String>;

fn builtin_defaults() -> PromptMapping {
    let mut mapping = PromptMapping::new();
    mapping.insert(DEFAULT_CATEGORY.to_string(), NUTRITION_PROMPT.to_string());
    mapping.insert(GENERAL_CATEGORY.to_string(), GENERAL_PROMPT.to_string());
    mapping
}

/// File-backed local prompt mapping.
///
/// The file is created with the two built-in entries on first access and
/// mutated only through [`set`](LocalPromptStore::set).
pub struct LocalPromptStore {
    path: PathBuf,
}

impl LocalPromptStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Create the mapping file with the built-in entries if it is absent.
    /// Idempotent.
    pub async fn ensure_seeded(&self) -> Result<()> {
        if tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            return Ok(());
        }
        self.write_mapping(&builtin_defaults()).await
    }

    pub async fn load(&self) -> Result<PromptMapping> {
        self.ensure_seeded().await?;
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("{} is not a valid prompt mapping", self.path.display()))
    }

    /// Full mapping, or the built-ins when the file is unreadable.
    pub async fn load_or_defaults(&self) -> PromptMapping {
        match self.load().await {
            Ok(mapping) => mapping,
            Err(e) => {
                warn!(error = %e, "local prompt mapping unreadable, using built-ins");
                builtin_defaults()
            }
        }
    }

    /// One category's text, `None` when the mapping has no entry for it.
    pub async fn get(&self, category: &str) -> Result<Option<String>> {
        Ok(self.load().await?.remove(category))
    }

    /// Insert or overwrite one entry and persist the mapping.
    pub async fn set(&self, category: &str, text: &str) -> Result<()> {
        anyhow::ensure!(!category.is_empty(), "category must not be empty");
        anyhow::ensure!(!text.is_empty(), "prompt text must not be empty");
        let mut mapping = self.load().await?;
        mapping.insert(category.to_string(), text.to_string());
        self.write_mapping(&mapping).await
    }

    async fn write_mapping(&self, mapping: &PromptMapping) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(mapping)?;
        tokio::fs::write(&self.path, json)
            .await
            .with_context(|| format!("failed to write {}", self.path.display()))
    }
}

/// Candidate sources in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PromptSource {
    Remote,
    Local,
}

pub struct PromptResolver {
    local: LocalPromptStore,
    remote: Option<Arc<dyn DocumentStore>>,
}

impl PromptResolver {
    pub fn new(local: LocalPromptStore, remote: Option<Arc<dyn DocumentStore>>) -> Self {
        Self { local, remote }
    }

    fn chain(&self, config: &RuntimeConfig) -> Vec<PromptSource> {
        let mut chain = Vec::with_capacity(2);
        if config.use_remote_prompts && config.document_store_enabled && self.remote.is_some() {
            chain.push(PromptSource::Remote);
        }
        chain.push(PromptSource::Local);
        chain
    }

    /// Prompt text for `category`. Never fails: the chain ends in the
    /// built-in default.
    pub async fn resolve(&self, config: &RuntimeConfig, category: &str) -> String {
        for source in self.chain(config) {
            if let Some(text) = self.lookup(source, category).await {
                return text;
            }
        }
        NUTRITION_PROMPT.to_string()
    }

    async fn lookup(&self, source: PromptSource, category: &str) -> Option<String> {
        match source {
            PromptSource::Remote => {
                let store = self.remote.as_ref()?;
                match store.find_prompt(category).await {
                    Ok(Some(text)) if !text.is_empty() => Some(text),
                    Ok(_) => None,
                    Err(e) => {
                        warn!(category, error = %e, "remote prompt lookup failed, trying next source");
                        None
                    }
                }
            }
            PromptSource::Local => match self.local.get(category).await {
                Ok(found) => found,
                Err(e) => {
                    warn!(category, error = %e, "local prompt lookup failed, using built-in default");
                    None
                }
            },
        }
    }

    /// All category → prompt pairs from the active store. A remote error
    /// falls back to the full local mapping.
    pub async fn get_all(&self, config: &RuntimeConfig) -> PromptMapping {
        if config.use_remote_prompts && config.document_store_enabled {
            if let Some(store) = &self.remote {
                match store.list_prompts().await {
                    Ok(mapping) => return mapping,
                    Err(e) => {
                        warn!(error = %e, "remote prompt listing failed, falling back to local")
                    }
                }
            }
        }
        self.local.load_or_defaults().await
    }

    /// Insert or overwrite one entry in the local mapping. There is no
    /// remote write path.
    pub async fn set_local(&self, category: &str, text: &str) -> Result<()> {
        self.local.set(category, text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryDocumentStore;
    use crate::store::StoredAnalysis;
    use crate::models::AnalysisDocument;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct FailingStore;

    #[async_trait]
    impl DocumentStore for FailingStore {
        async fn insert_analysis(&self, _doc: &AnalysisDocument) -> Result<String> {
            anyhow::bail!("store is down")
        }
        async fn get_analysis(&self, _id: &str) -> Result<Option<StoredAnalysis>> {
            anyhow::bail!("store is down")
        }
        async fn find_prompt(&self, _category: &str) -> Result<Option<String>> {
            anyhow::bail!("store is down")
        }
        async fn list_prompts(&self) -> Result<PromptMapping> {
            anyhow::bail!("store is down")
        }
    }

    fn local_store(tmp: &TempDir) -> LocalPromptStore {
        LocalPromptStore::new(tmp.path().join("prompts.json"))
    }

    fn remote_on() -> RuntimeConfig {
        RuntimeConfig {
            document_store_enabled: true,
            use_remote_prompts: true,
            ..RuntimeConfig::default()
        }
    }

    #[tokio::test]
    async fn first_access_seeds_builtin_entries() {
        let tmp = TempDir::new().unwrap();
        let store = local_store(&tmp);

        let mapping = store.load().await.unwrap();
        assert_eq!(mapping.len(), 2);
        assert_eq!(
            mapping.get(DEFAULT_CATEGORY).map(String::as_str),
            Some(NUTRITION_PROMPT)
        );
        assert_eq!(
            mapping.get(GENERAL_CATEGORY).map(String::as_str),
            Some(GENERAL_PROMPT)
        );
    }

    #[tokio::test]
    async fn seeding_does_not_clobber_an_existing_file() {
        let tmp = TempDir::new().unwrap();
        let store = local_store(&tmp);
        store.set("Foo", "bar").await.unwrap();

        store.ensure_seeded().await.unwrap();
        assert_eq!(store.get("Foo").await.unwrap().as_deref(), Some("bar"));
    }

    #[tokio::test]
    async fn set_then_resolve_returns_the_written_text() {
        let tmp = TempDir::new().unwrap();
        let resolver = PromptResolver::new(local_store(&tmp), None);

        resolver.set_local("Foo", "bar").await.unwrap();
        let text = resolver.resolve(&RuntimeConfig::default(), "Foo").await;
        assert_eq!(text, "bar");
    }

    #[tokio::test]
    async fn unknown_category_resolves_to_builtin_default() {
        let tmp = TempDir::new().unwrap();
        let resolver = PromptResolver::new(local_store(&tmp), None);

        let text = resolver.resolve(&RuntimeConfig::default(), "NoSuchCategory").await;
        assert_eq!(text, NUTRITION_PROMPT);
    }

    #[tokio::test]
    async fn empty_category_and_text_writes_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = local_store(&tmp);
        assert!(store.set("", "text").await.is_err());
        assert!(store.set("Foo", "").await.is_err());
    }

    #[tokio::test]
    async fn remote_hit_wins_when_enabled() {
        let tmp = TempDir::new().unwrap();
        let remote = Arc::new(MemoryDocumentStore::new());
        remote.put_prompt("Special", "special prompt");
        let resolver = PromptResolver::new(local_store(&tmp), Some(remote));

        let text = resolver.resolve(&remote_on(), "Special").await;
        assert_eq!(text, "special prompt");
    }

    #[tokio::test]
    async fn remote_miss_falls_back_to_local_same_category() {
        let tmp = TempDir::new().unwrap();
        let remote = Arc::new(MemoryDocumentStore::new());
        remote.put_prompt("Other", "other prompt");
        let resolver = PromptResolver::new(local_store(&tmp), Some(remote));
        resolver.set_local("Special", "local special").await.unwrap();

        let text = resolver.resolve(&remote_on(), "Special").await;
        assert_eq!(text, "local special");
    }

    #[tokio::test]
    async fn remote_error_is_equivalent_to_remote_disabled() {
        let tmp = TempDir::new().unwrap();
        let resolver = PromptResolver::new(local_store(&tmp), Some(Arc::new(FailingStore)));
        resolver.set_local("Foo", "bar").await.unwrap();

        let with_failing_remote = resolver.resolve(&remote_on(), "Foo").await;
        let with_remote_disabled = resolver.resolve(&RuntimeConfig::default(), "Foo").await;
        assert_eq!(with_failing_remote, with_remote_disabled);
        assert_eq!(with_failing_remote, "bar");
    }

    #[tokio::test]
    async fn remote_is_ignored_unless_both_flags_are_set() {
        let tmp = TempDir::new().unwrap();
        let remote = Arc::new(MemoryDocumentStore::new());
        remote.put_prompt(DEFAULT_CATEGORY, "remote nutrition");
        let resolver = PromptResolver::new(local_store(&tmp), Some(remote));

        let config = RuntimeConfig {
            use_remote_prompts: true,
            document_store_enabled: false,
            ..RuntimeConfig::default()
        };
        let text = resolver.resolve(&config, DEFAULT_CATEGORY).await;
        assert_eq!(text, NUTRITION_PROMPT);
    }

    #[tokio::test]
    async fn get_all_prefers_remote_and_recovers_from_errors() {
        let tmp = TempDir::new().unwrap();
        let remote = Arc::new(MemoryDocumentStore::new());
        remote.put_prompt("Special", "special prompt");
        let resolver = PromptResolver::new(local_store(&tmp), Some(remote));

        let all = resolver.get_all(&remote_on()).await;
        assert_eq!(all.len(), 1);
        assert!(all.contains_key("Special"));

        let failing = PromptResolver::new(local_store(&tmp), Some(Arc::new(FailingStore)));
        let all = failing.get_all(&remote_on()).await;
        assert!(all.contains_key(DEFAULT_CATEGORY));
        assert!(all.contains_key(GENERAL_CATEGORY));
    }
}
