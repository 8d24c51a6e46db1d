use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Static settings, read once at startup from a TOML file.
///
/// Every section has defaults, so a missing file yields a fully working
/// configuration (data under `./data`, upstream at the public OpenAI
/// endpoint).
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Settings {
    pub data: DataConfig,
    pub server: ServerConfig,
    pub vision: VisionConfig,
    pub document_store: DocumentStoreConfig,
    pub dedup: DedupConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DataConfig {
    /// Directory holding the history log, snapshots, prompt mapping, and
    /// runtime configuration file.
    pub dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./data"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3103".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct VisionConfig {
    /// Chat-completions endpoint the relay forwards to.
    pub endpoint: String,
    pub model: String,
    pub max_tokens: u32,
    /// Applied to the outbound call and to image byte fetches.
    pub timeout_secs: u64,
    /// Name of the environment variable holding the bearer token.
    pub api_key_env: String,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o".to_string(),
            max_tokens: 300,
            timeout_secs: 15,
            api_key_env: "OPENAI_API_KEY".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DocumentStoreConfig {
    pub path: PathBuf,
}

impl Default for DocumentStoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/store.sqlite"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DedupConfig {
    /// Trailing window during which a repeated image reference is rejected.
    pub window_ms: u64,
    /// Cadence of the background sweep; must not exceed the window.
    pub sweep_interval_ms: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            window_ms: 3000,
            sweep_interval_ms: 1000,
        }
    }
}

impl Settings {
    pub fn log_file(&self) -> PathBuf {
        self.data.dir.join("vision_log.json")
    }

    pub fn prompts_file(&self) -> PathBuf {
        self.data.dir.join("prompts.json")
    }

    pub fn config_file(&self) -> PathBuf {
        self.data.dir.join("config.json")
    }
}

pub fn load_settings(path: &Path) -> Result<Settings> {
    let settings: Settings = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| "Failed to parse config file")?
    } else {
        Settings::default()
    };

    if settings.dedup.window_ms == 0 {
        anyhow::bail!("dedup.window_ms must be > 0");
    }

    if settings.dedup.sweep_interval_ms == 0
        || settings.dedup.sweep_interval_ms > settings.dedup.window_ms
    {
        anyhow::bail!("dedup.sweep_interval_ms must be in 1..=dedup.window_ms");
    }

    if settings.vision.max_tokens == 0 {
        anyhow::bail!("vision.max_tokens must be > 0");
    }

    if settings.vision.timeout_secs == 0 {
        anyhow::bail!("vision.timeout_secs must be > 0");
    }

    Ok(settings)
}

/// Runtime configuration, mutable through the API and persisted as a JSON
/// object file.
///
/// It is re-read before every request-scoped decision, so an update takes
/// effect on the next request rather than mid-request. The legacy wire keys
/// (`mongoEnabled`, `useMongoPrompt`) are accepted on input for older
/// clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Master switch for external persistence and remote prompts.
    #[serde(rename = "documentStoreEnabled", alias = "mongoEnabled")]
    pub document_store_enabled: bool,
    /// Whether prompt resolution prefers the remote store.
    #[serde(rename = "useRemotePrompts", alias = "useMongoPrompt")]
    pub use_remote_prompts: bool,
    /// Category applied when the caller omits one.
    #[serde(rename = "defaultCategory")]
    pub default_category: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            document_store_enabled: false,
            use_remote_prompts: false,
            default_category: "NutritionAnalysis".to_string(),
        }
    }
}

/// File-backed store for [`RuntimeConfig`].
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Current configuration. A missing or unreadable file yields the
    /// defaults rather than an error.
    pub async fn load(&self) -> RuntimeConfig {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(path = %self.path.display(), error = %e, "runtime config unreadable, using defaults");
                RuntimeConfig::default()
            }),
            Err(_) => RuntimeConfig::default(),
        }
    }

    pub async fn save(&self, config: &RuntimeConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(config)?;
        tokio::fs::write(&self.path, json)
            .await
            .with_context(|| format!("failed to write {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_file_yields_defaults() {
        let tmp = TempDir::new().unwrap();
        let store = ConfigStore::new(tmp.path().join("config.json"));
        let config = store.load().await;
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.default_category, "NutritionAnalysis");
        assert!(!config.document_store_enabled);
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let tmp = TempDir::new().unwrap();
        let store = ConfigStore::new(tmp.path().join("config.json"));
        let config = RuntimeConfig {
            document_store_enabled: true,
            use_remote_prompts: true,
            default_category: "GeneralAnalysis".to_string(),
        };
        store.save(&config).await.unwrap();
        assert_eq!(store.load().await, config);
    }

    #[test]
    fn legacy_wire_keys_are_accepted() {
        let config: RuntimeConfig = serde_json::from_str(
            r#"{"mongoEnabled": true, "useMongoPrompt": true, "defaultCategory": "Foo"}"#,
        )
        .unwrap();
        assert!(config.document_store_enabled);
        assert!(config.use_remote_prompts);
        assert_eq!(config.default_category, "Foo");
    }

    #[test]
    fn canonical_keys_are_emitted() {
        let json = serde_json::to_string(&RuntimeConfig::default()).unwrap();
        assert!(json.contains("documentStoreEnabled"));
        assert!(!json.contains("mongoEnabled"));
    }

    #[test]
    fn settings_defaults_are_valid() {
        let tmp = TempDir::new().unwrap();
        let settings = load_settings(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(settings.dedup.window_ms, 3000);
        assert!(settings.dedup.sweep_interval_ms <= settings.dedup.window_ms);
    }

    #[test]
    fn sweep_interval_above_window_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("raybanai.toml");
        std::fs::write(&path, "[dedup]\nwindow_ms = 1000\nsweep_interval_ms = 5000\n").unwrap();
        assert!(load_settings(&path).is_err());
    }
}
