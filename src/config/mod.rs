//! Configuration system (layered: code > env > config file).

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::context::ScreenshotMode;
use crate::error::GlimpseError;
use crate::host::CredentialResolver;
use crate::models::{ModelConfig, ProviderKey};
use crate::util::retry::RetryPolicy;

/// File name looked up in the platform config directory.
pub const CONFIG_FILE_NAME: &str = "glimpse.toml";

/// Tunables for the turn engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub system_prompt: Option<String>,
    /// Request token ceiling. `None` derives one from the model's context
    /// window minus its output reservation.
    pub token_ceiling: Option<usize>,
    pub min_request_interval_ms: u64,
    pub retry: RetryPolicy,
    pub screenshot_mode: ScreenshotMode,
    pub probe_timeout_ms: u64,
    /// Automatic tool continuations per submitted turn.
    pub max_tool_rounds: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            system_prompt: None,
            token_ceiling: None,
            min_request_interval_ms: 250,
            retry: RetryPolicy::default(),
            screenshot_mode: ScreenshotMode::Probe,
            probe_timeout_ms: 10_000,
            max_tool_rounds: 1,
        }
    }
}

impl EngineSettings {
    pub fn min_request_interval(&self) -> Duration {
        Duration::from_millis(self.min_request_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

/// On-disk shape of `glimpse.toml`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    keys: HashMap<String, String>,
    base_urls: HashMap<String, String>,
    engine: EngineSettings,
}

/// Layered configuration.
///
/// Later layers override earlier ones: config file, then environment
/// (including `.env`), then explicit setters.
#[derive(Clone)]
pub struct GlimpseConfig {
    api_keys: Arc<RwLock<HashMap<ProviderKey, String>>>,
    base_urls: Arc<RwLock<HashMap<ProviderKey, String>>>,
    engine: Arc<RwLock<EngineSettings>>,
}

impl fmt::Debug for GlimpseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let providers: Vec<ProviderKey> = self
            .api_keys
            .read()
            .map(|keys| keys.keys().copied().collect())
            .unwrap_or_default();
        f.debug_struct("GlimpseConfig")
            .field("api_keys_for", &providers)
            .field("base_urls", &self.base_urls)
            .field("engine", &self.engine)
            .finish()
    }
}

impl Default for GlimpseConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl GlimpseConfig {
    /// Empty config with default engine settings.
    pub fn new() -> Self {
        Self {
            api_keys: Arc::new(RwLock::new(HashMap::new())),
            base_urls: Arc::new(RwLock::new(HashMap::new())),
            engine: Arc::new(RwLock::new(EngineSettings::default())),
        }
    }

    /// Environment only (`.env` is loaded if present).
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let config = Self::new();
        config.apply_env(|var| std::env::var(var).ok());
        config
    }

    /// Config file (if it exists) overlaid with the environment.
    ///
    /// `path` defaults to [`default_path`](Self::default_path). A missing file
    /// is not an error; an unreadable or invalid one is.
    pub fn load(path: Option<&Path>) -> Result<Self, GlimpseError> {
        let _ = dotenvy::dotenv();
        let config = Self::new();
        let path = path.map(Path::to_path_buf).or_else(Self::default_path);
        if let Some(path) = path.filter(|p| p.exists()) {
            config.apply_file(&path)?;
        }
        config.apply_env(|var| std::env::var(var).ok());
        Ok(config)
    }

    /// `glimpse.toml` in the platform config directory.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "glimpse", "glimpse")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Overlay a TOML config file.
    pub fn apply_file(&self, path: &Path) -> Result<(), GlimpseError> {
        let raw = std::fs::read_to_string(path)?;
        let file: FileConfig = toml::from_str(&raw).map_err(|e| {
            GlimpseError::Configuration(format!("invalid config file {}: {e}", path.display()))
        })?;

        for (name, key) in file.keys {
            self.set_api_key(parse_provider(&name)?, key);
        }
        for (name, url) in file.base_urls {
            self.set_base_url(parse_provider(&name)?, url);
        }
        self.set_engine(file.engine);
        tracing::debug!(path = %path.display(), "loaded config file");
        Ok(())
    }

    /// Overlay values found through `lookup` (normally the process environment).
    pub fn apply_env(&self, lookup: impl Fn(&str) -> Option<String>) {
        for provider in ProviderKey::ALL {
            let key = provider
                .api_key_env_vars()
                .iter()
                .find_map(|var| lookup(var).filter(|v| !v.trim().is_empty()));
            if let Some(key) = key {
                self.set_api_key(provider, key);
            }
            if let Some(url) = lookup(provider.base_url_env_var()).filter(|v| !v.trim().is_empty()) {
                self.set_base_url(provider, url);
            }
        }
    }

    pub fn set_api_key(&self, provider: ProviderKey, key: impl Into<String>) {
        self.api_keys
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(provider, key.into());
    }

    pub fn get_api_key(&self, provider: ProviderKey) -> Option<String> {
        self.api_keys.read().ok()?.get(&provider).cloned()
    }

    pub fn set_base_url(&self, provider: ProviderKey, url: impl Into<String>) {
        self.base_urls
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(provider, url.into());
    }

    pub fn get_base_url(&self, provider: ProviderKey) -> Option<String> {
        self.base_urls.read().ok()?.get(&provider).cloned()
    }

    pub fn has_credentials(&self, provider: ProviderKey) -> bool {
        self.get_api_key(provider).is_some()
    }

    pub fn engine(&self) -> EngineSettings {
        self.engine
            .read()
            .map(|e| e.clone())
            .unwrap_or_default()
    }

    pub fn set_engine(&self, settings: EngineSettings) {
        *self.engine.write().unwrap_or_else(|e| e.into_inner()) = settings;
    }

    /// Adapter config for `provider`/`model_id` using the configured
    /// credential and base URL.
    pub fn model_config(
        &self,
        provider: ProviderKey,
        model_id: impl Into<String>,
    ) -> Result<ModelConfig, GlimpseError> {
        Ok(ModelConfig::builder()
            .provider(provider)
            .model_id(model_id)
            .credential(self.credential_for(provider)?)
            .maybe_base_url(self.get_base_url(provider))
            .build())
    }
}

impl CredentialResolver for GlimpseConfig {
    fn credential_for(&self, provider: ProviderKey) -> Result<String, GlimpseError> {
        self.get_api_key(provider).ok_or_else(|| {
            GlimpseError::Authentication(format!(
                "Missing {} for provider '{provider}'",
                provider.api_key_env_vars().join(" or ")
            ))
        })
    }
}

fn parse_provider(name: &str) -> Result<ProviderKey, GlimpseError> {
    ProviderKey::parse(name)
        .ok_or_else(|| GlimpseError::Configuration(format!("unknown provider '{name}' in config file")))
}
