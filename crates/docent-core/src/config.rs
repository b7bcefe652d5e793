//! Persisted config (service endpoints, models, retrieval knobs) in the app data directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::app_data;
use crate::ollama::{DEFAULT_BASE_URL, DEFAULT_EMBED_MODEL};
use crate::prompt::DEFAULT_TOP_K;
use crate::sections::DEFAULT_MAX_SECTION_CHARS;

const CONFIG_FILENAME: &str = "config.toml";

pub const DEFAULT_API_BASE: &str = "http://localhost:3000";
pub const DEFAULT_CHAT_MODEL: &str = "deepseek-ai/DeepSeek-R1-Distill-Qwen-7B";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

pub const ENV_API_BASE: &str = "DOCENT_API_BASE";
pub const ENV_CHAT_MODEL: &str = "DOCENT_CHAT_MODEL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL serving `/api/v1/embeddings` and `/api/v1/chat/completions`.
    pub api_base: String,
    pub chat_model: String,
    /// Number of sections pulled into each prompt.
    pub top_k: usize,
    /// Sections longer than this (in chars) are indexed without an embedding.
    pub max_section_chars: usize,
    pub request_timeout_secs: u64,
    /// Max wait between two chunks of a streamed answer.
    pub idle_timeout_secs: u64,
    /// Documentation sources for `build`.
    pub docs_root: Option<String>,
    /// Serialized index; defaults to `embeddings.json` in the app data directory.
    pub index_path: Option<String>,
    pub ollama_url: String,
    pub ollama_embed_model: String,
    /// Replaces the built-in system instructions.
    pub system_prompt: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            top_k: DEFAULT_TOP_K,
            max_section_chars: DEFAULT_MAX_SECTION_CHARS,
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            idle_timeout_secs: DEFAULT_TIMEOUT_SECS,
            docs_root: None,
            index_path: None,
            ollama_url: DEFAULT_BASE_URL.to_string(),
            ollama_embed_model: DEFAULT_EMBED_MODEL.to_string(),
            system_prompt: None,
        }
    }
}

impl Config {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Configured index path, else the default one in the app data directory.
    pub fn resolved_index_path(&self) -> Option<PathBuf> {
        self.index_path
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .or_else(app_data::default_index_path)
    }

    pub fn docs_root(&self) -> Option<PathBuf> {
        self.docs_root
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
    }

    /// Checks that the endpoints parse and retrieval knobs are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Url::parse(&self.api_base).map_err(|e| ConfigError::InvalidUrl(self.api_base.clone(), e))?;
        Url::parse(&self.ollama_url)
            .map_err(|e| ConfigError::InvalidUrl(self.ollama_url.clone(), e))?;
        if self.top_k == 0 {
            return Err(ConfigError::Invalid("top_k must be at least 1"));
        }
        Ok(())
    }

    /// Applies `DOCENT_*` environment overrides on top of the file values.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(v) = get(ENV_API_BASE).filter(|v| !v.is_empty()) {
            self.api_base = v;
        }
        if let Some(v) = get(ENV_CHAT_MODEL).filter(|v| !v.is_empty()) {
            self.chat_model = v;
        }
    }
}

/// Load config from the app data directory, with env overrides applied.
/// Returns default config if missing or invalid.
pub fn load_config() -> Config {
    let mut config = app_data::app_data_dir()
        .map(|dir| dir.join(CONFIG_FILENAME))
        .filter(|path| path.is_file())
        .and_then(|path| match load_config_from(&path) {
            Ok(c) => Some(c),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable config");
                None
            }
        })
        .unwrap_or_default();
    config.apply_env();
    config
}

/// Load config from an explicit file. Fails on read or parse errors.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let s = std::fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
    toml::from_str(&s).map_err(ConfigError::Parse)
}

/// Save config to the app data directory.
pub fn save_config(config: &Config) -> Result<(), ConfigError> {
    let data_dir = app_data::app_data_dir().ok_or(ConfigError::NoDataDir)?;
    save_config_to(config, &data_dir.join(CONFIG_FILENAME))
}

pub fn save_config_to(config: &Config, path: &Path) -> Result<(), ConfigError> {
    let s = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;
    std::fs::write(path, s).map_err(ConfigError::Write)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not determine app data directory")]
    NoDataDir,
    #[error("failed to read config {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("failed to write config: {0}")]
    Write(std::io::Error),
    #[error("invalid URL {0}: {1}")]
    InvalidUrl(String, url::ParseError),
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}
