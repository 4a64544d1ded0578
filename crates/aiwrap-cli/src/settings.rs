//! Application configuration.
//!
//! Settings come from a TOML file with `[provider]` and `[chat]` sections,
//! then environment overrides are applied on top:
//!
//! ```toml
//! [provider]
//! base_url = "https://api.openai.com/v1"
//! max_retries = 3
//!
//! [chat]
//! model = "gpt-4o-mini"
//! request_timeout_secs = 60
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use aiwrap_ai::ProviderConfig;
use aiwrap_tui::ChatSettings;

use crate::helpers::env_non_empty;

/// Config file read when `--config` is not given, if it exists.
pub const DEFAULT_CONFIG_PATH: &str = "config/aiwrap.toml";

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
const BASE_URL_ENV: &str = "OPENAI_BASE_URL";
const MODEL_ENV: &str = "AIWRAP_MODEL";

/// Top-level configuration file layout.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub provider: ProviderConfig,
    pub chat: ChatConfig,
}

/// The `[chat]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Registry name the provider is registered under.
    pub provider_name: String,
    /// Model for interactive chat. Empty uses the provider default.
    pub model: String,
    pub system_prompt: String,
    /// Deadline for one streamed reply in the chat UI.
    pub request_timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            provider_name: "openai".into(),
            model: String::new(),
            system_prompt: "You are a helpful assistant.".into(),
            request_timeout_secs: 60,
        }
    }
}

impl AppConfig {
    /// Load the configuration.
    ///
    /// An explicit `path` must exist. Without one, [`DEFAULT_CONFIG_PATH`]
    /// is used if present and defaults otherwise. Environment overrides are
    /// applied last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    Self::from_file(&default)?
                } else {
                    tracing::debug!("no config file, using defaults");
                    Self::default()
                }
            }
        };

        config.apply_env(env_non_empty);
        Ok(config)
    }

    /// Parse a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        tracing::info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Apply environment overrides using `lookup` to read variables.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(API_KEY_ENV) {
            self.provider.api_key = key;
        }
        if let Some(url) = lookup(BASE_URL_ENV) {
            self.provider.base_url = url;
        }
        if let Some(model) = lookup(MODEL_ENV) {
            self.chat.model = model;
        }
    }

    /// Fail unless an API key was configured somewhere.
    pub fn require_api_key(&self) -> Result<()> {
        if self.provider.api_key.is_empty() {
            bail!("{API_KEY_ENV} environment variable is required");
        }
        Ok(())
    }

    /// Settings for an interactive chat session.
    pub fn chat_settings(&self, model_override: Option<String>) -> ChatSettings {
        ChatSettings {
            provider: self.chat.provider_name.clone(),
            model: model_override.unwrap_or_else(|| self.chat.model.clone()),
            system_prompt: self.chat.system_prompt.clone(),
            request_timeout: Duration::from_secs(self.chat.request_timeout_secs),
        }
    }
}
