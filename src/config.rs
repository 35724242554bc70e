//! Application configuration from the environment.
//!
//! The `.env` file (if present) is loaded in `main.rs` before this module
//! reads anything, so plain environment variables always win over `.env`
//! values.

use thiserror::Error;

use crate::stt::config::{DEFAULT_BASE_URL, DEFAULT_LANGUAGE, DEFAULT_MODEL, DEFAULT_SAMPLE_RATE};
use crate::stt::StreamConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("DEEPGRAM_API_KEY is not set")]
    MissingApiKey,

    #[error("invalid {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },
}

/// Environment-derived settings for the CLI.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_key: String,
    pub model: String,
    pub language: String,
    pub sample_rate: u32,
    pub base_url: String,
}

impl AppConfig {
    /// Read configuration from environment variables.
    ///
    /// `DEEPGRAM_API_KEY` is required. `TAPSCRIBE_MODEL`,
    /// `TAPSCRIBE_LANGUAGE`, `TAPSCRIBE_SAMPLE_RATE`, and
    /// `TAPSCRIBE_BASE_URL` override the service defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("DEEPGRAM_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        let sample_rate = match std::env::var("TAPSCRIBE_SAMPLE_RATE") {
            Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                name: "TAPSCRIBE_SAMPLE_RATE",
                value: raw,
            })?,
            Err(_) => DEFAULT_SAMPLE_RATE,
        };

        Ok(Self {
            api_key,
            model: env_or("TAPSCRIBE_MODEL", DEFAULT_MODEL),
            language: env_or("TAPSCRIBE_LANGUAGE", DEFAULT_LANGUAGE),
            sample_rate,
            base_url: env_or("TAPSCRIBE_BASE_URL", DEFAULT_BASE_URL),
        })
    }

    /// Translate into per-session stream settings.
    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig::new(self.api_key.clone())
            .with_model(self.model.clone())
            .with_language(self.language.clone())
            .with_sample_rate(self.sample_rate)
            .with_base_url(self.base_url.clone())
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}
