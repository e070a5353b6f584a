//! Configuration resolution for kibitz-ai
//!
//! Turns the shared [`TomlConfig`] plus environment into settings for the
//! model client and the queue dispatcher. Priority is ENV → TOML; missing
//! required values are startup errors that say where to set them.

use kibitz_common::config::{
    resolve_optional_string, TomlConfig, ENV_MODEL_API_KEY, ENV_QUEUE_TOKEN,
};
use kibitz_common::{Error, Result};
use tracing::{info, warn};

use crate::services::{GeminiSettings, QueueSettings};

/// Resolve the model API key
///
/// **Priority:** ENV → TOML
pub fn resolve_model_api_key(toml_config: &TomlConfig) -> Result<String> {
    let env_key = std::env::var(ENV_MODEL_API_KEY)
        .ok()
        .filter(|k| is_valid_key(k));
    let toml_key = toml_config
        .model
        .api_key
        .as_ref()
        .filter(|k| is_valid_key(k));

    if env_key.is_some() && toml_key.is_some() {
        warn!("Model API key found in both environment and TOML. Using environment.");
    }

    if let Some(key) = env_key {
        info!("Model API key loaded from environment variable");
        return Ok(key);
    }

    if let Some(key) = toml_key {
        info!("Model API key loaded from TOML config");
        return Ok(key.clone());
    }

    Err(Error::Config(format!(
        "Model API key not configured. Please configure using one of:\n\
         1. Environment: {}=your-key-here\n\
         2. TOML config: ~/.config/kibitz/kibitz-ai.toml ([model] api_key = \"your-key\")",
        ENV_MODEL_API_KEY
    )))
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Settings for the Gemini client
pub fn resolve_model_settings(toml_config: &TomlConfig) -> Result<GeminiSettings> {
    let model = &toml_config.model;
    Ok(GeminiSettings {
        api_key: resolve_model_api_key(toml_config)?,
        model: model.name.clone(),
        base_url: model.base_url.clone(),
        min_interval_ms: model.min_interval_ms,
        timeout_seconds: model.timeout_seconds,
    })
}

/// Settings for queue dispatch; both URLs are required
pub fn resolve_queue_settings(toml_config: &TomlConfig, shared_secret: i64) -> Result<QueueSettings> {
    let dispatch = &toml_config.dispatch;

    let queue_url = dispatch
        .queue_url
        .clone()
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| {
            Error::Config("dispatch.mode = \"queue\" requires dispatch.queue_url".to_string())
        })?;
    let callback_url = dispatch
        .callback_url
        .clone()
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| {
            Error::Config("dispatch.mode = \"queue\" requires dispatch.callback_url".to_string())
        })?;

    if shared_secret == 0 {
        warn!("Queue callbacks are unsigned (shared_secret = 0)");
    }

    Ok(QueueSettings {
        queue_url,
        callback_url,
        auth_token: resolve_optional_string(ENV_QUEUE_TOKEN, dispatch.queue_auth_token.as_ref()),
        shared_secret,
    })
}
