//! Configuration loading and resolution
//!
//! Every value follows the same priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing TOML file is not an error unless it was named explicitly;
//! the service starts on defaults and logs a warning.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const ENV_CONFIG: &str = "KIBITZ_CONFIG";
/// Environment variable overriding the data folder
pub const ENV_DATA_FOLDER: &str = "KIBITZ_DATA_FOLDER";
/// Environment variable overriding the listen address
pub const ENV_BIND: &str = "KIBITZ_BIND";
/// Environment variable overriding the dispatch mode
pub const ENV_DISPATCH_MODE: &str = "KIBITZ_DISPATCH_MODE";
/// Environment variable carrying the queue bearer token
pub const ENV_QUEUE_TOKEN: &str = "KIBITZ_QUEUE_TOKEN";
/// Environment variable carrying the analysis model API key
pub const ENV_MODEL_API_KEY: &str = "KIBITZ_MODEL_API_KEY";
/// Environment variable carrying the shared signing secret
pub const ENV_SHARED_SECRET: &str = "KIBITZ_SHARED_SECRET";

/// Default listen address for the analysis service
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:5740";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Folder holding the database and uploaded objects
    #[serde(default)]
    pub data_folder: Option<PathBuf>,

    /// HTTP listen address (host:port)
    #[serde(default)]
    pub bind_address: Option<String>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub dispatch: DispatchConfig,

    #[serde(default)]
    pub model: ModelConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Database tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Upper bound on time spent retrying writes against a locked database
    #[serde(default = "default_max_lock_wait_ms")]
    pub max_lock_wait_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_lock_wait_ms: default_max_lock_wait_ms(),
        }
    }
}

/// Authentication configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Shared signing secret; 0 disables verification
    #[serde(default)]
    pub shared_secret: Option<i64>,
}

/// How analysis jobs are handed to a worker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// Spawn the worker in-process
    #[default]
    Inline,
    /// Submit an HTTP callback task to a managed queue
    Queue,
}

impl FromStr for DispatchMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inline" => Ok(DispatchMode::Inline),
            "queue" => Ok(DispatchMode::Queue),
            other => Err(Error::Config(format!(
                "Unknown dispatch mode '{}' (expected 'inline' or 'queue')",
                other
            ))),
        }
    }
}

/// Dispatch gateway configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default)]
    pub mode: DispatchMode,

    /// Managed queue task-creation endpoint
    #[serde(default)]
    pub queue_url: Option<String>,

    /// Public URL of this service's `/tasks/analyze` endpoint
    #[serde(default)]
    pub callback_url: Option<String>,

    /// Bearer token presented to the queue API
    #[serde(default)]
    pub queue_auth_token: Option<String>,
}

/// Analysis model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_model_name")]
    pub name: String,

    #[serde(default = "default_model_base_url")]
    pub base_url: String,

    /// Minimum spacing between model requests (0 = unlimited)
    #[serde(default)]
    pub min_interval_ms: u64,

    #[serde(default = "default_model_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            name: default_model_name(),
            base_url: default_model_base_url(),
            min_interval_ms: 0,
            timeout_seconds: default_model_timeout(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_lock_wait_ms() -> u64 {
    5000
}

fn default_model_name() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_model_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_model_timeout() -> u64 {
    60
}

impl TomlConfig {
    /// Parse a TOML config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
    }

    /// Load the config file for a module, degrading to defaults
    ///
    /// An explicit path (CLI or `KIBITZ_CONFIG`) must exist. The per-user
    /// default location is optional.
    pub fn load_for_module(cli_path: Option<&Path>, module_name: &str) -> Result<Self> {
        let explicit = cli_path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(ENV_CONFIG).ok().map(PathBuf::from));

        if let Some(path) = explicit {
            info!("Loading configuration from {}", path.display());
            return Self::load(&path);
        }

        match default_config_path(module_name) {
            Some(path) if path.exists() => {
                info!("Loading configuration from {}", path.display());
                Self::load(&path)
            }
            Some(path) => {
                warn!(
                    "No config file at {}; using built-in defaults",
                    path.display()
                );
                Ok(Self::default())
            }
            None => {
                warn!("Could not determine config directory; using built-in defaults");
                Ok(Self::default())
            }
        }
    }
}

/// Per-user config file location, e.g. `~/.config/kibitz/kibitz-ai.toml`
pub fn default_config_path(module_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("kibitz").join(format!("{}.toml", module_name)))
}

/// OS-dependent default data folder
pub fn default_data_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("kibitz"))
        .unwrap_or_else(|| PathBuf::from("./kibitz_data"))
}

/// Resolve a value through CLI → ENV → TOML → default
///
/// Blank environment values are treated as unset.
pub fn resolve_value<T>(
    cli: Option<T>,
    env_var_name: &str,
    toml_value: Option<T>,
    default: T,
) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(value) = cli {
        return Ok(value);
    }

    if let Ok(raw) = std::env::var(env_var_name) {
        if !raw.trim().is_empty() {
            return raw.trim().parse::<T>().map_err(|e| {
                Error::Config(format!("Invalid value for {}: {}", env_var_name, e))
            });
        }
    }

    Ok(toml_value.unwrap_or(default))
}

/// Resolve the data folder
pub fn resolve_data_folder(cli: Option<PathBuf>, config: &TomlConfig) -> Result<PathBuf> {
    resolve_value(
        cli,
        ENV_DATA_FOLDER,
        config.data_folder.clone(),
        default_data_folder(),
    )
}

/// Resolve the HTTP listen address
pub fn resolve_bind_address(cli: Option<String>, config: &TomlConfig) -> Result<String> {
    resolve_value(
        cli,
        ENV_BIND,
        config.bind_address.clone(),
        DEFAULT_BIND_ADDRESS.to_string(),
    )
}

/// Resolve the dispatch mode
pub fn resolve_dispatch_mode(config: &TomlConfig) -> Result<DispatchMode> {
    resolve_value(None, ENV_DISPATCH_MODE, Some(config.dispatch.mode), DispatchMode::Inline)
}

/// Resolve an optional secret-like string (ENV → TOML)
///
/// Blank values are ignored at both tiers.
pub fn resolve_optional_string(env_var_name: &str, toml_value: Option<&String>) -> Option<String> {
    std::env::var(env_var_name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .or_else(|| toml_value.filter(|v| !v.trim().is_empty()).cloned())
}

/// Create the data folder if missing
pub fn ensure_directory_exists(folder: &Path) -> Result<()> {
    if !folder.exists() {
        std::fs::create_dir_all(folder)?;
        info!("Created data folder: {}", folder.display());
    }
    Ok(())
}
