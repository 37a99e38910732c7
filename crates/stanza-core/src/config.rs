//! Persisted config (library path, Ollama, engine tuning) in the app data directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app_data;
use crate::ollama::{DEFAULT_BASE_URL, DEFAULT_EMBED_MODEL};

const CONFIG_FILENAME: &str = "config.toml";
const LIBRARY_FILENAME: &str = "library.json";

pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_MAX_UPDATE_ATTEMPTS: u32 = 8;

/// What `create_profile` does with seed ids that are not in the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeedPolicy {
    /// Skip unknown ids and record them.
    #[default]
    Lenient,
    /// Fail on the first unknown id.
    Strict,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Where the item/profile library snapshot lives. Defaults to the app data directory.
    pub library_path: Option<String>,
    pub ollama_url: Option<String>,
    pub embed_model: Option<String>,
    /// Bound on every store and embedding call.
    pub timeout_secs: Option<u64>,
    pub seed_policy: Option<SeedPolicy>,
    pub allow_empty_profiles: Option<bool>,
    pub max_update_attempts: Option<u32>,
    /// tracing filter directive, e.g. `info` or `stanza_core=debug`.
    pub log_level: Option<String>,
}

impl Config {
    pub fn engine_options(&self) -> EngineOptions {
        let defaults = EngineOptions::default();
        EngineOptions {
            timeout: self
                .timeout_secs
                .filter(|s| *s > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            seed_policy: self.seed_policy.unwrap_or(defaults.seed_policy),
            allow_empty_profiles: self
                .allow_empty_profiles
                .unwrap_or(defaults.allow_empty_profiles),
            max_update_attempts: self
                .max_update_attempts
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_update_attempts),
        }
    }

    pub fn ollama_url(&self) -> &str {
        self.ollama_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    pub fn embed_model(&self) -> &str {
        self.embed_model.as_deref().unwrap_or(DEFAULT_EMBED_MODEL)
    }

    /// Configured library path, else `library.json` in the app data directory.
    pub fn library_path(&self) -> Option<PathBuf> {
        self.library_path
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .or_else(|| app_data::app_data_dir().map(|d| d.join(LIBRARY_FILENAME)))
    }
}

/// Tuning shared by the profile manager, ranker and catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    pub timeout: Duration,
    pub seed_policy: SeedPolicy,
    pub allow_empty_profiles: bool,
    /// Compare-and-swap retries for a single profile update.
    pub max_update_attempts: u32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            seed_policy: SeedPolicy::Lenient,
            allow_empty_profiles: false,
            max_update_attempts: DEFAULT_MAX_UPDATE_ATTEMPTS,
        }
    }
}

/// Load config from the app data directory. Returns default config if missing or invalid.
pub fn load_config() -> Config {
    let Some(data_dir) = app_data::app_data_dir() else {
        return Config::default();
    };
    load_config_from(&data_dir.join(CONFIG_FILENAME))
}

pub fn load_config_from(path: &Path) -> Config {
    let Ok(s) = std::fs::read_to_string(path) else {
        return Config::default();
    };
    match toml::from_str(&s) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring invalid config");
            Config::default()
        }
    }
}

/// Save config to the app data directory.
pub fn save_config(config: &Config) -> Result<(), ConfigError> {
    let data_dir = app_data::app_data_dir().ok_or(ConfigError::NoDataDir)?;
    save_config_to(&data_dir.join(CONFIG_FILENAME), config)
}

pub fn save_config_to(path: &Path, config: &Config) -> Result<(), ConfigError> {
    let s = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;
    std::fs::write(path, s).map_err(ConfigError::Write)
}

/// Set and persist the library snapshot path. The parent directory must exist.
pub fn set_library_path(path: &Path) -> Result<(), ConfigError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let parent = parent.canonicalize().map_err(ConfigError::Canonicalize)?;
    if !parent.is_dir() {
        return Err(ConfigError::NotADirectory(parent));
    }
    let file_name = path
        .file_name()
        .ok_or_else(|| ConfigError::NotAFile(path.to_path_buf()))?;
    let mut config = load_config();
    config.library_path = Some(parent.join(file_name).to_string_lossy().into_owned());
    save_config(&config)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not determine app data directory")]
    NoDataDir,
    #[error("failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("failed to write config: {0}")]
    Write(std::io::Error),
    #[error("failed to resolve path: {0}")]
    Canonicalize(std::io::Error),
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("not a file path: {0}")]
    NotAFile(PathBuf),
}
