use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::enhance::RetryPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing HOME environment variable")]
    MissingHomeDirectory,
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

const APP_DIR: &str = "vibecode";
const APP_CONFIG_FILE: &str = "config.json";
const SESSION_FILE: &str = "session.json";
const DEFAULT_APP_ID: &str = "default-app-id";
const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.5-flash-image-preview";

const ENV_API_KEY: &str = "VIBECODE_API_KEY";
const ENV_APP_ID: &str = "VIBECODE_APP_ID";
const ENV_AUTH_TOKEN: &str = "VIBECODE_AUTH_TOKEN";

/// Application settings from `config.json`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default)]
    pub generation: GenerationSettings,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub notify: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerationSettings {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetrySettings {
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub base_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityConfig {
    pub session_file: PathBuf,
    pub initial_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub app_id: String,
    pub data_dir: PathBuf,
}

#[derive(Clone, PartialEq, Eq)]
pub struct GenerationConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key: String,
    pub timeout: Option<Duration>,
}

impl std::fmt::Debug for GenerationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationConfig")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Environment values that override the file. Kept apart so tests can
/// supply them without touching the process environment.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub api_key: Option<String>,
    pub app_id: Option<String>,
    pub auth_token: Option<String>,
    pub xdg_data_home: Option<PathBuf>,
    pub home: Option<PathBuf>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        let non_empty = |key: &str| std::env::var(key).ok().filter(|value| !value.trim().is_empty());
        Self {
            api_key: non_empty(ENV_API_KEY),
            app_id: non_empty(ENV_APP_ID),
            auth_token: non_empty(ENV_AUTH_TOKEN),
            xdg_data_home: std::env::var_os("XDG_DATA_HOME").map(PathBuf::from),
            home: std::env::var_os("HOME").map(PathBuf::from),
        }
    }
}

impl AppConfig {
    pub fn app_id(&self, env: &EnvOverrides) -> String {
        env.app_id
            .clone()
            .or_else(|| self.app_id.clone())
            .unwrap_or_else(|| DEFAULT_APP_ID.to_string())
    }

    pub fn data_dir(&self, env: &EnvOverrides) -> ConfigResult<PathBuf> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        let mut path = data_root(env.xdg_data_home.as_deref(), env.home.as_deref())?;
        path.push(APP_DIR);
        Ok(path)
    }

    pub fn identity_config(&self, env: &EnvOverrides) -> ConfigResult<IdentityConfig> {
        Ok(IdentityConfig {
            session_file: self.data_dir(env)?.join(SESSION_FILE),
            initial_token: env.auth_token.clone(),
        })
    }

    pub fn store_config(&self, env: &EnvOverrides) -> ConfigResult<StoreConfig> {
        Ok(StoreConfig {
            app_id: self.app_id(env),
            data_dir: self.data_dir(env)?,
        })
    }

    pub fn generation_config(&self, env: &EnvOverrides) -> GenerationConfig {
        let settings = &self.generation;
        GenerationConfig {
            endpoint: settings
                .endpoint
                .clone()
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            model: settings
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            api_key: env
                .api_key
                .clone()
                .or_else(|| settings.api_key.clone())
                .unwrap_or_default(),
            timeout: settings.timeout_secs.map(Duration::from_secs),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let defaults = RetryPolicy::default();
        RetryPolicy::new(
            self.retry.max_retries.unwrap_or(defaults.max_retries()),
            self.retry
                .base_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.base_delay()),
        )
    }
}

pub fn load_app_config() -> AppConfig {
    let (xdg_config_home, home) = config_env_dirs();
    load_app_config_with(xdg_config_home.as_deref(), home.as_deref())
}

fn load_app_config_with(xdg_config_home: Option<&Path>, home: Option<&Path>) -> AppConfig {
    let path = match app_config_path(APP_DIR, APP_CONFIG_FILE, xdg_config_home, home) {
        Ok(p) => p,
        Err(_) => return AppConfig::default(),
    };
    if !path.exists() {
        return AppConfig::default();
    }
    match std::fs::read_to_string(&path) {
        Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|err| {
            tracing::warn!(?err, ?path, "failed to parse config.json; using defaults");
            AppConfig::default()
        }),
        Err(err) => {
            tracing::warn!(?err, ?path, "failed to read config.json; using defaults");
            AppConfig::default()
        }
    }
}

pub(crate) fn config_env_dirs() -> (Option<PathBuf>, Option<PathBuf>) {
    (
        std::env::var_os("XDG_CONFIG_HOME").map(PathBuf::from),
        std::env::var_os("HOME").map(PathBuf::from),
    )
}

pub(crate) fn app_config_path(
    app_dir: &str,
    file_name: &str,
    xdg_config_home: Option<&Path>,
    home: Option<&Path>,
) -> ConfigResult<PathBuf> {
    let mut path = xdg_root(xdg_config_home, home, ".config")?;
    path.push(app_dir);
    path.push(file_name);
    Ok(path)
}

fn data_root(xdg_data_home: Option<&Path>, home: Option<&Path>) -> ConfigResult<PathBuf> {
    xdg_root(xdg_data_home, home, ".local/share")
}

fn xdg_root(xdg: Option<&Path>, home: Option<&Path>, home_fallback: &str) -> ConfigResult<PathBuf> {
    if let Some(xdg) = xdg.filter(|path| !path.as_os_str().is_empty()) {
        return Ok(xdg.to_path_buf());
    }

    let home = home.ok_or(ConfigError::MissingHomeDirectory)?;
    Ok(home.join(home_fallback))
}
