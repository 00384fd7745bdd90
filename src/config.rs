use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::CacheConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Root of the REST backend, e.g. https://painel.example.com/api
  pub base_url: String,
  /// Per-request transport timeout
  #[serde(default = "default_timeout_ms")]
  pub timeout_ms: u64,
  /// Where the user is sent after the backend rejects the credential
  #[serde(default = "default_login_path")]
  pub login_path: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheSettings {
  pub stale_time_ms: u64,
  pub gc_time_ms: u64,
  pub read_retry: u32,
  pub mutation_retry: u32,
  pub retry_delay_ms: u64,
}

impl Default for CacheSettings {
  fn default() -> Self {
    Self {
      stale_time_ms: 60_000,
      gc_time_ms: 300_000,
      read_retry: 1,
      mutation_retry: 0,
      retry_delay_ms: 1_000,
    }
  }
}

impl From<&CacheSettings> for CacheConfig {
  fn from(settings: &CacheSettings) -> Self {
    CacheConfig::default()
      .with_stale_time(Duration::from_millis(settings.stale_time_ms))
      .with_gc_time(Duration::from_millis(settings.gc_time_ms))
      .with_read_retry(settings.read_retry)
      .with_mutation_retry(settings.mutation_retry)
      .with_retry_delay(Duration::from_millis(settings.retry_delay_ms))
  }
}

fn default_timeout_ms() -> u64 {
  15_000
}

fn default_login_path() -> String {
  String::from("/login")
}

impl ApiConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_millis(self.timeout_ms)
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./painel.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/painel/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/painel/config.yaml\n\
                 See painel.example.yaml for the format."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("painel.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("painel").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))?;
    url::Url::parse(&config.api.base_url)
      .map_err(|e| eyre!("api.base_url '{}' is not a URL: {}", config.api.base_url, e))?;
    Ok(config)
  }

  pub fn cache_config(&self) -> CacheConfig {
    CacheConfig::from(&self.cache)
  }

  /// Get the session token from the environment.
  ///
  /// Checks PAINEL_TOKEN.
  pub fn get_token() -> Result<String> {
    std::env::var("PAINEL_TOKEN")
      .map_err(|_| eyre!("Session token not found. Pass it to `painel login` or set PAINEL_TOKEN."))
  }
}
