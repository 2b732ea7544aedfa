use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::{ReadCache, DEFAULT_MAX_ENTRIES, DEFAULT_TTL};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub database: DatabaseConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub logging: LoggingConfig,
  #[serde(default)]
  pub search: SearchConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatabaseConfig {
  /// SQLite file (defaults to $XDG_DATA_HOME/jobcat/jobs.db)
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Entry lifetime after write, in seconds
  #[serde(default = "default_ttl_secs")]
  pub ttl_secs: u64,
  /// Entry bound across all namespaces
  #[serde(default = "default_max_entries")]
  pub max_entries: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      ttl_secs: default_ttl_secs(),
      max_entries: default_max_entries(),
    }
  }
}

impl CacheConfig {
  pub fn build(&self) -> ReadCache {
    if self.enabled {
      ReadCache::new(Duration::from_secs(self.ttl_secs), self.max_entries)
    } else {
      ReadCache::disabled()
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
  /// Default filter when RUST_LOG is unset
  #[serde(default = "default_log_level")]
  pub level: String,
  /// Write logs to a file in this directory instead of stderr
  pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: default_log_level(),
      directory: None,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
  #[serde(default = "default_page_size")]
  pub default_page_size: u32,
  #[serde(default = "default_max_page_size")]
  pub max_page_size: u32,
}

impl Default for SearchConfig {
  fn default() -> Self {
    Self {
      default_page_size: default_page_size(),
      max_page_size: default_max_page_size(),
    }
  }
}

impl SearchConfig {
  /// Clamp a requested page size into `1..=max_page_size`.
  pub fn page_size(&self, requested: Option<u32>) -> u32 {
    requested
      .unwrap_or(self.default_page_size)
      .clamp(1, self.max_page_size.max(1))
  }
}

fn default_true() -> bool {
  true
}

fn default_ttl_secs() -> u64 {
  DEFAULT_TTL.as_secs()
}

fn default_max_entries() -> u64 {
  DEFAULT_MAX_ENTRIES
}

fn default_log_level() -> String {
  "info".to_string()
}

fn default_page_size() -> u32 {
  10
}

fn default_max_page_size() -> u32 {
  100
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./jobcat.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/jobcat/config.yaml
  ///
  /// Without a config file every setting takes its default.
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
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("jobcat.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("jobcat").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// Resolve the database path.
  ///
  /// Checks JOBCAT_DATABASE first, then the config file, then the data directory.
  pub fn database_path(&self) -> Result<PathBuf> {
    if let Ok(path) = std::env::var("JOBCAT_DATABASE") {
      return Ok(PathBuf::from(path));
    }
    if let Some(path) = &self.database.path {
      return Ok(path.clone());
    }

    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("jobcat").join("jobs.db"))
  }
}
