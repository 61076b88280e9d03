//! Run settings: an optional `bincache.toml` next to the workspace, then
//! environment overrides.
//!
//! ```toml
//! url = "https://cache.example.com"
//! cache_dir = ".cache/binaries"
//! parallelism = 8
//! timeout_secs = 120
//! ```
//!
//! `BINCACHE_URL`, `BINCACHE_TOKEN`, `BINCACHE_CACHE_DIR` and
//! `BINCACHE_PARALLELISM` take precedence over the file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::cache::CacheConfig;
use crate::consts::{CACHE_DIR_ENV, PARALLELISM_ENV, SETTINGS_FILE, TOKEN_ENV, URL_ENV};
use crate::platform::paths::binaries_cache_dir;
use crate::storage::{CacheBackend, CacheStorageChain, LocalStorage, RemoteStorage, StorageError};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Error)]
pub enum SettingsError {
  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("invalid settings file {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },

  #[error("invalid value '{value}' for {name}")]
  InvalidEnv { name: &'static str, value: String },

  #[error(transparent)]
  Storage(#[from] StorageError),
}

/// On-disk shape of `bincache.toml`.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct SettingsFile {
  url: Option<String>,
  token: Option<String>,
  cache_dir: Option<PathBuf>,
  parallelism: Option<usize>,
  timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settings {
  /// Remote cache endpoint. Without one only the local cache is used.
  pub url: Option<String>,
  #[serde(skip_serializing)]
  pub token: Option<String>,
  pub cache_dir: PathBuf,
  pub parallelism: usize,
  #[serde(with = "secs")]
  pub timeout: Duration,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      url: None,
      token: None,
      cache_dir: binaries_cache_dir(),
      parallelism: CacheConfig::default().parallelism,
      timeout: DEFAULT_TIMEOUT,
    }
  }
}

impl Settings {
  /// Loads settings for the workspace in `dir`.
  pub fn load(dir: &Path) -> Result<Self, SettingsError> {
    let path = dir.join(SETTINGS_FILE);
    let file = match fs::read_to_string(&path) {
      Ok(contents) => {
        debug!(path = %path.display(), "reading settings");
        toml::from_str(&contents).map_err(|source| SettingsError::Parse {
          path: path.clone(),
          source,
        })?
      }
      Err(err) if err.kind() == std::io::ErrorKind::NotFound => SettingsFile::default(),
      Err(source) => return Err(SettingsError::Read { path, source }),
    };

    let mut settings = Settings::default();
    settings.apply_file(file, dir);
    settings.apply_env()?;
    Ok(settings)
  }

  fn apply_file(&mut self, file: SettingsFile, dir: &Path) {
    if let Some(url) = file.url {
      self.url = Some(url);
    }
    if let Some(token) = file.token {
      self.token = Some(token);
    }
    if let Some(cache_dir) = file.cache_dir {
      self.cache_dir = if cache_dir.is_relative() {
        dir.join(cache_dir)
      } else {
        cache_dir
      };
    }
    if let Some(parallelism) = file.parallelism {
      self.parallelism = parallelism.max(1);
    }
    if let Some(secs) = file.timeout_secs {
      self.timeout = Duration::from_secs(secs);
    }
  }

  fn apply_env(&mut self) -> Result<(), SettingsError> {
    if let Some(url) = non_empty_var(URL_ENV) {
      self.url = Some(url);
    }
    if let Some(token) = non_empty_var(TOKEN_ENV) {
      self.token = Some(token);
    }
    if let Some(dir) = non_empty_var(CACHE_DIR_ENV) {
      self.cache_dir = PathBuf::from(dir);
    }
    if let Some(value) = non_empty_var(PARALLELISM_ENV) {
      self.parallelism = match value.parse::<usize>() {
        Ok(parallelism) if parallelism > 0 => parallelism,
        _ => {
          return Err(SettingsError::InvalidEnv {
            name: PARALLELISM_ENV,
            value,
          });
        }
      };
    }
    Ok(())
  }

  pub fn cache_config(&self) -> CacheConfig {
    CacheConfig {
      parallelism: self.parallelism,
    }
  }

  /// Local backend first, then the remote one when an endpoint is set.
  pub fn storage_chain(&self) -> Result<CacheStorageChain, SettingsError> {
    let local = LocalStorage::new(&self.cache_dir);
    let mut backends = vec![CacheBackend::Local(local.clone())];
    if let Some(url) = &self.url {
      let remote = RemoteStorage::with_timeout(url, self.token.clone(), local, self.timeout)?;
      backends.push(CacheBackend::Remote(remote));
    }
    Ok(CacheStorageChain::new(backends))
  }
}

fn non_empty_var(name: &str) -> Option<String> {
  std::env::var(name).ok().filter(|value| !value.is_empty())
}

mod secs {
  use std::time::Duration;

  use serde::Serializer;

  pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_secs())
  }
}
