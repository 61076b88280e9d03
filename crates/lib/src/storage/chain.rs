use std::path::PathBuf;

use tracing::{debug, warn};

use super::{CacheBackend, CacheItem, CacheStoring, StorageError};

/// Backends in priority order, fastest first.
///
/// Lookups fall through on misses and errors; stores fan out to every backend.
pub struct CacheStorageChain<S = CacheBackend> {
  backends: Vec<S>,
}

/// Result of fanning a store out to every backend.
#[derive(Debug, Default)]
pub struct StoreOutcome {
  pub stored: Vec<String>,
  pub failures: Vec<(String, StorageError)>,
}

impl<S: CacheStoring> CacheStorageChain<S> {
  pub fn new(backends: Vec<S>) -> Self {
    Self { backends }
  }

  pub fn backends(&self) -> &[S] {
    &self.backends
  }

  /// Attempts every backend, whatever the others did.
  pub async fn store_all(&self, item: &CacheItem, paths: &[PathBuf]) -> StoreOutcome {
    let mut outcome = StoreOutcome::default();
    for backend in &self.backends {
      match backend.store(item, paths).await {
        Ok(()) => outcome.stored.push(backend.name().to_string()),
        Err(err) => {
          warn!(backend = backend.name(), name = %item.name, hash = %item.hash, error = %err, "store failed");
          outcome.failures.push((backend.name().to_string(), err));
        }
      }
    }
    outcome
  }
}

impl<S: CacheStoring> CacheStoring for CacheStorageChain<S> {
  fn name(&self) -> &str {
    "chain"
  }

  /// True on the first backend reporting a hit; errors count as misses.
  async fn exists(&self, item: &CacheItem) -> Result<bool, StorageError> {
    for backend in &self.backends {
      match backend.exists(item).await {
        Ok(true) => {
          debug!(backend = backend.name(), name = %item.name, hash = %item.hash, "cache hit");
          return Ok(true);
        }
        Ok(false) => {}
        Err(err) => {
          warn!(backend = backend.name(), name = %item.name, error = %err, "existence check failed, trying next backend");
        }
      }
    }
    Ok(false)
  }

  /// First successful fetch wins; otherwise the last error, wrapped with its backend.
  async fn fetch(&self, item: &CacheItem) -> Result<Vec<PathBuf>, StorageError> {
    let mut last_error = None;
    for backend in &self.backends {
      match backend.fetch(item).await {
        Ok(paths) => return Ok(paths),
        Err(err) => {
          debug!(backend = backend.name(), name = %item.name, error = %err, "fetch failed, trying next backend");
          last_error = Some(StorageError::Backend {
            backend: backend.name().to_string(),
            source: Box::new(err),
          });
        }
      }
    }
    Err(last_error.unwrap_or_else(|| item.not_found()))
  }

  /// Succeeds if at least one backend stored the artifacts.
  async fn store(&self, item: &CacheItem, paths: &[PathBuf]) -> Result<(), StorageError> {
    if self.backends.is_empty() {
      return Err(StorageError::NoBackends);
    }
    let outcome = self.store_all(item, paths).await;
    if outcome.stored.is_empty() {
      return Err(StorageError::AllBackendsFailed {
        name: item.name.clone(),
        errors: outcome
          .failures
          .iter()
          .map(|(backend, err)| format!("{backend}: {err}"))
          .collect(),
      });
    }
    Ok(())
  }
}
