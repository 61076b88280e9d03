//! Cache storage backends and the ordered chain that combines them.
//!
//! Every backend answers the same three questions for a fingerprint: is an
//! entry present, where are its artifacts, and store these artifacts.

mod chain;
mod local;
mod remote;

use std::future::Future;
use std::path::PathBuf;

use globset::{Glob, GlobSet, GlobSetBuilder};
use thiserror::Error;

use crate::hash::ContentHash;

pub use chain::{CacheStorageChain, StoreOutcome};
pub use local::{LocalStorage, find_artifacts};
pub use remote::RemoteStorage;

#[derive(Debug, Error)]
pub enum StorageError {
  #[error("no cached artifact for {name} ({hash})")]
  NotFound { name: String, hash: ContentHash },

  #[error("I/O error at {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("request to {url} failed: {message}")]
  Http { url: String, message: String },

  #[error("{url} responded with HTTP {status}")]
  Status { url: String, status: u16 },

  #[error("archive error: {0}")]
  Archive(String),

  #[error("invalid artifact pattern: {0}")]
  Pattern(#[from] globset::Error),

  #[error("background task failed: {0}")]
  Join(#[from] tokio::task::JoinError),

  #[error("{backend} backend: {source}")]
  Backend {
    backend: String,
    #[source]
    source: Box<StorageError>,
  },

  #[error("every backend failed to store {name}: {}", .errors.join("; "))]
  AllBackendsFailed { name: String, errors: Vec<String> },

  #[error("no storage backends configured")]
  NoBackends,
}

/// What a cache entry is keyed by.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheItem {
  /// Product name; artifact files are matched against it.
  pub name: String,
  pub hash: ContentHash,
}

impl CacheItem {
  pub fn new(name: impl Into<String>, hash: ContentHash) -> Self {
    Self { name: name.into(), hash }
  }

  fn not_found(&self) -> StorageError {
    StorageError::NotFound {
      name: self.name.clone(),
      hash: self.hash.clone(),
    }
  }
}

/// A cache backend. Implementations must tolerate concurrent calls for
/// different fingerprints.
pub trait CacheStoring: Send + Sync {
  /// Short label used in logs and errors.
  fn name(&self) -> &str;

  fn exists(&self, item: &CacheItem) -> impl Future<Output = Result<bool, StorageError>> + Send;

  /// Local paths of the entry's artifacts.
  fn fetch(&self, item: &CacheItem) -> impl Future<Output = Result<Vec<PathBuf>, StorageError>> + Send;

  /// Stores artifacts under the item's fingerprint. Storing an existing entry succeeds.
  fn store(&self, item: &CacheItem, paths: &[PathBuf]) -> impl Future<Output = Result<(), StorageError>> + Send;
}

/// The backends a chain can hold.
pub enum CacheBackend {
  Local(LocalStorage),
  Remote(RemoteStorage),
}

impl CacheStoring for CacheBackend {
  fn name(&self) -> &str {
    match self {
      Self::Local(local) => local.name(),
      Self::Remote(remote) => remote.name(),
    }
  }

  async fn exists(&self, item: &CacheItem) -> Result<bool, StorageError> {
    match self {
      Self::Local(local) => local.exists(item).await,
      Self::Remote(remote) => remote.exists(item).await,
    }
  }

  async fn fetch(&self, item: &CacheItem) -> Result<Vec<PathBuf>, StorageError> {
    match self {
      Self::Local(local) => local.fetch(item).await,
      Self::Remote(remote) => remote.fetch(item).await,
    }
  }

  async fn store(&self, item: &CacheItem, paths: &[PathBuf]) -> Result<(), StorageError> {
    match self {
      Self::Local(local) => local.store(item, paths).await,
      Self::Remote(remote) => remote.store(item, paths).await,
    }
  }
}

/// File names that count as artifacts of `name`.
pub fn artifact_globs(name: &str) -> Result<GlobSet, StorageError> {
  let mut builder = GlobSetBuilder::new();
  builder.add(Glob::new(&format!("{name}.{{xcframework,framework,bundle,macro}}"))?);
  builder.add(Glob::new(&format!("lib{name}.a"))?);
  Ok(builder.build()?)
}
