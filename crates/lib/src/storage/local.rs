//! On-disk cache: one directory per fingerprint under a root.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{CacheItem, CacheStoring, StorageError, artifact_globs};

#[derive(Debug, Clone)]
pub struct LocalStorage {
  root: PathBuf,
}

impl LocalStorage {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn entry_dir(&self, item: &CacheItem) -> PathBuf {
    self.root.join(item.hash.as_str())
  }

  /// Artifacts present for `item`; empty when the entry is missing or holds no match.
  pub fn lookup(&self, item: &CacheItem) -> Result<Vec<PathBuf>, StorageError> {
    find_artifacts(&self.entry_dir(item), &item.name)
  }

  /// Moves a fully populated directory into place as the entry for `item`.
  ///
  /// If another writer already installed the entry, `staged` is left for the caller to drop.
  pub(crate) fn install(&self, item: &CacheItem, staged: &Path) -> Result<(), StorageError> {
    let entry = self.entry_dir(item);
    if !find_artifacts(&entry, &item.name)?.is_empty() {
      return Ok(());
    }
    if entry.exists() {
      // A directory without matching artifacts counts as a miss; replace it.
      fs::remove_dir_all(&entry).map_err(|source| StorageError::Io {
        path: entry.clone(),
        source,
      })?;
    }
    match fs::rename(staged, &entry) {
      Ok(()) => Ok(()),
      Err(_) if !find_artifacts(&entry, &item.name)?.is_empty() => Ok(()),
      Err(source) => Err(StorageError::Io { path: entry, source }),
    }
  }

  /// A fresh staging directory on the same filesystem as the entries.
  pub(crate) fn staging_dir(&self) -> Result<tempfile::TempDir, StorageError> {
    let io_err = |source| StorageError::Io {
      path: self.root.clone(),
      source,
    };
    fs::create_dir_all(&self.root).map_err(io_err)?;
    tempfile::Builder::new()
      .prefix(".staging-")
      .tempdir_in(&self.root)
      .map_err(io_err)
  }

  fn store_sync(&self, item: &CacheItem, paths: &[PathBuf]) -> Result<(), StorageError> {
    if paths.is_empty() {
      return Err(item.not_found());
    }
    if !self.lookup(item)?.is_empty() {
      debug!(name = %item.name, hash = %item.hash, "entry already stored locally");
      return Ok(());
    }
    let staging = self.staging_dir()?;
    for path in paths {
      let Some(file_name) = path.file_name() else {
        continue;
      };
      copy_recursively(path, &staging.path().join(file_name))?;
    }
    if find_artifacts(staging.path(), &item.name)?.is_empty() {
      return Err(item.not_found());
    }
    self.install(item, staging.path())?;
    info!(name = %item.name, hash = %item.hash, "stored artifacts locally");
    Ok(())
  }
}

impl CacheStoring for LocalStorage {
  fn name(&self) -> &str {
    "local"
  }

  async fn exists(&self, item: &CacheItem) -> Result<bool, StorageError> {
    let (storage, item) = (self.clone(), item.clone());
    let found = tokio::task::spawn_blocking(move || storage.lookup(&item)).await??;
    Ok(!found.is_empty())
  }

  async fn fetch(&self, item: &CacheItem) -> Result<Vec<PathBuf>, StorageError> {
    let (storage, owned) = (self.clone(), item.clone());
    let found = tokio::task::spawn_blocking(move || storage.lookup(&owned)).await??;
    if found.is_empty() {
      return Err(item.not_found());
    }
    Ok(found)
  }

  async fn store(&self, item: &CacheItem, paths: &[PathBuf]) -> Result<(), StorageError> {
    let (storage, item, paths) = (self.clone(), item.clone(), paths.to_vec());
    tokio::task::spawn_blocking(move || storage.store_sync(&item, &paths)).await?
  }
}

/// Entries of `entry` that are artifacts of `name`, sorted. A missing directory has none.
pub fn find_artifacts(entry: &Path, name: &str) -> Result<Vec<PathBuf>, StorageError> {
  if !entry.is_dir() {
    return Ok(Vec::new());
  }
  let globs = artifact_globs(name)?;
  let io_err = |source| StorageError::Io {
    path: entry.to_path_buf(),
    source,
  };
  let mut found = Vec::new();
  for child in fs::read_dir(entry).map_err(io_err)? {
    let child = child.map_err(io_err)?;
    if globs.is_match(child.file_name()) {
      found.push(child.path());
    }
  }
  found.sort();
  Ok(found)
}

/// Copies a file or directory tree, recreating symlinks rather than following them.
pub(crate) fn copy_recursively(from: &Path, to: &Path) -> Result<(), StorageError> {
  let io_err = |path: &Path| {
    let path = path.to_path_buf();
    move |source| StorageError::Io { path, source }
  };
  let metadata = fs::symlink_metadata(from).map_err(io_err(from))?;

  if metadata.file_type().is_symlink() {
    let target = fs::read_link(from).map_err(io_err(from))?;
    symlink(&target, to).map_err(io_err(to))?;
  } else if metadata.is_dir() {
    fs::create_dir_all(to).map_err(io_err(to))?;
    for entry in fs::read_dir(from).map_err(io_err(from))? {
      let entry = entry.map_err(io_err(from))?;
      copy_recursively(&entry.path(), &to.join(entry.file_name()))?;
    }
  } else {
    fs::copy(from, to).map_err(io_err(from))?;
  }
  Ok(())
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
  std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
  std::os::windows::fs::symlink_file(target, link)
}
