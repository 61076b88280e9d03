//! Content hashing of files, folders and strings.
//!
//! Only byte content participates. Timestamps, permissions and empty
//! directories are ignored, so a fresh checkout hashes like a warm one.

use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use super::HashError;

/// A full 64-character SHA-256 hex digest.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(pub String);

impl ContentHash {
  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl std::fmt::Display for ContentHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Hashes filesystem inputs, remembering every path it has seen.
///
/// One instance is shared by all units of a run; a file referenced by several
/// units is read once.
#[derive(Debug, Default)]
pub struct ContentHasher {
  memo: Mutex<HashMap<PathBuf, ContentHash>>,
}

impl ContentHasher {
  pub fn new() -> Self {
    Self::default()
  }

  /// Hash of a file's bytes, or of a folder's files (see [`hash_folder`]).
  pub fn hash_path(&self, path: &Path) -> Result<ContentHash, HashError> {
    if let Some(hash) = self.memo.lock().ok().and_then(|memo| memo.get(path).cloned()) {
      return Ok(hash);
    }
    let metadata = fs::metadata(path).map_err(|source| HashError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    let hash = if metadata.is_dir() { hash_folder(path)? } else { hash_file(path)? };
    if let Ok(mut memo) = self.memo.lock() {
      memo.insert(path.to_path_buf(), hash.clone());
    }
    Ok(hash)
  }

  pub fn memoized(&self) -> usize {
    self.memo.lock().map(|memo| memo.len()).unwrap_or(0)
  }
}

/// Hash of a folder's files: relative path plus content, in sorted order.
///
/// Symlinks are followed. Directories contribute nothing on their own.
pub fn hash_folder(path: &Path) -> Result<ContentHash, HashError> {
  let mut entries: Vec<(String, ContentHash)> = Vec::new();

  for entry in WalkDir::new(path).follow_links(true).sort_by_file_name() {
    let entry = entry.map_err(|err| HashError::Walk {
      path: path.to_path_buf(),
      message: err.to_string(),
    })?;
    if !entry.file_type().is_file() {
      continue;
    }
    let relative = entry
      .path()
      .strip_prefix(path)
      .unwrap_or(entry.path())
      .to_string_lossy()
      .replace('\\', "/");
    entries.push((relative, hash_file(entry.path())?));
  }

  entries.sort();

  let mut hasher = Sha256::new();
  for (relative, hash) in entries {
    hasher.update(relative.as_bytes());
    hasher.update(b":");
    hasher.update(hash.0.as_bytes());
    hasher.update(b"\n");
  }
  Ok(ContentHash(hex::encode(hasher.finalize())))
}

pub fn hash_file(path: &Path) -> Result<ContentHash, HashError> {
  let io_err = |source| HashError::Io {
    path: path.to_path_buf(),
    source,
  };
  let mut file = fs::File::open(path).map_err(io_err)?;

  let mut hasher = Sha256::new();
  let mut buffer = [0u8; 8192];
  loop {
    let bytes_read = file.read(&mut buffer).map_err(io_err)?;
    if bytes_read == 0 {
      break;
    }
    hasher.update(&buffer[..bytes_read]);
  }

  Ok(ContentHash(hex::encode(hasher.finalize())))
}

pub fn hash_bytes(data: &[u8]) -> ContentHash {
  let mut hasher = Sha256::new();
  hasher.update(data);
  ContentHash(hex::encode(hasher.finalize()))
}

/// Order-independent hash of a collection of strings.
pub fn hash_unordered<I, S>(items: I) -> ContentHash
where
  I: IntoIterator<Item = S>,
  S: AsRef<str>,
{
  let mut items: Vec<String> = items.into_iter().map(|item| item.as_ref().to_string()).collect();
  items.sort();
  let mut hasher = Sha256::new();
  for item in items {
    hasher.update(item.as_bytes());
    hasher.update(b"\n");
  }
  ContentHash(hex::encode(hasher.finalize()))
}
