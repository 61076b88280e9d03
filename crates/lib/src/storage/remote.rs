//! HTTP cache service backend.
//!
//! `HEAD|GET|PUT {endpoint}/api/cache/{fingerprint}?name={name}` with a bearer
//! token. Artifacts travel as a gzip-compressed tar; fetched archives are
//! unpacked into the local cache so the next lookup hits locally.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use tracing::{debug, info};

use super::{CacheItem, CacheStoring, LocalStorage, StorageError};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct RemoteStorage {
  endpoint: String,
  token: Option<String>,
  client: Client,
  local: LocalStorage,
}

impl RemoteStorage {
  /// `local` is where fetched artifacts are unpacked.
  pub fn new(endpoint: &str, token: Option<String>, local: LocalStorage) -> Result<Self, StorageError> {
    Self::with_timeout(endpoint, token, local, DEFAULT_TIMEOUT)
  }

  pub fn with_timeout(
    endpoint: &str,
    token: Option<String>,
    local: LocalStorage,
    timeout: Duration,
  ) -> Result<Self, StorageError> {
    let client = Client::builder().timeout(timeout).build().map_err(|err| StorageError::Http {
      url: endpoint.to_string(),
      message: err.to_string(),
    })?;
    Ok(Self {
      endpoint: endpoint.trim_end_matches('/').to_string(),
      token,
      client,
      local,
    })
  }

  pub fn endpoint(&self) -> &str {
    &self.endpoint
  }

  fn url(&self, item: &CacheItem) -> String {
    format!("{}/api/cache/{}", self.endpoint, item.hash)
  }

  fn request(&self, method: Method, item: &CacheItem) -> RequestBuilder {
    let request = self
      .client
      .request(method, self.url(item))
      .query(&[("name", item.name.as_str())]);
    match &self.token {
      Some(token) => request.bearer_auth(token),
      None => request,
    }
  }

  fn http_error(&self, item: &CacheItem, err: reqwest::Error) -> StorageError {
    StorageError::Http {
      url: self.url(item),
      message: err.to_string(),
    }
  }
}

impl CacheStoring for RemoteStorage {
  fn name(&self) -> &str {
    "remote"
  }

  async fn exists(&self, item: &CacheItem) -> Result<bool, StorageError> {
    let response = self
      .request(Method::HEAD, item)
      .send()
      .await
      .map_err(|err| self.http_error(item, err))?;
    match response.status() {
      status if status.is_success() => Ok(true),
      StatusCode::NOT_FOUND => Ok(false),
      status => Err(StorageError::Status {
        url: self.url(item),
        status: status.as_u16(),
      }),
    }
  }

  async fn fetch(&self, item: &CacheItem) -> Result<Vec<PathBuf>, StorageError> {
    let response = self
      .request(Method::GET, item)
      .send()
      .await
      .map_err(|err| self.http_error(item, err))?;
    match response.status() {
      status if status.is_success() => {}
      StatusCode::NOT_FOUND => return Err(item.not_found()),
      status => {
        return Err(StorageError::Status {
          url: self.url(item),
          status: status.as_u16(),
        });
      }
    }
    let bytes = response.bytes().await.map_err(|err| self.http_error(item, err))?;
    debug!(name = %item.name, hash = %item.hash, size = bytes.len(), "downloaded archive");

    let (local, owned) = (self.local.clone(), item.clone());
    let paths = tokio::task::spawn_blocking(move || -> Result<Vec<PathBuf>, StorageError> {
      let staging = local.staging_dir()?;
      unpack(&bytes, staging.path())?;
      local.install(&owned, staging.path())?;
      local.lookup(&owned)
    })
    .await??;

    if paths.is_empty() {
      return Err(StorageError::Archive(format!(
        "archive for {} contained no artifacts",
        item.name
      )));
    }
    info!(name = %item.name, hash = %item.hash, "fetched artifacts from remote cache");
    Ok(paths)
  }

  async fn store(&self, item: &CacheItem, paths: &[PathBuf]) -> Result<(), StorageError> {
    if paths.is_empty() {
      return Err(item.not_found());
    }
    let owned = paths.to_vec();
    let archive = tokio::task::spawn_blocking(move || pack(&owned)).await??;
    debug!(name = %item.name, hash = %item.hash, size = archive.len(), "uploading archive");

    let response = self
      .request(Method::PUT, item)
      .header(reqwest::header::CONTENT_TYPE, "application/gzip")
      .body(archive)
      .send()
      .await
      .map_err(|err| self.http_error(item, err))?;
    if !response.status().is_success() {
      return Err(StorageError::Status {
        url: self.url(item),
        status: response.status().as_u16(),
      });
    }
    info!(name = %item.name, hash = %item.hash, "stored artifacts remotely");
    Ok(())
  }
}

/// Archives each path under its file name.
pub(crate) fn pack(paths: &[PathBuf]) -> Result<Vec<u8>, StorageError> {
  let archive_err = |err: std::io::Error| StorageError::Archive(err.to_string());
  let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
  builder.follow_symlinks(false);

  for path in paths {
    let Some(file_name) = path.file_name() else {
      continue;
    };
    if path.is_dir() {
      builder.append_dir_all(file_name, path).map_err(archive_err)?;
    } else {
      builder.append_path_with_name(path, file_name).map_err(archive_err)?;
    }
  }

  let encoder = builder.into_inner().map_err(archive_err)?;
  encoder.finish().map_err(archive_err)
}

/// Unpacks a gzip-compressed tar. Entries escaping `dest` are skipped by `tar`.
pub(crate) fn unpack(bytes: &[u8], dest: &Path) -> Result<(), StorageError> {
  let mut decompressed = Vec::new();
  GzDecoder::new(bytes)
    .read_to_end(&mut decompressed)
    .map_err(|err| StorageError::Archive(format!("decompression failed: {err}")))?;
  tar::Archive::new(decompressed.as_slice())
    .unpack(dest)
    .map_err(|err| StorageError::Archive(err.to_string()))
}
