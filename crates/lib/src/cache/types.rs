//! Types for cache warming.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;
use thiserror::Error;

use super::builder::BuildError;
use crate::graph::{GraphError, TargetId};
use crate::hash::{ContentHash, HashError};
use crate::mapper::MapperError;
use crate::storage::StorageError;

/// Where a warming run is, or where it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
  #[default]
  Hashing,
  Diffing,
  Building,
  Storing,
  Done,
  Failed,
}

impl fmt::Display for Stage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let label = match self {
      Stage::Hashing => "hash",
      Stage::Diffing => "diff",
      Stage::Building => "build",
      Stage::Storing => "store",
      Stage::Done => "done",
      Stage::Failed => "failed",
    };
    f.write_str(label)
  }
}

/// Errors that end a warming run.
#[derive(Debug, Error)]
pub enum CacheError {
  #[error(transparent)]
  Graph(#[from] GraphError),

  #[error("hash stage failed: {0}")]
  Hash(#[from] HashError),

  #[error("build stage failed for {scheme} ({}): {source}", .targets.join(", "))]
  Build {
    scheme: String,
    targets: Vec<String>,
    #[source]
    source: BuildError,
  },

  #[error("{stage} stage failed for {target}: {source}")]
  Storage {
    stage: Stage,
    target: TargetId,
    #[source]
    source: StorageError,
  },

  #[error(transparent)]
  Mapper(#[from] MapperError),

  #[error("background task failed: {0}")]
  Task(String),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

impl CacheError {
  /// The stage the run was in when this error occurred.
  pub fn stage(&self) -> Stage {
    match self {
      CacheError::Graph(_) | CacheError::Hash(_) | CacheError::Mapper(_) => Stage::Hashing,
      CacheError::Build { .. } | CacheError::Io(_) => Stage::Building,
      CacheError::Storage { stage, .. } => *stage,
      CacheError::Task(_) => Stage::Failed,
    }
  }
}

/// Configuration, OS version and device the artifacts are built for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildProfile {
  pub configuration: String,
  pub os_version: Option<String>,
  pub device: Option<String>,
}

impl Default for BuildProfile {
  fn default() -> Self {
    Self {
      configuration: "Debug".to_string(),
      os_version: None,
      device: None,
    }
  }
}

/// What to warm.
#[derive(Debug, Clone, Default)]
pub struct CacheOptions {
  /// Restricts the run to these units and their dependencies. Empty means all.
  pub targets: BTreeSet<String>,
  /// Skip the named units themselves, still warming what they depend on.
  pub dependencies_only: bool,
  pub profile: BuildProfile,
}

/// Tuning for the fan-out stages.
#[derive(Debug, Clone)]
pub struct CacheConfig {
  /// Maximum concurrent existence checks and stores.
  pub parallelism: usize,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      parallelism: num_cpus(),
    }
  }
}

fn num_cpus() -> usize {
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}

/// Outcome of a warming run.
#[derive(Debug, Default)]
pub struct CacheReport {
  pub fingerprints: BTreeMap<TargetId, ContentHash>,
  /// Units that were already present in some backend.
  pub cached: BTreeSet<TargetId>,
  pub built: Vec<TargetId>,
  pub stored: BTreeSet<TargetId>,
  /// Units whose artifacts could not be stored anywhere, with the reason.
  pub store_failures: Vec<(TargetId, String)>,
  pub stage: Stage,
}

impl CacheReport {
  pub fn is_complete(&self) -> bool {
    self.stage == Stage::Done && self.store_failures.is_empty()
  }
}
