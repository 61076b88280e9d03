//! Content fingerprints of build units.

mod content;
mod graph;
mod target;

use std::path::PathBuf;

use thiserror::Error;

use crate::graph::{GraphError, TargetId};

pub use content::{ContentHash, ContentHasher, hash_bytes, hash_file, hash_folder, hash_unordered};
pub use graph::GraphContentHasher;
pub use target::{HashContext, TargetContentHash, TargetContentHasher};

#[derive(Debug, Error)]
pub enum HashError {
  #[error("failed to read {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to walk {path}: {message}")]
  Walk { path: PathBuf, message: String },

  #[error("{target} was hashed before its dependency {dependency}")]
  MissingDependencyHash { target: TargetId, dependency: TargetId },

  #[error("failed to hash {target}: {source}")]
  Target {
    target: TargetId,
    #[source]
    source: Box<HashError>,
  },

  #[error(transparent)]
  Graph(#[from] GraphError),
}
