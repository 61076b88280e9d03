//! Graph-to-graph transformations run before hashing and after fetching artifacts.
//!
//! A mapper never touches the filesystem. Anything it needs written is returned as a
//! [`SideEffect`] and executed by the caller through [`apply_side_effects`].

mod binaries;
mod focus;
mod prune;

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::graph::{Graph, GraphError};

pub use binaries::TargetsToBinariesGraphMapper;
pub use focus::FocusTargetsGraphMapper;
pub use prune::TreeShakePrunedTargetsGraphMapper;

#[derive(Debug, Error)]
pub enum MapperError {
  #[error(transparent)]
  Graph(#[from] GraphError),

  #[error("unknown targets: {}", .0.join(", "))]
  UnknownTargets(Vec<String>),

  #[error("failed to apply side effect on {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// Deferred filesystem change produced by a mapper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideEffect {
  File { path: PathBuf, contents: Vec<u8> },
  Directory { path: PathBuf },
  Delete { path: PathBuf },
}

pub trait GraphMapping {
  fn map(&self, graph: Graph) -> Result<(Graph, Vec<SideEffect>), MapperError>;
}

/// Threads a graph through mappers in order, collecting their side effects.
#[derive(Default)]
pub struct SequentialGraphMapper {
  mappers: Vec<Box<dyn GraphMapping + Send + Sync>>,
}

impl SequentialGraphMapper {
  pub fn new(mappers: Vec<Box<dyn GraphMapping + Send + Sync>>) -> Self {
    Self { mappers }
  }

  pub fn push(mut self, mapper: impl GraphMapping + Send + Sync + 'static) -> Self {
    self.mappers.push(Box::new(mapper));
    self
  }

  pub fn len(&self) -> usize {
    self.mappers.len()
  }

  pub fn is_empty(&self) -> bool {
    self.mappers.is_empty()
  }
}

impl GraphMapping for SequentialGraphMapper {
  fn map(&self, graph: Graph) -> Result<(Graph, Vec<SideEffect>), MapperError> {
    let mut graph = graph;
    let mut side_effects = Vec::new();
    for mapper in &self.mappers {
      let (mapped, effects) = mapper.map(graph)?;
      graph = mapped;
      side_effects.extend(effects);
    }
    Ok((graph, side_effects))
  }
}

/// Executes side effects in order. Deleting a missing path is not an error.
pub fn apply_side_effects(side_effects: &[SideEffect]) -> Result<(), MapperError> {
  for effect in side_effects {
    match effect {
      SideEffect::File { path, contents } => {
        if let Some(parent) = path.parent() {
          create_dir(parent)?;
        }
        debug!(path = %path.display(), bytes = contents.len(), "writing file");
        std::fs::write(path, contents).map_err(|source| io_error(path, source))?;
      }
      SideEffect::Directory { path } => create_dir(path)?,
      SideEffect::Delete { path } => delete(path)?,
    }
  }
  Ok(())
}

fn create_dir(path: &Path) -> Result<(), MapperError> {
  std::fs::create_dir_all(path).map_err(|source| io_error(path, source))
}

fn delete(path: &Path) -> Result<(), MapperError> {
  let metadata = match std::fs::symlink_metadata(path) {
    Ok(metadata) => metadata,
    Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
    Err(source) => return Err(io_error(path, source)),
  };
  debug!(path = %path.display(), "deleting");
  let result = if metadata.is_dir() {
    std::fs::remove_dir_all(path)
  } else {
    std::fs::remove_file(path)
  };
  result.map_err(|source| io_error(path, source))
}

fn io_error(path: &Path, source: std::io::Error) -> MapperError {
  MapperError::Io {
    path: path.to_path_buf(),
    source,
  }
}
