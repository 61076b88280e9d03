//! Metadata of precompiled artifacts and system SDKs.
//!
//! Binary inspection goes through [`PrecompiledMetadataProviding`], so the
//! process-backed [`probe::ToolProbe`] can be swapped for a fake in tests.

pub mod framework;
pub mod library;
pub mod probe;
pub mod system;
pub mod xcframework;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::graph::{GraphDependency, Linking};
use crate::platform::arch::Architecture;

pub use framework::{FrameworkMetadata, FrameworkMetadataProvider};
pub use library::{LibraryMetadata, LibraryMetadataProvider};
pub use probe::ToolProbe;
pub use system::{SystemFrameworkMetadata, SystemFrameworkMetadataProvider};
pub use xcframework::{XcFrameworkMetadata, XcFrameworkMetadataProvider};

#[derive(Debug, Error)]
pub enum MetadataError {
  #[error("precompiled artifact not found at {0}")]
  NotFound(PathBuf),

  #[error("couldn't find architectures for binary at {0}")]
  ArchitecturesNotFound(PathBuf),

  #[error("failed to run {tool}: {source}")]
  ToolSpawn {
    tool: String,
    #[source]
    source: std::io::Error,
  },

  #[error("{tool} failed for {path}: {stderr}")]
  ToolFailed { tool: String, path: PathBuf, stderr: String },

  #[error("invalid xcframework at {path}: {reason}")]
  InvalidXcFramework { path: PathBuf, reason: String },

  #[error("unsupported precompiled artifact {0}")]
  Unsupported(PathBuf),

  #[error("unsupported SDK '{0}'")]
  UnsupportedSdk(String),

  #[error("I/O error at {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// Inspection of a single binary.
///
/// Implementations may spawn processes; callers decide whether to retry.
pub trait PrecompiledMetadataProviding: Send + Sync {
  /// Architecture slices contained in the binary.
  fn architectures(&self, binary: &Path) -> Result<BTreeSet<Architecture>, MetadataError>;

  /// How dependents link the binary.
  fn linking(&self, binary: &Path) -> Result<Linking, MetadataError>;

  /// Debug-symbol UUIDs, one per slice that carries one.
  fn uuids(&self, binary: &Path) -> Result<BTreeSet<String>, MetadataError>;
}

/// Resolution of a precompiled artifact path into a graph node.
pub trait PrecompiledLoading: Send + Sync {
  fn load(&self, path: &Path) -> Result<GraphDependency, MetadataError>;
}

/// Dispatches artifact paths to the provider matching their extension.
pub struct PrecompiledLoader<P> {
  frameworks: FrameworkMetadataProvider<P>,
  xcframeworks: XcFrameworkMetadataProvider<P>,
  libraries: LibraryMetadataProvider<P>,
}

impl<P: PrecompiledMetadataProviding + Clone> PrecompiledLoader<P> {
  pub fn new(probe: P) -> Self {
    Self {
      frameworks: FrameworkMetadataProvider::new(probe.clone()),
      xcframeworks: XcFrameworkMetadataProvider::new(probe.clone()),
      libraries: LibraryMetadataProvider::new(probe),
    }
  }
}

impl<P: PrecompiledMetadataProviding> PrecompiledLoading for PrecompiledLoader<P> {
  fn load(&self, path: &Path) -> Result<GraphDependency, MetadataError> {
    match path.extension().and_then(|ext| ext.to_str()) {
      Some("framework") => Ok(self.frameworks.load(path)?.into()),
      Some("xcframework") => Ok(self.xcframeworks.load(path)?.into()),
      Some("a") | Some("dylib") => Ok(self.libraries.load(path, None)?.into()),
      Some("bundle") => Ok(GraphDependency::Bundle {
        path: existing(path)?,
      }),
      Some("macro") => Ok(GraphDependency::Macro {
        path: existing(path)?,
      }),
      _ => Err(MetadataError::Unsupported(path.to_path_buf())),
    }
  }
}

/// Bundles and macros carry no binary metadata; they only have to exist.
fn existing(path: &Path) -> Result<PathBuf, MetadataError> {
  if path.exists() {
    Ok(path.to_path_buf())
  } else {
    Err(MetadataError::NotFound(path.to_path_buf()))
  }
}


#[cfg(test)]
mod tests {
  use super::fake::FakeProbe;
  use super::*;

  #[test]
  fn loader_dispatches_by_extension() {
    let temp = tempfile::tempdir().unwrap();
    let framework = temp.path().join("Core.framework");
    std::fs::create_dir_all(&framework).unwrap();
    std::fs::write(framework.join("Core"), b"binary").unwrap();
    let library = temp.path().join("libCore.a");
    std::fs::write(&library, b"archive").unwrap();

    let loader = PrecompiledLoader::new(FakeProbe::default());

    assert!(matches!(loader.load(&framework).unwrap(), GraphDependency::Framework { .. }));
    assert!(matches!(loader.load(&library).unwrap(), GraphDependency::Library { .. }));
    assert!(matches!(
      loader.load(&temp.path().join("Core.zip")),
      Err(MetadataError::Unsupported(_))
    ));
  }

  #[test]
  fn loader_reads_bundles_and_macros() {
    let temp = tempfile::tempdir().unwrap();
    let bundle = temp.path().join("Assets.bundle");
    std::fs::create_dir_all(&bundle).unwrap();
    std::fs::write(bundle.join("icon.png"), b"png").unwrap();
    let plugin = temp.path().join("Macros.macro");
    std::fs::write(&plugin, b"exe").unwrap();

    let loader = PrecompiledLoader::new(FakeProbe::default());

    assert_eq!(loader.load(&bundle).unwrap(), GraphDependency::Bundle { path: bundle.clone() });
    assert_eq!(loader.load(&plugin).unwrap(), GraphDependency::Macro { path: plugin.clone() });
    assert!(matches!(
      loader.load(&temp.path().join("Missing.bundle")),
      Err(MetadataError::NotFound(_))
    ));
  }
}
