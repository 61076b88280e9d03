use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use super::{MetadataError, PrecompiledMetadataProviding};
use crate::graph::{GraphDependency, Linking};
use crate::platform::arch::Architecture;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryMetadata {
  pub path: PathBuf,
  pub public_headers: Option<PathBuf>,
  pub linking: Linking,
  pub architectures: BTreeSet<Architecture>,
}

impl From<LibraryMetadata> for GraphDependency {
  fn from(metadata: LibraryMetadata) -> Self {
    GraphDependency::Library {
      path: metadata.path,
      public_headers: metadata.public_headers,
      linking: metadata.linking,
      architectures: metadata.architectures,
    }
  }
}

/// Reads plain `.a` / `.dylib` libraries.
pub struct LibraryMetadataProvider<P> {
  probe: P,
}

impl<P: PrecompiledMetadataProviding> LibraryMetadataProvider<P> {
  pub fn new(probe: P) -> Self {
    Self { probe }
  }

  pub fn load(&self, path: &Path, public_headers: Option<&Path>) -> Result<LibraryMetadata, MetadataError> {
    if !path.exists() {
      return Err(MetadataError::NotFound(path.to_path_buf()));
    }
    Ok(LibraryMetadata {
      path: path.to_path_buf(),
      public_headers: public_headers.map(Path::to_path_buf),
      linking: self.probe.linking(path)?,
      architectures: self.probe.architectures(path)?,
    })
  }
}
