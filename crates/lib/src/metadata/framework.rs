use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::warn;

use super::{MetadataError, PrecompiledMetadataProviding};
use crate::graph::{GraphDependency, Linking};
use crate::platform::arch::Architecture;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameworkMetadata {
  pub path: PathBuf,
  pub binary_path: PathBuf,
  pub dsym_path: Option<PathBuf>,
  pub bcsymbolmap_paths: Vec<PathBuf>,
  pub linking: Linking,
  pub architectures: BTreeSet<Architecture>,
}

impl From<FrameworkMetadata> for GraphDependency {
  fn from(metadata: FrameworkMetadata) -> Self {
    GraphDependency::Framework {
      path: metadata.path,
      binary_path: metadata.binary_path,
      dsym_path: metadata.dsym_path,
      bcsymbolmap_paths: metadata.bcsymbolmap_paths,
      linking: metadata.linking,
      architectures: metadata.architectures,
    }
  }
}

/// Reads `X.framework` bundles.
pub struct FrameworkMetadataProvider<P> {
  probe: P,
}

impl<P: PrecompiledMetadataProviding> FrameworkMetadataProvider<P> {
  pub fn new(probe: P) -> Self {
    Self { probe }
  }

  pub fn load(&self, path: &Path) -> Result<FrameworkMetadata, MetadataError> {
    if !path.exists() {
      return Err(MetadataError::NotFound(path.to_path_buf()));
    }
    let binary_path = binary_path(path).ok_or_else(|| MetadataError::Unsupported(path.to_path_buf()))?;
    let architectures = self.probe.architectures(&binary_path)?;
    let linking = self.probe.linking(&binary_path)?;

    Ok(FrameworkMetadata {
      path: path.to_path_buf(),
      dsym_path: dsym_path(path),
      bcsymbolmap_paths: self.bcsymbolmap_paths(path, &binary_path),
      binary_path,
      linking,
      architectures,
    })
  }

  /// Symbol maps are optional: a failed UUID probe only drops them.
  fn bcsymbolmap_paths(&self, path: &Path, binary_path: &Path) -> Vec<PathBuf> {
    let uuids = match self.probe.uuids(binary_path) {
      Ok(uuids) => uuids,
      Err(err) => {
        warn!(path = %binary_path.display(), error = %err, "failed to read binary UUIDs");
        return Vec::new();
      }
    };
    let Some(parent) = path.parent() else {
      return Vec::new();
    };
    uuids
      .iter()
      .map(|uuid| parent.join(format!("{uuid}.bcsymbolmap")))
      .filter(|candidate| candidate.exists())
      .collect()
  }
}

/// `X.framework/X`
pub fn binary_path(framework: &Path) -> Option<PathBuf> {
  let name = framework.file_stem()?;
  Some(framework.join(name))
}

/// `X.framework.dSYM` next to the framework, if present.
fn dsym_path(framework: &Path) -> Option<PathBuf> {
  let file_name = framework.file_name()?.to_str()?;
  let dsym = framework.with_file_name(format!("{file_name}.dSYM"));
  dsym.exists().then_some(dsym)
}
