use std::fs;
use std::path::{Path, PathBuf};

use super::{MetadataError, PrecompiledMetadataProviding};
use crate::graph::{GraphDependency, Linking, XcFrameworkLibrary};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XcFrameworkMetadata {
  pub path: PathBuf,
  pub libraries: Vec<XcFrameworkLibrary>,
  pub linking: Linking,
}

impl From<XcFrameworkMetadata> for GraphDependency {
  fn from(metadata: XcFrameworkMetadata) -> Self {
    GraphDependency::XcFramework {
      path: metadata.path,
      libraries: metadata.libraries,
      linking: metadata.linking,
      dependencies: Vec::new(),
    }
  }
}

/// Reads `.xcframework` bundles.
///
/// Each subdirectory is a platform slice (`ios-arm64`, `ios-arm64_x86_64-simulator`)
/// holding a `.framework` or a library. Linking is taken from the first slice.
pub struct XcFrameworkMetadataProvider<P> {
  probe: P,
}

impl<P: PrecompiledMetadataProviding> XcFrameworkMetadataProvider<P> {
  pub fn new(probe: P) -> Self {
    Self { probe }
  }

  pub fn load(&self, path: &Path) -> Result<XcFrameworkMetadata, MetadataError> {
    if !path.exists() {
      return Err(MetadataError::NotFound(path.to_path_buf()));
    }
    let libraries = slices(path)?;
    let Some(first) = libraries.first() else {
      return Err(MetadataError::InvalidXcFramework {
        path: path.to_path_buf(),
        reason: "no platform slices".to_string(),
      });
    };

    let artifact = path.join(&first.path);
    let binary = if artifact.extension().is_some_and(|ext| ext == "framework") {
      super::framework::binary_path(&artifact).ok_or_else(|| MetadataError::Unsupported(artifact.clone()))?
    } else {
      artifact
    };
    let linking = self.probe.linking(&binary)?;

    Ok(XcFrameworkMetadata {
      path: path.to_path_buf(),
      libraries,
      linking,
    })
  }
}

fn slices(path: &Path) -> Result<Vec<XcFrameworkLibrary>, MetadataError> {
  let io_err = |source| MetadataError::Io {
    path: path.to_path_buf(),
    source,
  };
  let mut libraries = Vec::new();
  for entry in fs::read_dir(path).map_err(io_err)? {
    let entry = entry.map_err(io_err)?;
    if !entry.file_type().map_err(io_err)?.is_dir() {
      continue;
    }
    let identifier = entry.file_name().to_string_lossy().into_owned();
    let mut artifacts: Vec<PathBuf> = fs::read_dir(entry.path())
      .map_err(io_err)?
      .filter_map(Result::ok)
      .map(|child| child.path())
      .filter(|child| {
        child
          .extension()
          .and_then(|ext| ext.to_str())
          .is_some_and(|ext| matches!(ext, "framework" | "a" | "dylib"))
      })
      .collect();
    artifacts.sort();
    if let Some(artifact) = artifacts.into_iter().next() {
      let relative = artifact.strip_prefix(path).map(Path::to_path_buf).unwrap_or(artifact);
      libraries.push(XcFrameworkLibrary {
        identifier,
        path: relative,
      });
    }
  }
  libraries.sort();
  Ok(libraries)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::metadata::fake::FakeProbe;

  #[test]
  fn reads_slices() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path().join("Core.xcframework");
    let device = root.join("ios-arm64").join("Core.framework");
    let simulator = root.join("ios-arm64_x86_64-simulator").join("Core.framework");
    fs::create_dir_all(&device).unwrap();
    fs::create_dir_all(&simulator).unwrap();
    fs::write(device.join("Core"), b"bin").unwrap();
    fs::write(root.join("Info.plist"), b"<plist/>").unwrap();

    let mut probe = FakeProbe::default();
    probe.linking.insert(device.join("Core"), Linking::Static);

    let metadata = XcFrameworkMetadataProvider::new(probe).load(&root).unwrap();
    assert_eq!(metadata.libraries.len(), 2);
    assert_eq!(metadata.libraries[0].identifier, "ios-arm64");
    assert_eq!(metadata.libraries[0].path, PathBuf::from("ios-arm64/Core.framework"));
    assert_eq!(metadata.linking, Linking::Static);
  }

  #[test]
  fn empty_bundle_is_invalid() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path().join("Core.xcframework");
    fs::create_dir_all(&root).unwrap();

    let err = XcFrameworkMetadataProvider::new(FakeProbe::default())
      .load(&root)
      .unwrap_err();
    assert!(matches!(err, MetadataError::InvalidXcFramework { .. }));
  }
}
