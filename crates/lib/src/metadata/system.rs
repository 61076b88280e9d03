use std::path::{Path, PathBuf};

use super::MetadataError;
use crate::graph::{GraphDependency, SdkSource, SdkStatus};
use crate::platform::Platform;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemFrameworkMetadata {
  pub name: String,
  pub path: PathBuf,
  pub status: SdkStatus,
  pub source: SdkSource,
}

impl From<SystemFrameworkMetadata> for GraphDependency {
  fn from(metadata: SystemFrameworkMetadata) -> Self {
    GraphDependency::Sdk {
      name: metadata.name,
      path: metadata.path,
      status: metadata.status,
      source: metadata.source,
    }
  }
}

/// Resolves SDK names (`UIKit.framework`, `libc++.tbd`, `Foundation.swiftmodule`)
/// to their location. No filesystem access happens here.
#[derive(Debug, Clone)]
pub struct SystemFrameworkMetadataProvider {
  developer_dir: PathBuf,
}

impl Default for SystemFrameworkMetadataProvider {
  fn default() -> Self {
    Self::new("/Applications/Xcode.app/Contents/Developer")
  }
}

impl SystemFrameworkMetadataProvider {
  pub fn new(developer_dir: impl Into<PathBuf>) -> Self {
    Self {
      developer_dir: developer_dir.into(),
    }
  }

  pub fn load(
    &self,
    name: &str,
    status: SdkStatus,
    platform: Platform,
    source: SdkSource,
  ) -> Result<SystemFrameworkMetadata, MetadataError> {
    let extension = Path::new(name).extension().and_then(|ext| ext.to_str());
    let path = match (source, extension) {
      (SdkSource::System, Some("framework")) => Path::new("/System/Library/Frameworks").join(name),
      (SdkSource::System, Some("tbd")) if name.starts_with("lib") => Path::new("/usr/lib").join(name),
      (SdkSource::System, Some("swiftmodule")) => Path::new("/usr/lib/swift").join(name),
      (SdkSource::Developer, Some("framework")) => self
        .developer_dir
        .join("Platforms")
        .join(format!("{}.platform", platform.developer_platform_name()))
        .join("Developer/Library/Frameworks")
        .join(name),
      _ => return Err(MetadataError::UnsupportedSdk(name.to_string())),
    };

    Ok(SystemFrameworkMetadata {
      name: name.to_string(),
      path,
      status,
      source,
    })
  }
}
