pub mod arch;
pub mod paths;

use std::fmt;

use serde::{Deserialize, Serialize};

/// Apple platform a build unit is compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
  Ios,
  Macos,
  Tvos,
  Watchos,
  Visionos,
}

impl Platform {
  /// Returns the display identifier for this platform (e.g., "iOS")
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Ios => "iOS",
      Self::Macos => "macOS",
      Self::Tvos => "tvOS",
      Self::Watchos => "watchOS",
      Self::Visionos => "visionOS",
    }
  }

  /// Directory name of the platform inside the developer directory
  /// (`<developer>/Platforms/<name>.platform`).
  pub fn developer_platform_name(&self) -> &'static str {
    match self {
      Self::Ios => "iPhoneOS",
      Self::Macos => "MacOSX",
      Self::Tvos => "AppleTVOS",
      Self::Watchos => "WatchOS",
      Self::Visionos => "XROS",
    }
  }

  /// Destination specifier for a build.
  ///
  /// With a device name the build targets that simulator (optionally pinned to an
  /// OS version); without one it targets the generic platform.
  pub fn destination(&self, os_version: Option<&str>, device: Option<&str>) -> String {
    match (self, device) {
      (Self::Macos, _) => "platform=macOS".to_string(),
      (_, Some(device)) => {
        let mut destination = format!("platform={} Simulator,name={}", self.as_str(), device);
        if let Some(os) = os_version {
          destination.push_str(&format!(",OS={}", os));
        }
        destination
      }
      (_, None) => format!("generic/platform={}", self.as_str()),
    }
  }
}

impl fmt::Display for Platform {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}
