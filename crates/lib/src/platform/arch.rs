use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// CPU architecture slices found in precompiled binaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Architecture {
  X86_64,
  I386,
  Armv7,
  Armv7s,
  Armv7k,
  Arm64,
  Arm64e,
  Arm64_32,
}

impl Architecture {
  /// Returns the identifier used by the binary tools for this architecture
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::X86_64 => "x86_64",
      Self::I386 => "i386",
      Self::Armv7 => "armv7",
      Self::Armv7s => "armv7s",
      Self::Armv7k => "armv7k",
      Self::Arm64 => "arm64",
      Self::Arm64e => "arm64e",
      Self::Arm64_32 => "arm64_32",
    }
  }
}

impl FromStr for Architecture {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "x86_64" => Ok(Self::X86_64),
      "i386" => Ok(Self::I386),
      "armv7" => Ok(Self::Armv7),
      "armv7s" => Ok(Self::Armv7s),
      "armv7k" => Ok(Self::Armv7k),
      "arm64" => Ok(Self::Arm64),
      "arm64e" => Ok(Self::Arm64e),
      "arm64_32" => Ok(Self::Arm64_32),
      other => Err(format!("unknown architecture: {}", other)),
    }
  }
}

impl fmt::Display for Architecture {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}
