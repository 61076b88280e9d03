use std::collections::BTreeSet;
use std::path::Path;
use std::process::Command;

use tracing::debug;

use super::{MetadataError, PrecompiledMetadataProviding};
use crate::graph::Linking;
use crate::platform::arch::Architecture;

/// Inspects binaries with `lipo`, `file` and `dwarfdump`.
#[derive(Debug, Clone)]
pub struct ToolProbe {
  pub lipo: String,
  pub file: String,
  pub dwarfdump: String,
}

impl Default for ToolProbe {
  fn default() -> Self {
    Self {
      lipo: "lipo".to_string(),
      file: "file".to_string(),
      dwarfdump: "dwarfdump".to_string(),
    }
  }
}

impl ToolProbe {
  fn run(&self, tool: &str, args: &[&str], binary: &Path) -> Result<String, MetadataError> {
    debug!(tool, path = %binary.display(), "probing binary");
    let output = Command::new(tool)
      .args(args)
      .arg(binary)
      .output()
      .map_err(|source| MetadataError::ToolSpawn {
        tool: tool.to_string(),
        source,
      })?;

    if !output.status.success() {
      return Err(MetadataError::ToolFailed {
        tool: tool.to_string(),
        path: binary.to_path_buf(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
      });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
  }
}

impl PrecompiledMetadataProviding for ToolProbe {
  fn architectures(&self, binary: &Path) -> Result<BTreeSet<Architecture>, MetadataError> {
    let output = self.run(&self.lipo, &["-info"], binary)?;
    let architectures = parse_lipo_architectures(&output);
    if architectures.is_empty() {
      return Err(MetadataError::ArchitecturesNotFound(binary.to_path_buf()));
    }
    Ok(architectures)
  }

  fn linking(&self, binary: &Path) -> Result<Linking, MetadataError> {
    let output = self.run(&self.file, &[], binary)?;
    Ok(parse_file_linking(&output))
  }

  fn uuids(&self, binary: &Path) -> Result<BTreeSet<String>, MetadataError> {
    let output = self.run(&self.dwarfdump, &["--uuid"], binary)?;
    Ok(parse_dwarfdump_uuids(&output))
  }
}

/// Parses `lipo -info` output.
///
/// Handles both `Non-fat file: X is architecture: arm64` and
/// `Architectures in the fat file: X are: x86_64 arm64`. Unknown slices are skipped.
pub fn parse_lipo_architectures(output: &str) -> BTreeSet<Architecture> {
  output
    .lines()
    .filter_map(|line| line.rsplit_once(':'))
    .flat_map(|(_, archs)| archs.split_whitespace())
    .filter_map(|arch| arch.parse().ok())
    .collect()
}

/// Parses `file` output; any dylib slice makes the binary dynamic.
pub fn parse_file_linking(output: &str) -> Linking {
  if output.contains("dynamically linked shared library") {
    Linking::Dynamic
  } else {
    Linking::Static
  }
}

/// Parses `dwarfdump --uuid` output (`UUID: <uuid> (<arch>) <path>`).
pub fn parse_dwarfdump_uuids(output: &str) -> BTreeSet<String> {
  output
    .lines()
    .filter_map(|line| line.trim().strip_prefix("UUID:"))
    .filter_map(|rest| rest.split_whitespace().next())
    .map(|uuid| uuid.to_uppercase())
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn lipo_fat_file() {
    let output = "Architectures in the fat file: /tmp/Core.framework/Core are: x86_64 arm64\n";
    let archs = parse_lipo_architectures(output);
    assert_eq!(
      archs,
      [Architecture::X86_64, Architecture::Arm64].into_iter().collect()
    );
  }

  #[test]
  fn lipo_thin_file() {
    let output = "Non-fat file: /tmp/libCore.a is architecture: arm64\n";
    assert_eq!(
      parse_lipo_architectures(output),
      [Architecture::Arm64].into_iter().collect()
    );
  }

  #[test]
  fn lipo_garbage_yields_nothing() {
    assert!(parse_lipo_architectures("fatal error: can't open input file").is_empty());
    assert!(parse_lipo_architectures("").is_empty());
  }

  #[test]
  fn file_linking() {
    let dynamic = "Core: Mach-O universal binary with 2 architectures\n\
      Core (for architecture x86_64): Mach-O 64-bit dynamically linked shared library x86_64\n";
    let archive = "libCore.a: current ar archive random library\n";
    assert_eq!(parse_file_linking(dynamic), Linking::Dynamic);
    assert_eq!(parse_file_linking(archive), Linking::Static);
  }

  #[test]
  fn dwarfdump_uuids() {
    let output = "UUID: 510fd35c-1a3b-3b4c-9a2e-3d1f5a2b7c10 (x86_64) /tmp/Core\n\
      UUID: 7A2E5F8D-4C1B-3E9A-8D7F-0B1C2D3E4F50 (arm64) /tmp/Core\n";
    let uuids = parse_dwarfdump_uuids(output);
    assert_eq!(uuids.len(), 2);
    assert!(uuids.contains("510FD35C-1A3B-3B4C-9A2E-3D1F5A2B7C10"));
  }

  #[test]
  fn missing_tool_is_a_spawn_error() {
    let probe = ToolProbe {
      lipo: "bincache-no-such-tool".to_string(),
      ..Default::default()
    };
    let err = probe.architectures(Path::new("/tmp/Core")).unwrap_err();
    assert!(matches!(err, MetadataError::ToolSpawn { .. }));
  }
}
