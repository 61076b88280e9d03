//! The collaborator that turns units into artifacts.

use std::future::Future;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

use super::types::BuildProfile;
use crate::graph::TargetId;
use crate::platform::Platform;

#[derive(Debug, Error)]
pub enum BuildError {
  #[error("failed to spawn {program}: {source}")]
  Spawn {
    program: String,
    #[source]
    source: std::io::Error,
  },

  #[error("scheme {scheme} failed with exit code {code:?}: {stderr}")]
  Failed {
    scheme: String,
    code: Option<i32>,
    stderr: String,
  },
}

/// Units built together in one invocation of the build program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildGroup {
  pub scheme: String,
  pub platform: Platform,
  /// Units in build order.
  pub targets: Vec<TargetId>,
}

impl BuildGroup {
  pub fn new(graph_name: &str, platform: Platform, targets: Vec<TargetId>) -> Self {
    Self {
      scheme: format!("{graph_name}-Cache-{platform}"),
      platform,
      targets,
    }
  }

  pub fn target_names(&self) -> Vec<String> {
    self.targets.iter().map(|id| id.name.clone()).collect()
  }
}

/// Builds a group of units, leaving their products in `output`.
pub trait TargetBuilding: Send + Sync {
  fn build(
    &self,
    group: &BuildGroup,
    profile: &BuildProfile,
    output: &Path,
  ) -> impl Future<Output = Result<(), BuildError>> + Send;
}

/// Spawns `xcodebuild` (or a replacement program) once per group.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
  program: String,
  workspace: PathBuf,
}

impl CommandBuilder {
  pub fn new(workspace: impl Into<PathBuf>) -> Self {
    Self {
      program: "xcodebuild".to_string(),
      workspace: workspace.into(),
    }
  }

  pub fn with_program(mut self, program: impl Into<String>) -> Self {
    self.program = program.into();
    self
  }

  pub fn arguments(&self, group: &BuildGroup, profile: &BuildProfile, output: &Path) -> Vec<String> {
    vec![
      "build".to_string(),
      "-workspace".to_string(),
      self.workspace.display().to_string(),
      "-scheme".to_string(),
      group.scheme.clone(),
      "-configuration".to_string(),
      profile.configuration.clone(),
      "-destination".to_string(),
      group
        .platform
        .destination(profile.os_version.as_deref(), profile.device.as_deref()),
      format!("CONFIGURATION_BUILD_DIR={}", output.display()),
      "SKIP_INSTALL=NO".to_string(),
    ]
  }
}

impl TargetBuilding for CommandBuilder {
  async fn build(&self, group: &BuildGroup, profile: &BuildProfile, output: &Path) -> Result<(), BuildError> {
    info!(scheme = %group.scheme, targets = group.targets.len(), "building scheme");
    let args = self.arguments(group, profile, output);
    debug!(program = %self.program, args = ?args, "spawning build");

    let result = Command::new(&self.program)
      .args(&args)
      .current_dir(self.workspace.parent().unwrap_or(Path::new(".")))
      .output()
      .await
      .map_err(|source| BuildError::Spawn {
        program: self.program.clone(),
        source,
      })?;

    if !result.status.success() {
      let stderr = String::from_utf8_lossy(&result.stderr).trim().to_string();
      let stdout = String::from_utf8_lossy(&result.stdout);
      if !stdout.is_empty() {
        debug!(stdout = %stdout, "build stdout");
      }
      return Err(BuildError::Failed {
        scheme: group.scheme.clone(),
        code: result.status.code(),
        stderr,
      });
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn group() -> BuildGroup {
    BuildGroup::new("App", Platform::Ios, vec![TargetId::new("/w", "Core")])
  }

  #[test]
  fn scheme_names_graph_and_platform() {
    assert_eq!(group().scheme, "App-Cache-iOS");
    assert_eq!(group().target_names(), vec!["Core".to_string()]);
  }

  #[test]
  fn arguments_carry_profile_and_output() {
    let builder = CommandBuilder::new("/w/App.xcworkspace");
    let profile = BuildProfile {
      configuration: "Release".to_string(),
      os_version: Some("17.0".to_string()),
      device: Some("iPhone 15".to_string()),
    };
    let args = builder.arguments(&group(), &profile, Path::new("/tmp/out"));

    assert_eq!(args[0], "build");
    assert!(args.windows(2).any(|pair| pair == ["-scheme", "App-Cache-iOS"]));
    assert!(args.windows(2).any(|pair| pair == ["-configuration", "Release"]));
    assert!(
      args
        .windows(2)
        .any(|pair| pair == ["-destination", "platform=iOS Simulator,name=iPhone 15,OS=17.0"])
    );
    assert!(args.contains(&"CONFIGURATION_BUILD_DIR=/tmp/out".to_string()));
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn failing_program_reports_scheme() {
    let builder = CommandBuilder::new("/tmp/App.xcworkspace").with_program("false");
    let err = builder
      .build(&group(), &BuildProfile::default(), Path::new("/tmp"))
      .await
      .unwrap_err();
    match err {
      BuildError::Failed { scheme, code, .. } => {
        assert_eq!(scheme, "App-Cache-iOS");
        assert_eq!(code, Some(1));
      }
      other => panic!("unexpected error: {other}"),
    }
  }

  #[tokio::test]
  async fn missing_program_fails_to_spawn() {
    let builder = CommandBuilder::new("/tmp/App.xcworkspace").with_program("bincache-no-such-program");
    let err = builder
      .build(&group(), &BuildProfile::default(), Path::new("/tmp"))
      .await
      .unwrap_err();
    assert!(matches!(err, BuildError::Spawn { .. }));
  }
}
