//! Workspace description produced by the project front end.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::consts::WORKSPACE_FILE;
use crate::graph::Target;

#[derive(Debug, Error)]
pub enum ProjectError {
  #[error("no workspace description at {0}")]
  NotFound(PathBuf),

  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("invalid workspace description {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
  pub name: String,
  #[serde(default)]
  pub path: PathBuf,
  #[serde(default)]
  pub projects: Vec<Project>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
  pub path: PathBuf,
  pub name: String,
  #[serde(default)]
  pub targets: Vec<Target>,
}

impl Workspace {
  /// Anchors project paths at the workspace, then target inputs at their project.
  pub fn resolve_paths(&mut self) {
    for project in &mut self.projects {
      if project.path.is_relative() {
        project.path = self.path.join(&project.path);
      }
      for target in &mut project.targets {
        target.resolve_paths(&project.path);
      }
    }
  }
}

/// Loads a workspace from a description file, or from a directory holding one.
///
/// The workspace path defaults to the directory containing the description.
pub fn load_workspace(path: &Path) -> Result<Workspace, ProjectError> {
  let file = if path.is_dir() { path.join(WORKSPACE_FILE) } else { path.to_path_buf() };
  if !file.is_file() {
    return Err(ProjectError::NotFound(file));
  }

  let content = fs::read_to_string(&file).map_err(|source| ProjectError::Read {
    path: file.clone(),
    source,
  })?;
  let mut workspace: Workspace = serde_json::from_str(&content).map_err(|source| ProjectError::Parse {
    path: file.clone(),
    source,
  })?;

  let base = file.parent().map(Path::to_path_buf).unwrap_or_default();
  if workspace.path.as_os_str().is_empty() {
    workspace.path = base;
  } else if workspace.path.is_relative() {
    workspace.path = base.join(&workspace.path);
  }
  workspace.resolve_paths();

  debug!(
    path = %file.display(),
    projects = workspace.projects.len(),
    "loaded workspace description"
  );
  Ok(workspace)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::graph::{Product, TargetDependency};
  use crate::platform::Platform;

  const DESCRIPTION: &str = r#"{
    "name": "App",
    "projects": [
      {
        "path": "App",
        "name": "App",
        "targets": [
          {
            "name": "Core",
            "product": "framework",
            "platform": "ios",
            "sources": [{"path": "Sources/Core.swift", "compiler_flags": "-DDEBUG"}],
            "resources": [{"type": "folder", "path": "Assets"}],
            "settings": {"SWIFT_VERSION": "5.0"},
            "dependencies": [{"type": "sdk", "name": "UIKit.framework"}]
          }
        ]
      }
    ]
  }"#;

  #[test]
  fn loads_from_directory() {
    let temp = tempfile::tempdir().unwrap();
    fs::write(temp.path().join(WORKSPACE_FILE), DESCRIPTION).unwrap();

    let workspace = load_workspace(temp.path()).unwrap();
    assert_eq!(workspace.name, "App");
    assert_eq!(workspace.path, temp.path());

    let project = &workspace.projects[0];
    assert_eq!(project.path, temp.path().join("App"));
    let core = &project.targets[0];
    assert_eq!(core.product, Product::Framework);
    assert_eq!(core.platform, Platform::Ios);
    assert_eq!(core.sources[0].path, temp.path().join("App/Sources/Core.swift"));
    assert_eq!(core.sources[0].compiler_flags.as_deref(), Some("-DDEBUG"));
    assert!(matches!(core.dependencies[0], TargetDependency::Sdk { .. }));
  }

  #[test]
  fn loads_from_file() {
    let temp = tempfile::tempdir().unwrap();
    let file = temp.path().join("custom.json");
    fs::write(&file, DESCRIPTION).unwrap();

    let workspace = load_workspace(&file).unwrap();
    assert_eq!(workspace.projects.len(), 1);
  }

  #[test]
  fn missing_description() {
    let temp = tempfile::tempdir().unwrap();
    let err = load_workspace(temp.path()).unwrap_err();
    assert!(matches!(err, ProjectError::NotFound(_)));
  }

  #[test]
  fn malformed_description() {
    let temp = tempfile::tempdir().unwrap();
    fs::write(temp.path().join(WORKSPACE_FILE), "{ not json").unwrap();
    let err = load_workspace(temp.path()).unwrap_err();
    assert!(matches!(err, ProjectError::Parse { .. }));
  }
}
