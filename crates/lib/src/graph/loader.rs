//! Turns a [`Workspace`] description into a resolved [`Graph`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{Graph, GraphDependency, GraphError, TargetDependency, TargetId};
use crate::metadata::{MetadataError, PrecompiledLoading, SystemFrameworkMetadataProvider};
use crate::platform::Platform;
use crate::project::Workspace;

pub struct GraphLoader<'a> {
  precompiled: &'a dyn PrecompiledLoading,
  system: SystemFrameworkMetadataProvider,
}

impl<'a> GraphLoader<'a> {
  pub fn new(precompiled: &'a dyn PrecompiledLoading, system: SystemFrameworkMetadataProvider) -> Self {
    Self { precompiled, system }
  }

  /// Registers every unit, resolves each declared dependency, then rejects cycles.
  pub fn load(&self, workspace: &Workspace) -> Result<Graph, GraphError> {
    let mut graph = Graph::new(workspace.name.clone(), workspace.path.clone());

    for project in &workspace.projects {
      let project_path = normalize(&project.path);
      for target in &project.targets {
        graph.add_target(TargetId::new(project_path.clone(), target.name.clone()), target.clone())?;
      }
    }

    let mut loaded: HashMap<PathBuf, GraphDependency> = HashMap::new();
    for project in &workspace.projects {
      let project_path = normalize(&project.path);
      for target in &project.targets {
        let id = TargetId::new(project_path.clone(), target.name.clone());
        let mut dependencies = Vec::with_capacity(target.dependencies.len());
        for declared in &target.dependencies {
          let dependency = self.resolve(&graph, &id, target.platform, declared, &mut loaded)?;
          if !dependencies.contains(&dependency) {
            dependencies.push(dependency);
          }
        }
        for dependency in &dependencies {
          link_nested(&mut graph, dependency);
        }
        graph.set_dependencies(GraphDependency::target(&id), dependencies);
      }
    }

    graph.validate_acyclic()?;
    info!(targets = graph.len(), precompiled = loaded.len(), "loaded dependency graph");
    Ok(graph)
  }

  fn resolve(
    &self,
    graph: &Graph,
    from: &TargetId,
    platform: Platform,
    declared: &TargetDependency,
    loaded: &mut HashMap<PathBuf, GraphDependency>,
  ) -> Result<GraphDependency, GraphError> {
    match declared {
      TargetDependency::Target { name } => self.unit(graph, from, TargetId::new(from.path.clone(), name.clone())),
      TargetDependency::Project { path, target } => {
        self.unit(graph, from, TargetId::new(normalize(path), target.clone()))
      }
      TargetDependency::Framework { path } => self.precompiled(from, path, loaded),
      TargetDependency::Xcframework { path, dependencies } => {
        let mut xcframework = self.precompiled(from, path, loaded)?;
        if let GraphDependency::XcFramework { dependencies: nested, .. } = &mut xcframework {
          for inner in dependencies {
            let inner_node = self.precompiled(from, inner, loaded)?;
            if !inner_node.is_bundled_binary() {
              return Err(GraphError::Metadata {
                target: from.clone(),
                source: MetadataError::InvalidXcFramework {
                  path: path.clone(),
                  reason: format!("nested dependency {} is not a framework", inner.display()),
                },
              });
            }
            if !nested.contains(&inner_node) {
              nested.push(inner_node);
            }
          }
        }
        Ok(xcframework)
      }
      TargetDependency::Library { path, public_headers } => {
        let mut dependency = self.precompiled(from, path, loaded)?;
        if let GraphDependency::Library { public_headers: headers, .. } = &mut dependency {
          headers.clone_from(public_headers);
        }
        Ok(dependency)
      }
      TargetDependency::Sdk { name, status, source } => self
        .system
        .load(name, *status, platform, *source)
        .map(GraphDependency::from)
        .map_err(|err| match err {
          MetadataError::UnsupportedSdk(name) => GraphError::UnsupportedSdk {
            target: from.clone(),
            name,
          },
          source => GraphError::Metadata {
            target: from.clone(),
            source,
          },
        }),
      TargetDependency::Package { product } => Ok(GraphDependency::Package {
        product: product.clone(),
      }),
    }
  }

  fn unit(&self, graph: &Graph, from: &TargetId, to: TargetId) -> Result<GraphDependency, GraphError> {
    if !graph.contains(&to) {
      return Err(GraphError::MissingDependency {
        target: from.clone(),
        reference: to.to_string(),
      });
    }
    Ok(GraphDependency::target(&to))
  }

  fn precompiled(
    &self,
    from: &TargetId,
    path: &Path,
    loaded: &mut HashMap<PathBuf, GraphDependency>,
  ) -> Result<GraphDependency, GraphError> {
    if let Some(dependency) = loaded.get(path) {
      return Ok(dependency.clone());
    }
    debug!(target = %from, path = %path.display(), "loading precompiled dependency");
    let dependency = self.precompiled.load(path).map_err(|source| GraphError::Metadata {
      target: from.clone(),
      source,
    })?;
    loaded.insert(path.to_path_buf(), dependency.clone());
    Ok(dependency)
  }
}

/// Mirrors an xcframework's nested dependencies as graph edges, recursively.
fn link_nested(graph: &mut Graph, node: &GraphDependency) {
  let nested = node.nested_dependencies();
  if nested.is_empty() {
    return;
  }
  for inner in nested {
    link_nested(graph, inner);
  }
  graph.set_dependencies(node.clone(), nested.to_vec());
}

/// Collapses `.` and `..` components without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
  use std::path::Component;

  let mut normalized = PathBuf::new();
  for component in path.components() {
    match component {
      Component::CurDir => {}
      Component::ParentDir => {
        normalized.pop();
      }
      other => normalized.push(other),
    }
  }
  normalized
}
