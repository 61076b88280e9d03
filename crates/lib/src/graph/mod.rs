//! Dependency graph of build units and precompiled artifacts.
//!
//! The graph is an arena: units are stored once, keyed by [`TargetId`], and every
//! edge is a [`GraphDependency`] value. Edges point from a dependent to its
//! dependencies; build order is derived through [`dag::TargetDag`].

pub mod dag;
pub mod loader;
mod types;

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use thiserror::Error;

use crate::metadata::MetadataError;

pub use types::*;

#[derive(Debug, Error)]
pub enum GraphError {
  #[error("duplicate target {0}")]
  DuplicateTarget(TargetId),

  #[error("unknown target {0}")]
  UnknownTarget(TargetId),

  #[error("target {target} depends on {reference}, which cannot be resolved")]
  MissingDependency { target: TargetId, reference: String },

  #[error("dependency cycle detected: {}", format_cycle(.cycle))]
  CyclicDependency { cycle: Vec<TargetId> },

  #[error("target {target} links unsupported SDK '{name}'")]
  UnsupportedSdk { target: TargetId, name: String },

  #[error("failed to load precompiled dependency of {target}: {source}")]
  Metadata {
    target: TargetId,
    #[source]
    source: MetadataError,
  },
}

fn format_cycle(cycle: &[TargetId]) -> String {
  cycle.iter().map(|id| id.name.as_str()).collect::<Vec<_>>().join(" -> ")
}

/// The resolved dependency graph of a workspace.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Graph {
  pub name: String,
  pub path: PathBuf,
  targets: BTreeMap<TargetId, Target>,
  /// Declaration order, used as a stable tie-breaker.
  order: Vec<TargetId>,
  dependencies: BTreeMap<GraphDependency, Vec<GraphDependency>>,
}

impl Graph {
  pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
    Self {
      name: name.into(),
      path: path.into(),
      ..Default::default()
    }
  }

  /// Adds a unit. Identities must be unique within the graph.
  pub fn add_target(&mut self, id: TargetId, target: Target) -> Result<(), GraphError> {
    if self.targets.contains_key(&id) {
      return Err(GraphError::DuplicateTarget(id));
    }
    self.order.push(id.clone());
    self.targets.insert(id, target);
    Ok(())
  }

  /// Replaces the ordered direct dependencies of `node`.
  pub fn set_dependencies(&mut self, node: GraphDependency, dependencies: Vec<GraphDependency>) {
    if dependencies.is_empty() {
      self.dependencies.remove(&node);
    } else {
      self.dependencies.insert(node, dependencies);
    }
  }

  pub fn target(&self, id: &TargetId) -> Option<&Target> {
    self.targets.get(id)
  }

  pub fn target_mut(&mut self, id: &TargetId) -> Option<&mut Target> {
    self.targets.get_mut(id)
  }

  pub fn contains(&self, id: &TargetId) -> bool {
    self.targets.contains_key(id)
  }

  pub fn len(&self) -> usize {
    self.targets.len()
  }

  pub fn is_empty(&self) -> bool {
    self.targets.is_empty()
  }

  pub fn all_targets(&self) -> BTreeSet<TargetId> {
    self.targets.keys().cloned().collect()
  }

  /// Units in the order they were declared.
  pub fn targets(&self) -> impl Iterator<Item = (&TargetId, &Target)> {
    self.order.iter().filter_map(|id| self.targets.get(id).map(|target| (id, target)))
  }

  pub fn declaration_index(&self, id: &TargetId) -> Option<usize> {
    self.order.iter().position(|candidate| candidate == id)
  }

  pub fn direct_dependencies(&self, node: &GraphDependency) -> &[GraphDependency] {
    self.dependencies.get(node).map(Vec::as_slice).unwrap_or(&[])
  }

  pub fn target_dependencies(&self, id: &TargetId) -> &[GraphDependency] {
    self.direct_dependencies(&GraphDependency::target(id))
  }

  /// Direct dependencies that are themselves build units.
  pub fn direct_target_dependencies(&self, id: &TargetId) -> Vec<TargetId> {
    self
      .target_dependencies(id)
      .iter()
      .filter_map(GraphDependency::target_id)
      .collect()
  }

  /// Units that list `id` as a direct dependency.
  pub fn direct_dependents(&self, id: &TargetId) -> Vec<TargetId> {
    let node = GraphDependency::target(id);
    self
      .dependencies
      .iter()
      .filter(|(_, deps)| deps.contains(&node))
      .filter_map(|(dependent, _)| dependent.target_id())
      .collect()
  }

  /// Every node reachable from `id`, excluding `id` itself.
  pub fn transitive_closure(&self, id: &TargetId) -> Result<BTreeSet<GraphDependency>, GraphError> {
    if !self.contains(id) {
      return Err(GraphError::UnknownTarget(id.clone()));
    }
    let mut visited = BTreeSet::new();
    let mut stack = Vec::new();
    self.visit(&GraphDependency::target(id), &mut visited, &mut stack)?;
    visited.remove(&GraphDependency::target(id));
    Ok(visited)
  }

  /// Units reachable from `id`, excluding `id` itself.
  pub fn transitive_target_dependencies(&self, id: &TargetId) -> Result<BTreeSet<TargetId>, GraphError> {
    Ok(
      self
        .transitive_closure(id)?
        .iter()
        .filter_map(GraphDependency::target_id)
        .collect(),
    )
  }

  /// Fails with the offending path if any unit depends on itself transitively.
  pub fn validate_acyclic(&self) -> Result<(), GraphError> {
    let mut visited = BTreeSet::new();
    for id in &self.order {
      let mut stack = Vec::new();
      self.visit(&GraphDependency::target(id), &mut visited, &mut stack)?;
    }
    Ok(())
  }

  fn visit(
    &self,
    node: &GraphDependency,
    visited: &mut BTreeSet<GraphDependency>,
    stack: &mut Vec<GraphDependency>,
  ) -> Result<(), GraphError> {
    if let Some(start) = stack.iter().position(|entry| entry == node) {
      let mut cycle: Vec<TargetId> = stack[start..].iter().filter_map(GraphDependency::target_id).collect();
      cycle.extend(node.target_id());
      return Err(GraphError::CyclicDependency { cycle });
    }
    if visited.contains(node) {
      return Ok(());
    }
    stack.push(node.clone());
    for dependency in self.direct_dependencies(node) {
      self.visit(dependency, visited, stack)?;
    }
    stack.pop();
    visited.insert(node.clone());
    Ok(())
  }

  /// Removes a unit together with every edge that mentions it.
  pub fn remove_target(&mut self, id: &TargetId) -> Option<Target> {
    let removed = self.targets.remove(id)?;
    self.order.retain(|candidate| candidate != id);
    let node = GraphDependency::target(id);
    self.dependencies.remove(&node);
    for deps in self.dependencies.values_mut() {
      deps.retain(|dep| dep != &node);
    }
    self.dependencies.retain(|_, deps| !deps.is_empty());
    Some(removed)
  }
}
