use std::collections::{BTreeMap, HashMap};

use tracing::{debug, info};

use super::{GraphMapping, MapperError, SideEffect};
use crate::graph::{Graph, GraphDependency, TargetId};

/// Swaps units for their cached artifacts.
///
/// A unit is replaced when it has an artifact and every unit it depends on directly is
/// replaced too. Dependents then link the artifact instead of the unit. Replaced units
/// are marked pruned so a following tree shake removes them.
///
/// An xcframework artifact nests the framework and xcframework artifacts its unit
/// depended on, so the replacement graph keeps the link chain between binaries.
#[derive(Debug, Clone, Default)]
pub struct TargetsToBinariesGraphMapper {
  artifacts: BTreeMap<TargetId, GraphDependency>,
}

/// Memo tables for one mapping pass.
#[derive(Default)]
struct Resolution {
  replaceable: HashMap<TargetId, bool>,
  artifacts: HashMap<TargetId, Option<GraphDependency>>,
}

impl TargetsToBinariesGraphMapper {
  pub fn new(artifacts: BTreeMap<TargetId, GraphDependency>) -> Self {
    Self { artifacts }
  }

  fn replaceable(&self, graph: &Graph, id: &TargetId, memo: &mut HashMap<TargetId, bool>) -> bool {
    if let Some(&known) = memo.get(id) {
      return known;
    }
    let result = self.artifacts.contains_key(id)
      && graph
        .direct_target_dependencies(id)
        .iter()
        .all(|dependency| self.replaceable(graph, dependency, memo));
    memo.insert(id.clone(), result);
    result
  }

  /// The node that replaces `id`, or `None` when `id` stays a build unit.
  fn artifact(&self, graph: &Graph, id: &TargetId, state: &mut Resolution) -> Option<GraphDependency> {
    if let Some(known) = state.artifacts.get(id) {
      return known.clone();
    }
    let resolved = match self.artifacts.get(id) {
      Some(artifact) if self.replaceable(graph, id, &mut state.replaceable) => {
        let mut artifact = artifact.clone();
        let mapped = self.mapped_dependencies(graph, id, state);
        if let GraphDependency::XcFramework { path, dependencies, .. } = &mut artifact {
          for dependency in mapped.into_iter().filter(GraphDependency::is_bundled_binary) {
            if dependency.path() != Some(path.as_path()) && !dependencies.contains(&dependency) {
              dependencies.push(dependency);
            }
          }
        }
        Some(artifact)
      }
      _ => None,
    };
    state.artifacts.insert(id.clone(), resolved.clone());
    resolved
  }

  /// Direct dependencies of `id`, with replaced units swapped for their artifacts.
  fn mapped_dependencies(&self, graph: &Graph, id: &TargetId, state: &mut Resolution) -> Vec<GraphDependency> {
    let mut mapped = Vec::new();
    for dependency in graph.target_dependencies(id) {
      let dependency = match dependency.target_id() {
        Some(dependency_id) => self
          .artifact(graph, &dependency_id, state)
          .unwrap_or_else(|| dependency.clone()),
        None => dependency.clone(),
      };
      if !mapped.contains(&dependency) {
        mapped.push(dependency);
      }
    }
    mapped
  }
}

impl GraphMapping for TargetsToBinariesGraphMapper {
  fn map(&self, mut graph: Graph) -> Result<(Graph, Vec<SideEffect>), MapperError> {
    if self.artifacts.is_empty() {
      return Ok((graph, Vec::new()));
    }

    let mut state = Resolution::default();
    let mut rewrites: Vec<(GraphDependency, Vec<GraphDependency>)> = Vec::new();
    let mut replaced: Vec<TargetId> = Vec::new();

    let ids: Vec<TargetId> = graph.targets().map(|(id, _)| id.clone()).collect();
    for id in &ids {
      let mapped = self.mapped_dependencies(&graph, id, &mut state);
      let Some(artifact) = self.artifact(&graph, id, &mut state) else {
        rewrites.push((GraphDependency::target(id), mapped));
        continue;
      };

      // Edges already recorded for the fetched artifact carry over to the node
      // that replaces the unit.
      let fetched = self.artifacts.get(id).unwrap_or(&artifact);
      let mut attached = graph.direct_dependencies(fetched).to_vec();
      for dependency in mapped.into_iter().filter(GraphDependency::stays_attached_to_artifact) {
        if dependency != artifact && !attached.contains(&dependency) {
          attached.push(dependency);
        }
      }
      debug!(target = %id, artifact = %artifact, nested = artifact.nested_dependencies().len(), "replacing target with cached artifact");
      if fetched != &artifact {
        rewrites.push((fetched.clone(), Vec::new()));
      }
      rewrites.push((artifact, attached));
      rewrites.push((GraphDependency::target(id), Vec::new()));
      replaced.push(id.clone());
    }

    for (node, dependencies) in rewrites {
      graph.set_dependencies(node, dependencies);
    }
    for id in &replaced {
      if let Some(target) = graph.target_mut(id) {
        target.prune = true;
      }
    }

    info!(
      replaced = replaced.len(),
      available = self.artifacts.len(),
      "mapped cached targets to binaries"
    );
    Ok((graph, Vec::new()))
  }
}
