use std::collections::BTreeSet;

use tracing::debug;

use super::{GraphMapping, MapperError, SideEffect};
use crate::graph::{Graph, TargetId};

/// Marks every unit outside the requested units' dependency closure as pruned.
///
/// Units are matched by name in every project. An empty request keeps everything.
#[derive(Debug, Clone, Default)]
pub struct FocusTargetsGraphMapper {
  targets: BTreeSet<String>,
}

impl FocusTargetsGraphMapper {
  pub fn new(targets: impl IntoIterator<Item = impl Into<String>>) -> Self {
    Self {
      targets: targets.into_iter().map(Into::into).collect(),
    }
  }
}

impl GraphMapping for FocusTargetsGraphMapper {
  fn map(&self, mut graph: Graph) -> Result<(Graph, Vec<SideEffect>), MapperError> {
    if self.targets.is_empty() {
      return Ok((graph, Vec::new()));
    }

    let requested: Vec<TargetId> = graph
      .targets()
      .filter(|(id, _)| self.targets.contains(&id.name))
      .map(|(id, _)| id.clone())
      .collect();

    let unknown: Vec<String> = self
      .targets
      .iter()
      .filter(|name| !requested.iter().any(|id| &id.name == *name))
      .cloned()
      .collect();
    if !unknown.is_empty() {
      return Err(MapperError::UnknownTargets(unknown));
    }

    let mut kept: BTreeSet<TargetId> = BTreeSet::new();
    for id in &requested {
      kept.extend(graph.transitive_target_dependencies(id)?);
      kept.insert(id.clone());
    }

    for id in graph.all_targets() {
      if !kept.contains(&id)
        && let Some(target) = graph.target_mut(&id)
      {
        debug!(target = %id, "pruning unfocused target");
        target.prune = true;
      }
    }
    Ok((graph, Vec::new()))
  }
}
