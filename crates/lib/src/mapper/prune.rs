use tracing::debug;

use super::{GraphMapping, MapperError, SideEffect};
use crate::graph::{Graph, TargetId};

/// Removes pruned units and every edge that points at them.
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeShakePrunedTargetsGraphMapper;

impl GraphMapping for TreeShakePrunedTargetsGraphMapper {
  fn map(&self, mut graph: Graph) -> Result<(Graph, Vec<SideEffect>), MapperError> {
    let pruned: Vec<TargetId> = graph
      .targets()
      .filter(|(_, target)| target.prune)
      .map(|(id, _)| id.clone())
      .collect();
    for id in &pruned {
      graph.remove_target(id);
    }
    if !pruned.is_empty() {
      debug!(removed = pruned.len(), remaining = graph.len(), "tree-shook pruned targets");
    }
    Ok((graph, Vec::new()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::graph::{GraphDependency, Product, Target};
  use crate::platform::Platform;

  #[test]
  fn removes_pruned_targets_and_dangling_edges() {
    let mut graph = Graph::new("W", "/w");
    let app = TargetId::new("/w", "App");
    let core = TargetId::new("/w", "Core");
    graph
      .add_target(app.clone(), Target::new("App", Product::App, Platform::Ios))
      .unwrap();
    let mut core_target = Target::new("Core", Product::Framework, Platform::Ios);
    core_target.prune = true;
    graph.add_target(core.clone(), core_target).unwrap();
    graph.set_dependencies(
      GraphDependency::target(&app),
      vec![
        GraphDependency::target(&core),
        GraphDependency::Package { product: "Log".into() },
      ],
    );

    let (graph, _) = TreeShakePrunedTargetsGraphMapper.map(graph).unwrap();

    assert!(!graph.contains(&core));
    assert_eq!(
      graph.target_dependencies(&app),
      &[GraphDependency::Package { product: "Log".into() }]
    );
  }
}
