//! Build-order DAG over a subset of build units.
//!
//! Edges run from dependency to dependent. Units outside the subset are walked
//! through, so ordering between two members is kept even when the path between
//! them crosses a unit that is not being built.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap, HashSet};

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

use super::{Graph, GraphError, TargetId};
use crate::platform::Platform;

pub struct TargetDag {
  graph: DiGraph<TargetId, ()>,
  nodes: HashMap<TargetId, NodeIndex>,
  /// Tie-break key per node: platform, then declaration order.
  keys: HashMap<NodeIndex, (Platform, usize)>,
}

impl TargetDag {
  /// DAG over every unit in the graph.
  pub fn from_graph(graph: &Graph) -> Result<Self, GraphError> {
    Self::for_targets(graph, &graph.all_targets())
  }

  /// DAG restricted to `subset`.
  pub fn for_targets(graph: &Graph, subset: &BTreeSet<TargetId>) -> Result<Self, GraphError> {
    let mut dag = DiGraph::new();
    let mut nodes = HashMap::new();
    let mut keys = HashMap::new();

    for (position, (id, target)) in graph.targets().enumerate() {
      if subset.contains(id) {
        let idx = dag.add_node(id.clone());
        nodes.insert(id.clone(), idx);
        keys.insert(idx, (target.platform, position));
      }
    }

    for id in subset {
      let Some(&dependent) = nodes.get(id) else {
        return Err(GraphError::UnknownTarget(id.clone()));
      };
      for dependency in reachable_members(graph, id, &nodes) {
        dag.add_edge(nodes[&dependency], dependent, ());
      }
    }

    let dag = Self { graph: dag, nodes, keys };
    dag.verify_acyclic()?;
    Ok(dag)
  }

  fn verify_acyclic(&self) -> Result<(), GraphError> {
    toposort(&self.graph, None).map_err(|cycle| GraphError::CyclicDependency {
      cycle: vec![self.graph[cycle.node_id()].clone()],
    })?;
    Ok(())
  }

  /// Dependencies before dependents, ties broken by platform then declaration order.
  pub fn build_order(&self) -> Result<Vec<TargetId>, GraphError> {
    let mut in_degree: HashMap<NodeIndex, usize> = self
      .graph
      .node_indices()
      .map(|idx| (idx, self.graph.neighbors_directed(idx, Direction::Incoming).count()))
      .collect();

    let mut ready: BinaryHeap<Reverse<((Platform, usize), NodeIndex)>> = in_degree
      .iter()
      .filter(|&(_, &degree)| degree == 0)
      .map(|(&idx, _)| Reverse((self.keys[&idx], idx)))
      .collect();

    let mut order = Vec::with_capacity(self.graph.node_count());
    while let Some(Reverse((_, idx))) = ready.pop() {
      order.push(self.graph[idx].clone());
      for neighbor in self.graph.neighbors_directed(idx, Direction::Outgoing) {
        if let Some(degree) = in_degree.get_mut(&neighbor) {
          *degree = degree.saturating_sub(1);
          if *degree == 0 {
            ready.push(Reverse((self.keys[&neighbor], neighbor)));
          }
        }
      }
    }

    if order.len() != self.graph.node_count() {
      let placed: HashSet<&TargetId> = order.iter().collect();
      let cycle = self
        .nodes
        .keys()
        .filter(|id| !placed.contains(id))
        .cloned()
        .collect();
      return Err(GraphError::CyclicDependency { cycle });
    }
    Ok(order)
  }

  /// Units grouped into waves; every unit's dependencies are in earlier waves.
  pub fn waves(&self) -> Result<Vec<Vec<TargetId>>, GraphError> {
    let mut in_degree: HashMap<NodeIndex, usize> = HashMap::new();
    for idx in self.graph.node_indices() {
      in_degree.insert(idx, self.graph.neighbors_directed(idx, Direction::Incoming).count());
    }

    let mut remaining: HashSet<NodeIndex> = self.graph.node_indices().collect();
    let mut waves = Vec::new();

    while !remaining.is_empty() {
      let mut ready: Vec<NodeIndex> = remaining.iter().filter(|&&idx| in_degree[&idx] == 0).copied().collect();

      if ready.is_empty() {
        let mut cycle: Vec<TargetId> = remaining.iter().map(|&idx| self.graph[idx].clone()).collect();
        cycle.sort();
        return Err(GraphError::CyclicDependency { cycle });
      }

      ready.sort_by_key(|idx| self.keys[idx]);
      for &idx in &ready {
        remaining.remove(&idx);
        for neighbor in self.graph.neighbors_directed(idx, Direction::Outgoing) {
          if let Some(degree) = in_degree.get_mut(&neighbor) {
            *degree = degree.saturating_sub(1);
          }
        }
      }

      waves.push(ready.into_iter().map(|idx| self.graph[idx].clone()).collect());
    }

    Ok(waves)
  }

  /// Members of the DAG that `id` must wait for.
  pub fn dependencies(&self, id: &TargetId) -> Vec<TargetId> {
    let Some(&idx) = self.nodes.get(id) else {
      return Vec::new();
    };
    self
      .graph
      .neighbors_directed(idx, Direction::Incoming)
      .map(|dep| self.graph[dep].clone())
      .collect()
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }
}

/// Members reachable from `id` without passing through another member.
fn reachable_members(graph: &Graph, id: &TargetId, members: &HashMap<TargetId, NodeIndex>) -> BTreeSet<TargetId> {
  let mut found = BTreeSet::new();
  let mut seen = HashSet::new();
  let mut stack = graph.direct_target_dependencies(id);
  while let Some(next) = stack.pop() {
    if !seen.insert(next.clone()) {
      continue;
    }
    if members.contains_key(&next) {
      found.insert(next);
    } else {
      stack.extend(graph.direct_target_dependencies(&next));
    }
  }
  found
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::graph::{GraphDependency, Product, Target};

  fn add(graph: &mut Graph, name: &str, platform: Platform, deps: &[&TargetId]) -> TargetId {
    let id = TargetId::new("/w", name);
    graph
      .add_target(id.clone(), Target::new(name, Product::Framework, platform))
      .unwrap();
    graph.set_dependencies(
      GraphDependency::target(&id),
      deps.iter().map(|dep| GraphDependency::target(dep)).collect(),
    );
    id
  }

  #[test]
  fn chain_is_ordered_dependencies_first() {
    let mut graph = Graph::new("W", "/w");
    let c = add(&mut graph, "C", Platform::Ios, &[]);
    let b = add(&mut graph, "B", Platform::Ios, &[&c]);
    let a = add(&mut graph, "A", Platform::Ios, &[&b]);

    let dag = TargetDag::from_graph(&graph).unwrap();
    assert_eq!(dag.build_order().unwrap(), vec![c.clone(), b.clone(), a.clone()]);
    assert_eq!(dag.waves().unwrap(), vec![vec![c], vec![b.clone()], vec![a.clone()]]);
    assert_eq!(dag.dependencies(&a), vec![b]);
  }

  #[test]
  fn independent_units_are_grouped_by_platform() {
    let mut graph = Graph::new("W", "/w");
    let mac = add(&mut graph, "MacCore", Platform::Macos, &[]);
    let ios_a = add(&mut graph, "IosA", Platform::Ios, &[]);
    let ios_b = add(&mut graph, "IosB", Platform::Ios, &[]);

    let order = TargetDag::from_graph(&graph).unwrap().build_order().unwrap();
    assert_eq!(order, vec![ios_a, ios_b, mac]);
  }

  #[test]
  fn subset_keeps_order_through_excluded_units() {
    let mut graph = Graph::new("W", "/w");
    let c = add(&mut graph, "C", Platform::Ios, &[]);
    let b = add(&mut graph, "B", Platform::Ios, &[&c]);
    let a = add(&mut graph, "A", Platform::Ios, &[&b]);

    let subset: BTreeSet<TargetId> = [a.clone(), c.clone()].into_iter().collect();
    let dag = TargetDag::for_targets(&graph, &subset).unwrap();
    assert_eq!(dag.len(), 2);
    assert_eq!(dag.build_order().unwrap(), vec![c.clone(), a.clone()]);
    assert_eq!(dag.dependencies(&a), vec![c]);
    assert!(dag.dependencies(&b).is_empty());
  }

  #[test]
  fn cycles_are_rejected() {
    let mut graph = Graph::new("W", "/w");
    let a = TargetId::new("/w", "A");
    let b = add(&mut graph, "B", Platform::Ios, &[&a]);
    add(&mut graph, "A", Platform::Ios, &[&b]);

    assert!(matches!(
      TargetDag::from_graph(&graph),
      Err(GraphError::CyclicDependency { .. })
    ));
  }

  #[test]
  fn empty_subset_yields_empty_order() {
    let graph = Graph::new("W", "/w");
    let dag = TargetDag::from_graph(&graph).unwrap();
    assert!(dag.is_empty());
    assert!(dag.build_order().unwrap().is_empty());
    assert!(dag.waves().unwrap().is_empty());
  }
}
