//! Fingerprints for every hashable unit of a graph.

use std::collections::{BTreeMap, BTreeSet};

use rayon::prelude::*;
use tracing::{debug, info};

use super::HashError;
use super::content::{ContentHash, ContentHasher};
use super::target::{HashContext, TargetContentHash, TargetContentHasher};
use crate::graph::dag::TargetDag;
use crate::graph::{Graph, TargetId};

/// Hashes a graph wave by wave; units within a wave are hashed in parallel.
///
/// A unit is only hashed once every build-unit dependency has a fingerprint,
/// since dependency fingerprints feed into its own.
#[derive(Debug, Default)]
pub struct GraphContentHasher {
  /// File and folder hashes shared by every unit, so files referenced by
  /// several units are read once.
  content: ContentHasher,
}

impl GraphContentHasher {
  /// Creates a hasher with an empty file memo.
  pub fn new() -> Self {
    Self::default()
  }

  /// Units that can be fingerprinted.
  ///
  /// A unit qualifies when its product is cacheable, it is not excluded or
  /// pruned, and every direct build-unit dependency qualifies too.
  pub fn hashable_targets(graph: &Graph, excluded: &BTreeSet<TargetId>) -> Result<BTreeSet<TargetId>, HashError> {
    let mut hashable = BTreeSet::new();
    for id in TargetDag::from_graph(graph)?.build_order()? {
      let Some(target) = graph.target(&id) else { continue };
      let qualifies = target.product.is_cacheable()
        && !target.prune
        && !excluded.contains(&id)
        && graph
          .direct_target_dependencies(&id)
          .iter()
          .all(|dependency| hashable.contains(dependency));
      if qualifies {
        hashable.insert(id);
      }
    }
    Ok(hashable)
  }

  /// Full hash details per unit.
  ///
  /// Only units accepted by [`Self::hashable_targets`] appear in the result.
  /// Fails on the first unit that cannot be hashed, naming that unit.
  pub fn content_hashes(
    &self,
    graph: &Graph,
    context: &HashContext,
    excluded: &BTreeSet<TargetId>,
  ) -> Result<BTreeMap<TargetId, TargetContentHash>, HashError> {
    let hashable = Self::hashable_targets(graph, excluded)?;
    let dag = TargetDag::for_targets(graph, &hashable)?;
    let hasher = TargetContentHasher::new(&self.content);

    let mut fingerprints: BTreeMap<TargetId, ContentHash> = BTreeMap::new();
    let mut hashes = BTreeMap::new();
    for (index, wave) in dag.waves()?.into_iter().enumerate() {
      debug!(wave = index, targets = wave.len(), "hashing wave");
      let results: Vec<(TargetId, Result<TargetContentHash, HashError>)> = wave
        .into_par_iter()
        .map(|id| {
          let result = match graph.target(&id) {
            Some(target) => hasher.hash(&id, target, graph.target_dependencies(&id), &fingerprints, context),
            None => Err(HashError::Graph(crate::graph::GraphError::UnknownTarget(id.clone()))),
          };
          (id, result)
        })
        .collect();

      for (id, result) in results {
        let hash = result.map_err(|source| HashError::Target {
          target: id.clone(),
          source: Box::new(source),
        })?;
        debug!(target = %id, hash = %hash.hash, "hashed target");
        fingerprints.insert(id.clone(), hash.hash.clone());
        hashes.insert(id, hash);
      }
    }

    info!(hashed = hashes.len(), files = self.content.memoized(), "computed content hashes");
    Ok(hashes)
  }

  /// Fingerprint per unit, without the per-input breakdown.
  pub fn fingerprints(
    &self,
    graph: &Graph,
    context: &HashContext,
    excluded: &BTreeSet<TargetId>,
  ) -> Result<BTreeMap<TargetId, ContentHash>, HashError> {
    Ok(
      self
        .content_hashes(graph, context, excluded)?
        .into_iter()
        .map(|(id, hash)| (id, hash.hash))
        .collect(),
    )
  }
}

#[cfg(test)]
mod tests {
  use std::fs;
  use std::path::Path;

  use proptest::prelude::*;

  use super::*;
  use crate::graph::{GraphDependency, Product, SourceFile, Target};
  use crate::platform::Platform;

  fn unit(root: &Path, name: &str, product: Product, sources: &[&str]) -> Target {
    let mut target = Target::new(name, product, Platform::Ios);
    target.sources = sources.iter().map(|source| SourceFile::new(root.join(source))).collect();
    target
  }

  /// App -> Feature -> Core, plus a test bundle on Core.
  fn layered(root: &Path) -> (Graph, TargetId, TargetId, TargetId) {
    for (file, content) in [("app.swift", "app"), ("feature.swift", "feature"), ("core.swift", "core")] {
      fs::write(root.join(file), content).unwrap();
    }
    let mut graph = Graph::new("W", root);
    let app = TargetId::new(root, "App");
    let feature = TargetId::new(root, "Feature");
    let core = TargetId::new(root, "Core");
    let tests = TargetId::new(root, "CoreTests");
    graph
      .add_target(core.clone(), unit(root, "Core", Product::Framework, &["core.swift"]))
      .unwrap();
    graph
      .add_target(feature.clone(), unit(root, "Feature", Product::StaticFramework, &["feature.swift"]))
      .unwrap();
    graph
      .add_target(app.clone(), unit(root, "App", Product::App, &["app.swift"]))
      .unwrap();
    graph
      .add_target(tests.clone(), unit(root, "CoreTests", Product::UnitTests, &[]))
      .unwrap();
    graph.set_dependencies(GraphDependency::target(&app), vec![GraphDependency::target(&feature)]);
    graph.set_dependencies(GraphDependency::target(&feature), vec![GraphDependency::target(&core)]);
    graph.set_dependencies(GraphDependency::target(&tests), vec![GraphDependency::target(&core)]);
    (graph, app, feature, core)
  }

  #[test]
  fn only_cacheable_units_are_hashed() {
    let temp = tempfile::tempdir().unwrap();
    let (graph, app, feature, core) = layered(temp.path());

    let hashes = GraphContentHasher::new()
      .fingerprints(&graph, &HashContext::new("Debug"), &BTreeSet::new())
      .unwrap();
    assert_eq!(hashes.len(), 2);
    assert!(hashes.contains_key(&feature));
    assert!(hashes.contains_key(&core));
    assert!(!hashes.contains_key(&app));
  }

  #[test]
  fn exclusion_propagates_to_dependents() {
    let temp = tempfile::tempdir().unwrap();
    let (graph, _, feature, core) = layered(temp.path());

    let excluded: BTreeSet<TargetId> = [core.clone()].into_iter().collect();
    let hashable = GraphContentHasher::hashable_targets(&graph, &excluded).unwrap();
    assert!(!hashable.contains(&core));
    assert!(!hashable.contains(&feature));
  }

  #[test]
  fn dependency_change_propagates() {
    let temp = tempfile::tempdir().unwrap();
    let (graph, _, feature, core) = layered(temp.path());
    let context = HashContext::new("Debug");

    let before = GraphContentHasher::new()
      .fingerprints(&graph, &context, &BTreeSet::new())
      .unwrap();
    fs::write(temp.path().join("core.swift"), "core v2").unwrap();
    let after = GraphContentHasher::new()
      .fingerprints(&graph, &context, &BTreeSet::new())
      .unwrap();

    assert_ne!(before[&core], after[&core]);
    assert_ne!(before[&feature], after[&feature]);
  }

  #[test]
  fn same_sources_in_different_projects_hash_equal() {
    let temp = tempfile::tempdir().unwrap();
    fs::write(temp.path().join("a.swift"), "a").unwrap();
    fs::write(temp.path().join("b.swift"), "b").unwrap();

    let mut graph = Graph::new("W", temp.path());
    let first = TargetId::new("/p1", "Core");
    let second = TargetId::new("/p2", "Core");
    graph
      .add_target(first.clone(), unit(temp.path(), "Core", Product::Framework, &["a.swift", "b.swift"]))
      .unwrap();
    graph
      .add_target(second.clone(), unit(temp.path(), "Core", Product::Framework, &["b.swift", "a.swift"]))
      .unwrap();

    let hashes = GraphContentHasher::new()
      .fingerprints(&graph, &HashContext::new("Debug"), &BTreeSet::new())
      .unwrap();
    assert_eq!(hashes[&first], hashes[&second]);
  }

  #[test]
  fn missing_source_names_the_target() {
    let mut graph = Graph::new("W", "/w");
    let id = TargetId::new("/w", "Core");
    graph
      .add_target(id, unit(Path::new("/nonexistent"), "Core", Product::Framework, &["a.swift"]))
      .unwrap();

    let err = GraphContentHasher::new()
      .fingerprints(&graph, &HashContext::new("Debug"), &BTreeSet::new())
      .unwrap_err();
    assert!(matches!(err, HashError::Target { ref target, .. } if target.name == "Core"));
  }

  proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn hashing_is_deterministic_and_order_independent(
      contents in prop::collection::vec("[a-z]{0,16}", 1..6),
      seed in any::<u64>(),
    ) {
      let temp = tempfile::tempdir().unwrap();
      let mut names = Vec::new();
      for (index, content) in contents.iter().enumerate() {
        let name = format!("f{index}.swift");
        fs::write(temp.path().join(&name), content).unwrap();
        names.push(name);
      }
      let mut shuffled = names.clone();
      let len = shuffled.len();
      shuffled.rotate_left((seed as usize) % len);
      if seed % 2 == 0 {
        shuffled.reverse();
      }

      let build = |order: &[String]| {
        let mut graph = Graph::new("W", temp.path());
        let refs: Vec<&str> = order.iter().map(String::as_str).collect();
        graph
          .add_target(TargetId::new("/p", "Core"), unit(temp.path(), "Core", Product::Framework, &refs))
          .unwrap();
        GraphContentHasher::new()
          .fingerprints(&graph, &HashContext::new("Debug"), &BTreeSet::new())
          .unwrap()
      };

      let first = build(&names);
      let again = build(&names);
      let reordered = build(&shuffled);
      prop_assert_eq!(&first, &again);
      prop_assert_eq!(&first, &reordered);
    }
  }
}
