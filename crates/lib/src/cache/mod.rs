//! Cache warming.
//!
//! A run moves through [`Stage`]s in order:
//!
//! 1. Hashing: focus and prune the graph, then fingerprint every cacheable unit
//! 2. Diffing: ask the storage for each fingerprint, concurrently
//! 3. Building: build the misses in dependency order, one scheme per platform run
//! 4. Storing: store each group's artifacts as soon as that group has built
//!
//! A build failure stops the run. Stores already started are awaited and kept.

mod builder;
mod types;

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::graph::dag::TargetDag;
use crate::graph::{Graph, GraphDependency, TargetId};
use crate::hash::{ContentHash, GraphContentHasher, HashContext};
use crate::mapper::{
  FocusTargetsGraphMapper, GraphMapping, SequentialGraphMapper, SideEffect, TargetsToBinariesGraphMapper,
  TreeShakePrunedTargetsGraphMapper,
};
use crate::metadata::PrecompiledLoading;
use crate::storage::{CacheItem, CacheStoring, StorageError, find_artifacts};

pub use builder::{BuildError, BuildGroup, CommandBuilder, TargetBuilding};
pub use types::{BuildProfile, CacheConfig, CacheError, CacheOptions, CacheReport, Stage};

/// Drives a cache run over a graph.
///
/// Generic over the storage and the build collaborator so tests can swap either.
pub struct CacheWarmer<S, B> {
  /// Where fingerprints are looked up and artifacts stored; shared by every task.
  storage: Arc<S>,
  /// Builds one scheme group at a time.
  builder: Arc<B>,
  /// Bounds the concurrent existence checks, fetches and stores.
  config: CacheConfig,
  /// Extra fingerprint inputs, see [`CacheWarmer::with_additional_strings`].
  additional_strings: Vec<String>,
}

impl<S, B> CacheWarmer<S, B>
where
  S: CacheStoring + 'static,
  B: TargetBuilding + 'static,
{
  /// Creates a warmer with no additional fingerprint inputs.
  pub fn new(storage: Arc<S>, builder: Arc<B>, config: CacheConfig) -> Self {
    Self {
      storage,
      builder,
      config,
      additional_strings: Vec::new(),
    }
  }

  /// Toolchain version markers mixed into every fingerprint.
  ///
  /// Replaces any markers set before. Changing them changes every fingerprint, so
  /// artifacts built by another toolchain are never reused.
  pub fn with_additional_strings(mut self, strings: impl IntoIterator<Item = impl Into<String>>) -> Self {
    self.additional_strings = strings.into_iter().map(Into::into).collect();
    self
  }

  /// Fingerprints of the units a warm run with `options` would consider.
  pub async fn hashes(&self, graph: Graph, options: &CacheOptions) -> Result<BTreeMap<TargetId, ContentHash>, CacheError> {
    info!(stage = %Stage::Hashing, targets = graph.len(), "hashing targets");
    let (_, fingerprints) = self.fingerprint(graph, options).await?;
    Ok(fingerprints)
  }

  /// Makes sure every cacheable unit has an entry in the storage.
  pub async fn warm(&self, graph: Graph, options: &CacheOptions) -> Result<CacheReport, CacheError> {
    let mut report = CacheReport::default();

    info!(stage = %report.stage, targets = graph.len(), "hashing targets");
    let (graph, fingerprints) = self.fingerprint(graph, options).await?;
    report.fingerprints = fingerprints;

    report.stage = Stage::Diffing;
    info!(stage = %report.stage, hashed = report.fingerprints.len(), "checking cache");
    let items = cache_items(&graph, &report.fingerprints);
    let missing = self.diff(&items).await?;
    report.cached = items.keys().filter(|id| !missing.contains(*id)).cloned().collect();
    if missing.is_empty() {
      report.stage = Stage::Done;
      info!(cached = report.cached.len(), "all targets cached, nothing to build");
      return Ok(report);
    }

    report.stage = Stage::Building;
    let order = TargetDag::for_targets(&graph, &missing)?.build_order()?;
    let groups = build_groups(&graph, order);
    info!(
      stage = %report.stage,
      targets = missing.len(),
      cached = report.cached.len(),
      groups = groups.len(),
      "building missing targets"
    );

    let semaphore = Arc::new(Semaphore::new(self.config.parallelism.max(1)));
    let mut stores: JoinSet<(TargetId, Result<(), StorageError>)> = JoinSet::new();
    for group in groups {
      let output = Arc::new(
        tokio::task::spawn_blocking(TempDir::new)
          .await
          .map_err(|err| CacheError::Task(err.to_string()))??,
      );
      if let Err(source) = self.builder.build(&group, &options.profile, output.path()).await {
        report.stage = Stage::Failed;
        error!(scheme = %group.scheme, targets = ?group.target_names(), error = %source, "build failed");
        collect_stores(stores, &mut report).await;
        return Err(CacheError::Build {
          scheme: group.scheme.clone(),
          targets: group.target_names(),
          source,
        });
      }

      for id in group.targets {
        let Some(item) = items.get(&id).cloned() else {
          continue;
        };
        report.built.push(id.clone());
        let storage = Arc::clone(&self.storage);
        let output = Arc::clone(&output);
        let semaphore = Arc::clone(&semaphore);
        stores.spawn(async move {
          let _permit = semaphore.acquire().await.ok();
          let result = store_artifacts(storage.as_ref(), &item, output.path()).await;
          (id, result)
        });
      }
    }

    report.stage = Stage::Storing;
    info!(stage = %report.stage, pending = stores.len(), "storing built artifacts");
    collect_stores(stores, &mut report).await;

    report.stage = Stage::Done;
    info!(
      built = report.built.len(),
      stored = report.stored.len(),
      failures = report.store_failures.len(),
      "cache warmed"
    );
    Ok(report)
  }

  /// Fetches every available artifact and rewrites the graph to link artifacts
  /// instead of building their units.
  pub async fn binary_graph(
    &self,
    graph: Graph,
    options: &CacheOptions,
    loader: Arc<dyn PrecompiledLoading>,
  ) -> Result<(Graph, Vec<SideEffect>), CacheError> {
    let (graph, fingerprints) = self.fingerprint(graph, options).await?;
    let items = cache_items(&graph, &fingerprints);

    let semaphore = Arc::new(Semaphore::new(self.config.parallelism.max(1)));
    let mut fetches = JoinSet::new();
    for (id, item) in items {
      let storage = Arc::clone(&self.storage);
      let semaphore = Arc::clone(&semaphore);
      fetches.spawn(async move {
        let _permit = semaphore.acquire().await.ok();
        let result = storage.fetch(&item).await;
        (id, result)
      });
    }

    let mut fetched: Vec<(TargetId, PathBuf)> = Vec::new();
    while let Some(joined) = fetches.join_next().await {
      match joined.map_err(|err| CacheError::Task(err.to_string()))? {
        (id, Ok(paths)) => {
          if let Some(path) = preferred_artifact(&paths) {
            fetched.push((id, path.to_path_buf()));
          }
        }
        (id, Err(err)) => debug!(target = %id, error = %err, "no cached artifact"),
      }
    }

    let artifacts = tokio::task::spawn_blocking(move || {
      fetched
        .into_iter()
        .filter_map(|(id, path)| match loader.load(&path) {
          Ok(node) => Some((id, node)),
          Err(err) => {
            warn!(target = %id, path = %path.display(), error = %err, "skipping unreadable artifact");
            None
          }
        })
        .collect::<BTreeMap<TargetId, GraphDependency>>()
    })
    .await
    .map_err(|err| CacheError::Task(err.to_string()))?;

    info!(artifacts = artifacts.len(), "replacing cached targets with binaries");
    let pipeline = SequentialGraphMapper::default()
      .push(TargetsToBinariesGraphMapper::new(artifacts))
      .push(TreeShakePrunedTargetsGraphMapper);
    Ok(pipeline.map(graph)?)
  }

  /// Focuses and prunes the graph, then fingerprints it off the async runtime.
  async fn fingerprint(
    &self,
    graph: Graph,
    options: &CacheOptions,
  ) -> Result<(Graph, BTreeMap<TargetId, ContentHash>), CacheError> {
    let pipeline = SequentialGraphMapper::default()
      .push(FocusTargetsGraphMapper::new(options.targets.iter().cloned()))
      .push(TreeShakePrunedTargetsGraphMapper);
    let (graph, _) = pipeline.map(graph)?;

    let excluded: BTreeSet<TargetId> = if options.dependencies_only {
      graph
        .targets()
        .filter(|(id, _)| options.targets.contains(&id.name))
        .map(|(id, _)| id.clone())
        .collect()
    } else {
      BTreeSet::new()
    };
    let context = HashContext {
      configuration: options.profile.configuration.clone(),
      additional_strings: self.additional_strings.clone(),
    };

    let (graph, fingerprints) = tokio::task::spawn_blocking(move || {
      let fingerprints = GraphContentHasher::new().fingerprints(&graph, &context, &excluded);
      (graph, fingerprints)
    })
    .await
    .map_err(|err| CacheError::Task(err.to_string()))?;
    Ok((graph, fingerprints?))
  }

  /// Units whose fingerprint is not in the storage.
  async fn diff(&self, items: &BTreeMap<TargetId, CacheItem>) -> Result<BTreeSet<TargetId>, CacheError> {
    let semaphore = Arc::new(Semaphore::new(self.config.parallelism.max(1)));
    let mut checks = JoinSet::new();
    for (id, item) in items {
      let (id, item) = (id.clone(), item.clone());
      let storage = Arc::clone(&self.storage);
      let semaphore = Arc::clone(&semaphore);
      checks.spawn(async move {
        let _permit = semaphore.acquire().await.ok();
        let result = storage.exists(&item).await;
        (id, result)
      });
    }

    let mut missing = BTreeSet::new();
    while let Some(joined) = checks.join_next().await {
      match joined.map_err(|err| CacheError::Task(err.to_string()))? {
        (id, Ok(true)) => debug!(target = %id, "cached"),
        (id, Ok(false)) => {
          debug!(target = %id, "not cached");
          missing.insert(id);
        }
        (target, Err(source)) => {
          return Err(CacheError::Storage {
            stage: Stage::Diffing,
            target,
            source,
          });
        }
      }
    }
    Ok(missing)
  }
}

/// Storage keys for every fingerprinted unit still in the graph.
fn cache_items(graph: &Graph, fingerprints: &BTreeMap<TargetId, ContentHash>) -> BTreeMap<TargetId, CacheItem> {
  fingerprints
    .iter()
    .filter_map(|(id, hash)| {
      let target = graph.target(id)?;
      Some((id.clone(), CacheItem::new(target.product_name(), hash.clone())))
    })
    .collect()
}

/// Splits a build order into runs of units sharing a platform.
fn build_groups(graph: &Graph, order: Vec<TargetId>) -> Vec<BuildGroup> {
  let mut groups: Vec<BuildGroup> = Vec::new();
  for id in order {
    let Some(platform) = graph.target(&id).map(|target| target.platform) else {
      continue;
    };
    match groups.last_mut() {
      Some(group) if group.platform == platform => group.targets.push(id),
      _ => groups.push(BuildGroup::new(&graph.name, platform, vec![id])),
    }
  }
  groups
}

/// Stores the artifacts of `item` found in a group's build output.
async fn store_artifacts<S: CacheStoring>(storage: &S, item: &CacheItem, output: &Path) -> Result<(), StorageError> {
  let (output, name) = (output.to_path_buf(), item.name.clone());
  let paths = tokio::task::spawn_blocking(move || find_artifacts(&output, &name)).await??;
  if paths.is_empty() {
    return Err(StorageError::NotFound {
      name: item.name.clone(),
      hash: item.hash.clone(),
    });
  }
  storage.store(item, &paths).await
}

async fn collect_stores(mut stores: JoinSet<(TargetId, Result<(), StorageError>)>, report: &mut CacheReport) {
  while let Some(joined) = stores.join_next().await {
    match joined {
      Ok((id, Ok(()))) => {
        debug!(target = %id, "stored artifacts");
        report.stored.insert(id);
      }
      Ok((id, Err(err))) => {
        warn!(target = %id, error = %err, "failed to store artifacts");
        report.store_failures.push((id, err.to_string()));
      }
      Err(err) => error!(error = %err, "store task panicked"),
    }
  }
}

/// An xcframework covers every platform slice, so it wins over a plain framework.
fn preferred_artifact(paths: &[PathBuf]) -> Option<&Path> {
  paths
    .iter()
    .find(|path| path.extension().is_some_and(|ext| ext == "xcframework"))
    .or_else(|| paths.first())
    .map(PathBuf::as_path)
}
