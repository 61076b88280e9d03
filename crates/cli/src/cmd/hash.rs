use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use bincache_lib::cache::{BuildProfile, CacheConfig, CacheOptions, CacheWarmer, CommandBuilder};
use bincache_lib::storage::{CacheBackend, CacheStorageChain};

use super::load_graph;
use crate::output::{OutputFormat, print_info, print_json};

/// Prints `Target: fingerprint` for every cacheable target. Nothing is built or fetched.
pub fn cmd_hash(
  path: &Path,
  targets: Vec<String>,
  dependencies_only: bool,
  configuration: String,
  output: OutputFormat,
) -> Result<()> {
  let graph = load_graph(path)?;
  let builder = Arc::new(CommandBuilder::new(&graph.path));
  let storage = Arc::new(CacheStorageChain::<CacheBackend>::new(Vec::new()));
  let warmer = CacheWarmer::new(storage, builder, CacheConfig::default());
  let options = CacheOptions {
    targets: targets.into_iter().collect(),
    dependencies_only,
    profile: BuildProfile {
      configuration,
      ..Default::default()
    },
  };

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let fingerprints = rt.block_on(warmer.hashes(graph, &options)).context("Hashing failed")?;

  let mut lines: Vec<(String, String)> = fingerprints
    .into_iter()
    .map(|(id, hash)| (id.name, hash.to_string()))
    .collect();
  lines.sort();

  if output.is_json() {
    let map: serde_json::Map<String, serde_json::Value> = lines
      .into_iter()
      .map(|(name, hash)| (name, serde_json::Value::String(hash)))
      .collect();
    print_json(&map)?;
  } else if lines.is_empty() {
    print_info("No cacheable targets");
  } else {
    for (name, hash) in lines {
      println!("{name}: {hash}");
    }
  }
  Ok(())
}
