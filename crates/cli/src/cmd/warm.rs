//! Implementation of the `bincache warm` command.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::info;

use bincache_lib::cache::{CacheOptions, CacheReport, CacheWarmer, CommandBuilder};
use bincache_lib::config::Settings;
use bincache_lib::graph::TargetId;

use super::{ProfileArgs, load_graph};
use crate::output::{
  CacheStatus, OutputFormat, format_duration, print_cache_line, print_info, print_json, print_stat, print_success,
};

pub struct WarmArgs {
  pub path: PathBuf,
  pub targets: Vec<String>,
  pub dependencies_only: bool,
  pub profile: ProfileArgs,
  pub build_program: String,
  pub timeout: Option<Duration>,
  pub output: OutputFormat,
}

/// Hashes the workspace, builds whatever the cache is missing, and stores it.
///
/// Store failures are reported but do not fail the command; build and graph
/// errors do.
pub fn cmd_warm(args: WarmArgs) -> Result<()> {
  let start = Instant::now();

  let graph = load_graph(&args.path)?;
  let mut settings = Settings::load(&graph.path).context("Failed to load settings")?;
  if let Some(timeout) = args.timeout {
    settings.timeout = timeout;
  }
  info!(cache_dir = %settings.cache_dir.display(), remote = settings.url.is_some(), "using cache");

  let storage = Arc::new(settings.storage_chain().context("Failed to configure cache storage")?);
  let workspace = graph.path.join(format!("{}.xcworkspace", graph.name));
  let builder = Arc::new(CommandBuilder::new(workspace).with_program(args.build_program));
  let warmer = CacheWarmer::new(storage, builder, settings.cache_config());

  let options = CacheOptions {
    targets: args.targets.into_iter().collect(),
    dependencies_only: args.dependencies_only,
    profile: args.profile.into(),
  };

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let report = rt.block_on(warmer.warm(graph, &options)).context("Cache warming failed")?;

  if args.output.is_json() {
    print_json(&report_json(&report))?;
  } else {
    print_report(&report, start.elapsed());
  }
  Ok(())
}

fn print_report(report: &CacheReport, elapsed: Duration) {
  for (id, status) in unit_statuses(report) {
    let hash = report.fingerprints.get(id).map(|hash| hash.to_string());
    print_cache_line(status, &id.name, hash.as_deref());
  }
  for (id, reason) in &report.store_failures {
    print_cache_line(CacheStatus::Failed, &id.name, Some(reason));
  }

  println!();
  if report.built.is_empty() {
    print_info("All cacheable targets are already cached");
  } else {
    print_success("Cache warmed!");
  }
  print_stat("Hashed", &report.fingerprints.len().to_string());
  print_stat("Already cached", &report.cached.len().to_string());
  print_stat("Built", &report.built.len().to_string());
  print_stat("Stored", &report.stored.len().to_string());
  print_stat("Duration", &format_duration(elapsed));
}

/// Cache hits, then built units in build order; a built unit that was stored
/// reports as stored. Store failures are listed separately with their reason.
fn unit_statuses(report: &CacheReport) -> Vec<(&TargetId, CacheStatus)> {
  let failed: Vec<&TargetId> = report.store_failures.iter().map(|(id, _)| id).collect();
  let cached = report.cached.iter().map(|id| (id, CacheStatus::Cached));
  let built = report
    .built
    .iter()
    .filter(|id| !failed.contains(id))
    .map(|id| {
      let status = if report.stored.contains(id) {
        CacheStatus::Stored
      } else {
        CacheStatus::Built
      };
      (id, status)
    });
  cached.chain(built).collect()
}

fn report_json(report: &CacheReport) -> serde_json::Value {
  let fingerprints: serde_json::Map<String, serde_json::Value> = report
    .fingerprints
    .iter()
    .map(|(id, hash)| (id.name.clone(), serde_json::Value::String(hash.to_string())))
    .collect();
  let failures: Vec<serde_json::Value> = report
    .store_failures
    .iter()
    .map(|(id, reason)| serde_json::json!({ "target": id.name, "error": reason }))
    .collect();

  serde_json::json!({
    "stage": report.stage,
    "fingerprints": fingerprints,
    "cached": names(&report.cached),
    "built": names(&report.built),
    "stored": names(&report.stored),
    "store_failures": failures,
  })
}

fn names<'a>(ids: impl IntoIterator<Item = &'a TargetId>) -> Vec<String> {
  ids.into_iter().map(|id| id.name.clone()).collect()
}
