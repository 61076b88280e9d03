mod config;
mod hash;
mod warm;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

use bincache_lib::cache::BuildProfile;
use bincache_lib::graph::Graph;
use bincache_lib::graph::loader::GraphLoader;
use bincache_lib::metadata::{PrecompiledLoader, SystemFrameworkMetadataProvider, ToolProbe};
use bincache_lib::project::load_workspace;

pub use config::cmd_config;
pub use hash::cmd_hash;
pub use warm::{WarmArgs, cmd_warm};

/// Build profile flags shared by commands that build.
#[derive(Debug, Clone, Args)]
pub struct ProfileArgs {
  /// Build configuration
  #[arg(short, long, default_value = "Debug")]
  pub configuration: String,

  /// OS version of the simulator to build for
  #[arg(long = "os")]
  pub os_version: Option<String>,

  /// Simulator device name to build for
  #[arg(long)]
  pub device: Option<String>,
}

impl From<ProfileArgs> for BuildProfile {
  fn from(args: ProfileArgs) -> Self {
    BuildProfile {
      configuration: args.configuration,
      os_version: args.os_version,
      device: args.device,
    }
  }
}

/// Reads the workspace description at `path` and resolves its dependency graph.
pub(crate) fn load_graph(path: &Path) -> Result<Graph> {
  let path = dunce::canonicalize(path).with_context(|| format!("Path not found: {}", path.display()))?;
  let workspace = load_workspace(&path).context("Failed to load workspace")?;
  let loader = PrecompiledLoader::new(ToolProbe::default());
  GraphLoader::new(&loader, SystemFrameworkMetadataProvider::default())
    .load(&workspace)
    .context("Failed to load dependency graph")
}
