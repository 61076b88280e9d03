mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::cmd::ProfileArgs;
use crate::output::{OutputFormat, print_error};

/// bincache - binary cache for native project builds
#[derive(Parser)]
#[command(name = "bincache")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build and store every cacheable target missing from the cache
  Warm {
    /// Workspace directory or description file
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Only warm these targets and their dependencies
    #[arg(long, value_delimiter = ',')]
    targets: Vec<String>,

    /// Warm the dependencies of --targets but not the targets themselves
    #[arg(long, requires = "targets")]
    dependencies_only: bool,

    #[command(flatten)]
    profile: ProfileArgs,

    /// Program used to build schemes
    #[arg(long, default_value = "xcodebuild")]
    build_program: String,

    /// Remote request timeout, e.g. "30s" or "2m"
    #[arg(long, value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t)]
    output: OutputFormat,
  },

  /// Print the fingerprint of every cacheable target
  Hash {
    /// Workspace directory or description file
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Only hash these targets and their dependencies
    #[arg(long, value_delimiter = ',')]
    targets: Vec<String>,

    /// Skip the --targets themselves
    #[arg(long, requires = "targets")]
    dependencies_only: bool,

    /// Build configuration
    #[arg(short, long, default_value = "Debug")]
    configuration: String,

    /// Output format
    #[arg(short, long, value_enum, default_value_t)]
    output: OutputFormat,
  },

  /// Print the cache endpoint, token and local cache directory
  Config {
    /// Workspace directory
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value_t)]
    output: OutputFormat,
  },
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  let result = match cli.command {
    Commands::Warm {
      path,
      targets,
      dependencies_only,
      profile,
      build_program,
      timeout,
      output,
    } => cmd::cmd_warm(cmd::WarmArgs {
      path,
      targets,
      dependencies_only,
      profile,
      build_program,
      timeout,
      output,
    }),
    Commands::Hash {
      path,
      targets,
      dependencies_only,
      configuration,
      output,
    } => cmd::cmd_hash(&path, targets, dependencies_only, configuration, output),
    Commands::Config { path, output } => cmd::cmd_config(&path, output),
  };

  match result {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) => {
      print_error(&format!("{err:#}"));
      ExitCode::FAILURE
    }
  }
}

/// Logs go to stderr. `RUST_LOG` wins over `--verbose`.
fn init_tracing(verbose: bool) {
  let default = if verbose { "debug" } else { "warn" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .with_target(false)
    .without_time()
    .init();
}
