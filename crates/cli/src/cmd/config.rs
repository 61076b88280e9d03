use std::path::Path;

use anyhow::{Context, Result};

use bincache_lib::config::Settings;

use crate::output::{OutputFormat, print_json, print_stat};

/// Prints the effective cache settings for the workspace in `path`.
pub fn cmd_config(path: &Path, output: OutputFormat) -> Result<()> {
  let path = dunce::canonicalize(path).with_context(|| format!("Path not found: {}", path.display()))?;
  let dir = if path.is_dir() {
    path.as_path()
  } else {
    path.parent().unwrap_or(Path::new("."))
  };
  let settings = Settings::load(dir).context("Failed to load settings")?;

  if output.is_json() {
    print_json(&serde_json::json!({
      "url": settings.url,
      "token": settings.token,
      "cache_dir": settings.cache_dir,
      "parallelism": settings.parallelism,
      "timeout_secs": settings.timeout.as_secs(),
    }))?;
  } else {
    print_stat("Endpoint", settings.url.as_deref().unwrap_or("(local only)"));
    print_stat("Token", settings.token.as_deref().unwrap_or("(none)"));
    print_stat("Cache directory", &settings.cache_dir.display().to_string());
    print_stat("Parallelism", &settings.parallelism.to_string());
  }
  Ok(())
}
