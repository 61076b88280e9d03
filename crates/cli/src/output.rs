//! CLI output formatting utilities.
//!
//! Colored status lines go through `owo-colors` and only color when the stream
//! supports it; JSON output is pretty-printed to stdout. Per-unit cache lines
//! share one layout so `warm` and `hash` output lines up.

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const INFO: &str = "•";
}

/// What happened to a single unit during a cache run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
  /// Some backend already had the artifacts.
  Cached,
  /// Built locally because every backend missed.
  Built,
  /// Built and written to at least one backend.
  Stored,
  /// Built but no backend accepted the artifacts.
  Failed,
}

impl CacheStatus {
  pub fn label(self) -> &'static str {
    match self {
      CacheStatus::Cached => "hit",
      CacheStatus::Built => "miss",
      CacheStatus::Stored => "stored",
      CacheStatus::Failed => "failed",
    }
  }

  fn symbol(self) -> &'static str {
    match self {
      CacheStatus::Cached | CacheStatus::Stored => symbols::SUCCESS,
      CacheStatus::Built => symbols::INFO,
      CacheStatus::Failed => symbols::ERROR,
    }
  }
}

/// Uncolored `<label> <name> <detail>` line with the label padded so names align.
pub fn cache_line(status: CacheStatus, name: &str, detail: Option<&str>) -> String {
  match detail {
    Some(detail) => format!("{:<6} {} {}", status.label(), name, detail),
    None => format!("{:<6} {}", status.label(), name),
  }
}

pub fn print_cache_line(status: CacheStatus, name: &str, detail: Option<&str>) {
  let line = cache_line(status, name, detail);
  let symbol = status.symbol();
  match status {
    CacheStatus::Cached | CacheStatus::Stored => {
      println!("{} {}", symbol.if_supports_color(Stream::Stdout, |s| s.green()), line)
    },
    CacheStatus::Built => println!("{} {}", symbol.if_supports_color(Stream::Stdout, |s| s.blue()), line),
    CacheStatus::Failed => eprintln!(
      "{} {}",
      symbol.if_supports_color(Stream::Stderr, |s| s.red()),
      line.if_supports_color(Stream::Stderr, |s| s.red())
    ),
  }
}

pub fn format_duration(duration: Duration) -> String {
  let secs = duration.as_secs();
  let millis = duration.subsec_millis();

  if secs >= 60 {
    let mins = secs / 60;
    let remaining_secs = secs % 60;
    format!("{}m {}s", mins, remaining_secs)
  } else if secs > 0 {
    format!("{}.{:02}s", secs, millis / 10)
  } else {
    format!("{}ms", millis)
  }
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_info(message: &str) {
  println!(
    "{} {}",
    symbols::INFO.if_supports_color(Stream::Stdout, |s| s.blue()),
    message
  );
}

pub fn print_stat(label: &str, value: &str) {
  println!(
    "  {}: {}",
    label.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    value
  );
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}
