//! CLI smoke tests for bincache.
//!
//! These tests run the binary against small workspace descriptions and check
//! exit codes and output. Nothing here needs the real build toolchain.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serial_test::serial;
use tempfile::TempDir;

const ENV_VARS: [&str; 4] = [
  "BINCACHE_URL",
  "BINCACHE_TOKEN",
  "BINCACHE_CACHE_DIR",
  "BINCACHE_PARALLELISM",
];

/// Get a Command for the bincache binary with a clean cache environment.
fn bincache_cmd(cache: &TempDir) -> Command {
  let mut cmd = cargo_bin_cmd!("bincache");
  for var in ENV_VARS {
    cmd.env_remove(var);
  }
  cmd.env("BINCACHE_CACHE_DIR", cache.path().join("binaries"));
  cmd
}

/// App -> Feature -> Core, all iOS.
const WORKSPACE: &str = r#"{
  "name": "Demo",
  "projects": [
    {
      "path": "Demo",
      "name": "Demo",
      "targets": [
        {
          "name": "App",
          "product": "app",
          "platform": "ios",
          "sources": [{"path": "Sources/App.swift"}],
          "dependencies": [{"type": "target", "name": "Feature"}]
        },
        {
          "name": "Feature",
          "product": "framework",
          "platform": "ios",
          "sources": [{"path": "Sources/Feature.swift"}],
          "dependencies": [{"type": "target", "name": "Core"}]
        },
        {
          "name": "Core",
          "product": "framework",
          "platform": "ios",
          "sources": [{"path": "Sources/Core.swift"}]
        }
      ]
    }
  ]
}"#;

fn workspace() -> TempDir {
  let temp = TempDir::new().unwrap();
  let sources = temp.path().join("Demo/Sources");
  std::fs::create_dir_all(&sources).unwrap();
  for name in ["App", "Feature", "Core"] {
    std::fs::write(sources.join(format!("{name}.swift")), format!("struct {name} {{}}")).unwrap();
  }
  std::fs::write(temp.path().join("workspace.json"), WORKSPACE).unwrap();
  temp
}

// =============================================================================
// Help & Version
// =============================================================================

#[test]
fn help_flag_works() {
  let cache = TempDir::new().unwrap();
  bincache_cmd(&cache)
    .arg("--help")
    .assert()
    .success()
    .stdout(predicate::str::contains("Usage"))
    .stdout(predicate::str::contains("warm"));
}

#[test]
fn version_flag_works() {
  let cache = TempDir::new().unwrap();
  bincache_cmd(&cache)
    .arg("--version")
    .assert()
    .success()
    .stdout(predicate::str::contains("bincache"));
}

#[test]
fn subcommand_help_works() {
  let cache = TempDir::new().unwrap();
  for cmd in &["warm", "hash", "config"] {
    bincache_cmd(&cache)
      .arg(cmd)
      .arg("--help")
      .assert()
      .success()
      .stdout(predicate::str::contains("Usage"));
  }
}

// =============================================================================
// hash
// =============================================================================

#[test]
#[serial]
fn hash_prints_cacheable_targets() {
  let cache = TempDir::new().unwrap();
  let temp = workspace();

  bincache_cmd(&cache)
    .arg("hash")
    .arg(temp.path())
    .assert()
    .success()
    .stdout(predicate::str::contains("Core: "))
    .stdout(predicate::str::contains("Feature: "))
    .stdout(predicate::str::contains("App: ").not());
}

#[test]
#[serial]
fn hash_is_stable_and_configuration_sensitive() {
  let cache = TempDir::new().unwrap();
  let temp = workspace();
  let run = |configuration: &str| -> serde_json::Value {
    let output = bincache_cmd(&cache)
      .args(["hash", "--output", "json", "--configuration", configuration])
      .arg(temp.path())
      .output()
      .unwrap();
    assert!(output.status.success());
    serde_json::from_slice(&output.stdout).unwrap()
  };

  let debug = run("Debug");
  assert_eq!(debug, run("Debug"));
  assert_ne!(debug["Core"], run("Release")["Core"]);
  assert_eq!(debug["Core"].as_str().unwrap().len(), 64);
}

#[test]
#[serial]
fn hash_dependencies_only_skips_named_target() {
  let cache = TempDir::new().unwrap();
  let temp = workspace();

  bincache_cmd(&cache)
    .args(["hash", "--targets", "Feature", "--dependencies-only"])
    .arg(temp.path())
    .assert()
    .success()
    .stdout(predicate::str::contains("Core: "))
    .stdout(predicate::str::contains("Feature: ").not());
}

#[test]
#[serial]
fn hash_rejects_cyclic_workspace() {
  let cache = TempDir::new().unwrap();
  let temp = workspace();
  let cyclic = WORKSPACE.replacen(
    r#""sources": [{"path": "Sources/Core.swift"}]"#,
    r#""sources": [{"path": "Sources/Core.swift"}], "dependencies": [{"type": "target", "name": "Feature"}]"#,
    1,
  );
  std::fs::write(temp.path().join("workspace.json"), cyclic).unwrap();

  bincache_cmd(&cache)
    .arg("hash")
    .arg(temp.path())
    .assert()
    .failure()
    .stderr(predicate::str::contains("✗"))
    .stderr(predicate::str::contains("cycle"));
}

// =============================================================================
// warm
// =============================================================================

#[test]
#[serial]
fn warm_nonexistent_path_fails() {
  let cache = TempDir::new().unwrap();

  bincache_cmd(&cache)
    .arg("warm")
    .arg("/nonexistent/path/workspace")
    .assert()
    .failure()
    .code(1)
    .stderr(predicate::str::contains("Path not found"));
}

#[test]
#[serial]
fn warm_reports_build_failure() {
  let cache = TempDir::new().unwrap();
  let temp = workspace();

  bincache_cmd(&cache)
    .args(["warm", "--build-program", "bincache-test-missing-build-program"])
    .arg(temp.path())
    .assert()
    .failure()
    .code(1)
    .stderr(predicate::str::contains("build stage failed"));
}

#[test]
#[serial]
fn warm_unknown_target_fails() {
  let cache = TempDir::new().unwrap();
  let temp = workspace();

  bincache_cmd(&cache)
    .args(["warm", "--targets", "Missing"])
    .arg(temp.path())
    .assert()
    .failure()
    .stderr(predicate::str::contains("unknown targets: Missing"));
}

#[test]
#[serial]
fn warm_with_nothing_cacheable_succeeds() {
  let cache = TempDir::new().unwrap();
  let temp = workspace();

  bincache_cmd(&cache)
    .args(["warm", "--targets", "Core", "--dependencies-only"])
    .arg(temp.path())
    .assert()
    .success()
    .stdout(predicate::str::contains("already cached"));
}

// =============================================================================
// config
// =============================================================================

#[test]
#[serial]
fn config_reads_settings_file() {
  let cache = TempDir::new().unwrap();
  let temp = TempDir::new().unwrap();
  std::fs::write(
    temp.path().join("bincache.toml"),
    "url = \"https://cache.example.com\"\ntoken = \"abc123\"\n",
  )
  .unwrap();

  let output = bincache_cmd(&cache)
    .args(["config", "--output", "json"])
    .arg(temp.path())
    .output()
    .unwrap();
  assert!(output.status.success());

  let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(json["url"], "https://cache.example.com");
  assert_eq!(json["token"], "abc123");
  assert_eq!(
    json["cache_dir"].as_str().unwrap(),
    cache.path().join("binaries").to_str().unwrap()
  );
}

#[test]
#[serial]
fn config_environment_overrides_file() {
  let cache = TempDir::new().unwrap();
  let temp = TempDir::new().unwrap();
  std::fs::write(temp.path().join("bincache.toml"), "url = \"https://file.example.com\"\n").unwrap();

  bincache_cmd(&cache)
    .arg("config")
    .arg(temp.path())
    .env("BINCACHE_URL", "https://env.example.com")
    .assert()
    .success()
    .stdout(predicate::str::contains("https://env.example.com"));
}

#[test]
#[serial]
fn config_rejects_malformed_settings() {
  let cache = TempDir::new().unwrap();
  let temp = TempDir::new().unwrap();
  std::fs::write(temp.path().join("bincache.toml"), "url = [").unwrap();

  bincache_cmd(&cache)
    .arg("config")
    .arg(temp.path())
    .assert()
    .failure()
    .stderr(predicate::str::contains("invalid settings file"));
}
