use crate::consts::{APP_NAME, CACHE_DIR_ENV};
use std::path::PathBuf;

/// Returns the user's home directory
#[cfg(windows)]
pub fn home_dir() -> PathBuf {
  std::env::var("USERPROFILE")
    .map(PathBuf::from)
    .unwrap_or_else(|_| std::env::temp_dir())
}

/// Returns the user's home directory
#[cfg(not(windows))]
pub fn home_dir() -> PathBuf {
  std::env::var("HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| std::env::temp_dir())
}

/// Returns the directory for cache files for the application
#[cfg(windows)]
pub fn cache_dir() -> PathBuf {
  std::env::var("LOCALAPPDATA")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir())
    .join(APP_NAME)
    .join("Cache")
}

/// Returns the directory for cache files for the application
#[cfg(not(windows))]
pub fn cache_dir() -> PathBuf {
  let cache_home = std::env::var("XDG_CACHE_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".cache"));
  cache_home.join(APP_NAME)
}

/// Returns the root of the local binary cache.
///
/// `BINCACHE_CACHE_DIR` overrides the platform default.
pub fn binaries_cache_dir() -> PathBuf {
  if let Ok(path) = std::env::var(CACHE_DIR_ENV) {
    return PathBuf::from(path);
  }
  cache_dir().join("binaries")
}

#[cfg(test)]
#[cfg(not(windows))]
mod tests {
  use super::*;
  use serial_test::serial;

  #[test]
  #[serial]
  fn xdg_cache_home_takes_precedence() {
    temp_env::with_vars(
      [
        ("XDG_CACHE_HOME", Some("/custom/cache")),
        ("HOME", Some("/home/user")),
        (CACHE_DIR_ENV, None),
      ],
      || {
        assert_eq!(cache_dir(), PathBuf::from("/custom/cache").join(APP_NAME));
        assert_eq!(
          binaries_cache_dir(),
          PathBuf::from("/custom/cache").join(APP_NAME).join("binaries")
        );
      },
    );
  }

  #[test]
  #[serial]
  fn xdg_fallback_to_home_directory() {
    temp_env::with_vars(
      [("XDG_CACHE_HOME", None::<&str>), ("HOME", Some("/home/user"))],
      || {
        assert_eq!(cache_dir(), PathBuf::from("/home/user/.cache").join(APP_NAME));
      },
    );
  }

  #[test]
  #[serial]
  fn cache_dir_env_overrides_default() {
    temp_env::with_vars([(CACHE_DIR_ENV, Some("/tmp/bincache-test"))], || {
      assert_eq!(binaries_cache_dir(), PathBuf::from("/tmp/bincache-test"));
    });
  }
}
