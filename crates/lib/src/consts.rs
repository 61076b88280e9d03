//! Crate-wide constants.

pub const APP_NAME: &str = "bincache";

/// Version marker mixed into every fingerprint. Bump when the hash layout changes.
pub const CACHE_VERSION: &str = "1";

/// File name of the workspace description inside a project directory.
pub const WORKSPACE_FILE: &str = "workspace.json";

/// File name of the optional settings file inside a project directory.
pub const SETTINGS_FILE: &str = "bincache.toml";

pub const URL_ENV: &str = "BINCACHE_URL";
pub const TOKEN_ENV: &str = "BINCACHE_TOKEN";
pub const CACHE_DIR_ENV: &str = "BINCACHE_CACHE_DIR";
pub const PARALLELISM_ENV: &str = "BINCACHE_PARALLELISM";
