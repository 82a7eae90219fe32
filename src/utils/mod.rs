pub mod logging;

use std::env;
use std::path::PathBuf;

pub const CONFIG_PATH_ENV: &str = "TOOLSYNC_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// Location of config.json: `TOOLSYNC_CONFIG` if set, else the working directory.
pub fn resolve_config_path() -> PathBuf {
    env::var(CONFIG_PATH_ENV)
        .ok()
        .filter(|path| !path.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
