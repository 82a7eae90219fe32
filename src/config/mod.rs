// toolsync/src/config/mod.rs
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::library::LibraryLocation;
use crate::remote::DuplicatePolicy;

pub const DEFAULT_API_URL: &str = "https://api.airtable.com";
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 15;
/// One week.
pub const MAX_SYNC_INTERVAL_SECS: u64 = 7 * 24 * 60 * 60;

// Environment variables that take precedence over config.json
pub const ENV_API_KEY: &str = "TOOLSYNC_API_KEY";
pub const ENV_BASE_ID: &str = "TOOLSYNC_BASE_ID";
pub const ENV_TABLE_NAME: &str = "TOOLSYNC_TABLE_NAME";

// Structs for deserializing config.json
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawJsonConfig {
    pub api_key: Option<String>,
    pub base_id: Option<String>,
    pub table_name: Option<String>,
    pub api_url: Option<String>,
    pub library_name: Option<String>,
    pub library_location: Option<String>,
    pub cloud_library_dir: Option<PathBuf>,
    pub local_library_dir: Option<PathBuf>,
    pub sync_interval_secs: Option<u64>,
    pub max_tools_to_read: Option<usize>,
    pub duplicate_policy: Option<String>,
    pub expression_numbers: Option<bool>,
}

// Application's internal configuration structs
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub api_key: String,
    pub base_id: String,
    pub table_name: String,
    pub api_url: String,
}

#[derive(Debug, Clone)]
pub struct LibraryConfig {
    pub name: String,
    pub location: LibraryLocation,
    pub root_dir: PathBuf,
    pub max_tools_to_read: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Zero disables background synchronization.
    pub interval: Duration,
    pub duplicate_policy: DuplicatePolicy,
    pub expression_numbers: bool,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub remote: RemoteConfig,
    pub library: LibraryConfig,
    pub sync: SyncConfig,
}

impl AppConfig {
    pub fn load_from_json(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file at {}", config_path.display()))?;
        let mut raw_json_config: RawJsonConfig = serde_json::from_str(&config_content)
            .with_context(|| {
                format!(
                    "Failed to parse JSON from config file at {}",
                    config_path.display()
                )
            })?;

        apply_env_overrides(&mut raw_json_config, |key| std::env::var(key).ok());
        Self::from_raw(raw_json_config)
    }

    pub fn from_raw(raw: RawJsonConfig) -> Result<Self> {
        let remote = RemoteConfig {
            api_key: required(raw.api_key, "api_key")?,
            base_id: required(raw.base_id, "base_id")?,
            table_name: required(raw.table_name, "table_name")?,
            api_url: non_empty(raw.api_url).unwrap_or_else(|| DEFAULT_API_URL.to_string()),
        };

        let location = match non_empty(raw.library_location) {
            Some(value) => value
                .parse::<LibraryLocation>()
                .context("library_location in config.json is invalid")?,
            None => LibraryLocation::Cloud,
        };
        let root_dir = match location {
            LibraryLocation::Cloud => raw.cloud_library_dir,
            LibraryLocation::Local => raw.local_library_dir,
        }
        .filter(|p| !p.as_os_str().is_empty())
        .with_context(|| {
            format!(
                "{} must be set in config.json when library_location is {}",
                location.dir_key(),
                location
            )
        })?;

        let library = LibraryConfig {
            name: required(raw.library_name, "library_name")?,
            location,
            root_dir,
            max_tools_to_read: raw.max_tools_to_read.filter(|&cap| cap > 0),
        };

        let duplicate_policy = match non_empty(raw.duplicate_policy) {
            Some(value) => value
                .parse::<DuplicatePolicy>()
                .context("duplicate_policy in config.json is invalid")?,
            None => DuplicatePolicy::default(),
        };

        let interval_secs = raw.sync_interval_secs.unwrap_or(DEFAULT_SYNC_INTERVAL_SECS);
        if interval_secs > MAX_SYNC_INTERVAL_SECS {
            anyhow::bail!(
                "sync_interval_secs in config.json must be at most {} (got {})",
                MAX_SYNC_INTERVAL_SECS,
                interval_secs
            );
        }

        let sync = SyncConfig {
            interval: Duration::from_secs(interval_secs),
            duplicate_policy,
            expression_numbers: raw.expression_numbers.unwrap_or(false),
        };

        Ok(AppConfig {
            remote,
            library,
            sync,
        })
    }
}

/// Overwrites credentials and table identifiers with values from the environment.
/// `lookup` is `std::env::var` in production.
pub fn apply_env_overrides<F>(raw: &mut RawJsonConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let targets = [
        (ENV_API_KEY, &mut raw.api_key),
        (ENV_BASE_ID, &mut raw.base_id),
        (ENV_TABLE_NAME, &mut raw.table_name),
    ];
    for (key, slot) in targets {
        if let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) {
            *slot = Some(value);
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn required(value: Option<String>, key: &str) -> Result<String> {
    non_empty(value).with_context(|| format!("{} must be set in config.json", key))
}
