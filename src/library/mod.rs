// toolsync/src/library/mod.rs
//! Reads the target tool library from the host and materializes it in the
//! same shape as the sync snapshot: description -> remote field map.

pub(crate) mod filesystem;

use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::LibraryConfig;
use crate::errors::{AppError, Result};
use crate::mapping::{self, FieldMap, MapOptions};

pub use filesystem::FsLibrarySource;

/// Where the host keeps a tool library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LibraryLocation {
    Cloud,
    Local,
}

impl LibraryLocation {
    /// Config key holding the directory for this location.
    pub fn dir_key(&self) -> &'static str {
        match self {
            LibraryLocation::Cloud => "cloud_library_dir",
            LibraryLocation::Local => "local_library_dir",
        }
    }
}

impl fmt::Display for LibraryLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LibraryLocation::Cloud => write!(f, "CLOUD"),
            LibraryLocation::Local => write!(f, "LOCAL"),
        }
    }
}

impl FromStr for LibraryLocation {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CLOUD" => Ok(LibraryLocation::Cloud),
            "LOCAL" => Ok(LibraryLocation::Local),
            other => Err(anyhow::anyhow!(
                "unknown library location '{}', expected CLOUD or LOCAL",
                other
            )),
        }
    }
}

/// A library the host can open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryAsset {
    pub leaf_name: String,
    pub url: String,
}

/// The host application's view of its tool libraries.
pub trait ToolLibrarySource: Send + Sync {
    /// Libraries available at `location`, in a stable order.
    fn library_assets(&self, location: LibraryLocation) -> Result<Vec<LibraryAsset>>;

    /// Every tool of `asset`, each serialized as a JSON record.
    fn load_tools(&self, asset: &LibraryAsset) -> Result<Vec<Value>>;
}

impl<T: ToolLibrarySource + ?Sized> ToolLibrarySource for Arc<T> {
    fn library_assets(&self, location: LibraryLocation) -> Result<Vec<LibraryAsset>> {
        (**self).library_assets(location)
    }

    fn load_tools(&self, asset: &LibraryAsset) -> Result<Vec<Value>> {
        (**self).load_tools(asset)
    }
}

/// One materialized read of the target library.
#[derive(Debug, Clone, Default)]
pub struct LibraryRead {
    pub tools: BTreeMap<String, FieldMap>,
    /// Tools visited, bounded by the read cap.
    pub read: usize,
    /// Tools in the library.
    pub total: usize,
    /// Tools whose record could not be mapped.
    pub dropped: usize,
}

/// Finds the first library whose leaf name contains `name`.
pub fn locate_library<S>(source: &S, name: &str, location: LibraryLocation) -> Result<LibraryAsset>
where
    S: ToolLibrarySource + ?Sized,
{
    source
        .library_assets(location)?
        .into_iter()
        .find(|asset| asset.leaf_name.contains(name))
        .ok_or_else(|| AppError::LibraryNotFound {
            name: name.to_string(),
            location: location.to_string(),
        })
}

/// Reads the configured library, yielding to the runtime after every tool.
pub async fn read_current_tool_library<S>(
    source: &S,
    config: &LibraryConfig,
    options: MapOptions,
) -> Result<LibraryRead>
where
    S: ToolLibrarySource + ?Sized,
{
    info!("Reading current tool library {}", config.name);

    let asset = locate_library(source, &config.name, config.location)?;
    let records = source.load_tools(&asset)?;

    let mut library = LibraryRead {
        total: records.len(),
        ..LibraryRead::default()
    };

    for (index, record) in records.iter().enumerate() {
        if config.max_tools_to_read.is_some_and(|cap| library.read >= cap) {
            break;
        }
        library.read += 1;

        match mapping::generate_remote_entry(record, options) {
            Some(fields) => {
                // a mapped entry always carries its description
                let description = mapping::entry_description(&fields)
                    .unwrap_or_default()
                    .to_string();
                if library.tools.insert(description.clone(), fields).is_some() {
                    warn!(
                        "Duplicate tool description '{}' in {}, keeping the later tool",
                        description, asset.leaf_name
                    );
                }
            }
            None => {
                library.dropped += 1;
                warn!(
                    "Failed to generate remote entry for tool #{} in {}: {}",
                    index, asset.leaf_name, record
                );
            }
        }

        tokio::task::yield_now().await;
    }

    info!(
        "DONE! (read {} tools out of {} in {} library, {} dropped)",
        library.read, library.total, asset.leaf_name, library.dropped
    );
    Ok(library)
}
