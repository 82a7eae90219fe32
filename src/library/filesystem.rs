// toolsync/src/library/filesystem.rs
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::{LibraryAsset, LibraryLocation, ToolLibrarySource};
use crate::errors::{AppError, Result};

/// Tool libraries exported by the host as JSON files, one directory per location.
///
/// A library file is either the host export document (`{"data": [...]}`) or a
/// bare array of tool records. The file stem is the library's leaf name.
#[derive(Debug, Clone, Default)]
pub struct FsLibrarySource {
    roots: HashMap<LibraryLocation, PathBuf>,
}

impl FsLibrarySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(mut self, location: LibraryLocation, root: impl Into<PathBuf>) -> Self {
        self.roots.insert(location, root.into());
        self
    }
}

impl ToolLibrarySource for FsLibrarySource {
    fn library_assets(&self, location: LibraryLocation) -> Result<Vec<LibraryAsset>> {
        let Some(root) = self.roots.get(&location) else {
            return Ok(Vec::new());
        };

        let mut assets = Vec::new();
        for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
            let entry = entry.map_err(std::io::Error::from)?;
            let path = entry.path();
            if !entry.file_type().is_file() || !is_json(path) {
                continue;
            }
            if let Some(stem) = path.file_stem() {
                assets.push(LibraryAsset {
                    leaf_name: stem.to_string_lossy().into_owned(),
                    url: path.to_string_lossy().into_owned(),
                });
            }
        }
        Ok(assets)
    }

    fn load_tools(&self, asset: &LibraryAsset) -> Result<Vec<Value>> {
        let content = fs::read_to_string(&asset.url)?;
        let document: Value = serde_json::from_str(&content)?;

        match document {
            Value::Array(tools) => Ok(tools),
            Value::Object(mut map) => match map.remove("data") {
                Some(Value::Array(tools)) => Ok(tools),
                _ => Err(AppError::InvalidLibrary {
                    path: asset.url.clone(),
                    reason: "expected a 'data' array of tools".to_string(),
                }),
            },
            _ => Err(AppError::InvalidLibrary {
                path: asset.url.clone(),
                reason: "expected a JSON object or array".to_string(),
            }),
        }
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}
