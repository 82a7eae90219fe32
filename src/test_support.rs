// toolsync/src/test_support.rs
//! In-memory stand-ins for the host tool library and the remote table.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::subscriber::DefaultGuard;

use crate::errors::{AppError, Result};
use crate::library::{LibraryAsset, LibraryLocation, ToolLibrarySource};
use crate::mapping::{FieldMap, entry_description};
use crate::remote::{RemoteRecord, RemoteStore};

/// Log lines written by the fmt subscriber installed with [`LogCapture::install`].
#[derive(Clone, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    /// Captures events on the current thread until the guard is dropped.
    /// Tests must run on the current-thread runtime, the `#[tokio::test]` default.
    pub fn install() -> (Self, DefaultGuard) {
        let capture = Self::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_target(false)
            .finish();
        let guard = tracing::subscriber::set_default(subscriber);
        (capture, guard)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock().unwrap()).into_owned()
    }

    /// Captured lines at `level` (e.g. `"WARN"`).
    pub fn lines_at(&self, level: &str) -> Vec<String> {
        self.contents()
            .lines()
            .filter(|line| line.split_whitespace().nth(1) == Some(level))
            .map(str::to_string)
            .collect()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryLibrarySource {
    libraries: Mutex<Vec<(LibraryLocation, String, Vec<Value>)>>,
}

impl MemoryLibrarySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_library(self, location: LibraryLocation, name: &str, tools: Vec<Value>) -> Self {
        self.libraries
            .lock()
            .unwrap()
            .push((location, name.to_string(), tools));
        self
    }

    pub fn replace_tools(&self, name: &str, tools: Vec<Value>) {
        let mut libraries = self.libraries.lock().unwrap();
        let library = libraries
            .iter_mut()
            .find(|(_, library_name, _)| library_name == name)
            .expect("library exists");
        library.2 = tools;
    }
}

impl ToolLibrarySource for MemoryLibrarySource {
    fn library_assets(&self, location: LibraryLocation) -> Result<Vec<LibraryAsset>> {
        Ok(self
            .libraries
            .lock()
            .unwrap()
            .iter()
            .filter(|(library_location, _, _)| *library_location == location)
            .map(|(_, name, _)| LibraryAsset {
                leaf_name: name.clone(),
                url: format!("memory://{}", name),
            })
            .collect())
    }

    fn load_tools(&self, asset: &LibraryAsset) -> Result<Vec<Value>> {
        self.libraries
            .lock()
            .unwrap()
            .iter()
            .find(|(_, name, _)| *name == asset.leaf_name)
            .map(|(_, _, tools)| tools.clone())
            .ok_or_else(|| AppError::InvalidLibrary {
                path: asset.url.clone(),
                reason: "unknown library".to_string(),
            })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    Find(String),
    Create(FieldMap),
    Update(String, FieldMap),
}

/// Remote table fake that records every call. Created records become
/// visible to later lookups.
#[derive(Default)]
pub struct RecordingStore {
    records: Mutex<HashMap<String, Vec<String>>>,
    calls: Mutex<Vec<StoreCall>>,
    fail_find: AtomicBool,
    fail_writes: AtomicBool,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(self, description: &str, ids: &[&str]) -> Self {
        self.records.lock().unwrap().insert(
            description.to_string(),
            ids.iter().map(|id| id.to_string()).collect(),
        );
        self
    }

    pub fn failing_find(self) -> Self {
        self.fail_find.store(true, Ordering::SeqCst);
        self
    }

    pub fn failing_writes(self) -> Self {
        self.set_failing_writes(true);
        self
    }

    pub fn set_failing_writes(&self, failing: bool) {
        self.fail_writes.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn finds(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, StoreCall::Find(_)))
            .count()
    }

    pub fn writes(&self) -> Vec<StoreCall> {
        self.calls()
            .into_iter()
            .filter(|call| !matches!(call, StoreCall::Find(_)))
            .collect()
    }

    fn rejected(&self, operation: &'static str) -> Option<AppError> {
        self.fail_writes.load(Ordering::SeqCst).then(|| AppError::RemoteStatus {
            operation,
            status: 422,
            body: r#"{"error":"INVALID"}"#.to_string(),
        })
    }
}

#[async_trait]
impl RemoteStore for RecordingStore {
    async fn find(&self, _field_name: &str, value: &str) -> Result<Vec<RemoteRecord>> {
        self.calls.lock().unwrap().push(StoreCall::Find(value.to_string()));
        if self.fail_find.load(Ordering::SeqCst) {
            return Err(AppError::RemoteStatus {
                operation: "lookup",
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        let records = self.records.lock().unwrap();
        Ok(records
            .get(value)
            .map(|ids| {
                ids.iter()
                    .map(|id| RemoteRecord {
                        id: id.clone(),
                        fields: FieldMap::new(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create(&self, fields: &FieldMap) -> Result<()> {
        self.calls.lock().unwrap().push(StoreCall::Create(fields.clone()));
        if let Some(e) = self.rejected("create") {
            return Err(e);
        }
        let mut records = self.records.lock().unwrap();
        let next_id = format!("rec{}", records.len() + 1);
        let description = entry_description(fields).unwrap_or_default().to_string();
        records.entry(description).or_default().push(next_id);
        Ok(())
    }

    async fn update(&self, record_id: &str, fields: &FieldMap) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(StoreCall::Update(record_id.to_string(), fields.clone()));
        match self.rejected("update") {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
