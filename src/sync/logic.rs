// toolsync/src/sync/logic.rs
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::config::{LibraryConfig, SyncConfig};
use crate::library::{self, ToolLibrarySource};
use crate::mapping::{DESCRIPTION_FIELD, FieldMap, MapOptions};
use crate::remote::{self, DuplicatePolicy, RemoteStore};

/// Field maps last written to the remote table, keyed by tool description.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    entries: HashMap<String, FieldMap>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, description: &str) -> Option<&FieldMap> {
        self.entries.get(description)
    }

    pub fn record(&mut self, description: String, fields: FieldMap) {
        self.entries.insert(description, fields);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    New,
    Modified,
}

/// Entries of `current` that are missing from `last` or differ from it.
/// Whole-record comparison; removals are not reported.
pub fn diff<'a>(
    current: &'a BTreeMap<String, FieldMap>,
    last: &Snapshot,
) -> Vec<(&'a str, &'a FieldMap, Change)> {
    current
        .iter()
        .filter_map(|(description, fields)| match last.get(description) {
            None => Some((description.as_str(), fields, Change::New)),
            Some(previous) if previous != fields => {
                Some((description.as_str(), fields, Change::Modified))
            }
            Some(_) => None,
        })
        .collect()
}

/// Outcome of one read-diff-upsert pass.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub pass_id: Uuid,
    pub forced: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub processed: usize,
    pub new: usize,
    pub modified: usize,
    pub failed: usize,
    /// Set when the library could not be read; nothing was synced.
    pub library_error: Option<String>,
}

impl SyncReport {
    fn begin(forced: bool) -> Self {
        let now = Utc::now();
        Self {
            pass_id: Uuid::new_v4(),
            forced,
            started_at: now,
            finished_at: now,
            processed: 0,
            new: 0,
            modified: 0,
            failed: 0,
            library_error: None,
        }
    }

    pub fn unchanged(&self) -> usize {
        self.processed - self.new - self.modified
    }

    pub fn succeeded(&self) -> bool {
        self.library_error.is_none() && self.failed == 0
    }
}

/// Owns everything a pass touches: the library source, the remote store and
/// the last-synced snapshot.
pub struct SyncEngine<L, R> {
    source: L,
    store: R,
    library: LibraryConfig,
    options: MapOptions,
    duplicate_policy: DuplicatePolicy,
    snapshot: Snapshot,
}

impl<L, R> SyncEngine<L, R>
where
    L: ToolLibrarySource,
    R: RemoteStore,
{
    pub fn new(source: L, store: R, library: LibraryConfig, sync: &SyncConfig) -> Self {
        Self {
            source,
            store,
            library,
            options: MapOptions {
                expression_numbers: sync.expression_numbers,
            },
            duplicate_policy: sync.duplicate_policy,
            snapshot: Snapshot::new(),
        }
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Upserts every tool that is new or changed since the last pass.
    pub async fn sync_all_tools(&mut self) -> SyncReport {
        self.run_pass(false).await
    }

    /// Forgets what was synced, so every current tool is upserted again.
    pub async fn force_sync_all_tools(&mut self) -> SyncReport {
        info!("Clearing last synced snapshot ({} tools)", self.snapshot.len());
        self.snapshot.clear();
        self.run_pass(true).await
    }

    async fn run_pass(&mut self, forced: bool) -> SyncReport {
        let mut report = SyncReport::begin(forced);
        let span = info_span!("sync_pass", pass_id = %report.pass_id, forced);

        async {
            info!("Synchronizing all tools in library to remote table...");

            let current = match library::read_current_tool_library(
                &self.source,
                &self.library,
                self.options,
            )
            .await
            {
                Ok(read) => read.tools,
                Err(e) => {
                    error!("Failed to read tool library: {}", e);
                    report.library_error = Some(e.to_string());
                    return;
                }
            };

            report.processed = current.len();
            let changes = diff(&current, &self.snapshot);
            debug!(
                "{} of {} tools unchanged since last pass",
                current.len() - changes.len(),
                current.len()
            );

            for (description, fields, change) in changes {
                match change {
                    Change::New => report.new += 1,
                    Change::Modified => report.modified += 1,
                }

                info!("updating tool : {}", description);
                let outcome = remote::upsert(
                    &self.store,
                    DESCRIPTION_FIELD,
                    description,
                    fields,
                    self.duplicate_policy,
                )
                .await;

                if outcome.is_success() {
                    debug!("{}: {}", description, outcome);
                    self.snapshot.record(description.to_string(), fields.clone());
                } else {
                    report.failed += 1;
                    warn!("failed to update tool : {}", description);
                }

                tokio::task::yield_now().await;
            }

            info!(
                "DONE! (processed {} tools, {} new, {} modified, {} failed)",
                report.processed, report.new, report.modified, report.failed
            );
        }
        .instrument(span)
        .await;

        report.finished_at = Utc::now();
        report
    }
}
