// toolsync/src/remote/mod.rs
pub(crate) mod airtable;

use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;

use crate::errors::Result;
use crate::mapping::FieldMap;

pub use airtable::AirtableClient;

/// A record as returned by the remote table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteRecord {
    pub id: String,
    #[serde(default)]
    pub fields: FieldMap,
}

/// Filter, create and update over the remote table.
///
/// `find` separates "no match" (`Ok` with an empty list) from a failed
/// lookup (`Err`).
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn find(&self, field_name: &str, value: &str) -> Result<Vec<RemoteRecord>>;
    async fn create(&self, fields: &FieldMap) -> Result<()>;
    async fn update(&self, record_id: &str, fields: &FieldMap) -> Result<()>;
}

#[async_trait]
impl<T: RemoteStore + ?Sized> RemoteStore for Arc<T> {
    async fn find(&self, field_name: &str, value: &str) -> Result<Vec<RemoteRecord>> {
        (**self).find(field_name, value).await
    }

    async fn create(&self, fields: &FieldMap) -> Result<()> {
        (**self).create(fields).await
    }

    async fn update(&self, record_id: &str, fields: &FieldMap) -> Result<()> {
        (**self).update(record_id, fields).await
    }
}

/// What to do when several remote records share one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// Update the first record the lookup returned.
    #[default]
    UpdateFirst,
    /// Leave every match alone; the entry stays unsynced.
    Skip,
}

impl FromStr for DuplicatePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "update_first" => Ok(DuplicatePolicy::UpdateFirst),
            "skip" => Ok(DuplicatePolicy::Skip),
            other => Err(anyhow::anyhow!(
                "unknown duplicate policy '{}', expected update_first or skip",
                other
            )),
        }
    }
}

#[derive(Debug)]
pub enum UpsertOutcome {
    Created,
    Updated { record_id: String },
    /// Several records matched; `record_id` is the one that was written.
    UpdatedDuplicate { record_id: String, matches: usize },
    SkippedDuplicate { matches: usize },
    Failed(crate::errors::AppError),
}

impl UpsertOutcome {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            UpsertOutcome::Created
                | UpsertOutcome::Updated { .. }
                | UpsertOutcome::UpdatedDuplicate { .. }
        )
    }
}

impl fmt::Display for UpsertOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpsertOutcome::Created => write!(f, "created"),
            UpsertOutcome::Updated { record_id } => write!(f, "updated {}", record_id),
            UpsertOutcome::UpdatedDuplicate { record_id, matches } => {
                write!(f, "updated {} ({} matching records)", record_id, matches)
            }
            UpsertOutcome::SkippedDuplicate { matches } => {
                write!(f, "skipped ({} matching records)", matches)
            }
            UpsertOutcome::Failed(e) => write!(f, "failed: {}", e),
        }
    }
}

/// Creates the record keyed by `key_value` in `key_field`, or updates it if it
/// already exists. Errors are logged here and reported through the outcome.
pub async fn upsert<S>(
    store: &S,
    key_field: &str,
    key_value: &str,
    fields: &FieldMap,
    policy: DuplicatePolicy,
) -> UpsertOutcome
where
    S: RemoteStore + ?Sized,
{
    let matches = match store.find(key_field, key_value).await {
        Ok(records) => records,
        Err(e) => {
            warn!("WARNING : Failed to look up {} in remote table: {}", key_value, e);
            return UpsertOutcome::Failed(e);
        }
    };

    let outcome = match matches.as_slice() {
        [] => match store.create(fields).await {
            Ok(()) => UpsertOutcome::Created,
            Err(e) => UpsertOutcome::Failed(e),
        },
        [record] => match store.update(&record.id, fields).await {
            Ok(()) => UpsertOutcome::Updated {
                record_id: record.id.clone(),
            },
            Err(e) => UpsertOutcome::Failed(e),
        },
        [first, ..] => {
            let ids: Vec<&str> = matches.iter().map(|r| r.id.as_str()).collect();
            warn!(
                "WARNING : Multiple matching records found for {} in remote table: {:?}",
                key_value, ids
            );
            match policy {
                DuplicatePolicy::Skip => UpsertOutcome::SkippedDuplicate {
                    matches: matches.len(),
                },
                DuplicatePolicy::UpdateFirst => match store.update(&first.id, fields).await {
                    Ok(()) => UpsertOutcome::UpdatedDuplicate {
                        record_id: first.id.clone(),
                        matches: matches.len(),
                    },
                    Err(e) => UpsertOutcome::Failed(e),
                },
            }
        }
    };

    if let UpsertOutcome::Failed(e) = &outcome {
        warn!("WARNING : Failed to write record {} to remote table: {}", key_value, e);
        warn!("fields_to_update : {:?}", fields);
    }
    outcome
}
