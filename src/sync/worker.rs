// toolsync/src/sync/worker.rs
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::logic::{SyncEngine, SyncReport};
use crate::library::ToolLibrarySource;
use crate::remote::RemoteStore;

const REQUEST_QUEUE_DEPTH: usize = 8;

/// Work the sync worker accepts. `reply` receives the pass report.
#[derive(Debug)]
pub enum SyncRequest {
    SyncNow { reply: oneshot::Sender<SyncReport> },
    ForceFull { reply: oneshot::Sender<SyncReport> },
}

/// Handle to the worker task that owns the snapshot.
pub struct SyncHandle {
    requests: mpsc::Sender<SyncRequest>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SyncHandle {
    /// Runs an incremental pass and waits for its report. `None` once the
    /// worker has stopped.
    pub async fn sync_now(&self) -> Option<SyncReport> {
        let (reply, report) = oneshot::channel();
        self.send(SyncRequest::SyncNow { reply }).await?;
        report.await.ok()
    }

    /// Clears the snapshot, runs a pass and waits for its report.
    pub async fn force_full_sync(&self) -> Option<SyncReport> {
        let (reply, report) = oneshot::channel();
        self.send(SyncRequest::ForceFull { reply }).await?;
        report.await.ok()
    }

    /// Stops the worker after the pass in flight, if any, completes.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!("Sync worker ended abnormally: {}", e);
        }
    }

    async fn send(&self, request: SyncRequest) -> Option<()> {
        if self.cancel.is_cancelled() {
            return None;
        }
        self.requests.send(request).await.ok()
    }
}

/// Spawns the worker. A zero `interval` disables the periodic pass.
pub fn spawn_worker<L, R>(engine: SyncEngine<L, R>, interval: Duration) -> SyncHandle
where
    L: ToolLibrarySource + 'static,
    R: RemoteStore + 'static,
{
    let (requests, receiver) = mpsc::channel(REQUEST_QUEUE_DEPTH);
    let cancel = CancellationToken::new();
    let task = tokio::spawn(run_worker(engine, receiver, cancel.clone(), interval));

    SyncHandle {
        requests,
        cancel,
        task,
    }
}

async fn run_worker<L, R>(
    mut engine: SyncEngine<L, R>,
    mut requests: mpsc::Receiver<SyncRequest>,
    cancel: CancellationToken,
    interval: Duration,
) where
    L: ToolLibrarySource,
    R: RemoteStore,
{
    let mut ticker = periodic_ticker(interval);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            request = requests.recv() => match request {
                Some(SyncRequest::SyncNow { reply }) => {
                    let report = engine.sync_all_tools().await;
                    respond(reply, report);
                }
                Some(SyncRequest::ForceFull { reply }) => {
                    let report = engine.force_sync_all_tools().await;
                    respond(reply, report);
                }
                None => break,
            },
            _ = next_tick(&mut ticker) => {
                info!("periodic library synchronization");
                engine.sync_all_tools().await;
            }
        }
    }

    info!("Sync worker stopped");
}

/// `None` when the interval is zero or too large to schedule.
fn periodic_ticker(interval: Duration) -> Option<Interval> {
    if interval.is_zero() {
        return None;
    }
    let Some(start) = Instant::now().checked_add(interval) else {
        warn!(
            "Sync interval of {}s cannot be scheduled, background sync disabled",
            interval.as_secs()
        );
        return None;
    };
    let mut ticker = time::interval_at(start, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Some(ticker)
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

fn respond(reply: oneshot::Sender<SyncReport>, report: SyncReport) {
    // the requester may have stopped waiting
    let _ = reply.send(report);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LibraryConfig, SyncConfig};
    use crate::library::LibraryLocation;
    use crate::remote::DuplicatePolicy;
    use crate::test_support::{MemoryLibrarySource, RecordingStore};
    use serde_json::json;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn engine(
        store: &Arc<RecordingStore>,
    ) -> SyncEngine<MemoryLibrarySource, Arc<RecordingStore>> {
        let source = MemoryLibrarySource::new().with_library(
            LibraryLocation::Local,
            "Router bits",
            vec![
                json!({"description": "1/4 downcut", "geometry": {"SFDM": 0.25}}),
                json!({"description": "1/2 compression", "geometry": {"SFDM": 0.5}}),
            ],
        );
        let library = LibraryConfig {
            name: "Router".to_string(),
            location: LibraryLocation::Local,
            root_dir: PathBuf::from("/unused"),
            max_tools_to_read: None,
        };
        let sync = SyncConfig {
            interval: Duration::ZERO,
            duplicate_policy: DuplicatePolicy::UpdateFirst,
            expression_numbers: false,
        };
        SyncEngine::new(source, Arc::clone(store), library, &sync)
    }

    #[tokio::test]
    async fn test_requests_are_served_in_order() {
        let store = Arc::new(RecordingStore::new());
        let handle = spawn_worker(engine(&store), Duration::ZERO);

        let first = handle.sync_now().await.expect("worker replies");
        let second = handle.sync_now().await.expect("worker replies");
        let forced = handle.force_full_sync().await.expect("worker replies");

        assert_eq!(first.new, 2);
        assert_eq!(second.unchanged(), 2);
        assert!(forced.forced);
        assert_eq!(forced.new, 2);
        assert_eq!(store.writes().len(), 4);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_triggers_periodic_pass() {
        let store = Arc::new(RecordingStore::new());
        let handle = spawn_worker(engine(&store), Duration::from_secs(15));

        time::sleep(Duration::from_secs(16)).await;
        let report = handle.sync_now().await.expect("worker replies");

        // the timer pass already synced both tools
        assert_eq!(report.new, 0);
        assert_eq!(store.writes().len(), 2);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_unschedulable_interval_disables_timer() {
        let store = Arc::new(RecordingStore::new());
        let handle = spawn_worker(engine(&store), Duration::MAX);

        let report = handle.sync_now().await.expect("worker replies");
        assert_eq!(report.new, 2);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_disables_timer() {
        let store = Arc::new(RecordingStore::new());
        let handle = spawn_worker(engine(&store), Duration::ZERO);

        time::sleep(Duration::from_secs(600)).await;
        assert!(store.calls().is_empty());

        let report = handle.sync_now().await.expect("worker replies");
        assert_eq!(report.new, 2);

        handle.shutdown().await;
    }
}
