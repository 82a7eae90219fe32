// toolsync/src/sync/mod.rs
pub(crate) mod logic;
pub(crate) mod worker;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::AppConfig;
use crate::library::{FsLibrarySource, ToolLibrarySource};
use crate::remote::{AirtableClient, RemoteStore};

pub use logic::{SyncEngine, SyncReport};
pub use worker::SyncHandle;

/// Builds the filesystem library source and the Airtable client from config.
pub fn build_engine(app_config: &AppConfig) -> Result<SyncEngine<FsLibrarySource, AirtableClient>> {
    let source = FsLibrarySource::new().with_root(
        app_config.library.location,
        app_config.library.root_dir.clone(),
    );
    let client = AirtableClient::new(&app_config.remote)
        .context("Failed to create remote table client")?;
    info!("Remote table endpoint: {}", client.endpoint());

    Ok(SyncEngine::new(
        source,
        client,
        app_config.library.clone(),
        &app_config.sync,
    ))
}

/// One full synchronization of the configured library, then return.
pub async fn run_sync_once(app_config: &AppConfig) -> Result<SyncReport> {
    let mut engine = build_engine(app_config)?;
    Ok(engine.force_sync_all_tools().await)
}

/// The long-running synchronization service: a worker owning the snapshot,
/// fed by the periodic timer and by explicit requests.
pub struct SyncService {
    handle: SyncHandle,
}

impl SyncService {
    /// Spawns the worker and runs the startup full sync before returning.
    pub async fn start<L, R>(
        engine: SyncEngine<L, R>,
        app_config: &AppConfig,
    ) -> Result<(Self, SyncReport)>
    where
        L: ToolLibrarySource + 'static,
        R: RemoteStore + 'static,
    {
        let interval = app_config.sync.interval;
        let handle = worker::spawn_worker(engine, interval);

        info!("ToolSync : Forcing synchronization of full tool library on startup!");
        let startup = handle
            .force_full_sync()
            .await
            .context("Sync worker stopped before the startup synchronization finished")?;

        if interval.is_zero() {
            info!("ToolSync : background synchronization disabled");
        } else {
            info!(
                "ToolSync : scheduling background synchronization every {} seconds",
                interval.as_secs()
            );
        }

        Ok((SyncService { handle }, startup))
    }

    pub async fn sync_now(&self) -> Option<SyncReport> {
        info!("ToolSync : Scanning tool library for changes and synchronizing...");
        self.handle.sync_now().await
    }

    pub async fn force_full_sync(&self) -> Option<SyncReport> {
        info!("ToolSync : force full resync requested");
        self.handle.force_full_sync().await
    }

    pub async fn stop(self) {
        self.handle.shutdown().await;
    }
}
