//! Process-wide engine: one orchestrator wired to one reconciliation store.

use std::sync::{Arc, MutexGuard};

use crate::catalog::Catalog;
use crate::config::HarvestConfig;
use crate::fetch::Fetcher;
use crate::orchestrator::{
    BackgroundFetchStatus, BackgroundRequest, Orchestrator, RecordSink,
};
use crate::reconcile::{ListingStats, ReconciliationStore, SharedStore};
use crate::storage::SqliteStorage;
use crate::types::{AccumulatedRecord, HarvestResult};

/// Built once at start-up and shared by every front end.
#[derive(Clone)]
pub struct Harvester {
    orchestrator: Arc<Orchestrator>,
    store: SharedStore,
}

impl Harvester {
    pub fn new(orchestrator: Orchestrator, store: ReconciliationStore) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            store: store.into_shared(),
        }
    }

    /// Load the catalog, open the database and build the fetcher.
    pub fn from_config(config: &HarvestConfig) -> HarvestResult<Self> {
        let catalog = match &config.catalog_path {
            Some(path) => Catalog::from_path(path)?,
            None => Catalog::embedded()?,
        };
        let fetcher = Fetcher::new(config.fetch.clone())?;
        let orchestrator = Orchestrator::new(catalog, fetcher)?;
        let store = ReconciliationStore::open(SqliteStorage::open(&config.db_path)?)?;
        tracing::debug!(
            "harvester ready: {} source(s), {} stored record(s), db {}",
            orchestrator.list_sources().len(),
            store.len(),
            config.db_path.display()
        );
        Ok(Self::new(orchestrator, store))
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    fn lock_store(&self) -> MutexGuard<'_, ReconciliationStore> {
        self.store.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("store mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Start a background run persisting into the store. `false` when one
    /// is already running.
    pub fn start(&self, request: BackgroundRequest) -> bool {
        let sink: Arc<dyn RecordSink> = self.store.clone();
        self.orchestrator.start_background(request, sink)
    }

    pub fn stop(&self) {
        self.orchestrator.stop_background();
    }

    pub fn status(&self) -> BackgroundFetchStatus {
        self.orchestrator.background_status()
    }

    pub async fn wait(&self) {
        self.orchestrator.wait_background().await;
    }

    pub fn stats(&self) -> ListingStats {
        self.lock_store().stats()
    }

    pub fn records(&self) -> Vec<AccumulatedRecord> {
        self.lock_store().records()
    }

    pub fn clear(&self) -> HarvestResult<()> {
        self.lock_store().clear()
    }

    /// Remove seeded demo records, returning how many were dropped.
    pub fn purge_samples(&self) -> HarvestResult<usize> {
        let mut store = self.lock_store();
        let before = store.len();
        let remaining = store.remove_sample_records()?;
        Ok(before - remaining.len())
    }
}
