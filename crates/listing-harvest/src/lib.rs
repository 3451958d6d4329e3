//! ListingHarvest: business-listing acquisition and reconciliation engine.
//!
//! Sources from a static catalog are fetched through one rate-limited,
//! cache-aware fetcher, turned into candidate records by pluggable
//! extractors, and merged into a deduplicated accumulated set.

pub mod catalog;
pub mod config;
pub mod extract;
pub mod fetch;
pub mod harvester;
pub mod identity;
pub mod orchestrator;
pub mod progress;
pub mod reconcile;
pub mod storage;
pub mod types;

pub use catalog::Catalog;
pub use config::HarvestConfig;
pub use extract::{ExtractContext, ExtractorSpec, SourceExtractor};
pub use fetch::{FetchConfig, Fetcher};
pub use harvester::Harvester;
pub use identity::IdentityKey;
pub use orchestrator::{
    BackgroundFetchStatus, BackgroundRequest, Orchestrator, RecordSink, RunReport, RunState,
    SourceSelection,
};
pub use progress::{ProgressCallback, ProgressEvent, ProgressEventKind};
pub use reconcile::{ListingStats, MergeSummary, ReconciliationStore, SharedStore};
pub use storage::{MemoryStorage, RecordStorage, SqliteStorage};
pub use types::*;
