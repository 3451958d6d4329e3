//! Source orchestration: drives fetch + extract over the priority-ordered
//! catalog with a single logical worker.
//!
//! Sources are processed strictly one after another; the fetcher's single
//! request clock would serialize them anyway. A failing source is logged,
//! recorded in the status error history, and the run moves on.

pub mod background;
pub mod status;

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex as AsyncMutex;

pub use background::BackgroundRequest;
pub use status::{BackgroundFetchStatus, RunState, StatusBoard, MAX_ERROR_HISTORY};

use crate::catalog::Catalog;
use crate::extract::{ExtractContext, SourceExtractor};
use crate::fetch::Fetcher;
pub use crate::progress::ProgressCallback;
use crate::progress::{self, ProgressEmitter, ProgressEventKind, ProgressReceiver, ProgressSender};
use crate::types::{CandidateRecord, HarvestResult, SourceDescriptor};

use background::RunControl;

/// Receives each source's candidates as soon as the source finishes.
pub trait RecordSink: Send + Sync {
    fn accept(&self, source: &str, records: &[CandidateRecord]) -> HarvestResult<()>;
}

/// Which sources a run covers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SourceSelection {
    #[default]
    All,
    Named(Vec<String>),
}

/// Outcome of one pass over the selected sources.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    /// Candidates from every source that produced any, failed or not.
    pub records: Vec<CandidateRecord>,
    /// Non-fatal per-source errors, `"<source>: <error>"`.
    pub errors: Vec<String>,
    pub sources_completed: usize,
    pub sources_total: usize,
}

struct SourceOutcome {
    records: Vec<CandidateRecord>,
    error: Option<String>,
}

/// Priority-ordered multi-source orchestrator.
pub struct Orchestrator {
    catalog: RwLock<Catalog>,
    extractors: HashMap<String, Arc<dyn SourceExtractor>>,
    fetcher: Fetcher,
    status: StatusBoard,
    progress: ProgressSender,
    /// Held for the whole of any run, foreground or background.
    run_lock: AsyncMutex<()>,
    control: RunControl,
}

impl Orchestrator {
    /// Build the orchestrator, compiling every source's extractor.
    pub fn new(catalog: Catalog, fetcher: Fetcher) -> HarvestResult<Self> {
        let mut extractors = HashMap::new();
        for source in catalog.list_sources() {
            extractors.insert(source.name.clone(), source.extractor.build()?);
        }
        let (progress, _) = progress::channel();

        Ok(Self {
            catalog: RwLock::new(catalog),
            extractors,
            fetcher,
            status: StatusBoard::new(),
            progress,
            run_lock: AsyncMutex::new(()),
            control: RunControl::new(),
        })
    }

    /// Replace the extractor of one source with a custom implementation.
    pub fn with_extractor(
        mut self,
        source: impl Into<String>,
        extractor: Arc<dyn SourceExtractor>,
    ) -> Self {
        self.extractors.insert(source.into(), extractor);
        self
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    pub fn status_board(&self) -> &StatusBoard {
        &self.status
    }

    /// Copy of the current background status. Never waits on a run.
    pub fn background_status(&self) -> BackgroundFetchStatus {
        self.status.snapshot()
    }

    /// Subscribe to typed progress events of every subsequent run.
    pub fn subscribe(&self) -> ProgressReceiver {
        self.progress.subscribe()
    }

    /// Catalog sorted by ascending priority, ties in catalog order.
    pub fn list_sources(&self) -> Vec<SourceDescriptor> {
        self.read_catalog(|c| c.list_sources())
    }

    pub fn set_source_enabled(&self, name: &str, enabled: bool) -> HarvestResult<()> {
        let mut catalog = self.catalog.write().unwrap_or_else(|p| p.into_inner());
        catalog.set_enabled(name, enabled)
    }

    fn read_catalog<T>(&self, f: impl FnOnce(&Catalog) -> T) -> T {
        let catalog = self.catalog.read().unwrap_or_else(|p| p.into_inner());
        f(&catalog)
    }

    fn select(&self, selection: &SourceSelection) -> Vec<SourceDescriptor> {
        let sources = self.list_sources();
        match selection {
            SourceSelection::All => sources,
            SourceSelection::Named(names) => {
                for name in names {
                    if !sources.iter().any(|s| &s.name == name) {
                        tracing::warn!("unknown source '{name}' ignored");
                    }
                }
                sources
                    .into_iter()
                    .filter(|s| names.contains(&s.name))
                    .collect()
            }
        }
    }

    /// Run the selected sources once in the foreground.
    ///
    /// Per-source failures end up in the report and the status error
    /// history; the call itself only fails when a sink rejects a batch,
    /// which cannot happen here.
    pub async fn run_once<'a>(
        &'a self,
        selection: &SourceSelection,
        on_progress: Option<&'a ProgressCallback<'a>>,
    ) -> HarvestResult<RunReport> {
        self.run(selection, on_progress, None, false).await
    }

    /// Like [`run_once`](Self::run_once), handing each source's batch to
    /// `sink` as soon as it finishes. A sink error ends the run.
    pub async fn run_with_sink<'a>(
        &'a self,
        selection: &SourceSelection,
        on_progress: Option<&'a ProgressCallback<'a>>,
        sink: &'a dyn RecordSink,
    ) -> HarvestResult<RunReport> {
        self.run(selection, on_progress, Some(sink), false).await
    }

    pub(crate) async fn run<'a>(
        &'a self,
        selection: &SourceSelection,
        on_progress: Option<&'a ProgressCallback<'a>>,
        sink: Option<&'a dyn RecordSink>,
        cancellable: bool,
    ) -> HarvestResult<RunReport> {
        let _guard = self.run_lock.lock().await;

        let sources = self.select(selection);
        let total = sources.len();
        let started = Instant::now();
        let run_id = format!("run-{}", Utc::now().timestamp_millis());
        let mut emitter = ProgressEmitter::new(run_id, Some(&self.progress), on_progress);

        tracing::info!("starting run over {total} source(s)");
        self.status.begin(total);
        emitter.emit(ProgressEventKind::RunStarted { total });

        let mut report = RunReport {
            sources_total: total,
            ..RunReport::default()
        };

        for source in sources {
            if cancellable && self.control.stop_requested() {
                tracing::info!(
                    "stop requested, halting after {}/{total} source(s)",
                    report.sources_completed
                );
                break;
            }

            if !source.enabled {
                tracing::debug!("{}: disabled, skipping", source.name);
                report.sources_completed += 1;
                self.status.source_done(report.sources_completed);
                emitter.emit(ProgressEventKind::SourceSkipped {
                    source: source.name.clone(),
                    completed: report.sources_completed,
                    total,
                });
                continue;
            }

            let outcome = self
                .harvest_source(&source, &mut emitter, report.sources_completed, total)
                .await;
            report.sources_completed += 1;
            let completed = report.sources_completed;
            let count = outcome.records.len();

            if let Some(error) = outcome.error {
                let entry = format!("{}: {error}", source.name);
                tracing::warn!("source failed: {entry}");
                self.status.record_error(entry.clone());
                report.errors.push(entry);
                emitter.emit(ProgressEventKind::SourceFailed {
                    source: source.name.clone(),
                    error,
                    completed,
                    total,
                });
            } else {
                emitter.emit(ProgressEventKind::SourceCompleted {
                    source: source.name.clone(),
                    records: count,
                    completed,
                    total,
                });
            }

            if let Some(sink) = sink {
                if !outcome.records.is_empty() {
                    if let Err(e) = sink.accept(&source.name, &outcome.records) {
                        tracing::error!("{}: failed to persist batch: {e}", source.name);
                        self.status.source_done(completed);
                        return Err(e);
                    }
                }
            }

            self.status.source_done(completed);
            report.records.extend(outcome.records);
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            "run finished: {} record(s) from {}/{} source(s), {} error(s)",
            report.records.len(),
            report.sources_completed,
            total,
            report.errors.len()
        );
        emitter.emit(ProgressEventKind::RunFinished {
            records: report.records.len(),
            errors: report.errors.len(),
            completed: report.sources_completed,
            total,
            elapsed_ms,
        });

        Ok(report)
    }

    /// Fetch and extract every page of one source.
    async fn harvest_source(
        &self,
        source: &SourceDescriptor,
        emitter: &mut ProgressEmitter<'_>,
        completed: usize,
        total: usize,
    ) -> SourceOutcome {
        let mut records = Vec::new();

        let Some(extractor) = self.extractors.get(&source.name) else {
            return SourceOutcome {
                records,
                error: Some("no extractor configured".to_string()),
            };
        };

        let paged = ["{page}", "{offset}"]
            .iter()
            .any(|p| source.endpoint.contains(p));
        let last_page = if paged { source.max_pages } else { 1 };

        for page in 1..=last_page {
            let url = source.page_url(page);
            let content = match self.fetcher.fetch(&url).await {
                Ok(content) => content,
                Err(e) => {
                    return SourceOutcome {
                        records,
                        error: Some(e.to_string()),
                    }
                }
            };

            let ctx = ExtractContext {
                source: &source.name,
                page,
                url: &url,
            };
            let batch = match catch_unwind(AssertUnwindSafe(|| extractor.extract(&content, &ctx)))
            {
                Ok(batch) => batch,
                Err(_) => {
                    return SourceOutcome {
                        records,
                        error: Some(format!("extractor panicked on page {page}")),
                    }
                }
            };

            let found = batch.len();
            records.extend(batch);
            emitter.emit(ProgressEventKind::PageFetched {
                source: source.name.clone(),
                page,
                records: found,
                completed,
                total,
            });

            if found == 0 {
                tracing::debug!("{}: page {page} empty, stopping", source.name);
                break;
            }
        }

        SourceOutcome {
            records,
            error: None,
        }
    }
}
