//! Progress events and broadcast channel for run telemetry.
//!
//! The orchestrator emits `ProgressEvent`s while it works through the
//! catalog. They flow through a `tokio::sync::broadcast` channel to any
//! number of subscribers (CLI printer, HTTP status, tests). When nobody is
//! subscribed, events are dropped.

use serde::{Deserialize, Serialize};

/// A progress event emitted during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// The run this event belongs to.
    pub run_id: String,
    /// Monotonically increasing sequence number within the run.
    pub seq: u64,
    pub event: ProgressEventKind,
}

/// The specific kind of progress event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProgressEventKind {
    RunStarted {
        total: usize,
    },
    /// One page of a source was fetched and extracted.
    PageFetched {
        source: String,
        page: u32,
        records: usize,
        completed: usize,
        total: usize,
    },
    SourceCompleted {
        source: String,
        records: usize,
        completed: usize,
        total: usize,
    },
    /// Disabled source; still counts as completed.
    SourceSkipped {
        source: String,
        completed: usize,
        total: usize,
    },
    SourceFailed {
        source: String,
        error: String,
        completed: usize,
        total: usize,
    },
    RunFinished {
        records: usize,
        errors: usize,
        completed: usize,
        total: usize,
        elapsed_ms: u64,
    },
}

impl ProgressEventKind {
    /// `(completed, total)` at the time of the event.
    pub fn counts(&self) -> (usize, usize) {
        match self {
            Self::RunStarted { total } => (0, *total),
            Self::PageFetched {
                completed, total, ..
            }
            | Self::SourceCompleted {
                completed, total, ..
            }
            | Self::SourceSkipped {
                completed, total, ..
            }
            | Self::SourceFailed {
                completed, total, ..
            }
            | Self::RunFinished {
                completed, total, ..
            } => (*completed, *total),
        }
    }

    /// Human-readable status line.
    pub fn message(&self) -> String {
        match self {
            Self::RunStarted { total } => format!("starting run over {total} source(s)"),
            Self::PageFetched {
                source,
                page,
                records,
                ..
            } => format!("{source}: page {page} yielded {records} record(s)"),
            Self::SourceCompleted {
                source, records, ..
            } => format!("{source}: done, {records} record(s)"),
            Self::SourceSkipped { source, .. } => format!("{source}: disabled, skipped"),
            Self::SourceFailed { source, error, .. } => format!("{source}: failed: {error}"),
            Self::RunFinished {
                records,
                errors,
                elapsed_ms,
                ..
            } => format!(
                "run finished: {records} record(s), {errors} error(s) in {:.1}s",
                *elapsed_ms as f64 / 1000.0
            ),
        }
    }
}

/// Sender handle for emitting progress events.
pub type ProgressSender = tokio::sync::broadcast::Sender<ProgressEvent>;

/// Receiver handle for consuming progress events.
pub type ProgressReceiver = tokio::sync::broadcast::Receiver<ProgressEvent>;

/// Create a progress broadcast channel with a bounded buffer.
///
/// 256 events covers a full default-catalog run (a handful of sources,
/// tens of pages) with room for a slow subscriber.
pub fn channel() -> (ProgressSender, ProgressReceiver) {
    tokio::sync::broadcast::channel(256)
}

/// `(status message, completed sources, total sources)`. May borrow caller
/// state for the duration of the run.
pub type ProgressCallback<'a> = dyn Fn(&str, usize, usize) + Send + Sync + 'a;

/// Per-run emitter: stamps events with the run id and sequence number and
/// forwards them to the optional callback and the broadcast channel.
pub(crate) struct ProgressEmitter<'a> {
    run_id: String,
    seq: u64,
    tx: Option<&'a ProgressSender>,
    callback: Option<&'a ProgressCallback<'a>>,
}

impl<'a> ProgressEmitter<'a> {
    pub(crate) fn new(
        run_id: String,
        tx: Option<&'a ProgressSender>,
        callback: Option<&'a ProgressCallback<'a>>,
    ) -> Self {
        Self {
            run_id,
            seq: 0,
            tx,
            callback,
        }
    }

    pub(crate) fn emit(&mut self, event: ProgressEventKind) {
        if let Some(callback) = self.callback {
            let (completed, total) = event.counts();
            callback(&event.message(), completed, total);
        }
        if let Some(sender) = self.tx {
            self.seq += 1;
            let _ = sender.send(ProgressEvent {
                run_id: self.run_id.clone(),
                seq: self.seq,
                event,
            });
        }
    }
}
