//! Background runs: at most one at a time, cooperative stop, optional
//! deadline.
//!
//! The run token is a `watch` channel holding "a background run is
//! active". Acquiring it is a compare-and-set under the channel's lock, so
//! a second `start` while a run is active is a silent no-op. The token is
//! released by a drop guard inside the spawned task, which also covers a
//! panicking or timed-out run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use super::{Orchestrator, RecordSink, RunState, SourceSelection};

/// Parameters of one background run.
#[derive(Debug, Clone, Default)]
pub struct BackgroundRequest {
    pub selection: SourceSelection,
    /// Deadline for the whole run. Elapsing ends it as `TimedOut`.
    pub timeout: Option<Duration>,
}

pub(crate) struct RunControl {
    active: watch::Sender<bool>,
    stop: AtomicBool,
}

impl RunControl {
    pub(crate) fn new() -> Self {
        let (active, _) = watch::channel(false);
        Self {
            active,
            stop: AtomicBool::new(false),
        }
    }

    fn try_acquire(&self) -> bool {
        self.active.send_if_modified(|active| {
            if *active {
                false
            } else {
                *active = true;
                true
            }
        })
    }

    fn release(&self) {
        self.active.send_replace(false);
    }

    pub(crate) fn is_active(&self) -> bool {
        *self.active.borrow()
    }

    pub(crate) fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

struct TokenGuard<'a>(&'a RunControl);

impl Drop for TokenGuard<'_> {
    fn drop(&mut self) {
        self.0.release();
    }
}

impl Orchestrator {
    /// Start a background run unless one is already active.
    ///
    /// Returns `false` (and changes nothing) when a run is in progress.
    /// Each finished source's batch is handed to `sink` immediately.
    /// Must be called from within a tokio runtime.
    pub fn start_background(
        self: &Arc<Self>,
        request: BackgroundRequest,
        sink: Arc<dyn RecordSink>,
    ) -> bool {
        if !self.control.try_acquire() {
            tracing::debug!("background run already in progress, ignoring start");
            return false;
        }
        self.control.stop.store(false, Ordering::SeqCst);
        self.status.mark_running();

        let this = Arc::clone(self);
        tokio::spawn(async move {
            let _token = TokenGuard(&this.control);
            let run = this.run(&request.selection, None, Some(sink.as_ref()), true);

            let outcome = match request.timeout {
                Some(limit) => match tokio::time::timeout(limit, run).await {
                    Ok(result) => Some(result),
                    Err(_) => None,
                },
                None => Some(run.await),
            };

            let state = match outcome {
                None => {
                    let limit = request.timeout.unwrap_or_default();
                    tracing::warn!("background run timed out after {limit:?}");
                    this.status
                        .record_error(format!("run timed out after {limit:?}"));
                    RunState::TimedOut
                }
                Some(Err(e)) => {
                    this.status.record_error(format!("run failed: {e}"));
                    RunState::Failed
                }
                // A stop that lands during the last source changes nothing.
                Some(Ok(report))
                    if this.control.stop_requested()
                        && report.sources_completed < report.sources_total =>
                {
                    RunState::Stopped
                }
                Some(Ok(_)) => RunState::Completed,
            };

            tracing::info!("background run ended: {state}");
            this.status.finish(state);
        });

        true
    }

    /// Ask the active background run to halt at the next source boundary.
    ///
    /// No-op when idle. Already-persisted batches are kept.
    pub fn stop_background(&self) {
        if !self.control.is_active() {
            return;
        }
        tracing::info!("stop requested for background run");
        self.control.stop.store(true, Ordering::SeqCst);
        self.status.mark_stopping();
    }

    /// Wait until no background run is active.
    pub async fn wait_background(&self) {
        let mut rx = self.control.active.subscribe();
        let _ = rx.wait_for(|active| !*active).await;
    }
}
