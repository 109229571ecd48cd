//! Continuous run loop: runs every procedure of a solution on a fixed
//! period until stopped.
//!
//! No frame is fed in, so this is what drives chains that start from a
//! source tool. Each run gets the next frame id and its bundle lands in the
//! result store like a pipeline result.

use crate::data::FrameId;
use crate::pipeline::stage::panic_message;
use crate::pipeline::{PipelineError, SharedProcedure};
use crate::solution::events::{EventHub, SolutionEvent};
use crate::solution::store::ResultStore;
use crate::solution::{run_procedures, SolutionState};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

pub(crate) struct ContinuousContext {
    pub procedures: Vec<SharedProcedure>,
    pub interval: Duration,
    pub store: Arc<ResultStore>,
    pub events: Arc<EventHub>,
    pub state: Arc<Mutex<SolutionState>>,
    pub retain_images: bool,
}

/// Counters shared with the loop thread.
#[derive(Debug)]
struct LoopCounters {
    next_frame_id: AtomicU64,
    runs: AtomicU64,
}

/// What the loop did before it was stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ContinuousSummary {
    pub runs: u64,
    pub next_frame_id: FrameId,
    /// The thread exited inside the stop window
    pub joined: bool,
}

pub(crate) struct ContinuousRunner {
    /// Dropping the sender wakes the loop and ends it
    stop: Option<Sender<()>>,
    /// Disconnects when the loop thread exits
    done: Option<Receiver<()>>,
    handle: Option<JoinHandle<()>>,
    counters: Arc<LoopCounters>,
}

impl ContinuousRunner {
    pub(crate) fn spawn(
        solution: &str,
        first_frame_id: FrameId,
        ctx: ContinuousContext,
    ) -> Result<Self, PipelineError> {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(0);
        let counters = Arc::new(LoopCounters {
            next_frame_id: AtomicU64::new(first_frame_id),
            runs: AtomicU64::new(0),
        });
        let loop_counters = Arc::clone(&counters);

        let handle = std::thread::Builder::new()
            .name(format!("continuous-{}", solution))
            .spawn(move || {
                let _done = done_tx;
                run_loop(ctx, stop_rx, &loop_counters);
            })
            .map_err(|e| PipelineError::Spawn {
                stage: "continuous".to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            stop: Some(stop_tx),
            done: Some(done_rx),
            handle: Some(handle),
            counters,
        })
    }

    /// Signal the loop and wait up to `timeout` for the run in progress to
    /// finish. A loop that does not exit in time is detached.
    pub(crate) fn stop(mut self, timeout: Duration) -> ContinuousSummary {
        self.stop.take();
        let joined = match self.done.take() {
            Some(done) => matches!(
                done.recv_timeout(timeout),
                Err(RecvTimeoutError::Disconnected)
            ),
            None => true,
        };

        if let Some(handle) = self.handle.take() {
            if !joined {
                tracing::warn!("Continuous run did not stop within {:?}; detaching", timeout);
            } else if handle.join().is_err() {
                tracing::error!("Continuous run thread panicked outside a run");
            }
        }

        ContinuousSummary {
            runs: self.counters.runs.load(Ordering::Acquire),
            next_frame_id: self.counters.next_frame_id.load(Ordering::Acquire),
            joined,
        }
    }
}

impl Drop for ContinuousRunner {
    fn drop(&mut self) {
        self.stop.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run_loop(ctx: ContinuousContext, stop: Receiver<()>, counters: &LoopCounters) {
    tracing::debug!("Continuous run loop started ({:?} period)", ctx.interval);
    ctx.events.emit(SolutionEvent::ContinuousStarted {
        interval_ms: ctx.interval.as_millis() as u64,
    });

    loop {
        let started = Instant::now();
        let frame_id = counters.next_frame_id.fetch_add(1, Ordering::AcqRel);
        ctx.events.emit(SolutionEvent::RunStarted);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            run_procedures(&ctx.procedures, None, Some(frame_id))
        }));
        let mut bundle = match outcome {
            Ok(bundle) => bundle,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!("Continuous run {} panicked: {}; loop stopped", frame_id, message);
                *ctx.state.lock() = SolutionState::Error;
                ctx.events.emit(SolutionEvent::ContinuousFailed { message });
                break;
            }
        };

        counters.runs.fetch_add(1, Ordering::AcqRel);
        ctx.events.emit(SolutionEvent::RunCompleted {
            elapsed_us: bundle.elapsed.as_micros() as u64,
            failures: bundle.failure_count(),
        });
        if !ctx.retain_images {
            bundle.recycle_images();
        }
        ctx.store.insert(frame_id, bundle);

        // Start-to-start period; an overrun goes straight to the next run
        let wait = ctx.interval.saturating_sub(started.elapsed());
        if !matches!(stop.recv_timeout(wait), Err(RecvTimeoutError::Timeout)) {
            break;
        }
    }

    tracing::debug!(
        "Continuous run loop exiting after {} run(s)",
        counters.runs.load(Ordering::Acquire)
    );
}
