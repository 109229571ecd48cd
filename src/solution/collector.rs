//! Background collector: moves finished items from the pipeline egress into
//! the result store.

use crate::pipeline::stage::PipelineControl;
use crate::pipeline::{BoundedQueue, PipelineError, PipelineItem};
use crate::solution::events::{EventHub, SolutionEvent};
use crate::solution::store::ResultStore;
use crate::solution::SolutionState;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

pub(crate) struct CollectorContext {
    pub egress: BoundedQueue<PipelineItem>,
    pub control: Arc<PipelineControl>,
    pub store: Arc<ResultStore>,
    pub events: Arc<EventHub>,
    pub state: Arc<Mutex<SolutionState>>,
    pub poll_interval: Duration,
    pub retain_images: bool,
}

pub(crate) struct Collector {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<usize>>,
}

impl Collector {
    pub(crate) fn spawn(solution: &str, ctx: CollectorContext) -> Result<Self, PipelineError> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let handle = std::thread::Builder::new()
            .name(format!("collector-{}", solution))
            .spawn(move || run_collector(ctx, stop_flag))
            .map_err(|e| PipelineError::Spawn {
                stage: "collector".to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Stop after collecting whatever is left in the egress. Returns how many
    /// items were collected in total.
    pub(crate) fn stop(mut self) -> usize {
        self.stop.store(true, Ordering::Release);
        match self.handle.take().map(JoinHandle::join) {
            Some(Ok(collected)) => collected,
            Some(Err(_)) => {
                tracing::error!("Collector thread panicked");
                0
            }
            None => 0,
        }
    }
}

impl Drop for Collector {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run_collector(ctx: CollectorContext, stop: Arc<AtomicBool>) -> usize {
    tracing::debug!("Collector started");
    let mut collected = 0;
    let mut failure_reported = false;

    while !stop.load(Ordering::Acquire) {
        if let Some(item) = ctx.egress.pop(ctx.poll_interval) {
            collect(&ctx, item);
            collected += 1;
        }

        if !failure_reported {
            if let Some(error) = ctx.control.fatal_error() {
                failure_reported = true;
                *ctx.state.lock() = SolutionState::Error;
                tracing::error!("Pipeline failed: {}", error);
                ctx.events.emit(SolutionEvent::PipelineFailed {
                    message: error.to_string(),
                });
            }
        }
    }

    for item in ctx.egress.drain() {
        collect(&ctx, item);
        collected += 1;
    }
    tracing::debug!("Collector exiting after {} item(s)", collected);
    collected
}

fn collect(ctx: &CollectorContext, item: PipelineItem) {
    let PipelineItem { frame, mut bundle } = item;
    if let Some(image) = frame.image {
        image.recycle();
    }
    if !ctx.retain_images {
        bundle.recycle_images();
    }

    let success = bundle.is_success();
    tracing::debug!("Collected frame {} ({})", frame.id, if success { "ok" } else { "with failures" });
    ctx.store.insert(frame.id, bundle);
    ctx.events.emit(SolutionEvent::FrameCompleted {
        frame_id: frame.id,
        success,
    });
}
