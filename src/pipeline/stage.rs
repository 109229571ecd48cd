//! PipelineStage: one worker thread between two bounded queues.
//!
//! The worker pops an item, runs the stage processor on it and pushes it
//! downstream, checking the stop flag between items. One worker per stage
//! and FIFO queues keep items in arrival order.

use crate::pipeline::error::PipelineError;
use crate::pipeline::item::PipelineItem;
use crate::pipeline::processor::StageProcessor;
use crate::pipeline::queue::{BoundedQueue, OverflowPolicy, PushOutcome};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use parking_lot::Mutex;
use serde::Serialize;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Lifecycle of a stage (and of the pipeline as a whole).
///
/// `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StageState {
    Idle,
    Running,
    Draining,
    Stopped,
}

impl StageState {
    pub fn is_active(&self) -> bool {
        matches!(self, StageState::Running | StageState::Draining)
    }
}

/// Stop flag, fatal error and in-flight count shared by a pipeline and all
/// its workers.
#[derive(Debug, Default)]
pub(crate) struct PipelineControl {
    stop: AtomicBool,
    fatal: Mutex<Option<PipelineError>>,
    /// Items admitted at ingress that have neither reached the egress nor
    /// been dropped
    in_flight: AtomicUsize,
}

impl PipelineControl {
    pub(crate) fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub(crate) fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Record the first fatal error and stop every worker.
    pub(crate) fn fail(&self, error: PipelineError) {
        {
            let mut fatal = self.fatal.lock();
            if fatal.is_none() {
                *fatal = Some(error);
            }
        }
        self.request_stop();
    }

    pub(crate) fn fatal_error(&self) -> Option<PipelineError> {
        self.fatal.lock().clone()
    }

    /// Count an item before it becomes visible in the ingress.
    pub(crate) fn admit(&self) {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
    }

    /// An item reached the egress or left the pipeline.
    pub(crate) fn settle(&self) {
        let _ = self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }
}

/// Timing knobs handed to each worker.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WorkerSettings {
    pub poll_interval: Duration,
    pub backpressure_retry: Duration,
    pub overflow_policy: OverflowPolicy,
    /// The worker's output is the egress
    pub tail: bool,
}

#[derive(Debug, Default)]
struct StageCounters {
    processed: AtomicU64,
    dropped: AtomicU64,
    errors: AtomicU64,
}

/// Per-stage counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageStats {
    pub processed: u64,
    /// Items lost to the overflow policy on this stage's output queue
    pub dropped: u64,
    /// Recoverable processor errors
    pub errors: u64,
}

pub struct PipelineStage {
    name: String,
    input: BoundedQueue<PipelineItem>,
    output: BoundedQueue<PipelineItem>,
    /// Moved into the worker on start
    processor: Option<Box<dyn StageProcessor>>,
    state: Arc<Mutex<StageState>>,
    counters: Arc<StageCounters>,
    handle: Option<JoinHandle<()>>,
    /// Disconnects when the worker exits
    done: Option<Receiver<()>>,
}

impl PipelineStage {
    pub fn new(
        processor: Box<dyn StageProcessor>,
        input: BoundedQueue<PipelineItem>,
        output: BoundedQueue<PipelineItem>,
    ) -> Self {
        Self {
            name: processor.name().to_string(),
            input,
            output,
            processor: Some(processor),
            state: Arc::new(Mutex::new(StageState::Idle)),
            counters: Arc::new(StageCounters::default()),
            handle: None,
            done: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input(&self) -> &BoundedQueue<PipelineItem> {
        &self.input
    }

    pub fn output(&self) -> &BoundedQueue<PipelineItem> {
        &self.output
    }

    pub fn state(&self) -> StageState {
        *self.state.lock()
    }

    pub fn stats(&self) -> StageStats {
        StageStats {
            processed: self.counters.processed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
        }
    }

    /// Spawn the worker thread.
    pub(crate) fn start(
        &mut self,
        settings: WorkerSettings,
        control: Arc<PipelineControl>,
    ) -> Result<(), PipelineError> {
        match self.state() {
            StageState::Idle => {}
            StageState::Running | StageState::Draining => return Err(PipelineError::AlreadyRunning),
            StageState::Stopped => return Err(PipelineError::AlreadyStopped),
        }
        let processor = self.processor.take().ok_or(PipelineError::AlreadyStopped)?;

        let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(0);
        let worker = StageWorker {
            name: self.name.clone(),
            processor,
            input: self.input.clone(),
            output: self.output.clone(),
            settings,
            control,
            state: Arc::clone(&self.state),
            counters: Arc::clone(&self.counters),
        };

        *self.state.lock() = StageState::Running;
        let spawned = std::thread::Builder::new()
            .name(format!("stage-{}", self.name))
            .spawn(move || {
                let _done = done_tx;
                worker.run();
            });

        match spawned {
            Ok(handle) => {
                self.handle = Some(handle);
                self.done = Some(done_rx);
                Ok(())
            }
            Err(e) => {
                *self.state.lock() = StageState::Stopped;
                Err(PipelineError::Spawn {
                    stage: self.name.clone(),
                    message: e.to_string(),
                })
            }
        }
    }

    pub(crate) fn begin_drain(&self) {
        let mut state = self.state.lock();
        if *state == StageState::Running {
            *state = StageState::Draining;
        }
    }

    /// Wait for the worker until `deadline`. Returns `false` if it had to be
    /// detached.
    pub(crate) fn join(&mut self, deadline: Instant) -> bool {
        let Some(handle) = self.handle.take() else {
            *self.state.lock() = StageState::Stopped;
            return true;
        };

        let exited = match self.done.take() {
            Some(done) => matches!(
                done.recv_deadline(deadline),
                Err(RecvTimeoutError::Disconnected)
            ),
            None => true,
        };

        if !exited {
            tracing::warn!(
                "[{}] Worker did not stop within the drain window; detaching",
                self.name
            );
            return false;
        }

        if handle.join().is_err() {
            tracing::error!("[{}] Worker thread panicked outside its processor", self.name);
        }
        *self.state.lock() = StageState::Stopped;
        true
    }
}

impl std::fmt::Debug for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineStage")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("input", &self.input)
            .field("output", &self.output)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Everything the worker thread owns.
struct StageWorker {
    name: String,
    processor: Box<dyn StageProcessor>,
    input: BoundedQueue<PipelineItem>,
    output: BoundedQueue<PipelineItem>,
    settings: WorkerSettings,
    control: Arc<PipelineControl>,
    state: Arc<Mutex<StageState>>,
    counters: Arc<StageCounters>,
}

impl StageWorker {
    fn run(mut self) {
        tracing::info!("[{}] Stage worker started", self.name);

        while !self.control.stop_requested() {
            let Some(mut item) = self.input.pop(self.settings.poll_interval) else {
                continue;
            };
            let frame_id = item.id();

            let processor = &mut self.processor;
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| processor.process(&mut item)));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    tracing::warn!("[{}] Frame {} failed: {}", self.name, frame_id, err);
                    self.counters.errors.fetch_add(1, Ordering::Relaxed);
                    item.bundle
                        .stage_errors
                        .push((self.name.clone(), err.to_string()));
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    tracing::error!(
                        "[{}] Processor panicked on frame {}: {}; stopping pipeline",
                        self.name,
                        frame_id,
                        message
                    );
                    self.control.fail(PipelineError::StageFailed {
                        stage: self.name.clone(),
                        message,
                    });
                    item.recycle();
                    self.control.settle();
                    break;
                }
            }

            self.counters.processed.fetch_add(1, Ordering::Relaxed);
            self.forward(item);
        }

        *self.state.lock() = StageState::Stopped;
        tracing::info!("[{}] Stage worker exiting", self.name);
    }

    fn forward(&self, item: PipelineItem) {
        let frame_id = item.id();
        match self.output.push_with_policy(
            item,
            self.settings.backpressure_retry,
            self.settings.overflow_policy,
        ) {
            PushOutcome::Enqueued => {
                if self.settings.tail {
                    self.control.settle();
                }
                tracing::trace!("[{}] Frame {} forwarded", self.name, frame_id);
            }
            PushOutcome::DroppedOldest(old) => {
                // One of the two left the pipeline: `old` from an inner queue,
                // or `frame_id` by reaching the egress
                self.control.settle();
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    "[{}] Backpressure on '{}': dropped oldest frame {}",
                    self.name,
                    self.output.name(),
                    old.id()
                );
                old.recycle();
            }
            PushOutcome::Rejected(new) => {
                self.control.settle();
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    "[{}] Backpressure on '{}': dropped frame {}",
                    self.name,
                    self.output.name(),
                    new.id()
                );
                new.recycle();
            }
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Frame, ImageData};
    use crate::memory::BufferShape;
    use crate::pipeline::error::StageError;
    use crate::pipeline::processor::{FnStage, MockStageProcessor};

    fn settings() -> WorkerSettings {
        WorkerSettings {
            poll_interval: Duration::from_millis(5),
            backpressure_retry: Duration::from_millis(5),
            overflow_policy: OverflowPolicy::DropOldest,
            tail: true,
        }
    }

    fn item(id: u64) -> PipelineItem {
        PipelineItem::new(Frame::new(id, ImageData::filled(BufferShape::new(1, 1, 1), 0)))
    }

    fn stage(processor: Box<dyn StageProcessor>) -> PipelineStage {
        PipelineStage::new(
            processor,
            BoundedQueue::new("in", 4),
            BoundedQueue::new("out", 4),
        )
    }

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(2)
    }

    #[test]
    fn test_worker_processes_and_records_errors() {
        let processor = FnStage::new("odd", |item: &mut PipelineItem| {
            if item.id() % 2 == 1 {
                Err(StageError::new("odd frame"))
            } else {
                Ok(())
            }
        });
        let mut stage = stage(Box::new(processor));
        let control = Arc::new(PipelineControl::default());
        stage.start(settings(), Arc::clone(&control)).unwrap();
        assert_eq!(stage.state(), StageState::Running);

        for id in 0..2 {
            control.admit();
            stage.input().try_push(item(id)).unwrap();
        }

        let first = stage.output().pop(Duration::from_secs(2)).unwrap();
        let second = stage.output().pop(Duration::from_secs(2)).unwrap();
        assert_eq!((first.id(), second.id()), (0, 1));
        assert!(first.bundle.stage_errors.is_empty());
        assert_eq!(second.bundle.stage_errors[0].0, "odd");

        control.request_stop();
        stage.begin_drain();
        assert!(stage.join(deadline()));
        assert_eq!(stage.state(), StageState::Stopped);
        assert_eq!(stage.stats().processed, 2);
        assert_eq!(stage.stats().errors, 1);
        assert_eq!(control.in_flight(), 0);
    }

    #[test]
    fn test_panic_is_fatal() {
        let mut processor = MockStageProcessor::new();
        processor.expect_name().return_const("lens".to_string());
        processor
            .expect_process()
            .returning(|_| panic!("lens cracked"));

        let mut stage = stage(Box::new(processor));
        let control = Arc::new(PipelineControl::default());
        stage.start(settings(), Arc::clone(&control)).unwrap();
        control.admit();
        stage.input().try_push(item(0)).unwrap();

        assert!(stage.join(deadline()));
        assert!(control.stop_requested());
        assert_eq!(control.in_flight(), 0);
        assert_eq!(
            control.fatal_error(),
            Some(PipelineError::StageFailed {
                stage: "lens".to_string(),
                message: "lens cracked".to_string(),
            })
        );
        assert!(stage.output().is_empty());
    }

    #[test]
    fn test_stage_cannot_restart() {
        let mut stage = stage(Box::new(FnStage::new("noop", |_: &mut PipelineItem| Ok(()))));
        let control = Arc::new(PipelineControl::default());
        stage.start(settings(), Arc::clone(&control)).unwrap();
        assert_eq!(
            stage.start(settings(), Arc::clone(&control)),
            Err(PipelineError::AlreadyRunning)
        );

        control.request_stop();
        assert!(stage.join(deadline()));
        assert_eq!(
            stage.start(settings(), control),
            Err(PipelineError::AlreadyStopped)
        );
    }

    #[test]
    fn test_inner_stage_keeps_item_in_flight() {
        let mut stage = stage(Box::new(FnStage::new("head", |_: &mut PipelineItem| Ok(()))));
        let control = Arc::new(PipelineControl::default());
        let inner = WorkerSettings {
            tail: false,
            ..settings()
        };
        stage.start(inner, Arc::clone(&control)).unwrap();
        control.admit();
        stage.input().try_push(item(0)).unwrap();

        assert!(stage.output().pop(Duration::from_secs(2)).is_some());
        control.request_stop();
        assert!(stage.join(deadline()));
        // Only the tail hands items over to the egress
        assert_eq!(control.in_flight(), 1);
        control.settle();
        control.settle();
        assert_eq!(control.in_flight(), 0);
    }
}
