//! DeterministicPipeline: ordered, staged frame processing.
//!
//! Stage *i*'s output queue is stage *i+1*'s input queue. Frame ids are
//! assigned at ingress under one lock, every queue is FIFO and every stage
//! has exactly one worker, so ids leave the last stage in increasing order.
//! Backpressure drops leave gaps, never inversions.
//!
//! A pipeline runs once: `start`, then `stop`. Build a new one to restart.

use crate::config::PipelineConfig;
use crate::data::{Frame, FrameId, ImageData};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::item::PipelineItem;
use crate::pipeline::processor::StageProcessor;
use crate::pipeline::queue::{BoundedQueue, QueueDepth};
use crate::pipeline::stage::{PipelineControl, PipelineStage, StageState, StageStats, WorkerSettings};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// What `stop` managed to clean up.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StopReport {
    /// Workers that exited inside the drain window
    pub joined: usize,
    /// Stages whose workers had to be detached
    pub detached: Vec<String>,
    /// Items still queued between stages, returned to the pool
    pub discarded: usize,
}

impl StopReport {
    pub fn is_clean(&self) -> bool {
        self.detached.is_empty()
    }
}

pub struct DeterministicPipeline {
    config: PipelineConfig,
    /// `queues[0]` is the ingress, the last one the egress
    queues: Vec<BoundedQueue<PipelineItem>>,
    stages: Vec<PipelineStage>,
    next_frame_id: Mutex<FrameId>,
    rejected: AtomicU64,
    control: Arc<PipelineControl>,
    state: Mutex<StageState>,
}

impl DeterministicPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let ingress = BoundedQueue::new("ingress", config.queue_capacity);
        Self {
            config,
            queues: vec![ingress],
            stages: Vec::new(),
            next_frame_id: Mutex::new(0),
            rejected: AtomicU64::new(0),
            control: Arc::new(PipelineControl::default()),
            state: Mutex::new(StageState::Idle),
        }
    }

    /// Continue numbering from an earlier pipeline so ids are never reused.
    pub fn with_first_frame_id(self, first: FrameId) -> Self {
        *self.next_frame_id.lock() = first;
        self
    }

    /// Append a stage fed by the current last queue.
    pub fn add_stage(&mut self, processor: Box<dyn StageProcessor>) -> PipelineResult<()> {
        match *self.state.lock() {
            StageState::Idle => {}
            StageState::Stopped => return Err(PipelineError::AlreadyStopped),
            _ => return Err(PipelineError::AlreadyRunning),
        }

        let input = self.egress().clone();
        let output = BoundedQueue::new(
            format!("{}-out", processor.name()),
            self.config.queue_capacity,
        );
        tracing::debug!(
            "Added stage '{}' ({} -> {})",
            processor.name(),
            input.name(),
            output.name()
        );
        self.stages.push(PipelineStage::new(processor, input, output.clone()));
        self.queues.push(output);
        Ok(())
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Spawn one worker per stage.
    pub fn start(&mut self) -> PipelineResult<()> {
        match self.state() {
            StageState::Idle => {}
            StageState::Stopped => return Err(PipelineError::AlreadyStopped),
            _ => return Err(PipelineError::AlreadyRunning),
        }
        if self.stages.is_empty() {
            return Err(PipelineError::NoStages);
        }

        let settings = WorkerSettings {
            poll_interval: self.config.poll_interval(),
            backpressure_retry: self.config.backpressure_retry(),
            overflow_policy: self.config.overflow_policy,
            tail: false,
        };

        let last = self.stages.len() - 1;
        for i in 0..self.stages.len() {
            let settings = WorkerSettings {
                tail: i == last,
                ..settings
            };
            if let Err(e) = self.stages[i].start(settings, Arc::clone(&self.control)) {
                tracing::error!("Failed to start pipeline: {}", e);
                self.stop();
                return Err(e);
            }
        }

        *self.state.lock() = StageState::Running;
        tracing::info!(
            "Pipeline started: {} stage(s), queue capacity {}, {:?} on overflow",
            self.stages.len(),
            self.config.queue_capacity,
            self.config.overflow_policy
        );
        Ok(())
    }

    /// Wait until every accepted item has reached the egress or been
    /// dropped, or `timeout` passes. Returns whether the pipeline went quiet.
    pub fn drain(&self, timeout: Duration) -> bool {
        self.drain_until(deadline_after(timeout))
    }

    /// Cooperative stop: workers finish their current item and exit. Items
    /// still between stages are discarded; the egress keeps its items.
    /// Workers get `drain_timeout` to join.
    pub fn stop(&mut self) -> StopReport {
        self.stop_until(deadline_after(self.config.drain_timeout()))
    }

    /// Drain, then stop, both inside one `window`. Whatever the drain does
    /// not use is left for the workers to join.
    pub fn drain_and_stop(&mut self, window: Duration) -> (bool, StopReport) {
        let deadline = deadline_after(window);
        let drained = self.drain_until(deadline);
        (drained, self.stop_until(deadline))
    }

    /// Items accepted at ingress and not yet at the egress
    pub fn in_flight(&self) -> usize {
        self.control.in_flight()
    }

    fn drain_until(&self, deadline: Instant) -> bool {
        loop {
            let quiet = self.control.in_flight() == 0;
            if quiet || self.control.stop_requested() {
                return quiet;
            }
            if Instant::now() >= deadline {
                tracing::warn!(
                    "Pipeline did not drain in time; {} item(s) in flight",
                    self.control.in_flight()
                );
                return false;
            }
            std::thread::sleep(self.config.poll_interval().min(Duration::from_millis(5)));
        }
    }

    fn stop_until(&mut self, deadline: Instant) -> StopReport {
        {
            let mut state = self.state.lock();
            if *state == StageState::Stopped {
                return StopReport::default();
            }
            *state = StageState::Draining;
        }

        self.control.request_stop();
        for stage in &self.stages {
            stage.begin_drain();
        }

        let mut report = StopReport::default();
        for stage in &mut self.stages {
            if stage.join(deadline) {
                report.joined += 1;
            } else {
                report.detached.push(stage.name().to_string());
            }
        }

        let last = self.queues.len() - 1;
        for queue in &self.queues[..last] {
            for item in queue.drain() {
                report.discarded += 1;
                self.control.settle();
                item.recycle();
            }
        }

        *self.state.lock() = StageState::Stopped;
        tracing::info!(
            "Pipeline stopped: {} joined, {} detached, {} discarded",
            report.joined,
            report.detached.len(),
            report.discarded
        );
        report
    }

    /// Assign the next frame id and enqueue, waiting up to `timeout`.
    ///
    /// Returns `None` when the pipeline is not running or the ingress stayed
    /// full; the image then goes back to its pool and no id is used up.
    pub fn put_frame(
        &self,
        image: ImageData,
        metadata: BTreeMap<String, serde_json::Value>,
        timeout: Duration,
    ) -> Option<FrameId> {
        if self.state() != StageState::Running {
            tracing::debug!("Frame rejected: pipeline is {:?}", self.state());
            image.recycle();
            return None;
        }

        let mut next_id = self.next_frame_id.lock();
        let id = *next_id;
        let item = PipelineItem::new(Frame::new(id, image).with_metadata(metadata));

        self.control.admit();
        match self.queues[0].push_timeout(item, timeout) {
            Ok(()) => {
                *next_id += 1;
                tracing::trace!("Frame {} entered the pipeline", id);
                Some(id)
            }
            Err(item) => {
                drop(next_id);
                self.control.settle();
                self.rejected.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Ingress full; frame rejected");
                item.recycle();
                None
            }
        }
    }

    /// Next completed item from the last stage.
    pub fn recv(&self, timeout: Duration) -> Option<PipelineItem> {
        self.egress().pop(timeout)
    }

    /// Handle on the egress queue, for a collector thread.
    pub fn egress_handle(&self) -> BoundedQueue<PipelineItem> {
        self.egress().clone()
    }

    /// Id the next accepted frame will get
    pub fn next_frame_id(&self) -> FrameId {
        *self.next_frame_id.lock()
    }

    pub fn queue_depths(&self) -> Vec<QueueDepth> {
        self.queues.iter().map(QueueDepth::from).collect()
    }

    /// Items lost to backpressure inside the pipeline
    pub fn frames_dropped(&self) -> u64 {
        self.stages.iter().map(|s| s.stats().dropped).sum()
    }

    /// Frames refused at ingress
    pub fn frames_rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Items that made it through the last stage
    pub fn frames_processed(&self) -> u64 {
        self.stages.last().map_or(0, |s| s.stats().processed)
    }

    pub fn stage_stats(&self) -> Vec<(String, StageStats)> {
        self.stages
            .iter()
            .map(|s| (s.name().to_string(), s.stats()))
            .collect()
    }

    pub fn stage_states(&self) -> Vec<(String, StageState)> {
        self.stages
            .iter()
            .map(|s| (s.name().to_string(), s.state()))
            .collect()
    }

    /// `Stopped` as soon as a stage failed, even before `stop` is called.
    pub fn state(&self) -> StageState {
        if self.control.fatal_error().is_some() {
            return StageState::Stopped;
        }
        *self.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.state() == StageState::Running
    }

    pub fn fatal_error(&self) -> Option<PipelineError> {
        self.control.fatal_error()
    }

    pub(crate) fn control(&self) -> Arc<PipelineControl> {
        Arc::clone(&self.control)
    }

    fn egress(&self) -> &BoundedQueue<PipelineItem> {
        &self.queues[self.queues.len() - 1]
    }
}

impl Drop for DeterministicPipeline {
    fn drop(&mut self) {
        let active = self.state.lock().is_active();
        if active {
            self.stop();
        }
    }
}

impl std::fmt::Debug for DeterministicPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeterministicPipeline")
            .field("state", &self.state())
            .field("stages", &self.stages)
            .field("next_frame_id", &self.next_frame_id())
            .finish()
    }
}

fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .unwrap_or_else(|| now + Duration::from_secs(3600))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{BufferPool, BufferShape};
    use crate::pipeline::error::StageError;
    use crate::pipeline::processor::FnStage;
    use crate::pipeline::queue::OverflowPolicy;

    const WAIT: Duration = Duration::from_secs(2);

    fn config(capacity: usize) -> PipelineConfig {
        PipelineConfig {
            poll_interval_ms: 2,
            backpressure_retry_ms: 2,
            ..PipelineConfig::default().with_queue_capacity(capacity)
        }
    }

    fn image() -> ImageData {
        ImageData::filled(BufferShape::new(2, 2, 1), 0)
    }

    fn noop(name: &str) -> Box<dyn StageProcessor> {
        Box::new(FnStage::new(name, |_: &mut PipelineItem| Ok(())))
    }

    fn sleepy(name: &str, millis: u64) -> Box<dyn StageProcessor> {
        Box::new(FnStage::new(name, move |_: &mut PipelineItem| {
            std::thread::sleep(Duration::from_millis(millis));
            Ok(())
        }))
    }

    #[test]
    fn test_start_requires_stages() {
        let mut pipeline = DeterministicPipeline::new(config(2));
        assert_eq!(pipeline.start(), Err(PipelineError::NoStages));
        assert_eq!(pipeline.put_frame(image(), BTreeMap::new(), WAIT), None);
        assert_eq!(pipeline.next_frame_id(), 0);
    }

    #[test]
    fn test_frames_leave_in_order() {
        let mut pipeline = DeterministicPipeline::new(config(16));
        pipeline
            .add_stage(Box::new(FnStage::new("jitter", |item: &mut PipelineItem| {
                std::thread::sleep(Duration::from_millis(item.id() * 7 % 13));
                Ok(())
            })))
            .unwrap();
        pipeline.add_stage(noop("fast")).unwrap();
        pipeline.start().unwrap();

        for expected in 0..10 {
            assert_eq!(pipeline.put_frame(image(), BTreeMap::new(), WAIT), Some(expected));
        }
        let ids: Vec<_> = (0..10)
            .filter_map(|_| pipeline.recv(WAIT).map(|item| item.id()))
            .collect();
        assert_eq!(ids, (0..10).collect::<Vec<_>>());

        let report = pipeline.stop();
        assert!(report.is_clean());
        assert_eq!(report.joined, 2);
        assert_eq!(pipeline.frames_processed(), 10);
        assert!(pipeline
            .stage_states()
            .iter()
            .all(|(_, state)| *state == StageState::Stopped));
    }

    #[test]
    fn test_stage_error_travels_with_item() {
        let mut pipeline = DeterministicPipeline::new(config(4));
        pipeline
            .add_stage(Box::new(FnStage::new("reject", |_: &mut PipelineItem| {
                Err(StageError::new("no part present"))
            })))
            .unwrap();
        pipeline.add_stage(noop("after")).unwrap();
        pipeline.start().unwrap();

        pipeline.put_frame(image(), BTreeMap::new(), WAIT).unwrap();
        let item = pipeline.recv(WAIT).unwrap();
        assert_eq!(
            item.bundle.stage_errors,
            vec![("reject".to_string(), "no part present".to_string())]
        );
        assert!(!item.bundle.is_success());
    }

    #[test]
    fn test_rejected_frame_keeps_id() {
        let mut pipeline = DeterministicPipeline::new(config(1));
        pipeline.add_stage(sleepy("slow", 150)).unwrap();
        pipeline.start().unwrap();

        assert_eq!(pipeline.put_frame(image(), BTreeMap::new(), WAIT), Some(0));
        // Worker holds frame 0; frame 1 fills the ingress
        assert_eq!(pipeline.put_frame(image(), BTreeMap::new(), WAIT), Some(1));
        assert_eq!(pipeline.put_frame(image(), BTreeMap::new(), Duration::ZERO), None);
        assert_eq!(pipeline.frames_rejected(), 1);

        assert_eq!(pipeline.put_frame(image(), BTreeMap::new(), WAIT), Some(2));
    }

    #[test]
    fn test_backpressure_drops_oldest_without_reordering() {
        let mut pipeline = DeterministicPipeline::new(PipelineConfig {
            overflow_policy: OverflowPolicy::DropOldest,
            ..config(1)
        });
        pipeline.add_stage(noop("only")).unwrap();
        pipeline.start().unwrap();

        // Nobody reads the egress, so older results get evicted
        for _ in 0..6 {
            pipeline.put_frame(image(), BTreeMap::new(), WAIT).unwrap();
        }
        assert!(pipeline.drain(WAIT));
        assert!(pipeline.frames_dropped() > 0);

        let mut last = None;
        while let Some(item) = pipeline.recv(Duration::from_millis(10)) {
            assert!(last.map_or(true, |prev| item.id() > prev));
            last = Some(item.id());
        }
        assert_eq!(last, Some(5));
    }

    #[test]
    fn test_panic_stops_pipeline() {
        let mut pipeline = DeterministicPipeline::new(config(4));
        pipeline
            .add_stage(Box::new(FnStage::new("fragile", |item: &mut PipelineItem| {
                if item.id() == 1 {
                    panic!("bad frame");
                }
                Ok(())
            })))
            .unwrap();
        pipeline.start().unwrap();

        pipeline.put_frame(image(), BTreeMap::new(), WAIT).unwrap();
        pipeline.put_frame(image(), BTreeMap::new(), WAIT).unwrap();
        assert!(pipeline.recv(WAIT).is_some());

        let deadline = Instant::now() + WAIT;
        while pipeline.fatal_error().is_none() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(matches!(
            pipeline.fatal_error(),
            Some(PipelineError::StageFailed { ref stage, .. }) if stage == "fragile"
        ));
        assert_eq!(pipeline.state(), StageState::Stopped);
        assert_eq!(pipeline.put_frame(image(), BTreeMap::new(), WAIT), None);

        assert!(pipeline.stop().is_clean());
        assert_eq!(pipeline.start(), Err(PipelineError::AlreadyStopped));
    }

    #[test]
    fn test_stop_discards_inner_items_and_returns_buffers() {
        let pool = BufferPool::new(4, BufferShape::new(2, 2, 1));
        let mut pipeline = DeterministicPipeline::new(config(4));
        pipeline.add_stage(sleepy("slow", 100)).unwrap();
        pipeline.start().unwrap();

        for _ in 0..3 {
            let image = ImageData::from_pool(&pool, Some(Duration::ZERO));
            pipeline.put_frame(image, BTreeMap::new(), WAIT).unwrap();
        }
        let report = pipeline.stop();
        assert!(report.discarded >= 1);

        while let Some(item) = pipeline.recv(Duration::ZERO) {
            item.recycle();
        }
        assert_eq!(pool.in_use_count(), 0);
    }

    #[test]
    fn test_drain_waits_for_item_held_by_worker() {
        let mut pipeline = DeterministicPipeline::new(config(4));
        pipeline.add_stage(sleepy("slow", 60)).unwrap();
        pipeline.add_stage(noop("tail")).unwrap();
        pipeline.start().unwrap();

        pipeline.put_frame(image(), BTreeMap::new(), WAIT).unwrap();
        // Every queue is empty while the first worker holds the frame
        std::thread::sleep(Duration::from_millis(15));
        assert_eq!(pipeline.in_flight(), 1);

        assert!(pipeline.drain(WAIT));
        assert_eq!(pipeline.in_flight(), 0);
        assert_eq!(pipeline.recv(Duration::ZERO).map(|item| item.id()), Some(0));
        assert_eq!(pipeline.stop().discarded, 0);
    }

    #[test]
    fn test_drain_and_stop_share_one_window() {
        let mut pipeline = DeterministicPipeline::new(PipelineConfig {
            drain_timeout_ms: 150,
            ..config(4)
        });
        pipeline.add_stage(sleepy("stuck", 1000)).unwrap();
        pipeline.start().unwrap();
        pipeline.put_frame(image(), BTreeMap::new(), WAIT).unwrap();
        std::thread::sleep(Duration::from_millis(10));

        let started = Instant::now();
        let (drained, report) = pipeline.drain_and_stop(Duration::from_millis(150));
        let elapsed = started.elapsed();

        assert!(!drained);
        assert_eq!(report.detached, vec!["stuck".to_string()]);
        assert!(elapsed >= Duration::from_millis(140), "{:?}", elapsed);
        assert!(elapsed < Duration::from_millis(280), "{:?}", elapsed);
    }
}
