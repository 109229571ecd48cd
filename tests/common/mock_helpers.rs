//! Hand-written tools and stages for driving the engine from the outside

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use vischain_rs::graph::{ToolConfigError, ToolError, ToolOutput, ToolParams};
use vischain_rs::pipeline::{FnStage, PipelineItem, StageError};
use vischain_rs::{EngineContext, FrameId, ImageData, ResultData, Tool, ToolRegistry};

/// What a [`RecordingTool`] saw on one call
#[derive(Debug, Clone, PartialEq)]
pub struct Visit {
    pub tool: String,
    pub first_pixel: Option<u8>,
    pub upstream_keys: Vec<String>,
}

pub type VisitLog = Arc<Mutex<Vec<Visit>>>;

/// Passes its input through and logs every call. The optional `label`
/// parameter names the entries it logs.
pub struct RecordingTool {
    label: String,
    log: VisitLog,
}

impl RecordingTool {
    pub fn new(label: &str, log: VisitLog) -> Self {
        Self {
            label: label.to_string(),
            log,
        }
    }
}

impl Tool for RecordingTool {
    fn initialize(&mut self, params: &ToolParams, _ctx: &EngineContext) -> Result<(), ToolConfigError> {
        if let Some(label) = params.get("label") {
            self.label = label
                .as_str()
                .ok_or_else(|| ToolConfigError::InvalidParameters("label must be a string".into()))?
                .to_string();
        }
        Ok(())
    }

    fn requires_image_input(&self) -> bool {
        true
    }

    fn run(&mut self, input: Option<ImageData>, upstream: ResultData) -> Result<ToolOutput, ToolError> {
        let first_pixel = input.as_ref().and_then(|image| image.pixels().first().copied());
        self.log.lock().push(Visit {
            tool: self.label.clone(),
            first_pixel,
            upstream_keys: upstream.keys().map(str::to_string).collect(),
        });

        let mut results = ResultData::new();
        results.set_value(format!("seen_by_{}", self.label), first_pixel.map(u64::from));
        Ok(ToolOutput::new(input, results))
    }
}

/// Sleeps for `first pixel % max_ms` milliseconds before passing the image on
pub struct SleepTool {
    max_ms: u64,
}

impl Tool for SleepTool {
    fn initialize(&mut self, params: &ToolParams, _ctx: &EngineContext) -> Result<(), ToolConfigError> {
        if let Some(max) = params.get("max_ms").and_then(|v| v.as_u64()) {
            self.max_ms = max.max(1);
        }
        Ok(())
    }

    fn requires_image_input(&self) -> bool {
        true
    }

    fn run(&mut self, input: Option<ImageData>, _upstream: ResultData) -> Result<ToolOutput, ToolError> {
        let pixel = input
            .as_ref()
            .and_then(|image| image.pixels().first().copied())
            .unwrap_or(0);
        std::thread::sleep(Duration::from_millis(u64::from(pixel) % self.max_ms));
        Ok(ToolOutput::image(input))
    }
}

/// Always fails
pub struct FailingTool;

impl Tool for FailingTool {
    fn initialize(&mut self, _params: &ToolParams, _ctx: &EngineContext) -> Result<(), ToolConfigError> {
        Ok(())
    }

    fn requires_image_input(&self) -> bool {
        true
    }

    fn run(&mut self, input: Option<ImageData>, _upstream: ResultData) -> Result<ToolOutput, ToolError> {
        if let Some(image) = input {
            image.recycle();
        }
        Err(ToolError::Failed("sensor saturated".to_string()))
    }
}

/// Panics on every call
pub struct PanickingTool;

impl Tool for PanickingTool {
    fn initialize(&mut self, _params: &ToolParams, _ctx: &EngineContext) -> Result<(), ToolConfigError> {
        Ok(())
    }

    fn requires_image_input(&self) -> bool {
        true
    }

    fn run(&mut self, _input: Option<ImageData>, _upstream: ResultData) -> Result<ToolOutput, ToolError> {
        panic!("camera driver crashed");
    }
}

/// When a [`TimedTool`] started and finished one call
#[derive(Debug, Clone)]
pub struct Span {
    pub label: String,
    pub start: Instant,
    pub end: Instant,
}

impl Span {
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

pub type SpanLog = Arc<Mutex<Vec<Span>>>;

/// Holds every image for `hold_ms` and logs the span of each call under
/// its `label` parameter
pub struct TimedTool {
    label: String,
    hold_ms: u64,
    log: SpanLog,
}

impl Tool for TimedTool {
    fn initialize(&mut self, params: &ToolParams, _ctx: &EngineContext) -> Result<(), ToolConfigError> {
        if let Some(label) = params.get("label").and_then(|v| v.as_str()) {
            self.label = label.to_string();
        }
        if let Some(hold) = params.get("hold_ms").and_then(|v| v.as_u64()) {
            self.hold_ms = hold;
        }
        Ok(())
    }

    fn requires_image_input(&self) -> bool {
        true
    }

    fn run(&mut self, input: Option<ImageData>, _upstream: ResultData) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        std::thread::sleep(Duration::from_millis(self.hold_ms));
        self.log.lock().push(Span {
            label: self.label.clone(),
            start,
            end: Instant::now(),
        });
        Ok(ToolOutput::image(input))
    }
}

/// Built-in tools plus `Timed`; every `Timed` node appends to `spans`
pub fn timed_registry(spans: &SpanLog) -> ToolRegistry {
    let mut registry = ToolRegistry::with_builtin_tools();
    let spans = Arc::clone(spans);
    registry.register("Timed", move || {
        Box::new(TimedTool {
            label: "timed".to_string(),
            hold_ms: 10,
            log: Arc::clone(&spans),
        }) as Box<dyn Tool>
    });
    registry
}

/// Built-in tools plus `Record`, `Sleep`, `Fail` and `Panic`. Every `Record` node
/// appends to `log`.
pub fn test_registry(log: &VisitLog) -> ToolRegistry {
    let mut registry = ToolRegistry::with_builtin_tools();
    let log = Arc::clone(log);
    registry.register("Record", move || {
        Box::new(RecordingTool::new("record", Arc::clone(&log))) as Box<dyn Tool>
    });
    registry.register("Sleep", || Box::new(SleepTool { max_ms: 50 }) as Box<dyn Tool>);
    registry.register("Fail", || Box::new(FailingTool) as Box<dyn Tool>);
    registry.register("Panic", || Box::new(PanickingTool) as Box<dyn Tool>);
    registry
}

/// Stage that sleeps for a per-frame delay looked up by frame id
pub fn delay_stage(
    delays: Vec<u64>,
) -> FnStage<impl FnMut(&mut PipelineItem) -> Result<(), StageError> + Send> {
    FnStage::new("jitter", move |item: &mut PipelineItem| {
        let delay = delays.get(item.id() as usize).copied().unwrap_or(0);
        std::thread::sleep(Duration::from_millis(delay));
        Ok(())
    })
}

/// Stage that records the ids it sees, in order
pub fn id_recording_stage(
    seen: Arc<Mutex<Vec<FrameId>>>,
) -> FnStage<impl FnMut(&mut PipelineItem) -> Result<(), StageError> + Send> {
    FnStage::new("record", move |item: &mut PipelineItem| {
        seen.lock().push(item.id());
        Ok(())
    })
}

/// Deterministic pseudo-random delays in `0..max_ms`
pub fn jitter(count: usize, max_ms: u64, seed: u64) -> Vec<u64> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    (0..count)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (state >> 33) % max_ms
        })
        .collect()
}
