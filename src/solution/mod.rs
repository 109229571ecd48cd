//! Solution: top-level orchestrator.
//!
//! A Solution owns an ordered set of Procedures and runs them in one of
//! three ways:
//!
//! - directly (`run_once`, `step_run`) on the caller's thread
//! - on a timer (`start_continuous`), for chains that start from a source tool
//! - as frames arrive, through a [`DeterministicPipeline`] with one stage per
//!   Procedure
//!
//! Only one mode is active at a time: direct runs and graph changes are
//! refused while the pipeline or the continuous loop is running. Each
//! Procedure has its own lock, so pipeline stages run side by side.
//!
//! # Pipeline mode
//!
//! ```text
//! put_frame ─► Procedure 1 ─► ... ─► Procedure N ─► collector ─► ResultStore
//! ```
//!
//! The collector thread moves finished bundles into a bounded store where
//! they can be taken by frame id or as "most recent".

mod collector;
mod continuous;
pub mod error;
pub mod events;
pub mod stats;
pub mod store;

pub use error::SolutionError;
pub use events::{EventHub, SolutionEvent};
pub use stats::SolutionStatistics;
pub use store::ResultStore;

// The bundle type is shared with the pipeline
pub use crate::pipeline::ResultBundle;

use crate::config::EngineConfig;
use crate::context::EngineContext;
use crate::data::{FrameId, ImageData};
use crate::graph::{Procedure, ProcedureRun};
use crate::pipeline::{
    DeterministicPipeline, PipelineError, ProcedureStage, SharedProcedure, StageState, StopReport,
};
use collector::{Collector, CollectorContext};
use continuous::{ContinuousContext, ContinuousRunner};
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SolutionState {
    Idle,
    /// A direct run is in progress
    Running,
    /// The pipeline is running
    Pipeline,
    /// The continuous run loop is active
    Continuous,
    /// The pipeline or the continuous loop failed; stop it to recover
    Error,
}

/// A built pipeline and, while it runs, its collector.
struct PipelineRuntime {
    pipeline: DeterministicPipeline,
    collector: Option<Collector>,
    /// Roster generation the stages were built from
    roster_generation: u64,
}

pub struct Solution {
    name: String,
    config: EngineConfig,
    ctx: EngineContext,
    procedures: Vec<SharedProcedure>,
    roster_generation: u64,
    pipeline_mode: bool,
    buffer_size: usize,
    runtime: Option<PipelineRuntime>,
    continuous: Option<ContinuousRunner>,
    next_frame_id: FrameId,
    store: Arc<ResultStore>,
    events: Arc<EventHub>,
    state: Arc<Mutex<SolutionState>>,
}

impl Solution {
    /// Solution with default engine settings.
    pub fn new(name: impl Into<String>, ctx: EngineContext) -> Self {
        Self::from_config(name, &EngineConfig::default(), ctx)
    }

    pub fn from_config(name: impl Into<String>, config: &EngineConfig, ctx: EngineContext) -> Self {
        Self {
            name: name.into(),
            config: config.clone(),
            ctx,
            procedures: Vec::new(),
            roster_generation: 0,
            pipeline_mode: false,
            buffer_size: config.pipeline.queue_capacity,
            runtime: None,
            continuous: None,
            next_frame_id: 0,
            store: Arc::new(ResultStore::new(config.solution.max_stored_results)),
            events: Arc::new(EventHub::new()),
            state: Arc::new(Mutex::new(SolutionState::Idle)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> SolutionState {
        *self.state.lock()
    }

    pub fn subscribe(&self) -> Receiver<SolutionEvent> {
        self.events.subscribe()
    }

    // ── Procedure management ──

    /// Append a procedure. Names are unique within a solution.
    pub fn add_procedure(&mut self, procedure: Procedure) -> Result<(), SolutionError> {
        self.ensure_idle()?;
        if self.position(procedure.name()).is_some() {
            return Err(SolutionError::DuplicateProcedure(procedure.name().to_string()));
        }

        tracing::info!(
            "Solution '{}': added procedure '{}' ({} tools)",
            self.name,
            procedure.name(),
            procedure.tool_count()
        );
        self.procedures.push(Arc::new(Mutex::new(procedure)));
        self.roster_generation += 1;
        Ok(())
    }

    pub fn remove_procedure(&mut self, name: &str) -> Result<Procedure, SolutionError> {
        self.ensure_idle()?;
        let pos = self
            .position(name)
            .ok_or_else(|| SolutionError::UnknownProcedure(name.to_string()))?;

        // The idle pipeline's stages hold the procedure too
        self.runtime = None;
        let shared = self.procedures.remove(pos);
        match Arc::try_unwrap(shared) {
            Ok(procedure) => {
                self.roster_generation += 1;
                tracing::info!("Solution '{}': removed procedure '{}'", self.name, name);
                Ok(procedure.into_inner())
            }
            Err(shared) => {
                self.procedures.insert(pos, shared);
                tracing::warn!(
                    "Solution '{}': procedure '{}' is held by a detached worker",
                    self.name,
                    name
                );
                Err(SolutionError::ProcedureInUse(name.to_string()))
            }
        }
    }

    /// Procedure names in execution order
    pub fn procedure_names(&self) -> Vec<String> {
        self.procedures
            .iter()
            .map(|p| p.lock().name().to_string())
            .collect()
    }

    pub fn procedure_count(&self) -> usize {
        self.procedures.len()
    }

    /// Mutate one procedure (tools, connections, parameters).
    pub fn with_procedure<R>(
        &mut self,
        name: &str,
        f: impl FnOnce(&mut Procedure) -> R,
    ) -> Result<R, SolutionError> {
        self.ensure_idle()?;
        let pos = self
            .position(name)
            .ok_or_else(|| SolutionError::UnknownProcedure(name.to_string()))?;
        let result = f(&mut *self.procedures[pos].lock());
        // The name may have changed; stages are rebuilt on the next start
        self.roster_generation += 1;
        Ok(result)
    }

    // ── Direct mode ──

    /// Run every procedure once, in order, on the caller's thread.
    ///
    /// Each procedure gets its own copy of `image`; the last one takes the
    /// original.
    pub fn run_once(&mut self, image: Option<ImageData>) -> Result<ResultBundle, SolutionError> {
        let ready = self.ensure_idle().and_then(|()| {
            if self.procedures.is_empty() {
                Err(SolutionError::NoProcedures)
            } else {
                Ok(())
            }
        });
        if let Err(e) = ready {
            if let Some(image) = image {
                image.recycle();
            }
            return Err(e);
        }

        *self.state.lock() = SolutionState::Running;
        self.events.emit(SolutionEvent::RunStarted);
        let bundle = run_procedures(&self.procedures, image, None);

        *self.state.lock() = SolutionState::Idle;
        self.events.emit(SolutionEvent::RunCompleted {
            elapsed_us: bundle.elapsed.as_micros() as u64,
            failures: bundle.failure_count(),
        });
        tracing::debug!(
            "Solution '{}': run_once finished in {:?} ({} failure(s))",
            self.name,
            bundle.elapsed,
            bundle.failure_count()
        );
        Ok(bundle)
    }

    /// Run a single procedure directly.
    pub fn step_run(
        &mut self,
        procedure: &str,
        image: Option<ImageData>,
    ) -> Result<ProcedureRun, SolutionError> {
        let found = self.ensure_idle().and_then(|()| {
            self.position(procedure)
                .ok_or_else(|| SolutionError::UnknownProcedure(procedure.to_string()))
        });
        match found {
            Ok(pos) => Ok(self.procedures[pos].lock().run(image)),
            Err(e) => {
                if let Some(image) = image {
                    image.recycle();
                }
                Err(e)
            }
        }
    }

    // ── Continuous mode ──

    /// Run every procedure, with no input image, once per `interval` on a
    /// background thread until `stop_continuous`. Each run gets the next
    /// frame id and is stored like a pipeline result.
    ///
    /// Not available in pipeline mode.
    pub fn start_continuous(&mut self, interval: Duration) -> Result<(), SolutionError> {
        if self.is_continuous_running() {
            return Ok(());
        }
        if self.pipeline_mode {
            return Err(SolutionError::PipelineModeEnabled);
        }
        if self.procedures.is_empty() {
            return Err(SolutionError::NoProcedures);
        }

        // A failing first run overwrites this with `Error`
        *self.state.lock() = SolutionState::Continuous;
        let runner = ContinuousRunner::spawn(
            &self.name,
            self.next_frame_id,
            ContinuousContext {
                procedures: self.procedures.clone(),
                interval,
                store: Arc::clone(&self.store),
                events: Arc::clone(&self.events),
                state: Arc::clone(&self.state),
                retain_images: self.config.solution.retain_images,
            },
        );
        match runner {
            Ok(runner) => self.continuous = Some(runner),
            Err(e) => {
                *self.state.lock() = SolutionState::Idle;
                return Err(e.into());
            }
        }

        tracing::info!(
            "Solution '{}': continuous run started every {:?}",
            self.name,
            interval
        );
        Ok(())
    }

    /// Stop the continuous loop after the run in progress and return how
    /// many runs completed. Waits up to the drain window for the thread.
    pub fn stop_continuous(&mut self) -> u64 {
        let Some(runner) = self.continuous.take() else {
            return 0;
        };
        let summary = runner.stop(self.config.pipeline.drain_timeout());
        self.next_frame_id = summary.next_frame_id;

        *self.state.lock() = SolutionState::Idle;
        self.events.emit(SolutionEvent::ContinuousStopped {
            runs: summary.runs,
        });
        tracing::info!(
            "Solution '{}': continuous run stopped after {} run(s){}",
            self.name,
            summary.runs,
            if summary.joined { "" } else { ", thread detached" }
        );
        summary.runs
    }

    pub fn is_continuous_running(&self) -> bool {
        self.continuous.is_some()
    }

    // ── Pipeline mode ──

    /// Switch to pipeline mode with queues of depth `buffer_size`. The
    /// pipeline is built now and started by `start`.
    pub fn enable_pipeline_mode(&mut self, buffer_size: usize) -> Result<(), SolutionError> {
        self.ensure_idle()?;
        self.buffer_size = buffer_size.max(1);
        self.runtime = Some(self.build_runtime()?);
        self.pipeline_mode = true;
        tracing::info!(
            "Solution '{}': pipeline mode enabled (queue depth {})",
            self.name,
            self.buffer_size
        );
        Ok(())
    }

    /// Back to direct mode, stopping the pipeline if it runs.
    pub fn disable_pipeline_mode(&mut self) {
        if self.is_pipeline_running() {
            self.stop();
        }
        self.runtime = None;
        self.pipeline_mode = false;
        tracing::info!("Solution '{}': pipeline mode disabled", self.name);
    }

    pub fn is_pipeline_mode(&self) -> bool {
        self.pipeline_mode
    }

    pub fn is_pipeline_running(&self) -> bool {
        self.runtime
            .as_ref()
            .is_some_and(|rt| rt.collector.is_some())
    }

    /// Start the pipeline, rebuilding it if it already ran or the set of
    /// procedures changed since it was built.
    pub fn start(&mut self) -> Result<(), SolutionError> {
        if !self.pipeline_mode {
            return Err(SolutionError::PipelineNotEnabled);
        }
        if self.is_pipeline_running() {
            return Ok(());
        }

        let stale = self.runtime.as_ref().map_or(true, |rt| {
            rt.roster_generation != self.roster_generation
                || rt.pipeline.state() != StageState::Idle
        });
        if stale {
            self.runtime = Some(self.build_runtime()?);
        }

        let Some(runtime) = self.runtime.as_mut() else {
            return Err(SolutionError::PipelineNotEnabled);
        };
        runtime.pipeline.start()?;

        let collector = Collector::spawn(
            &self.name,
            CollectorContext {
                egress: runtime.pipeline.egress_handle(),
                control: runtime.pipeline.control(),
                store: Arc::clone(&self.store),
                events: Arc::clone(&self.events),
                state: Arc::clone(&self.state),
                poll_interval: self.config.pipeline.poll_interval(),
                retain_images: self.config.solution.retain_images,
            },
        );
        let collector = match collector {
            Ok(collector) => collector,
            Err(e) => {
                runtime.pipeline.stop();
                return Err(e.into());
            }
        };
        runtime.collector = Some(collector);

        *self.state.lock() = SolutionState::Pipeline;
        self.events.emit(SolutionEvent::PipelineStarted {
            stages: runtime.pipeline.stage_count(),
        });
        tracing::info!("Solution '{}': pipeline started", self.name);
        Ok(())
    }

    /// Let queued frames finish and stop the workers, both within one drain
    /// window, then collect what reached the end.
    pub fn stop(&mut self) -> StopReport {
        let Some(runtime) = self.runtime.as_mut() else {
            return StopReport::default();
        };
        let Some(collector) = runtime.collector.take() else {
            return StopReport::default();
        };

        let (_, report) = runtime
            .pipeline
            .drain_and_stop(self.config.pipeline.drain_timeout());
        self.next_frame_id = runtime.pipeline.next_frame_id();
        let collected = collector.stop();

        *self.state.lock() = SolutionState::Idle;
        self.events.emit(SolutionEvent::PipelineStopped {
            discarded: report.discarded,
        });
        tracing::info!(
            "Solution '{}': pipeline stopped ({} collected, {} discarded)",
            self.name,
            collected,
            report.discarded
        );
        report
    }

    /// Submit a frame; `false` when the pipeline is not running or full.
    pub fn put_frame(&self, image: ImageData) -> bool {
        self.submit_frame(image).is_some()
    }

    /// Submit a frame and get its id.
    pub fn submit_frame(&self, image: ImageData) -> Option<FrameId> {
        self.submit_frame_with(image, BTreeMap::new())
    }

    pub fn submit_frame_with(
        &self,
        image: ImageData,
        metadata: BTreeMap<String, serde_json::Value>,
    ) -> Option<FrameId> {
        match self.runtime.as_ref() {
            Some(rt) if rt.collector.is_some() => rt.pipeline.put_frame(
                image,
                metadata,
                self.config.pipeline.ingress_timeout(),
            ),
            _ => {
                tracing::debug!("Solution '{}': frame rejected, pipeline not running", self.name);
                image.recycle();
                None
            }
        }
    }

    /// Hand out the bundle for `frame_id`, once.
    pub fn take_result(&self, frame_id: FrameId) -> Option<ResultBundle> {
        self.store.take(frame_id)
    }

    pub fn take_latest(&self) -> Option<ResultBundle> {
        self.store.take_latest()
    }

    pub fn latest_frame_id(&self) -> Option<FrameId> {
        self.store.latest_frame_id()
    }

    pub fn wait_for_result(&self, frame_id: FrameId, timeout: Duration) -> Option<ResultBundle> {
        self.store.wait_for(frame_id, timeout)
    }

    /// Fatal stage failure of the current pipeline, if any.
    pub fn pipeline_error(&self) -> Option<PipelineError> {
        self.runtime.as_ref()?.pipeline.fatal_error()
    }

    pub fn get_statistics(&self) -> SolutionStatistics {
        let pool = self.ctx.pool().stats();
        let pipeline = self.runtime.as_ref().map(|rt| &rt.pipeline);

        SolutionStatistics {
            state: self.state(),
            available_buffers: pool.available,
            in_use_buffers: pool.in_use,
            pool,
            queue_depths: pipeline.map(|p| p.queue_depths()).unwrap_or_default(),
            frames_processed: self.store.collected(),
            frames_dropped: pipeline.map_or(0, |p| p.frames_dropped()),
            frames_rejected: pipeline.map_or(0, |p| p.frames_rejected()),
            stored_results: self.store.len(),
            stages: pipeline.map(|p| p.stage_stats()).unwrap_or_default(),
        }
    }

    fn ensure_idle(&self) -> Result<(), SolutionError> {
        if self.is_continuous_running() {
            return Err(SolutionError::ContinuousActive);
        }
        if self.is_pipeline_running() {
            return Err(SolutionError::PipelineActive);
        }
        Ok(())
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.procedures.iter().position(|p| p.lock().name() == name)
    }

    /// One `ProcedureStage` per procedure; the last stage consumes the image.
    fn build_runtime(&self) -> Result<PipelineRuntime, SolutionError> {
        if self.procedures.is_empty() {
            return Err(SolutionError::NoProcedures);
        }

        let config = self
            .config
            .pipeline
            .clone()
            .with_queue_capacity(self.buffer_size);
        let mut pipeline = DeterministicPipeline::new(config).with_first_frame_id(self.next_frame_id);

        let last = self.procedures.len() - 1;
        for (i, procedure) in self.procedures.iter().enumerate() {
            let stage = ProcedureStage::single(Arc::clone(procedure)).consuming_image(i == last);
            pipeline.add_stage(Box::new(stage))?;
        }

        tracing::debug!(
            "Solution '{}': built pipeline with {} stage(s)",
            self.name,
            pipeline.stage_count()
        );
        Ok(PipelineRuntime {
            pipeline,
            collector: None,
            roster_generation: self.roster_generation,
        })
    }
}

impl Drop for Solution {
    fn drop(&mut self) {
        if self.is_continuous_running() {
            self.stop_continuous();
        }
        if self.is_pipeline_running() {
            self.stop();
        }
    }
}

/// Run `procedures` in order on one input. Each gets its own copy of
/// `image`; the last one takes the original.
pub(crate) fn run_procedures(
    procedures: &[SharedProcedure],
    image: Option<ImageData>,
    frame_id: Option<FrameId>,
) -> ResultBundle {
    let started = Instant::now();
    let mut bundle = ResultBundle::new(frame_id);
    let mut image = image;
    let last = procedures.len().saturating_sub(1);

    for (i, shared) in procedures.iter().enumerate() {
        let input = if i == last {
            image.take()
        } else {
            image.as_ref().map(ImageData::duplicate)
        };
        let mut procedure = shared.lock();
        let run = procedure.run(input);
        bundle.procedures.insert(procedure.name().to_string(), run);
    }
    if let Some(image) = image {
        image.recycle();
    }

    bundle.elapsed = started.elapsed();
    bundle
}

impl std::fmt::Debug for Solution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Solution")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("procedures", &self.procedure_names())
            .field("pipeline_mode", &self.pipeline_mode)
            .field("continuous", &self.is_continuous_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphDefinition, NodeDefinition, ToolParams, ToolRegistry, Connection};
    use crate::memory::{BufferPool, BufferShape};

    const WAIT: Duration = Duration::from_secs(2);

    fn ctx() -> EngineContext {
        EngineContext::new(BufferPool::new(8, BufferShape::new(4, 4, 1)))
    }

    fn procedure(name: &str, ctx: &EngineContext) -> Procedure {
        let def = GraphDefinition::new(name)
            .node(NodeDefinition::new("Inv", "Invert"))
            .node(
                NodeDefinition::new("Bin", "Threshold")
                    .with_params(ToolParams::new().with("level", 128)),
            )
            .edge(Connection::image("Inv", "Bin"));
        Procedure::from_definition(&def, &ToolRegistry::with_builtin_tools(), ctx).unwrap()
    }

    fn solution() -> Solution {
        let ctx = ctx();
        let mut solution = Solution::new("line", ctx.clone());
        solution.add_procedure(procedure("inspect", &ctx)).unwrap();
        solution
    }

    #[test]
    fn test_run_once() {
        let mut solution = solution();
        let events = solution.subscribe();
        let image = ImageData::filled(BufferShape::new(4, 4, 1), 10);

        let bundle = solution.run_once(Some(image)).unwrap();
        assert!(bundle.is_success());
        assert_eq!(bundle.frame_id, None);
        assert_eq!(
            bundle.result("inspect", "Bin").unwrap().value("foreground_pixels"),
            Some(&16.into())
        );
        assert_eq!(events.try_recv(), Ok(SolutionEvent::RunStarted));
        assert!(matches!(events.try_recv(), Ok(SolutionEvent::RunCompleted { failures: 0, .. })));
        assert_eq!(solution.state(), SolutionState::Idle);
    }

    #[test]
    fn test_procedure_management() {
        let mut solution = solution();
        let ctx = solution.context().clone();
        assert_eq!(
            solution.add_procedure(procedure("inspect", &ctx)),
            Err(SolutionError::DuplicateProcedure("inspect".to_string()))
        );
        solution.add_procedure(procedure("measure", &ctx)).unwrap();
        assert_eq!(solution.procedure_names(), vec!["inspect", "measure"]);

        let tools = solution
            .with_procedure("measure", |p| p.tool_count())
            .unwrap();
        assert_eq!(tools, 2);

        assert!(solution.remove_procedure("measure").is_ok());
        assert!(matches!(
            solution.step_run("measure", None),
            Err(SolutionError::UnknownProcedure(_))
        ));
    }

    #[test]
    fn test_run_once_without_procedures() {
        let mut solution = Solution::new("empty", ctx());
        assert_eq!(
            solution.run_once(None).unwrap_err(),
            SolutionError::NoProcedures
        );
        assert_eq!(solution.start(), Err(SolutionError::PipelineNotEnabled));
        assert_eq!(
            solution.enable_pipeline_mode(2),
            Err(SolutionError::NoProcedures)
        );
    }

    #[test]
    fn test_pipeline_mode_excludes_direct_runs() {
        let mut solution = solution();
        solution.enable_pipeline_mode(2).unwrap();
        solution.start().unwrap();
        assert_eq!(solution.state(), SolutionState::Pipeline);

        assert_eq!(solution.run_once(None).unwrap_err(), SolutionError::PipelineActive);
        let ctx = solution.context().clone();
        assert_eq!(
            solution.add_procedure(procedure("late", &ctx)),
            Err(SolutionError::PipelineActive)
        );

        let id = solution
            .submit_frame(ImageData::from_pool(ctx.pool(), None))
            .unwrap();
        let bundle = solution.wait_for_result(id, WAIT).unwrap();
        assert_eq!(bundle.frame_id, Some(id));
        assert!(bundle.result("inspect", "Bin").unwrap().is_ok());

        solution.stop();
        assert_eq!(solution.state(), SolutionState::Idle);
        assert!(!solution.put_frame(ImageData::filled(BufferShape::new(4, 4, 1), 0)));
    }

    #[test]
    fn test_frame_ids_continue_after_restart() {
        let mut solution = solution();
        solution.enable_pipeline_mode(4).unwrap();
        let shape = BufferShape::new(4, 4, 1);

        solution.start().unwrap();
        assert_eq!(solution.submit_frame(ImageData::filled(shape, 0)), Some(0));
        assert_eq!(solution.submit_frame(ImageData::filled(shape, 0)), Some(1));
        solution.stop();

        solution.start().unwrap();
        assert_eq!(solution.submit_frame(ImageData::filled(shape, 0)), Some(2));
        solution.stop();

        assert_eq!(solution.latest_frame_id(), Some(2));
        assert_eq!(solution.get_statistics().frames_processed, 3);
    }

    #[test]
    fn test_continuous_and_pipeline_mode_exclude_each_other() {
        let mut solution = solution();
        let ctx = solution.context().clone();
        solution.enable_pipeline_mode(2).unwrap();
        assert_eq!(
            solution.start_continuous(Duration::from_millis(5)),
            Err(SolutionError::PipelineModeEnabled)
        );
        solution.disable_pipeline_mode();

        solution.start_continuous(Duration::from_millis(5)).unwrap();
        assert_eq!(solution.state(), SolutionState::Continuous);
        assert_eq!(solution.enable_pipeline_mode(2), Err(SolutionError::ContinuousActive));
        assert_eq!(
            solution.add_procedure(procedure("late", &ctx)),
            Err(SolutionError::ContinuousActive)
        );
        assert!(matches!(
            solution.step_run("inspect", None),
            Err(SolutionError::ContinuousActive)
        ));

        // The first run always completes before the loop looks at stop
        assert!(solution.stop_continuous() >= 1);
        assert!(!solution.is_continuous_running());
        assert_eq!(solution.state(), SolutionState::Idle);
        assert_eq!(solution.stop_continuous(), 0);
        assert!(solution.run_once(None).is_ok());
    }

    #[test]
    fn test_remove_procedure_after_pipeline_built() {
        let mut solution = solution();
        solution.enable_pipeline_mode(2).unwrap();

        let removed = solution.remove_procedure("inspect").unwrap();
        assert_eq!(removed.name(), "inspect");
        assert_eq!(solution.procedure_count(), 0);
        assert_eq!(solution.start(), Err(SolutionError::NoProcedures));
    }
}
