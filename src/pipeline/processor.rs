//! Stage processing functions.
//!
//! A [`StageProcessor`] is what a stage's worker calls for every item.
//! [`ProcedureStage`] runs owned Procedures; [`FnStage`] adapts a closure.

use crate::data::ImageData;
use crate::graph::Procedure;
use crate::pipeline::error::StageError;
use crate::pipeline::item::PipelineItem;
use parking_lot::Mutex;
use std::sync::Arc;

/// One procedure shared between a Solution and the stage that runs it.
/// Each procedure has its own lock, so stages never wait on each other.
pub type SharedProcedure = Arc<Mutex<Procedure>>;

/// Work done by one stage on one item.
#[cfg_attr(test, mockall::automock)]
pub trait StageProcessor: Send {
    fn name(&self) -> &str;

    /// Process one item in place. An `Err` is recorded on the item's bundle
    /// and the item still moves to the next stage.
    fn process(&mut self, item: &mut PipelineItem) -> Result<(), StageError>;
}

/// Closure-backed stage.
pub struct FnStage<F> {
    name: String,
    f: F,
}

impl<F> FnStage<F>
where
    F: FnMut(&mut PipelineItem) -> Result<(), StageError> + Send,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> StageProcessor for FnStage<F>
where
    F: FnMut(&mut PipelineItem) -> Result<(), StageError> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&mut self, item: &mut PipelineItem) -> Result<(), StageError> {
        (self.f)(item)
    }
}

/// Runs one or more Procedures on each frame.
///
/// Every procedure gets its own copy of the frame image. A consuming stage
/// (the last one in a pipeline) hands the original to its last procedure
/// instead, so the buffer goes back to the pool inside the run. Only the
/// procedure being run is locked.
pub struct ProcedureStage {
    name: String,
    procedures: Vec<SharedProcedure>,
    targets: Vec<String>,
    consume_image: bool,
}

impl ProcedureStage {
    pub fn new(procedures: Vec<SharedProcedure>) -> Self {
        let targets: Vec<String> = procedures
            .iter()
            .map(|p| p.lock().name().to_string())
            .collect();
        Self {
            name: targets.join("+"),
            procedures,
            targets,
            consume_image: false,
        }
    }

    /// Stage running a single procedure
    pub fn single(procedure: SharedProcedure) -> Self {
        Self::new(vec![procedure])
    }

    pub fn consuming_image(mut self, consume: bool) -> Self {
        self.consume_image = consume;
        self
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }
}

impl StageProcessor for ProcedureStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&mut self, item: &mut PipelineItem) -> Result<(), StageError> {
        if self.procedures.is_empty() {
            return Err(StageError::new("stage has no procedures"));
        }
        let last = self.procedures.len() - 1;

        for (i, (procedure, target)) in self.procedures.iter().zip(&self.targets).enumerate() {
            let input = if self.consume_image && i == last {
                item.frame.image.take()
            } else {
                item.frame.image.as_ref().map(ImageData::duplicate)
            };

            let run = procedure.lock().run(input);
            item.bundle.elapsed += run.elapsed;
            item.bundle.procedures.insert(target.clone(), run);
        }
        Ok(())
    }
}
