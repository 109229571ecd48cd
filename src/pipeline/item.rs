//! Work items moving through the pipeline.

use crate::data::{Frame, FrameId, ImageData, ResultData};
use crate::graph::ProcedureRun;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;

/// Everything produced for one frame (or one direct run).
#[derive(Debug, Default)]
pub struct ResultBundle {
    /// `None` for run-once results
    pub frame_id: Option<FrameId>,
    pub procedures: BTreeMap<String, ProcedureRun>,
    /// `(stage, message)` for every recoverable stage failure
    pub stage_errors: Vec<(String, String)>,
    pub elapsed: Duration,
}

impl ResultBundle {
    pub fn new(frame_id: Option<FrameId>) -> Self {
        Self {
            frame_id,
            ..Default::default()
        }
    }

    pub fn procedure(&self, name: &str) -> Option<&ProcedureRun> {
        self.procedures.get(name)
    }

    /// One tool's results within one procedure
    pub fn result(&self, procedure: &str, tool: &str) -> Option<&ResultData> {
        self.procedures.get(procedure)?.result(tool)
    }

    /// Terminal image of one tool within one procedure
    pub fn image(&self, procedure: &str, tool: &str) -> Option<&ImageData> {
        self.procedures.get(procedure)?.image(tool)
    }

    /// Number of failed tools across all procedures
    pub fn failure_count(&self) -> usize {
        self.procedures.values().map(|run| run.failures.len()).sum()
    }

    pub fn is_success(&self) -> bool {
        self.stage_errors.is_empty() && self.failure_count() == 0
    }

    /// Return every terminal image to its pool.
    pub fn recycle_images(&mut self) {
        for run in self.procedures.values_mut() {
            run.recycle_images();
        }
    }

    /// JSON summary of every tool's results.
    pub fn to_json(&self) -> Value {
        let procedures: serde_json::Map<String, Value> = self
            .procedures
            .iter()
            .map(|(name, run)| {
                let tools: serde_json::Map<String, Value> = run
                    .results
                    .iter()
                    .map(|(tool, result)| (tool.clone(), result.to_json()))
                    .collect();
                (
                    name.clone(),
                    json!({
                        "order": run.order,
                        "elapsed_us": run.elapsed.as_micros() as u64,
                        "tools": tools,
                    }),
                )
            })
            .collect();

        json!({
            "frame_id": self.frame_id,
            "elapsed_us": self.elapsed.as_micros() as u64,
            "procedures": procedures,
            "stage_errors": self.stage_errors,
        })
    }
}

/// A frame and the results accumulated for it so far.
#[derive(Debug)]
pub struct PipelineItem {
    pub frame: Frame,
    pub bundle: ResultBundle,
}

impl PipelineItem {
    pub fn new(frame: Frame) -> Self {
        let bundle = ResultBundle::new(Some(frame.id));
        Self { frame, bundle }
    }

    pub fn id(&self) -> FrameId {
        self.frame.id
    }

    /// Return the frame image and any terminal images to their pools.
    pub fn recycle(mut self) {
        if let Some(image) = self.frame.image.take() {
            image.recycle();
        }
        self.bundle.recycle_images();
    }
}
