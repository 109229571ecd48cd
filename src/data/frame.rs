use crate::data::ImageData;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Identifier assigned to a frame at pipeline ingress
pub type FrameId = u64;

/// A unit of streaming work
///
/// The id is assigned once when the frame enters a pipeline and never
/// changes. Stages may take the image out, which is why it is optional.
#[derive(Debug)]
pub struct Frame {
    pub id: FrameId,
    pub image: Option<ImageData>,
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl Frame {
    pub fn new(id: FrameId, image: ImageData) -> Self {
        Self {
            id,
            image: Some(image),
            metadata: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, metadata: BTreeMap<String, serde_json::Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Time since the frame entered the pipeline
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.created_at
    }
}
