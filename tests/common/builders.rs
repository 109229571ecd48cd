//! Test data builders for creating test objects

use std::time::Duration;
use vischain_rs::config::PipelineConfig;
use vischain_rs::graph::{Connection, GraphDefinition, NodeDefinition};
use vischain_rs::memory::{BufferPool, BufferShape};
use vischain_rs::pipeline::OverflowPolicy;
use vischain_rs::{EngineContext, ImageData};

/// Shape used by every integration test
pub const SHAPE: BufferShape = BufferShape {
    width: 4,
    height: 4,
    channels: 1,
};

pub fn pool(capacity: usize) -> BufferPool {
    BufferPool::new(capacity, SHAPE)
}

pub fn context(capacity: usize) -> EngineContext {
    EngineContext::new(pool(capacity))
}

/// Pooled image with every pixel set to `value`
pub fn pooled_image(ctx: &EngineContext, value: u8) -> ImageData {
    let mut image = ImageData::from_pool(ctx.pool(), Some(Duration::from_millis(200)));
    image.pixels_mut().fill(value);
    image
}

/// Builder for linear chains: every node feeds the next one's image input
pub struct ChainBuilder {
    definition: GraphDefinition,
    last: Option<String>,
}

impl ChainBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            definition: GraphDefinition::new(name),
            last: None,
        }
    }

    pub fn then(self, node: &str, tool_type: &str) -> Self {
        self.then_node(NodeDefinition::new(node, tool_type))
    }

    pub fn then_node(mut self, node: NodeDefinition) -> Self {
        let name = node.name.clone();
        self.definition = self.definition.node(node);
        if let Some(previous) = self.last.replace(name.clone()) {
            self.definition = self.definition.edge(Connection::image(previous, name));
        }
        self
    }

    pub fn build(self) -> GraphDefinition {
        self.definition
    }
}

/// Pipeline settings with short waits
pub fn fast_pipeline_config(capacity: usize, policy: OverflowPolicy) -> PipelineConfig {
    PipelineConfig {
        queue_capacity: capacity,
        backpressure_retry_ms: 200,
        poll_interval_ms: 2,
        drain_timeout_ms: 2000,
        ingress_timeout_ms: 1000,
        overflow_policy: policy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_builder() {
        let def = ChainBuilder::new("p")
            .then("A", "Invert")
            .then("B", "Passthrough")
            .then("C", "Threshold")
            .build();

        assert_eq!(def.nodes.len(), 3);
        assert_eq!(def.edges, vec![Connection::image("A", "B"), Connection::image("B", "C")]);
    }
}
