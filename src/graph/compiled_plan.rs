use crate::graph::id::NodeId;

/// Compiled execution plan for a Procedure graph.
///
/// Per-node vectors are indexed by `NodeId::index()` and sized to the node
/// slot count, so removed slots simply have empty entries.
#[derive(Debug, Clone, Default)]
pub struct CompiledPlan {
    /// Live nodes in topological order
    pub order: Vec<NodeId>,

    /// Distinct upstream nodes of each node, in connection order
    pub upstream: Vec<Vec<NodeId>>,

    /// Nodes fed by each node's image output
    pub image_targets: Vec<Vec<NodeId>>,

    /// Nodes declaring an image input with no incoming image edge;
    /// they receive the run's input image
    pub image_roots: Vec<NodeId>,

    /// Cache invalidation generation number
    pub generation: u64,

    /// Compilation statistics
    pub stats: PlanStats,
}

/// Statistics about the compiled plan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanStats {
    /// Live nodes in the graph
    pub total_nodes: usize,

    /// Number of connections
    pub edges: usize,

    /// Nodes without incoming connections
    pub root_nodes: usize,

    /// Nodes without outgoing connections
    pub sink_nodes: usize,

    /// Compilation time in microseconds
    pub compile_time_us: u64,
}

impl CompiledPlan {
    /// Check if the plan has any nodes
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
