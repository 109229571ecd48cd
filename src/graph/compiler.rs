use super::compiled_plan::{CompiledPlan, PlanStats};
use super::connection::Edge;
use super::id::NodeId;
use super::port::PortKind;
use super::tool::ToolNode;
use std::collections::VecDeque;

/// Nodes Kahn's algorithm could not schedule because they sit on a cycle
/// (or downstream of one).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleError {
    pub unscheduled: Vec<NodeId>,
}

/// Compiles a Procedure graph into an execution plan
pub struct PlanCompiler;

impl PlanCompiler {
    /// Compile the graph into a plan.
    ///
    /// # Arguments
    /// * `nodes` - Node slots; `None` marks a removed node
    /// * `edges` - All connections
    /// * `generation` - Generation counter for cache invalidation
    ///
    /// # Returns
    /// A `CompiledPlan` with every live node in topological order, or the
    /// unscheduled nodes when the graph has a cycle.
    pub fn compile(
        nodes: &[Option<ToolNode>],
        edges: &[Edge],
        generation: u64,
    ) -> Result<CompiledPlan, CycleError> {
        let start_time = std::time::Instant::now();

        let (adj, upstream, image_targets) = Self::build_adjacency(nodes, edges);
        let order = Self::topological_sort(nodes, &adj)?;

        let image_roots = Self::image_roots(nodes, edges);

        let total_nodes = order.len();
        let root_nodes = order
            .iter()
            .filter(|id| upstream[id.index()].is_empty())
            .count();
        let sink_nodes = order.iter().filter(|id| adj[id.index()].is_empty()).count();

        let stats = PlanStats {
            total_nodes,
            edges: edges.len(),
            root_nodes,
            sink_nodes,
            compile_time_us: start_time.elapsed().as_micros() as u64,
        };

        Ok(CompiledPlan {
            order,
            upstream,
            image_targets,
            image_roots,
            generation,
            stats,
        })
    }

    /// Forward adjacency (one entry per edge), distinct upstream lists and
    /// image routing.
    #[allow(clippy::type_complexity)]
    fn build_adjacency(
        nodes: &[Option<ToolNode>],
        edges: &[Edge],
    ) -> (Vec<Vec<usize>>, Vec<Vec<NodeId>>, Vec<Vec<NodeId>>) {
        let n = nodes.len();
        let mut adj = vec![Vec::new(); n];
        let mut upstream: Vec<Vec<NodeId>> = vec![Vec::new(); n];
        let mut image_targets: Vec<Vec<NodeId>> = vec![Vec::new(); n];

        for edge in edges {
            let from = edge.from_node.index();
            let to = edge.to_node.index();

            // Skip edges involving removed nodes
            if from >= n || to >= n || nodes[from].is_none() || nodes[to].is_none() {
                continue;
            }

            adj[from].push(to);
            if !upstream[to].contains(&edge.from_node) {
                upstream[to].push(edge.from_node);
            }
            if edge.kind == PortKind::Image {
                image_targets[from].push(edge.to_node);
            }
        }

        (adj, upstream, image_targets)
    }

    /// Kahn's algorithm, FIFO so that independent nodes keep insertion order
    fn topological_sort(
        nodes: &[Option<ToolNode>],
        adj: &[Vec<usize>],
    ) -> Result<Vec<NodeId>, CycleError> {
        let n = nodes.len();
        let mut in_degree = vec![0usize; n];
        for targets in adj {
            for &to in targets {
                in_degree[to] += 1;
            }
        }

        let mut queue: VecDeque<usize> = (0..n)
            .filter(|&i| nodes[i].is_some() && in_degree[i] == 0)
            .collect();
        let mut order = Vec::with_capacity(n);

        while let Some(node) = queue.pop_front() {
            order.push(NodeId(node as u32));

            for &neighbor in &adj[node] {
                in_degree[neighbor] -= 1;
                if in_degree[neighbor] == 0 {
                    queue.push_back(neighbor);
                }
            }
        }

        let live = nodes.iter().filter(|slot| slot.is_some()).count();
        if order.len() != live {
            let unscheduled = (0..n)
                .filter(|&i| nodes[i].is_some() && in_degree[i] > 0)
                .map(|i| NodeId(i as u32))
                .collect();
            return Err(CycleError { unscheduled });
        }

        Ok(order)
    }

    fn image_roots(nodes: &[Option<ToolNode>], edges: &[Edge]) -> Vec<NodeId> {
        nodes
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| {
                let node = slot.as_ref()?;
                let id = NodeId(idx as u32);
                let fed = edges
                    .iter()
                    .any(|e| e.to_node == id && e.kind == PortKind::Image);
                (node.has_image_input() && !fed).then_some(id)
            })
            .collect()
    }
}
