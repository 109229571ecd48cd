//! Procedure: one DAG of tool nodes and its synchronous executor.
//!
//! Connections are validated when they are made; the execution order is
//! recompiled on every graph change and `run` just walks the cached plan on
//! the caller's thread.
//!
//! # Data flow
//!
//! - An image edge moves the producer's output image into the consumer.
//!   When one output feeds several consumers, all but the last get a copy.
//! - Every edge (image or result) makes the producer's results visible to
//!   the consumer, nested under the producer's name.
//! - A disabled node, or one that needs an image but has none, is skipped:
//!   its image passes through and its consumers see its own upstream
//!   results instead of an entry for it.
//! - A failing node never aborts the run. Its consumers get a copy of the
//!   image it received and a failed marker as its results.

use crate::context::EngineContext;
use crate::data::{ImageData, ResultData};
use crate::graph::compiled_plan::{CompiledPlan, PlanStats};
use crate::graph::compiler::{CycleError, PlanCompiler};
use crate::graph::connection::{Connection, Edge};
use crate::graph::definition::{GraphDefinition, NodeDefinition};
use crate::graph::error::{ConfigurationError, ToolExecutionError};
use crate::graph::id::{EdgeId, NodeId};
use crate::graph::port::{PortDirection, PortKind, INPUT_IMAGE, OUTPUT_IMAGE};
use crate::graph::registry::ToolRegistry;
use crate::graph::tool::{ToolNode, ToolParams};
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

/// Everything one `Procedure::run` produced.
#[derive(Debug, Default)]
pub struct ProcedureRun {
    pub procedure: String,
    /// One entry per live node, including skipped and failed ones
    pub results: BTreeMap<String, ResultData>,
    /// Output images of nodes whose image output feeds nothing
    pub images: BTreeMap<String, ImageData>,
    pub failures: Vec<ToolExecutionError>,
    /// Node names in the order they were visited
    pub order: Vec<String>,
    pub elapsed: Duration,
}

impl ProcedureRun {
    fn new(procedure: &str) -> Self {
        Self {
            procedure: procedure.to_string(),
            ..Default::default()
        }
    }

    pub fn result(&self, tool: &str) -> Option<&ResultData> {
        self.results.get(tool)
    }

    pub fn image(&self, tool: &str) -> Option<&ImageData> {
        self.images.get(tool)
    }

    /// No node failed
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Return every terminal image to its pool.
    pub fn recycle_images(&mut self) {
        for (_, image) in std::mem::take(&mut self.images) {
            image.recycle();
        }
    }
}

/// What a visited node exposes to its consumers.
enum Forwarded {
    /// The node's own results, nested under its name downstream
    Own { name: String, results: ResultData },
    /// A skipped node's merged upstream, flattened into the consumer's view
    Transparent(ResultData),
}

/// One tool graph.
pub struct Procedure {
    name: String,
    enabled: bool,
    nodes: Vec<Option<ToolNode>>,
    names: HashMap<String, NodeId>,
    edges: Vec<Edge>,
    next_edge_id: u32,
    /// Cached compiled execution plan
    compiled_plan: CompiledPlan,
    /// Generation counter for cache invalidation
    graph_generation: u64,
    last_error: Option<String>,
    last_execution_time: Option<Duration>,
}

impl Procedure {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            nodes: Vec::new(),
            names: HashMap::new(),
            edges: Vec::new(),
            next_edge_id: 0,
            compiled_plan: CompiledPlan::default(),
            graph_generation: 0,
            last_error: None,
            last_execution_time: None,
        }
    }

    /// Build a procedure from a definition: add every node, then connect
    /// every edge, in the order they are listed.
    pub fn from_definition(
        definition: &GraphDefinition,
        registry: &ToolRegistry,
        ctx: &EngineContext,
    ) -> Result<Self, ConfigurationError> {
        let mut procedure = Procedure::new(&definition.name);
        procedure.enabled = definition.enabled;

        for node_def in &definition.nodes {
            let mut node = registry.instantiate(
                &node_def.name,
                &node_def.tool_type,
                node_def.params.clone(),
                ctx,
            )?;
            node.set_enabled(node_def.enabled);
            procedure.add_tool(node)?;
        }

        for edge in &definition.edges {
            procedure.connect(&edge.from_tool, &edge.from_port, &edge.to_tool, &edge.to_port)?;
        }

        tracing::info!(
            "Loaded procedure '{}': {} tools, {} connections",
            procedure.name,
            procedure.tool_count(),
            procedure.edges.len()
        );
        Ok(procedure)
    }

    /// Snapshot of the graph in definition form.
    pub fn to_definition(&self) -> GraphDefinition {
        GraphDefinition {
            name: self.name.clone(),
            enabled: self.enabled,
            nodes: self
                .live_nodes()
                .map(|node| NodeDefinition {
                    name: node.name().to_string(),
                    tool_type: node.tool_type().to_string(),
                    params: node.params().clone(),
                    enabled: node.is_enabled(),
                })
                .collect(),
            edges: self.edges.iter().map(|e| e.connection.clone()).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// A disabled procedure returns an empty run.
    pub fn set_procedure_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    // ── Graph building ──

    /// Add a node. Names are unique within a procedure.
    pub fn add_tool(&mut self, node: ToolNode) -> Result<NodeId, ConfigurationError> {
        if self.names.contains_key(node.name()) {
            return Err(ConfigurationError::DuplicateTool(node.name().to_string()));
        }

        let id = NodeId(self.nodes.len() as u32);
        tracing::info!(
            "Added tool '{}' ({}) to procedure '{}'",
            node.name(),
            node.tool_type(),
            self.name
        );
        self.names.insert(node.name().to_string(), id);
        self.nodes.push(Some(node));
        self.refresh_plan();
        Ok(id)
    }

    /// Remove a node and every connection touching it.
    pub fn remove_tool(&mut self, name: &str) -> Result<ToolNode, ConfigurationError> {
        let id = self.node_id(name)?;
        let node = self.nodes[id.index()]
            .take()
            .ok_or_else(|| ConfigurationError::UnknownTool(name.to_string()))?;

        self.names.remove(name);
        let before = self.edges.len();
        self.edges
            .retain(|e| e.from_node != id && e.to_node != id);
        self.refresh_plan();

        tracing::info!(
            "Removed tool '{}' and {} connection(s) from procedure '{}'",
            name,
            before - self.edges.len(),
            self.name
        );
        Ok(node)
    }

    /// Connect `from_tool.from_port` to `to_tool.to_port`.
    ///
    /// Rejected, leaving the graph unchanged, when a tool or port does not
    /// exist, the port kinds differ, an image input is already fed, or the
    /// edge would close a cycle.
    pub fn connect(
        &mut self,
        from_tool: &str,
        from_port: &str,
        to_tool: &str,
        to_port: &str,
    ) -> Result<(), ConfigurationError> {
        let from = self.node_id(from_tool)?;
        let to = self.node_id(to_tool)?;
        if from == to {
            return Err(ConfigurationError::SelfLoop(from_tool.to_string()));
        }

        let out_kind = self.port_kind(from, from_port, PortDirection::Output)?;
        let in_kind = self.port_kind(to, to_port, PortDirection::Input)?;
        if out_kind != in_kind {
            return Err(ConfigurationError::PortKindMismatch {
                from: format!("{}.{}", from_tool, from_port),
                to: format!("{}.{}", to_tool, to_port),
            });
        }

        let connection = Connection::new(from_tool, from_port, to_tool, to_port);
        if self.edges.iter().any(|e| e.connection == connection) {
            return Err(ConfigurationError::DuplicateConnection(
                connection.to_string(),
            ));
        }
        if in_kind == PortKind::Image
            && self
                .edges
                .iter()
                .any(|e| e.to_node == to && e.kind == PortKind::Image)
        {
            return Err(ConfigurationError::InputAlreadyConnected(format!(
                "{}.{}",
                to_tool, to_port
            )));
        }

        self.edges.push(Edge {
            id: EdgeId(self.next_edge_id),
            from_node: from,
            to_node: to,
            kind: in_kind,
            connection,
        });

        if let Err(cycle) = self.rebuild_plan() {
            self.edges.pop();
            tracing::warn!(
                "Rejected connection {}.{} -> {}.{}: cycle through {:?}",
                from_tool,
                from_port,
                to_tool,
                to_port,
                cycle.unscheduled
            );
            return Err(ConfigurationError::CycleDetected {
                from: from_tool.to_string(),
                to: to_tool.to_string(),
            });
        }

        self.next_edge_id += 1;
        tracing::info!(
            "Connected {}.{} -> {}.{} in procedure '{}'",
            from_tool,
            from_port,
            to_tool,
            to_port,
            self.name
        );
        Ok(())
    }

    /// Connect `OutputImage -> InputImage`.
    pub fn connect_images(&mut self, from_tool: &str, to_tool: &str) -> Result<(), ConfigurationError> {
        self.connect(from_tool, OUTPUT_IMAGE, to_tool, INPUT_IMAGE)
    }

    /// Remove every connection from `from_tool` to `to_tool`. Returns
    /// whether anything was removed.
    pub fn disconnect(&mut self, from_tool: &str, to_tool: &str) -> bool {
        let (Some(&from), Some(&to)) = (self.names.get(from_tool), self.names.get(to_tool)) else {
            return false;
        };

        let before = self.edges.len();
        self.edges
            .retain(|e| !(e.from_node == from && e.to_node == to));
        let removed = before - self.edges.len();
        if removed == 0 {
            return false;
        }

        self.refresh_plan();
        tracing::info!(
            "Disconnected '{}' -> '{}' ({} connection(s))",
            from_tool,
            to_tool,
            removed
        );
        true
    }

    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.edges.iter().map(|e| &e.connection)
    }

    pub fn connections_from(&self, tool: &str) -> Vec<&Connection> {
        self.connections().filter(|c| c.from_tool == tool).collect()
    }

    pub fn connections_to(&self, tool: &str) -> Vec<&Connection> {
        self.connections().filter(|c| c.to_tool == tool).collect()
    }

    // ── Node access ──

    pub fn tool(&self, name: &str) -> Option<&ToolNode> {
        let id = self.names.get(name)?;
        self.nodes[id.index()].as_ref()
    }

    pub fn tool_mut(&mut self, name: &str) -> Option<&mut ToolNode> {
        let id = self.names.get(name)?;
        self.nodes[id.index()].as_mut()
    }

    /// Tool names in insertion order
    pub fn tool_names(&self) -> Vec<&str> {
        self.live_nodes().map(|n| n.name()).collect()
    }

    pub fn tool_count(&self) -> usize {
        self.names.len()
    }

    pub fn set_enabled(&mut self, tool: &str, enabled: bool) -> Result<(), ConfigurationError> {
        let node = self
            .tool_mut(tool)
            .ok_or_else(|| ConfigurationError::UnknownTool(tool.to_string()))?;
        node.set_enabled(enabled);
        tracing::info!("Tool '{}' {}", tool, if enabled { "enabled" } else { "disabled" });
        Ok(())
    }

    /// Replace a node's parameters, re-validated through the tool.
    pub fn set_params(
        &mut self,
        tool: &str,
        params: ToolParams,
        ctx: &EngineContext,
    ) -> Result<(), ConfigurationError> {
        let node = self
            .tool_mut(tool)
            .ok_or_else(|| ConfigurationError::UnknownTool(tool.to_string()))?;
        node.reconfigure(params, ctx)
    }

    /// Node names in execution order
    pub fn execution_order(&self) -> Vec<&str> {
        self.compiled_plan
            .order
            .iter()
            .filter_map(|id| self.nodes[id.index()].as_ref())
            .map(|n| n.name())
            .collect()
    }

    pub fn plan_stats(&self) -> &PlanStats {
        &self.compiled_plan.stats
    }

    /// Bumped on every successful graph change
    pub fn generation(&self) -> u64 {
        self.graph_generation
    }

    /// Most recent tool failure of the last run
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn last_execution_time(&self) -> Option<Duration> {
        self.last_execution_time
    }

    // ── Execution ──

    /// Execute every node once, in topological order.
    pub fn run(&mut self, input: Option<ImageData>) -> ProcedureRun {
        let started = Instant::now();
        let mut run = ProcedureRun::new(&self.name);

        if !self.enabled {
            tracing::debug!("Procedure '{}' is disabled; skipping run", self.name);
            if let Some(image) = input {
                image.recycle();
            }
            run.elapsed = started.elapsed();
            return run;
        }

        let slots = self.nodes.len();
        let mut pending: Vec<Option<ImageData>> =
            std::iter::repeat_with(|| None).take(slots).collect();
        let mut forwarded: Vec<Option<Forwarded>> =
            std::iter::repeat_with(|| None).take(slots).collect();
        let plan = &self.compiled_plan;

        route_image(input, &plan.image_roots, &mut pending);

        for &id in &plan.order {
            let idx = id.index();
            let Some(node) = self.nodes[idx].as_mut() else {
                continue;
            };
            let name = node.name().to_string();

            let mut upstream = ResultData::new();
            for source in &plan.upstream[idx] {
                match &forwarded[source.index()] {
                    Some(Forwarded::Own { name, results }) => {
                        upstream.insert_nested(name.clone(), results.clone())
                    }
                    Some(Forwarded::Transparent(results)) => upstream.extend_from(results),
                    None => {}
                }
            }

            let image = pending[idx].take();
            let (output_image, result, forward) = if !node.is_enabled() {
                tracing::debug!("Tool '{}' disabled; passing input through", name);
                (
                    image,
                    ResultData::skipped(&name, "disabled"),
                    Forwarded::Transparent(upstream),
                )
            } else if node.requires_image_input() && image.is_none() {
                tracing::debug!("Tool '{}' has no input image; skipped", name);
                (
                    None,
                    ResultData::skipped(&name, "no input image"),
                    Forwarded::Transparent(upstream),
                )
            } else {
                let fallback = match &image {
                    Some(image) if node.has_image_output() => Some(image.duplicate()),
                    _ => None,
                };

                match node.execute(image, upstream) {
                    Ok(output) => {
                        if let Some(copy) = fallback {
                            copy.recycle();
                        }
                        let mut results = output.results;
                        results.set_tool_name(&name);
                        tracing::debug!("Tool '{}' produced {} result(s)", name, results.len());
                        (
                            output.image,
                            results.clone(),
                            Forwarded::Own {
                                name: name.clone(),
                                results,
                            },
                        )
                    }
                    Err(error) => {
                        tracing::warn!(
                            "Tool '{}' in procedure '{}' failed: {}",
                            name,
                            self.name,
                            error
                        );
                        let failed = ResultData::failed(&name, error.to_string());
                        run.failures.push(ToolExecutionError {
                            tool: name.clone(),
                            error,
                        });
                        (
                            fallback,
                            failed.clone(),
                            Forwarded::Own {
                                name: name.clone(),
                                results: failed,
                            },
                        )
                    }
                }
            };

            let targets = &plan.image_targets[idx];
            if targets.is_empty() {
                if let Some(image) = output_image {
                    if node.has_image_output() {
                        run.images.insert(name.clone(), image);
                    } else {
                        image.recycle();
                    }
                }
            } else {
                route_image(output_image, targets, &mut pending);
            }

            run.order.push(name.clone());
            run.results.insert(name, result);
            forwarded[idx] = Some(forward);
        }

        run.elapsed = started.elapsed();
        self.last_execution_time = Some(run.elapsed);
        self.last_error = run.failures.last().map(|f| f.to_string());

        tracing::debug!(
            "Procedure '{}' ran {} tool(s) in {:?} ({} failed)",
            self.name,
            run.order.len(),
            run.elapsed,
            run.failures.len()
        );
        run
    }

    // ── Internals ──

    fn live_nodes(&self) -> impl Iterator<Item = &ToolNode> {
        self.nodes.iter().flatten()
    }

    fn node_id(&self, name: &str) -> Result<NodeId, ConfigurationError> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| ConfigurationError::UnknownTool(name.to_string()))
    }

    fn port_kind(
        &self,
        id: NodeId,
        port: &str,
        direction: PortDirection,
    ) -> Result<PortKind, ConfigurationError> {
        let node = self.nodes[id.index()]
            .as_ref()
            .ok_or_else(|| ConfigurationError::UnknownTool(format!("{:?}", id)))?;

        node.port(port, direction)
            .map(|p| p.kind)
            .ok_or_else(|| ConfigurationError::UnknownPort {
                tool: node.name().to_string(),
                port: port.to_string(),
                direction: match direction {
                    PortDirection::Input => "input",
                    PortDirection::Output => "output",
                },
            })
    }

    /// Recompile the plan; the cached plan and generation change only on success.
    fn rebuild_plan(&mut self) -> Result<(), CycleError> {
        let generation = self.graph_generation + 1;
        let plan = PlanCompiler::compile(&self.nodes, &self.edges, generation)?;

        tracing::debug!(
            "Procedure '{}' recompiled: {} tools / {} connections (gen {}, {} us)",
            self.name,
            plan.stats.total_nodes,
            plan.stats.edges,
            plan.generation,
            plan.stats.compile_time_us
        );
        self.compiled_plan = plan;
        self.graph_generation = generation;
        Ok(())
    }

    /// Recompile after a change that cannot introduce a cycle.
    fn refresh_plan(&mut self) {
        if let Err(cycle) = self.rebuild_plan() {
            tracing::error!(
                "Procedure '{}' graph has a cycle through {:?}",
                self.name,
                cycle.unscheduled
            );
        }
    }
}

impl std::fmt::Debug for Procedure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Procedure")
            .field("name", &self.name)
            .field("enabled", &self.enabled)
            .field("tools", &self.tool_names())
            .field("connections", &self.edges.len())
            .field("generation", &self.graph_generation)
            .finish()
    }
}

/// Move an image into its targets' pending slots, copying for all but the last.
fn route_image(image: Option<ImageData>, targets: &[NodeId], pending: &mut [Option<ImageData>]) {
    let Some(image) = image else {
        return;
    };
    let Some((last, rest)) = targets.split_last() else {
        image.recycle();
        return;
    };

    for target in rest {
        if let Some(stale) = pending[target.index()].replace(image.duplicate()) {
            stale.recycle();
        }
    }
    if let Some(stale) = pending[last.index()].replace(image) {
        stale.recycle();
    }
}
