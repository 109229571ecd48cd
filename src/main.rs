//! VisChain-RS demo runner
//!
//! Loads the engine configuration and one inspection graph, runs it once,
//! then streams a batch of synthetic frames through pipeline mode and prints
//! the solution statistics as JSON. Finally a camera-less chain, fed by a
//! constant source, runs in continuous mode for a moment.
//!
//! Usage: `vischain-rs [CONFIG.toml] [GRAPH.json|GRAPH.toml]`

use anyhow::Context;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vischain_rs::{
    config::{self, EngineConfig},
    graph::{Connection, GraphDefinition, NodeDefinition, ToolParams},
    EngineContext, ImageData, Procedure, Solution, ToolRegistry,
};

const DEMO_FRAMES: u64 = 32;

const CONTINUOUS_DEMO: Duration = Duration::from_millis(500);

fn main() -> anyhow::Result<()> {
    let _log_guard = init_logging();
    tracing::info!("Starting VisChain-RS");

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => EngineConfig::load(&path)
            .with_context(|| format!("loading engine config {}", path))?,
        None => EngineConfig::load_or_default(),
    };
    let definition = match args.next().map(PathBuf::from) {
        Some(path) => GraphDefinition::load(&path)?,
        None => demo_definition(),
    };

    let ctx = EngineContext::from_config(&config);
    let registry = ToolRegistry::with_builtin_tools();
    let procedure = Procedure::from_definition(&definition, &registry, &ctx)?;
    tracing::info!(
        "Loaded procedure '{}' with order {:?}",
        procedure.name(),
        procedure.execution_order()
    );

    let mut solution = Solution::from_config("demo", &config, ctx.clone());
    solution.add_procedure(procedure)?;

    let bundle = solution.run_once(Some(ImageData::from_pool(ctx.pool(), None)))?;
    println!("{}", serde_json::to_string_pretty(&bundle.to_json())?);
    drop(bundle);

    solution.enable_pipeline_mode(config.pipeline.queue_capacity)?;
    solution.start()?;
    let mut last = None;
    for value in 0..DEMO_FRAMES {
        let mut image = ImageData::from_pool(ctx.pool(), Some(Duration::from_millis(50)));
        image.pixels_mut().fill((value * 8 % 256) as u8);
        if let Some(id) = solution.submit_frame(image) {
            last = Some(id);
        }
    }
    if let Some(id) = last {
        match solution.wait_for_result(id, Duration::from_secs(2)) {
            Some(bundle) => tracing::info!(
                "Frame {} finished with {} failure(s)",
                id,
                bundle.failure_count()
            ),
            None => tracing::warn!("Frame {} did not finish in time", id),
        }
    }
    let report = solution.stop();
    tracing::info!("Pipeline stopped: {:?}", report);

    println!(
        "{}",
        serde_json::to_string_pretty(&solution.get_statistics())?
    );

    let mut generated = Solution::from_config("generated", &config, ctx.clone());
    generated.add_procedure(Procedure::from_definition(
        &source_definition(),
        &registry,
        &ctx,
    )?)?;
    generated.start_continuous(config.solution.run_interval())?;
    std::thread::sleep(CONTINUOUS_DEMO);
    let runs = generated.stop_continuous();
    if let Some(bundle) = generated.take_latest() {
        tracing::info!(
            "Continuous mode: {} run(s), last frame {:?}",
            runs,
            bundle.frame_id
        );
        println!("{}", serde_json::to_string_pretty(&bundle.to_json())?);
    }
    Ok(())
}

/// Console output plus a daily log file under the app data directory.
fn init_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,vischain_rs=debug"));
    let log_dir = config::app_data_dir().map(|dir| dir.join("logs"));

    match log_dir.filter(|dir| std::fs::create_dir_all(dir).is_ok()) {
        Some(dir) => {
            let (writer, guard) = tracing_appender::non_blocking(
                tracing_appender::rolling::daily(&dir, "vischain.log"),
            );
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
            None
        }
    }
}

/// Constant source, then measure.
fn source_definition() -> GraphDefinition {
    GraphDefinition::new("generated")
        .node(
            NodeDefinition::new("Camera", "ConstantSource")
                .with_params(ToolParams::new().with("value", 90)),
        )
        .node(NodeDefinition::new("Measure", "MeanIntensity"))
        .edge(Connection::image("Camera", "Measure"))
}

/// Invert, binarize, measure.
fn demo_definition() -> GraphDefinition {
    GraphDefinition::new("inspect")
        .node(NodeDefinition::new("Invert", "Invert"))
        .node(
            NodeDefinition::new("Binarize", "Threshold")
                .with_params(ToolParams::new().with("level", 100)),
        )
        .node(NodeDefinition::new("Measure", "MeanIntensity"))
        .edge(Connection::image("Invert", "Binarize"))
        .edge(Connection::image("Binarize", "Measure"))
}
