//! Integration tests for building and running Procedures
//!
//! Graphs are built through the public definition/registry path and driven
//! with the hand-written tools from `common::mock_helpers`.

mod common;

use common::builders::{context, pooled_image, ChainBuilder};
use common::mock_helpers::{test_registry, VisitLog};
use parking_lot::Mutex;
use std::sync::Arc;
use tempfile::TempDir;
use vischain_rs::graph::{ConfigurationError, GraphDefinition, NodeDefinition, ToolParams};
use vischain_rs::Procedure;

fn record(name: &str) -> NodeDefinition {
    NodeDefinition::new(name, "Record").with_params(ToolParams::new().with("label", name))
}

fn log() -> VisitLog {
    Arc::new(Mutex::new(Vec::new()))
}

#[test]
fn test_disabled_middle_node_passes_through() {
    let log = log();
    let ctx = context(4);
    let def = ChainBuilder::new("p")
        .then_node(record("A"))
        .then_node(record("B").disabled())
        .then_node(record("C"))
        .build();
    let mut procedure = Procedure::from_definition(&def, &test_registry(&log), &ctx).unwrap();

    let run = procedure.run(Some(pooled_image(&ctx, 7)));

    assert!(run.is_success());
    let visits = log.lock().clone();
    let tools: Vec<_> = visits.iter().map(|v| v.tool.as_str()).collect();
    assert_eq!(tools, vec!["A", "C"]);

    // C sees A's results and the untouched image; nothing from B
    assert_eq!(visits[1].upstream_keys, vec!["A".to_string()]);
    assert_eq!(visits[1].first_pixel, Some(7));
    assert_eq!(run.result("B").unwrap().message(), Some("disabled"));
}

#[test]
fn test_reverse_connection_rejected_without_side_effects() {
    let log = log();
    let ctx = context(4);
    let def = GraphDefinition::new("p").node(record("A")).node(record("B"));
    let mut procedure = Procedure::from_definition(&def, &test_registry(&log), &ctx).unwrap();

    procedure.connect_images("A", "B").unwrap();
    let before = procedure.to_definition();
    let generation = procedure.generation();
    let order: Vec<String> = procedure
        .execution_order()
        .into_iter()
        .map(String::from)
        .collect();

    let err = procedure.connect_images("B", "A").unwrap_err();
    assert_eq!(
        err,
        ConfigurationError::CycleDetected {
            from: "B".to_string(),
            to: "A".to_string()
        }
    );
    assert_eq!(procedure.to_definition(), before);
    assert_eq!(procedure.generation(), generation);
    assert_eq!(procedure.execution_order(), order);

    // Still runs as before
    let run = procedure.run(Some(pooled_image(&ctx, 1)));
    assert_eq!(run.order, vec!["A", "B"]);
}

#[test]
fn test_failure_hands_copy_of_input_downstream() {
    let log = log();
    let ctx = context(4);
    let def = ChainBuilder::new("p")
        .then("Broken", "Fail")
        .then_node(record("After"))
        .build();
    let mut procedure = Procedure::from_definition(&def, &test_registry(&log), &ctx).unwrap();

    let mut run = procedure.run(Some(pooled_image(&ctx, 42)));

    assert_eq!(run.failures.len(), 1);
    assert_eq!(run.failures[0].tool, "Broken");
    assert!(!run.result("Broken").unwrap().is_ok());
    assert!(run.result("After").unwrap().is_ok());
    assert_eq!(log.lock()[0].first_pixel, Some(42));
    assert_eq!(procedure.last_error(), Some("Tool 'Broken' failed: sensor saturated"));

    run.recycle_images();
    assert_eq!(ctx.pool().in_use_count(), 0);
}

#[test]
fn test_builtin_chain_from_toml_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("inspect.toml");
    ChainBuilder::new("inspect")
        .then("Invert", "Invert")
        .then_node(
            NodeDefinition::new("Binarize", "Threshold")
                .with_params(ToolParams::new().with("level", 200)),
        )
        .then("Measure", "MeanIntensity")
        .build()
        .save(&path)
        .unwrap();

    let ctx = context(4);
    let def = GraphDefinition::load(&path).unwrap();
    let log = log();
    let mut procedure = Procedure::from_definition(&def, &test_registry(&log), &ctx).unwrap();
    assert_eq!(procedure.execution_order(), vec!["Invert", "Binarize", "Measure"]);

    // 50 inverts to 205, which is above the threshold
    let run = procedure.run(Some(pooled_image(&ctx, 50)));
    assert!(run.is_success());
    let measure = run.result("Measure").unwrap();
    common::assert_float_eq(measure.value("mean").unwrap().as_f64().unwrap(), 255.0, 1e-9);
    assert_eq!(
        run.result("Binarize").unwrap().value("foreground_pixels"),
        Some(&16.into())
    );
    drop(run);
    assert_eq!(ctx.pool().in_use_count(), 0);
}

#[test]
fn test_repeated_runs_are_identical() {
    let log = log();
    let ctx = context(4);
    let def = ChainBuilder::new("p")
        .then("Invert", "Invert")
        .then("Binarize", "Threshold")
        .build();
    let mut procedure = Procedure::from_definition(&def, &test_registry(&log), &ctx).unwrap();

    let first = procedure.run(Some(pooled_image(&ctx, 9)));
    let second = procedure.run(Some(pooled_image(&ctx, 9)));

    assert_eq!(first.order, second.order);
    assert_eq!(first.results, second.results);
    assert_eq!(first.image("Binarize"), second.image("Binarize"));
}
