//! pumpflow demo binary.
//!
//! Usage: `pumpflow [config.json] [results.json]`
//!
//! Wires a source, a bounded loop and a composite stage, runs them to
//! completion, logs the results and optionally saves them as a data file.

use anyhow::Context;
use pumpflow::config::EngineConfig;
use pumpflow::pipeline::nodes::{CollectorSink, FnTransform, IterSource};
use pumpflow::pipeline::{Composite, Element, Loop, Pipeline, MAIN_PORT};
use pumpflow::value::{DataFile, List, Quantity, Unit, Value};
use std::path::Path;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const RUN_TIMEOUT: Duration = Duration::from_secs(30);

fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => EngineConfig::load(&path).with_context(|| format!("loading {}", path))?,
        None => EngineConfig::default(),
    };
    let output = args.next();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_filter.as_str())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting pumpflow demo");

    let mut pipeline = Pipeline::new(config.clone());
    let monitor = pipeline.monitor();

    pipeline.add_element(IterSource::new(0..5i64).into_element("seed"))?;
    pipeline.add_element(build_loop(config.default_loop_bound)?)?;
    pipeline.add_element(build_scaler()?)?;
    let (collector, results) = CollectorSink::new();
    pipeline.add_element(Element::sink("results", collector))?;

    pipeline.connect("seed", MAIN_PORT, "repeat", "x")?;
    pipeline.connect("repeat", "x", "to_length", "x")?;
    pipeline.connect("to_length", "x", "results", MAIN_PORT)?;

    pipeline
        .run_to_completion(RUN_TIMEOUT)
        .context("running demo pipeline")?;

    for (element, message) in monitor.drain_errors() {
        tracing::warn!("Element '{}' reported: {}", element, message);
    }
    let values = results.values();
    for value in &values {
        tracing::info!("Result: {}", value);
    }

    if let Some(path) = output {
        let mut file = DataFile::new();
        file.insert("results", &Value::from(values.into_iter().collect::<List>()));
        file.insert("parameters", &Value::from(pipeline.param_value()));
        file.save(Path::new(&path))
            .with_context(|| format!("saving {}", path))?;
        tracing::info!("Saved results to {}", path);
    }

    tracing::info!("Shutting down...");
    Ok(())
}

/// Adds one per pass, `bound` passes per seed value.
fn build_loop(bound: usize) -> anyhow::Result<Loop> {
    let looped = Loop::with_bound("repeat", bound);
    let (pump, output) = looped.add_port("x", None)?;
    let inc = FnTransform::element("inc", |v: Value| {
        Ok(Value::from(v.as_i64().unwrap_or_default() + 1))
    });
    looped.add_element(inc.clone())?;
    looped.connect(&pump, MAIN_PORT, &inc, MAIN_PORT)?;
    looped.connect(&inc, MAIN_PORT, &output, MAIN_PORT)?;
    Ok(looped)
}

/// Turns a count into a length quantity using the `step` parameter.
fn build_scaler() -> anyhow::Result<Composite> {
    let composite = Composite::new("to_length");
    let (pump, sink) = composite.add_port("x", None)?;
    let scale = Element::transform_fn("scale", |ctx| {
        let step = ctx.parameter("step")?;
        let step = step
            .as_quantity()
            .context("step must be a quantity")?
            .value_in(&Unit::parse("nm")?)?
            .as_f64()
            .unwrap_or_default();
        let count = ctx.input(MAIN_PORT)?.as_f64().unwrap_or_default();
        let length = Quantity::new(count * step, Unit::parse("nm")?).with_abstract_type("length");
        ctx.emit(MAIN_PORT, length)?;
        Ok(())
    });
    scale.declare_parameter(
        "step",
        Quantity::new(1.0, Unit::parse("nm")?).into(),
        Some(Quantity::new(2.5, Unit::parse("Å")?).into()),
    )?;
    composite.add_element(scale.clone())?;
    composite.connect(&pump, MAIN_PORT, &scale, MAIN_PORT)?;
    composite.connect(&scale, MAIN_PORT, &sink, MAIN_PORT)?;
    Ok(composite)
}
