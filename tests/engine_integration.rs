//! Integration tests for the worker discipline and completion tracking

mod common;

use common::builders::{add, collector, ints};
use common::wait_until;
use pumpflow::pipeline::nodes::IterSource;
use pumpflow::pipeline::{
    connect, Element, Pipeline, PipelineError, PipelineEvent, MAIN_PORT,
};
use pumpflow::value::CompatibilityRegistry;
use pumpflow::{EngineConfig, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_at_most_one_worker_per_sink() {
    const PRODUCERS: usize = 4;
    const PER_PRODUCER: i64 = 200;

    let active = Arc::new(AtomicUsize::new(0));
    let max_active = Arc::new(AtomicUsize::new(0));
    let iterations = Arc::new(AtomicUsize::new(0));
    let (a, m, it) = (
        Arc::clone(&active),
        Arc::clone(&max_active),
        Arc::clone(&iterations),
    );
    let sink = Element::sink_fn("sink", move |_| {
        let now = a.fetch_add(1, Ordering::SeqCst) + 1;
        m.fetch_max(now, Ordering::SeqCst);
        std::thread::yield_now();
        it.fetch_add(1, Ordering::SeqCst);
        a.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    });
    sink.remove_input(MAIN_PORT).unwrap();

    let mut pipeline = Pipeline::default();
    for i in 0..PRODUCERS {
        let port = format!("in{}", i);
        sink.register_input(&port, None).unwrap();
        pipeline
            .add_element(IterSource::new(0..PER_PRODUCER).into_element(format!("src{}", i)))
            .unwrap();
    }
    pipeline.add_element(sink).unwrap();
    for i in 0..PRODUCERS {
        pipeline
            .connect(&format!("src{}", i), MAIN_PORT, "sink", &format!("in{}", i))
            .unwrap();
    }

    pipeline.run_to_completion(Duration::from_secs(10)).unwrap();
    assert_eq!(max_active.load(Ordering::SeqCst), 1);
    assert_eq!(iterations.load(Ordering::SeqCst), PER_PRODUCER as usize);
}

#[test]
fn test_drain_while_ready() {
    let iterations = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&iterations);
    let sink = Element::sink_fn("sink", move |ctx| {
        assert!(ctx.input("a").is_ok() && ctx.input("b").is_ok());
        seen.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    sink.remove_input(MAIN_PORT).unwrap();
    sink.register_input("a", None).unwrap();
    sink.register_input("b", None).unwrap();

    let pa = Element::pump("pa");
    let pb = Element::pump("pb");
    let link_a = connect(&pa, MAIN_PORT, &sink, "a").unwrap();
    let link_b = connect(&pb, MAIN_PORT, &sink, "b").unwrap();

    for v in 0..3i64 {
        pa.emit(MAIN_PORT, v).unwrap();
    }
    assert_eq!(iterations.load(Ordering::SeqCst), 0);
    for v in 0..2i64 {
        pb.emit(MAIN_PORT, v).unwrap();
    }

    assert!(wait_until(|| iterations.load(Ordering::SeqCst) == 2 && !sink.is_active()));
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(iterations.load(Ordering::SeqCst), 2);
    assert_eq!(link_a.len(), 1);
    assert!(link_b.is_empty());
}

#[test]
fn test_inputs_are_popped_in_fifo_order() {
    let pump = Element::pump("p");
    let (sink, handle) = collector("sink");
    connect(&pump, MAIN_PORT, &sink, MAIN_PORT).unwrap();
    for v in 0..100i64 {
        pump.emit(MAIN_PORT, v).unwrap();
    }
    assert!(wait_until(|| handle.len() == 100));
    assert_eq!(ints(&handle), (0..100).collect::<Vec<_>>());
}

#[test]
fn test_upstream_finish_propagation() {
    let source = Element::source_fn("source", |ctx| {
        for v in 0..3i64 {
            ctx.emit(MAIN_PORT, v)?;
        }
        while !ctx.should_stop() {
            std::thread::sleep(Duration::from_millis(1));
        }
        Ok(())
    });
    let gate = Arc::new(AtomicBool::new(false));
    let open = Arc::clone(&gate);
    let transform = Element::transform_fn("transform", move |ctx| {
        while !open.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(1));
        }
        let v = ctx.take(MAIN_PORT)?;
        ctx.emit(MAIN_PORT, v)?;
        Ok(())
    });
    let (sink, handle) = collector("sink");
    let upstream = connect(&source, MAIN_PORT, &transform, MAIN_PORT).unwrap();
    let downstream = connect(&transform, MAIN_PORT, &sink, MAIN_PORT).unwrap();

    for element in [&sink, &transform, &source] {
        element.start().unwrap();
    }
    assert!(wait_until(|| upstream.len() + usize::from(transform.is_active()) >= 3));

    // Source and sink stopped, transform still running.
    source.stop();
    sink.stop();
    assert!(wait_until(|| source.is_finished()));
    std::thread::sleep(Duration::from_millis(10));
    assert!(!sink.is_finished());

    // Transform stopped but blocked with buffered input.
    transform.stop();
    std::thread::sleep(Duration::from_millis(10));
    assert!(!sink.is_finished());

    gate.store(true, Ordering::SeqCst);
    assert!(wait_until(|| sink.is_finished()));
    assert!(upstream.is_empty());
    assert!(downstream.is_empty());
    assert!(transform.is_finished());
    assert_eq!(ints(&handle), [0, 1, 2]);
}

#[test]
fn test_multi_input_sink_waits_for_every_link() {
    let pa = Element::pump("pa");
    let pb = Element::pump("pb");
    let sums = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let out = Arc::clone(&sums);
    let sink = Element::sink_fn("sum", move |ctx| {
        let a = ctx.take("a")?.as_i64().unwrap_or_default();
        let b = ctx.take("b")?.as_i64().unwrap_or_default();
        out.lock().push(a + b);
        Ok(())
    });
    sink.remove_input(MAIN_PORT).unwrap();
    sink.register_input("a", None).unwrap();
    sink.register_input("b", None).unwrap();
    let link_a = connect(&pa, MAIN_PORT, &sink, "a").unwrap();
    connect(&pb, MAIN_PORT, &sink, "b").unwrap();

    pa.emit(MAIN_PORT, 1i64).unwrap();
    pb.emit(MAIN_PORT, 2i64).unwrap();
    assert!(wait_until(|| sums.lock().len() == 1));
    pa.emit(MAIN_PORT, 5i64).unwrap();

    // One producer finished, the other still live, data pending on `a`.
    pa.stop();
    sink.stop();
    assert!(pa.is_finished());
    std::thread::sleep(Duration::from_millis(10));
    assert!(!sink.is_finished());

    pb.emit(MAIN_PORT, 7i64).unwrap();
    assert!(wait_until(|| sums.lock().len() == 2));
    assert!(wait_until(|| link_a.is_empty() && !sink.is_active()));
    assert!(!sink.is_finished());

    pb.stop();
    assert!(wait_until(|| sink.is_finished()));
    assert_eq!(*sums.lock(), [3, 12]);
}

#[test]
fn test_routine_errors_reach_monitor() {
    let mut pipeline = Pipeline::default();
    let monitor = pipeline.monitor();
    pipeline
        .add_element(IterSource::new([1i64, 2, 3]).into_element("src"))
        .unwrap();
    pipeline
        .add_element(Element::transform_fn("picky", |ctx| {
            let v = ctx.input(MAIN_PORT)?.as_i64().unwrap_or_default();
            if v == 2 {
                anyhow::bail!("refusing {}", v);
            }
            ctx.emit(MAIN_PORT, v)?;
            Ok(())
        }))
        .unwrap();
    let (sink, handle) = collector("sink");
    pipeline.add_element(sink).unwrap();
    pipeline.connect("src", MAIN_PORT, "picky", MAIN_PORT).unwrap();
    pipeline.connect("picky", MAIN_PORT, "sink", MAIN_PORT).unwrap();

    pipeline.run_to_completion(Duration::from_secs(5)).unwrap();
    let events = monitor.drain();
    assert!(events.iter().any(|e| matches!(
        e,
        PipelineEvent::ElementError { element, message }
            if element == "picky" && message.contains("refusing 2")
    )));
    assert_eq!(ints(&handle), [1, 3]);
    assert_eq!(
        pipeline.element("picky").unwrap().last_error().as_deref(),
        Some("refusing 2")
    );
}

#[test]
fn test_abstract_type_checks_at_connect_and_push() {
    let registry = Arc::new(
        CompatibilityRegistry::new()
            .with_rule("angle", ["angle"])
            .with_rule("energy", ["energy"]),
    );
    let mut pipeline = Pipeline::with_registry(EngineConfig::default(), registry);

    let angles = Element::pump("angles");
    angles
        .set_output_sample(MAIN_PORT, Some(Value::from(0.0).with_abstract_type("angle")))
        .unwrap();
    let (energy_sink, _) = collector("energies");
    energy_sink
        .set_input_sample(MAIN_PORT, Some(Value::from(0.0).with_abstract_type("energy")))
        .unwrap();
    let (any_sink, handle) = collector("any");
    pipeline.add_element(angles.clone()).unwrap();
    pipeline.add_element(energy_sink).unwrap();
    pipeline.add_element(any_sink).unwrap();

    assert!(matches!(
        pipeline.connect("angles", MAIN_PORT, "energies", MAIN_PORT),
        Err(PipelineError::TypeMismatch { .. })
    ));
    pipeline.connect("angles", MAIN_PORT, "any", MAIN_PORT).unwrap();

    assert!(matches!(
        angles.emit(MAIN_PORT, Value::from(1.0).with_abstract_type("energy")),
        Err(PipelineError::TypeMismatch { .. })
    ));
    assert!(matches!(
        angles.emit(MAIN_PORT, "not a number"),
        Err(PipelineError::TypeMismatch { .. })
    ));
    angles
        .emit(MAIN_PORT, Value::from(0.5).with_abstract_type("angle"))
        .unwrap();
    assert!(wait_until(|| handle.len() == 1));
}

#[test]
fn test_fan_out_shares_one_value() {
    let pump = Element::pump("p");
    let (left, left_handle) = collector("left");
    let (right, right_handle) = collector("right");
    let plus = add("plus", 1);
    connect(&pump, MAIN_PORT, &left, MAIN_PORT).unwrap();
    connect(&pump, MAIN_PORT, &plus, MAIN_PORT).unwrap();
    connect(&plus, MAIN_PORT, &right, MAIN_PORT).unwrap();

    pump.emit(MAIN_PORT, 10i64).unwrap();
    assert!(wait_until(|| left_handle.len() == 1 && right_handle.len() == 1));
    assert_eq!(ints(&left_handle), [10]);
    assert_eq!(ints(&right_handle), [11]);
}

#[test]
fn test_worker_threads_use_config_prefix() {
    let config = EngineConfig {
        worker_name_prefix: "lab".to_string(),
        ..Default::default()
    };
    let mut pipeline = Pipeline::new(config);
    let name = Arc::new(parking_lot::Mutex::new(None));
    let seen = Arc::clone(&name);
    pipeline.add_element(Element::pump("p")).unwrap();
    pipeline
        .add_element(Element::sink_fn("named", move |_| {
            *seen.lock() = std::thread::current().name().map(str::to_string);
            Ok(())
        }))
        .unwrap();
    pipeline.connect("p", MAIN_PORT, "named", MAIN_PORT).unwrap();
    pipeline.element("p").unwrap().emit(MAIN_PORT, 1i64).unwrap();
    assert!(wait_until(|| name.lock().is_some()));
    assert_eq!(name.lock().as_deref(), Some("lab-named"));
}
