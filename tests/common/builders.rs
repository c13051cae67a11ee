//! Test element builders

use pumpflow::pipeline::nodes::{CollectorHandle, CollectorSink, FnTransform};
use pumpflow::pipeline::{Element, MAIN_PORT};
use pumpflow::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A sink that records every `main` value, plus its read handle
pub fn collector(name: &str) -> (Element, CollectorHandle) {
    let (sink, handle) = CollectorSink::new();
    (Element::sink(name, sink), handle)
}

/// Transform adding `delta` to an integer on `main`
pub fn add(name: &str, delta: i64) -> Element {
    FnTransform::element(name, move |v: Value| {
        Ok(Value::from(v.as_i64().unwrap_or_default() + delta))
    })
}

/// Transform multiplying an integer on `main` by `factor`
pub fn mul(name: &str, factor: i64) -> Element {
    FnTransform::element(name, move |v: Value| {
        Ok(Value::from(v.as_i64().unwrap_or_default() * factor))
    })
}

/// `add(name, 1)` that also counts its invocations
pub fn counting_increment(name: &str) -> (Element, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let element = FnTransform::element(name, move |v: Value| {
        seen.fetch_add(1, Ordering::SeqCst);
        Ok(Value::from(v.as_i64().unwrap_or_default() + 1))
    });
    (element, calls)
}

/// Integers collected by a handle, in arrival order
pub fn ints(handle: &CollectorHandle) -> Vec<i64> {
    handle
        .values()
        .iter()
        .filter_map(Value::as_i64)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pumpflow::pipeline::connect;
    use std::time::Duration;

    #[test]
    fn test_add_builder() {
        let pump = Element::pump("p");
        let plus = add("plus", 2);
        let (sink, handle) = collector("sink");
        connect(&pump, MAIN_PORT, &plus, MAIN_PORT).unwrap();
        connect(&plus, MAIN_PORT, &sink, MAIN_PORT).unwrap();
        pump.emit(MAIN_PORT, 40i64).unwrap();
        assert!(handle.wait_for(1, Duration::from_secs(5)));
        assert_eq!(ints(&handle), [42]);
    }
}
