//! Pipeline orchestrator: a named collection of elements and links.
//!
//! The pipeline does not schedule anything itself: elements run on their
//! own worker threads. It owns the graph bookkeeping, fans lifecycle
//! calls out to every element, and aggregates completion:
//!
//! 1. `start()` starts every element (sources last).
//! 2. Sources run until their routine returns or `stop()` is requested.
//! 3. `is_finished()` holds once every element reports finished.
//! 4. `reinit()` stops, joins, clears every link and re-arms.

use crate::config::EngineConfig;
use crate::pipeline::bridge::{event_channel, PipelineEvent, PipelineMonitor};
use crate::pipeline::composite::Composite;
use crate::pipeline::element::{Element, ElementEvent, ElementRole, Lifecycle};
use crate::pipeline::error::{describe, PipelineError, PipelineResult};
use crate::pipeline::id::LinkId;
use crate::pipeline::link::{self, Link};
use crate::pipeline::looping::Loop;
use crate::value::{CompatibilityRegistry, Record, Value};
use crossbeam_channel::Sender;
use indexmap::IndexMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Upper bound on waiting for workers to go idle during `reinit`.
const REINIT_IDLE_TIMEOUT: Duration = Duration::from_secs(5);

/// One link, described by element and port names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub id: LinkId,
    pub producer: String,
    pub out_port: String,
    pub consumer: String,
    pub in_port: String,
    pub pending: usize,
}

impl From<Composite> for Element {
    fn from(composite: Composite) -> Self {
        composite.into_element()
    }
}

impl From<Loop> for Element {
    fn from(looped: Loop) -> Self {
        looped.into_element()
    }
}

/// The pipeline graph.
pub struct Pipeline {
    config: EngineConfig,
    registry: Arc<CompatibilityRegistry>,
    elements: IndexMap<String, Element>,
    links: Vec<Arc<Link>>,
    events: Sender<PipelineEvent>,
    monitor: PipelineMonitor,
    started: bool,
}

impl Pipeline {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_registry(config, Arc::new(CompatibilityRegistry::new()))
    }

    /// A pipeline whose links check abstract types against `registry`.
    pub fn with_registry(config: EngineConfig, registry: Arc<CompatibilityRegistry>) -> Self {
        let (events, monitor) = event_channel(config.event_channel_capacity.max(1));
        Self {
            config,
            registry,
            elements: IndexMap::new(),
            links: Vec::new(),
            events,
            monitor,
            started: false,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<CompatibilityRegistry> {
        &self.registry
    }

    /// A receiver for element start, stop and error events.
    pub fn monitor(&self) -> PipelineMonitor {
        self.monitor.clone()
    }

    // ── Graph building ──

    /// Register an element under its own name. Added to a running
    /// pipeline, it is started immediately.
    pub fn add_element(&mut self, element: impl Into<Element>) -> PipelineResult<Element> {
        let element = element.into();
        if self.elements.contains_key(element.name()) {
            return Err(PipelineError::DuplicateElement(element.name().to_string()));
        }
        element.set_registry(Arc::clone(&self.registry));
        element.set_worker_prefix(&self.config.worker_name_prefix);

        let tx = self.events.clone();
        element.on_event(move |event| {
            let event = match event {
                ElementEvent::Started { element } => PipelineEvent::ElementStarted(element.clone()),
                ElementEvent::Stopped { element } => PipelineEvent::ElementStopped(element.clone()),
                ElementEvent::Error { element, message } => PipelineEvent::ElementError {
                    element: element.clone(),
                    message: message.clone(),
                },
            };
            let _ = tx.try_send(event);
        });

        if self.started {
            element.start()?;
        }
        tracing::debug!("Added element '{}'", element.name());
        self.elements
            .insert(element.name().to_string(), element.clone());
        Ok(element)
    }

    pub fn element(&self, name: &str) -> PipelineResult<&Element> {
        self.elements
            .get(name)
            .ok_or_else(|| PipelineError::UnknownElement(name.to_string()))
    }

    pub fn element_names(&self) -> Vec<String> {
        self.elements.keys().cloned().collect()
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.elements.values()
    }

    /// Stop `name`, drop every link touching it and forget it.
    pub fn remove_element(&mut self, name: &str) -> PipelineResult<Element> {
        let element = self
            .elements
            .shift_remove(name)
            .ok_or_else(|| PipelineError::UnknownElement(name.to_string()))?;
        element.stop();
        let touching: Vec<LinkId> = element
            .input_links()
            .iter()
            .chain(element.output_links().iter())
            .map(|l| l.id())
            .collect();
        for link in &self.links {
            if touching.contains(&link.id()) {
                link::disconnect(link);
            }
        }
        self.links.retain(|l| !touching.contains(&l.id()));
        tracing::info!("Removed element '{}' and {} link(s)", name, touching.len());
        Ok(element)
    }

    /// Connect two registered elements by name.
    pub fn connect(
        &mut self,
        producer: &str,
        out_port: &str,
        consumer: &str,
        in_port: &str,
    ) -> PipelineResult<LinkId> {
        let from = self.element(producer)?;
        let to = self.element(consumer)?;
        let link = link::connect(from, out_port, to, in_port)?;
        let id = link.id();
        self.links.push(link);
        Ok(id)
    }

    pub fn disconnect(&mut self, id: LinkId) -> PipelineResult<()> {
        let index = self
            .links
            .iter()
            .position(|l| l.id() == id)
            .ok_or(PipelineError::UnknownLink(id))?;
        let link = self.links.remove(index);
        link::disconnect(&link);
        Ok(())
    }

    pub fn link(&self, id: LinkId) -> Option<&Arc<Link>> {
        self.links.iter().find(|l| l.id() == id)
    }

    pub fn connections(&self) -> Vec<ConnectionInfo> {
        self.links
            .iter()
            .map(|l| ConnectionInfo {
                id: l.id(),
                producer: l.producer_name().to_string(),
                out_port: l.producer_port().to_string(),
                consumer: l.consumer_name().to_string(),
                in_port: l.consumer_port().to_string(),
                pending: l.len(),
            })
            .collect()
    }

    // ── Lifecycle ──

    /// Start every element. Consumers start before sources.
    pub fn start(&mut self) -> PipelineResult<()> {
        if self.started {
            return Err(PipelineError::AlreadyStarted("pipeline".to_string()));
        }
        let (sources, others): (Vec<&Element>, Vec<&Element>) = self
            .elements
            .values()
            .partition(|e| e.role() == ElementRole::Source);
        for element in others.into_iter().chain(sources) {
            if element.lifecycle() == Lifecycle::NotStarted {
                element.start()?;
            }
        }
        self.started = true;
        tracing::info!("Pipeline started with {} element(s)", self.elements.len());
        Ok(())
    }

    /// Request every element to stop. Buffered values still drain.
    pub fn stop(&self) {
        for element in self.elements.values() {
            element.stop();
        }
        tracing::info!("Pipeline stop requested");
    }

    /// Stop, wait for workers, clear every link and re-arm all elements.
    pub fn reinit(&mut self) {
        self.stop();
        for element in self.elements.values() {
            if !element.wait_idle(REINIT_IDLE_TIMEOUT, self.config.finish_poll_interval()) {
                tracing::warn!("Element '{}' still active during reinit", element.name());
            }
        }
        for element in self.elements.values() {
            element.reinit();
        }
        for link in &self.links {
            link.clear();
        }
        self.started = false;
        tracing::info!("Pipeline reinitialized");
    }

    /// Every element reports finished.
    pub fn is_finished(&self) -> bool {
        self.elements.values().all(Element::is_finished)
    }

    pub fn is_running(&self) -> bool {
        self.elements
            .values()
            .any(|e| e.is_running() || e.is_active())
    }

    /// Poll `is_finished` until it holds or `timeout` elapses.
    pub fn wait_finished(&self, timeout: Duration) -> PipelineResult<()> {
        let deadline = Instant::now() + timeout;
        while !self.is_finished() {
            if Instant::now() >= deadline {
                return Err(PipelineError::Timeout(timeout));
            }
            std::thread::sleep(self.config.finish_poll_interval());
        }
        Ok(())
    }

    /// Start, let every source routine return, stop, and wait for the
    /// graph to drain.
    pub fn run_to_completion(&mut self, timeout: Duration) -> PipelineResult<()> {
        let deadline = Instant::now() + timeout;
        self.start()?;

        let poll = self.config.finish_poll_interval();
        let sources: Vec<Element> = self
            .elements
            .values()
            .filter(|e| e.role() == ElementRole::Source)
            .cloned()
            .collect();
        while sources.iter().any(Element::is_active) {
            if Instant::now() >= deadline {
                return Err(PipelineError::Timeout(timeout));
            }
            std::thread::sleep(poll);
        }

        self.stop();
        self.wait_finished(deadline.saturating_duration_since(Instant::now()))
            .map_err(|_| PipelineError::Timeout(timeout))?;
        let _ = self.events.try_send(PipelineEvent::Finished);
        tracing::info!("Pipeline finished");
        Ok(())
    }

    // ── Parameters ──

    /// Every element's parameters as one record keyed by element name.
    /// Elements without parameters are left out.
    pub fn param_value(&self) -> Record {
        let mut record = Record::new();
        for element in self.elements.values() {
            let params = element.parameter_record();
            if !params.is_empty() {
                record.insert(element.name().to_string(), Value::Record(params));
            }
        }
        record
    }

    /// Apply a record shaped like [`param_value`](Self::param_value).
    /// Every field is validated before any element is touched.
    pub fn apply_parameters(&self, record: &Record) -> PipelineResult<()> {
        let mut updates = Vec::with_capacity(record.len());
        for (name, value) in record.iter() {
            let element = self.element(name)?;
            let params = value.as_record().ok_or_else(|| PipelineError::TypeMismatch {
                context: format!("parameters of '{}'", name),
                expected: "record".to_string(),
                found: describe(value),
            })?;
            let declared = element.parameter_names();
            if let Some(unknown) = params
                .keys()
                .find(|k| !declared.iter().any(|n| n.as_str() == *k))
            {
                return Err(PipelineError::UnknownParameter(format!("{}.{}", name, unknown)));
            }
            updates.push((element, params));
        }
        for (element, params) in updates {
            element.apply_parameter_record(params)?;
        }
        Ok(())
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if self.started {
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::element::MAIN_PORT;
    use crate::pipeline::nodes::{CollectorSink, FnTransform, IterSource};

    fn linear(values: Vec<i64>) -> (Pipeline, crate::pipeline::nodes::CollectorHandle) {
        let mut pipeline = Pipeline::default();
        let (collector, handle) = CollectorSink::new();
        pipeline
            .add_element(IterSource::new(values).into_element("src"))
            .unwrap();
        pipeline
            .add_element(FnTransform::element("square", |v: Value| {
                let x = v.as_i64().unwrap_or_default();
                Ok(Value::from(x * x))
            }))
            .unwrap();
        pipeline
            .add_element(Element::sink("sink", collector))
            .unwrap();
        pipeline.connect("src", MAIN_PORT, "square", MAIN_PORT).unwrap();
        pipeline.connect("square", MAIN_PORT, "sink", MAIN_PORT).unwrap();
        (pipeline, handle)
    }

    #[test]
    fn test_duplicate_and_unknown_elements() {
        let mut pipeline = Pipeline::default();
        pipeline.add_element(Element::pump("a")).unwrap();
        assert!(matches!(
            pipeline.add_element(Element::pump("a")),
            Err(PipelineError::DuplicateElement(_))
        ));
        assert!(matches!(
            pipeline.connect("a", MAIN_PORT, "nope", MAIN_PORT),
            Err(PipelineError::UnknownElement(_))
        ));
        assert_eq!(pipeline.element_names(), ["a"]);
    }

    #[test]
    fn test_run_to_completion() {
        let (mut pipeline, handle) = linear(vec![1, 2, 3]);
        let monitor = pipeline.monitor();
        pipeline.run_to_completion(Duration::from_secs(5)).unwrap();

        let got: Vec<_> = handle.values().iter().map(|v| v.as_i64()).collect();
        assert_eq!(got, [Some(1), Some(4), Some(9)]);
        assert!(pipeline.is_finished());
        assert!(!pipeline.is_running());
        assert!(monitor.drain().contains(&PipelineEvent::Finished));
    }

    #[test]
    fn test_reinit_allows_second_run() {
        let (mut pipeline, handle) = linear(vec![2]);
        pipeline.run_to_completion(Duration::from_secs(5)).unwrap();
        assert!(matches!(pipeline.start(), Err(PipelineError::AlreadyStarted(_))));

        pipeline.reinit();
        assert!(!pipeline.is_finished());
        pipeline.run_to_completion(Duration::from_secs(5)).unwrap();
        assert_eq!(handle.len(), 2);
    }

    #[test]
    fn test_disconnect_and_remove() {
        let (mut pipeline, _) = linear(vec![]);
        assert_eq!(pipeline.connections().len(), 2);
        let first = pipeline.connections()[0].id;
        pipeline.disconnect(first).unwrap();
        assert!(matches!(
            pipeline.disconnect(first),
            Err(PipelineError::UnknownLink(_))
        ));

        pipeline.remove_element("sink").unwrap();
        assert!(pipeline.connections().is_empty());
        assert_eq!(pipeline.element_names(), ["src", "square"]);
        assert!(pipeline.element("square").unwrap().output_links().is_empty());
    }

    #[test]
    fn test_parameter_projection() {
        let mut pipeline = Pipeline::default();
        let gain = Element::transform_fn("gain", |ctx| {
            let k = ctx.parameter("k")?.as_f64().unwrap_or(1.0);
            let x = ctx.input(MAIN_PORT)?.as_f64().unwrap_or_default();
            ctx.emit(MAIN_PORT, k * x)?;
            Ok(())
        });
        gain.declare_parameter("k", Value::from(1.0), Some(Value::from(2.0)))
            .unwrap();
        pipeline.add_element(gain).unwrap();
        pipeline.add_element(Element::pump("feed")).unwrap();

        let mut params = pipeline.param_value();
        assert_eq!(params.keys().collect::<Vec<_>>(), ["gain"]);
        params
            .get_mut("gain")
            .unwrap()
            .as_record_mut()
            .unwrap()
            .set("k", 3.0)
            .unwrap();
        pipeline.apply_parameters(&params).unwrap();
        assert_eq!(
            pipeline.element("gain").unwrap().parameter("k").unwrap().as_f64(),
            Some(3.0)
        );

        let bogus = Record::from_fields([("gain", Value::from(1.0))]);
        assert!(matches!(
            pipeline.apply_parameters(&bogus),
            Err(PipelineError::TypeMismatch { .. })
        ));
    }
}
