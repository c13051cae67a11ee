//! Composite wrapper: a private sub-graph presented as one Transform.
//!
//! The outer element owns a [`Subgraph`] and a boundary table mapping each
//! outer port name to its internal bridge element:
//!
//! ```text
//!   outer.in ──► [relay] ──► pump(in) ──► ...sub-graph... ──► bridge sink(out) ──► outer.out
//! ```
//!
//! On every activation the outer routine forwards each arrived input into
//! the matching input pump. Bridge sinks re-emit whatever reaches them on
//! the matching outer output port.

use crate::pipeline::element::{
    Element, ElementRole, Lifecycle, Process, ProcessContext, MAIN_PORT,
};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::link::{connect, Link};
use crate::value::{CompatibilityRegistry, Value};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::sync::Arc;

/// Elements owned by a composite, with the boundary adapter tables.
#[derive(Debug, Default)]
pub struct Subgraph {
    elements: RwLock<IndexMap<String, Element>>,
    pub(crate) input_pumps: RwLock<IndexMap<String, Element>>,
    pub(crate) output_sinks: RwLock<IndexMap<String, Element>>,
}

impl Subgraph {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(&self, element: Element) -> PipelineResult<()> {
        let mut elements = self.elements.write();
        if elements.contains_key(element.name()) {
            return Err(PipelineError::DuplicateElement(element.name().to_string()));
        }
        elements.insert(element.name().to_string(), element);
        Ok(())
    }

    pub fn members(&self) -> Vec<Element> {
        self.elements.read().values().cloned().collect()
    }

    pub fn member(&self, name: &str) -> Option<Element> {
        self.elements.read().get(name).cloned()
    }

    pub fn input_pump(&self, port: &str) -> Option<Element> {
        self.input_pumps.read().get(port).cloned()
    }

    pub fn output_sink(&self, port: &str) -> Option<Element> {
        self.output_sinks.read().get(port).cloned()
    }

    /// Every member is idle and every internal link is empty.
    pub(crate) fn is_quiescent(&self, epochs: &mut Vec<(Element, u64)>) -> bool {
        self.members().iter().all(|m| m.is_idle(epochs))
    }

    pub(crate) fn start_all(&self) -> PipelineResult<()> {
        for member in self.members() {
            if member.lifecycle() == Lifecycle::NotStarted {
                member.start()?;
            }
        }
        Ok(())
    }

    pub(crate) fn stop_all(&self) {
        for member in self.members() {
            member.stop();
        }
    }

    pub(crate) fn reinit_all(&self) {
        for member in self.members() {
            member.reinit();
        }
    }

    pub(crate) fn set_registry(&self, registry: Arc<CompatibilityRegistry>) {
        for member in self.members() {
            member.set_registry(Arc::clone(&registry));
        }
    }

    pub(crate) fn set_worker_prefix(&self, prefix: &str) {
        for member in self.members() {
            member.set_worker_prefix(prefix);
        }
    }
}

/// Outer routine: inject each arrived input into its pump.
struct Relay {
    subgraph: Arc<Subgraph>,
}

impl Process for Relay {
    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> anyhow::Result<()> {
        for (port, value) in ctx.take_all() {
            match self.subgraph.input_pump(&port) {
                Some(pump) => pump.emit_shared(MAIN_PORT, value)?,
                None => tracing::warn!(element = %ctx.name(), port = %port, "No input pump"),
            }
        }
        Ok(())
    }
}

/// Builds the outer handle of a composite.
pub(crate) fn outer_element(
    name: impl Into<String>,
    subgraph: &Arc<Subgraph>,
    processor: Box<dyn Process>,
) -> Element {
    let element = Element::with_role(name, ElementRole::Transform, &[], &[], None, Some(processor));
    element.set_subgraph(Arc::clone(subgraph));
    element
}

/// Pump feeding the sub-graph from outer input `port`.
pub(crate) fn bridge_pump(outer: &Element, port: &str, sample: Option<Value>) -> PipelineResult<Element> {
    let pump = Element::pump(format!("{}::in::{}", outer.name(), port));
    pump.set_output_sample(MAIN_PORT, sample)?;
    pump.set_registry(outer.registry());
    Ok(pump)
}

/// Sink re-emitting everything it receives on outer output `port`.
pub(crate) fn bridge_sink(outer: &Element, port: &str, sample: Option<Value>) -> PipelineResult<Element> {
    let weak = outer.downgrade();
    let target = port.to_string();
    let sink = Element::sink_fn(format!("{}::out::{}", outer.name(), port), move |ctx| {
        let value = ctx.shared_input(MAIN_PORT)?;
        if let Some(outer) = weak.upgrade() {
            outer.emit_shared(&target, value)?;
        }
        Ok(())
    });
    sink.set_input_sample(MAIN_PORT, sample)?;
    sink.set_registry(outer.registry());
    Ok(sink)
}

/// A private sub-graph that behaves like a plain Transform.
#[derive(Debug, Clone)]
pub struct Composite {
    element: Element,
    subgraph: Arc<Subgraph>,
}

impl Composite {
    /// An empty composite with no ports; declare them with
    /// [`add_input_port`](Self::add_input_port) and friends.
    pub fn new(name: impl Into<String>) -> Self {
        let subgraph = Arc::new(Subgraph::new());
        let relay = Relay {
            subgraph: Arc::clone(&subgraph),
        };
        let element = outer_element(name, &subgraph, Box::new(relay));
        Self { element, subgraph }
    }

    /// A composite with a single `main` port in each direction.
    pub fn with_main(name: impl Into<String>) -> Self {
        let composite = Self::new(name);
        // Infallible: the composite has no ports yet.
        let _ = composite.add_port(MAIN_PORT, None);
        composite
    }

    /// The outer element to add to a pipeline or connect to.
    pub fn element(&self) -> &Element {
        &self.element
    }

    pub fn into_element(self) -> Element {
        self.element
    }

    pub fn subgraph(&self) -> &Subgraph {
        &self.subgraph
    }

    /// Declare outer input `name` and return its internal pump.
    pub fn add_input_port(&self, name: &str, sample: Option<Value>) -> PipelineResult<Element> {
        self.element.register_input(name, sample.clone())?;
        let pump = bridge_pump(&self.element, name, sample)?;
        self.subgraph.add(pump.clone())?;
        self.subgraph
            .input_pumps
            .write()
            .insert(name.to_string(), pump.clone());
        Ok(pump)
    }

    /// Declare outer output `name` and return its internal bridge sink.
    pub fn add_output_port(&self, name: &str, sample: Option<Value>) -> PipelineResult<Element> {
        self.element.register_output(name, sample.clone())?;
        let sink = bridge_sink(&self.element, name, sample)?;
        self.subgraph.add(sink.clone())?;
        self.subgraph
            .output_sinks
            .write()
            .insert(name.to_string(), sink.clone());
        Ok(sink)
    }

    /// Declare both an input and an output named `name`.
    pub fn add_port(&self, name: &str, sample: Option<Value>) -> PipelineResult<(Element, Element)> {
        let pump = self.add_input_port(name, sample.clone())?;
        let sink = self.add_output_port(name, sample)?;
        Ok((pump, sink))
    }

    pub fn input_pump(&self, port: &str) -> PipelineResult<Element> {
        self.subgraph
            .input_pump(port)
            .ok_or_else(|| self.unknown(port))
    }

    pub fn output_sink(&self, port: &str) -> PipelineResult<Element> {
        self.subgraph
            .output_sink(port)
            .ok_or_else(|| self.unknown(port))
    }

    /// Adopt `element` into the sub-graph.
    pub fn add_element(&self, element: Element) -> PipelineResult<()> {
        element.set_registry(self.element.registry());
        self.subgraph.add(element)
    }

    /// Wire two sub-graph elements together.
    pub fn connect(
        &self,
        producer: &Element,
        out_port: &str,
        consumer: &Element,
        in_port: &str,
    ) -> PipelineResult<Arc<Link>> {
        connect(producer, out_port, consumer, in_port)
    }

    fn unknown(&self, port: &str) -> PipelineError {
        PipelineError::UnknownPort {
            element: self.element.name().to_string(),
            port: port.to_string(),
        }
    }
}
