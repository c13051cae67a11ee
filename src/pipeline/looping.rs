//! Loop wrapper: bounded feedback around a private sub-graph.
//!
//! Per declared port `p` the loop owns an outer input and output `p`, an
//! input pump feeding the body, and an output node the body's result for
//! `p` is connected to. A single looper element collects one value per
//! port per pass:
//!
//! ```text
//!   outer.p ──► pump(p) ──► body ──► output_node(p) ──► looper.p
//!                 ▲                                       │
//!                 └──────── condition true ◄──────────────┤
//!                                                         └─ false ──► outer.p
//! ```
//!
//! While an activation circulates the outer element is held, so a second
//! outer arrival waits until the first one has been released. If any
//! element of the loop fails during an activation, that activation is
//! dropped without output: pending sub-graph values are discarded and the
//! hold is lifted so the next arrival can run.

use crate::config::DEFAULT_LOOP_BOUND;
use crate::pipeline::composite::{bridge_pump, outer_element, Subgraph};
use crate::pipeline::element::{
    Element, ElementEvent, ElementRole, Process, ProcessContext, WeakElement, MAIN_PORT,
};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::link::{connect, Link};
use crate::pipeline::nodes::ForwardNode;
use crate::value::Value;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// Termination predicate, consulted after every pass through the body.
pub trait LoopCondition: Send {
    /// `iteration` counts completed passes, starting at 1.
    fn should_continue(&mut self, iteration: usize, outputs: &IndexMap<String, Arc<Value>>) -> bool;

    /// Called before each new outer activation.
    fn reset(&mut self) {}
}

/// Run the body exactly `N` times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationBound(pub usize);

impl LoopCondition for IterationBound {
    fn should_continue(&mut self, iteration: usize, _outputs: &IndexMap<String, Arc<Value>>) -> bool {
        iteration < self.0
    }
}

/// Closure-backed condition, e.g. for convergence checks.
pub struct ConditionFn<F>(pub F);

impl<F> LoopCondition for ConditionFn<F>
where
    F: FnMut(usize, &IndexMap<String, Arc<Value>>) -> bool + Send,
{
    fn should_continue(&mut self, iteration: usize, outputs: &IndexMap<String, Arc<Value>>) -> bool {
        (self.0)(iteration, outputs)
    }
}

struct LoopShared {
    condition: Mutex<Box<dyn LoopCondition>>,
    iteration: AtomicUsize,
    last_iterations: AtomicUsize,
}

/// Drop the current activation: discard everything queued inside the
/// loop and lift the hold on `outer`.
fn abort_activation(outer: &Element, subgraph: &Subgraph, shared: &LoopShared) {
    if !outer.is_held() {
        return;
    }
    shared.iteration.store(0, Ordering::SeqCst);
    for member in subgraph.members() {
        for link in member.input_links() {
            link.clear();
        }
    }
    tracing::warn!(element = %outer.name(), "Loop activation dropped after an error");
    outer.release();
}

/// Outer routine: hold the loop, then seed the body.
struct Seed {
    subgraph: Arc<Subgraph>,
    shared: Arc<LoopShared>,
}

impl Process for Seed {
    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> anyhow::Result<()> {
        ctx.element().hold();
        self.shared.iteration.store(0, Ordering::SeqCst);
        self.shared.condition.lock().reset();
        tracing::debug!(element = %ctx.name(), "Loop activation started");
        for (port, value) in ctx.take_all() {
            if let Some(pump) = self.subgraph.input_pump(&port) {
                if let Err(err) = pump.emit_shared(MAIN_PORT, value) {
                    abort_activation(ctx.element(), &self.subgraph, &self.shared);
                    return Err(err.into());
                }
            }
        }
        Ok(())
    }
}

/// Looper routine: recirculate or release.
struct Looper {
    subgraph: Arc<Subgraph>,
    shared: Arc<LoopShared>,
    outer: WeakElement,
}

impl Looper {
    fn release(&self, outputs: IndexMap<String, Arc<Value>>) -> anyhow::Result<()> {
        let Some(outer) = self.outer.upgrade() else {
            return Ok(());
        };
        let mut result = Ok(());
        for (port, value) in outputs {
            if let Err(err) = outer.emit_shared(&port, value) {
                result = Err(err.into());
                break;
            }
        }
        outer.release();
        result
    }
}

impl Process for Looper {
    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> anyhow::Result<()> {
        let outputs = ctx.take_all();
        let iteration = self.shared.iteration.fetch_add(1, Ordering::SeqCst) + 1;
        let again = self
            .shared
            .condition
            .lock()
            .should_continue(iteration, &outputs);

        if again {
            for (port, value) in outputs {
                if let Some(pump) = self.subgraph.input_pump(&port) {
                    if let Err(err) = pump.emit_shared(MAIN_PORT, value) {
                        if let Some(outer) = self.outer.upgrade() {
                            abort_activation(&outer, &self.subgraph, &self.shared);
                        }
                        return Err(err.into());
                    }
                }
            }
            return Ok(());
        }

        self.shared.iteration.store(0, Ordering::SeqCst);
        self.shared
            .last_iterations
            .store(iteration, Ordering::SeqCst);
        tracing::debug!(element = %ctx.name(), iterations = iteration, "Loop released");
        self.release(outputs)
    }
}

/// Repeats a sub-graph until its [`LoopCondition`] says stop, then
/// forwards the final values outward once.
#[derive(Clone)]
pub struct Loop {
    element: Element,
    subgraph: Arc<Subgraph>,
    looper: Element,
    shared: Arc<LoopShared>,
}

impl Loop {
    pub fn new(name: impl Into<String>, condition: impl LoopCondition + 'static) -> Self {
        let subgraph = Arc::new(Subgraph::new());
        let shared = Arc::new(LoopShared {
            condition: Mutex::new(Box::new(condition)),
            iteration: AtomicUsize::new(0),
            last_iterations: AtomicUsize::new(0),
        });
        let seed = Seed {
            subgraph: Arc::clone(&subgraph),
            shared: Arc::clone(&shared),
        };
        let element = outer_element(name, &subgraph, Box::new(seed));
        let looper = Element::with_role(
            format!("{}::looper", element.name()),
            ElementRole::Sink,
            &[],
            &[],
            None,
            Some(Box::new(Looper {
                subgraph: Arc::clone(&subgraph),
                shared: Arc::clone(&shared),
                outer: element.downgrade(),
            })),
        );
        // Infallible: the sub-graph is empty.
        let _ = subgraph.add(looper.clone());
        Self {
            element,
            subgraph,
            looper,
            shared,
        }
    }

    /// Loop running the body a fixed number of times.
    pub fn with_bound(name: impl Into<String>, bound: usize) -> Self {
        Self::new(name, IterationBound(bound))
    }

    /// Loop with a `main` port running the body
    /// [`DEFAULT_LOOP_BOUND`] times. Wire the body between
    /// `input_pump(MAIN_PORT)` and `output_node(MAIN_PORT)`.
    pub fn default_bound(name: impl Into<String>) -> Self {
        let looped = Self::with_bound(name, DEFAULT_LOOP_BOUND);
        // Infallible: the loop has no ports yet.
        let _ = looped.add_port(MAIN_PORT, None);
        looped
    }

    pub fn element(&self) -> &Element {
        &self.element
    }

    pub fn into_element(self) -> Element {
        self.element
    }

    pub fn subgraph(&self) -> &Subgraph {
        &self.subgraph
    }

    /// Declare port `name` on both sides of the loop.
    ///
    /// Returns the body's input pump and the output node the body's result
    /// must be connected to.
    pub fn add_port(&self, name: &str, sample: Option<Value>) -> PipelineResult<(Element, Element)> {
        self.element.register_input(name, sample.clone())?;
        self.element.register_output(name, sample.clone())?;
        let pump = bridge_pump(&self.element, name, sample.clone())?;
        let output = ForwardNode::element(format!("{}::out::{}", self.element.name(), name));
        output.set_input_sample(MAIN_PORT, sample.clone())?;
        output.set_output_sample(MAIN_PORT, sample.clone())?;
        output.set_registry(self.element.registry());
        self.abort_on_error(&output);
        self.looper.register_input(name, sample)?;
        connect(&output, MAIN_PORT, &self.looper, name)?;

        self.subgraph.add(pump.clone())?;
        self.subgraph.add(output.clone())?;
        self.subgraph
            .input_pumps
            .write()
            .insert(name.to_string(), pump.clone());
        self.subgraph
            .output_sinks
            .write()
            .insert(name.to_string(), output.clone());
        Ok((pump, output))
    }

    pub fn input_pump(&self, port: &str) -> PipelineResult<Element> {
        self.subgraph
            .input_pump(port)
            .ok_or_else(|| self.unknown(port))
    }

    pub fn output_node(&self, port: &str) -> PipelineResult<Element> {
        self.subgraph
            .output_sink(port)
            .ok_or_else(|| self.unknown(port))
    }

    /// Adopt `element` into the loop body. A routine failure in it drops
    /// the activation in flight.
    pub fn add_element(&self, element: Element) -> PipelineResult<()> {
        element.set_registry(self.element.registry());
        self.subgraph.add(element.clone())?;
        self.abort_on_error(&element);
        Ok(())
    }

    fn abort_on_error(&self, member: &Element) {
        let outer = self.element.downgrade();
        let subgraph: Weak<Subgraph> = Arc::downgrade(&self.subgraph);
        let shared = Arc::clone(&self.shared);
        member.on_event(move |event| {
            if !matches!(event, ElementEvent::Error { .. }) {
                return;
            }
            if let (Some(outer), Some(subgraph)) = (outer.upgrade(), subgraph.upgrade()) {
                abort_activation(&outer, &subgraph, &shared);
            }
        });
    }

    pub fn connect(
        &self,
        producer: &Element,
        out_port: &str,
        consumer: &Element,
        in_port: &str,
    ) -> PipelineResult<Arc<Link>> {
        connect(producer, out_port, consumer, in_port)
    }

    /// Passes the most recently released activation took.
    pub fn last_iterations(&self) -> usize {
        self.shared.last_iterations.load(Ordering::SeqCst)
    }

    fn unknown(&self, port: &str) -> PipelineError {
        PipelineError::UnknownPort {
            element: self.element.name().to_string(),
            port: port.to_string(),
        }
    }
}

impl std::fmt::Debug for Loop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loop")
            .field("element", &self.element)
            .field("last_iterations", &self.last_iterations())
            .finish()
    }
}
