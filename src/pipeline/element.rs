//! Elements: the Source, Sink and Transform roles and their workers.
//!
//! An [`Element`] is a cheap handle (`Arc`) to shared state: its ports,
//! lifecycle, parameters and user routine.
//!
//! - A **Source** runs its [`Produce`] routine on one dedicated thread,
//!   started by [`Element::start`]. A source without a routine is a
//!   passive *pump*: whoever holds it calls [`Element::emit`].
//! - A **Sink** reacts to link-fill notifications. When every input port
//!   has a pending value and no worker is active, exactly one worker
//!   thread is spawned. The worker pops one value per input, runs the
//!   [`Process`] routine, and repeats while all inputs stay ready.
//! - A **Transform** is a Sink whose routine also emits.
//!
//! The spawn decision and the per-iteration pop happen under one
//! per-element lock; the thread itself is launched after that lock is
//! released, so a producer feeding several links of the same consumer
//! never deadlocks on it.

use crate::config::DEFAULT_WORKER_PREFIX;
use crate::pipeline::composite::Subgraph;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::id::ElementId;
use crate::pipeline::link::{disconnect, Link};
use crate::pipeline::parameter::ParameterSet;
use crate::pipeline::port::{PortDescriptor, PortSet};
use crate::value::{CompatibilityRegistry, Record, Value};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Name of the default port of every role.
pub const MAIN_PORT: &str = "main";

/// Role of an element in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementRole {
    Source,
    Sink,
    Transform,
}

/// Externally visible lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    NotStarted,
    Running,
    Stopped,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceRun {
    Idle,
    Running,
    Done,
}

/// Notification published to hooks registered with [`Element::on_event`].
#[derive(Debug, Clone, PartialEq)]
pub enum ElementEvent {
    Started { element: String },
    Stopped { element: String },
    Error { element: String, message: String },
}

pub type ElementHook = Arc<dyn Fn(&ElementEvent) + Send + Sync>;

/// Production routine of a Source, run on the source's own thread.
///
/// The routine should return once [`SourceContext::should_stop`] turns
/// true; the element counts as finished when it returns.
pub trait Produce: Send {
    fn produce(&mut self, ctx: &mut SourceContext<'_>) -> anyhow::Result<()>;
}

/// Per-iteration step of a Sink or Transform.
///
/// Called with one value popped from each input port. An `Err` ends the
/// current worker and is reported through the element's error hook; any
/// inputs still queued are picked up by a new worker.
pub trait Process: Send {
    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> anyhow::Result<()>;
}

struct FnProduce<F>(F);

impl<F> Produce for FnProduce<F>
where
    F: FnMut(&mut SourceContext<'_>) -> anyhow::Result<()> + Send,
{
    fn produce(&mut self, ctx: &mut SourceContext<'_>) -> anyhow::Result<()> {
        (self.0)(ctx)
    }
}

struct FnProcess<F>(F);

impl<F> Process for FnProcess<F>
where
    F: FnMut(&mut ProcessContext<'_>) -> anyhow::Result<()> + Send,
{
    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> anyhow::Result<()> {
        (self.0)(ctx)
    }
}

struct ElementState {
    lifecycle: Lifecycle,
    worker_active: bool,
    /// Set by the loop wrapper while an activation is circulating.
    held: bool,
    source: SourceRun,
    finished: bool,
}

pub(crate) struct ElementInner {
    id: ElementId,
    name: String,
    role: ElementRole,
    has_routine: bool,
    ports: RwLock<PortSet>,
    state: Mutex<ElementState>,
    stop_requested: AtomicBool,
    /// Bumped on every arrival, worker exit and hold change.
    activity: AtomicU64,
    producer: Mutex<Option<Box<dyn Produce>>>,
    processor: Mutex<Option<Box<dyn Process>>>,
    source_handle: Mutex<Option<JoinHandle<()>>>,
    parameters: RwLock<ParameterSet>,
    hooks: RwLock<Vec<ElementHook>>,
    last_error: Mutex<Option<String>>,
    registry: RwLock<Arc<CompatibilityRegistry>>,
    subgraph: RwLock<Option<Arc<Subgraph>>>,
    worker_prefix: RwLock<String>,
}

/// Shared handle to a pipeline element.
#[derive(Clone)]
pub struct Element {
    inner: Arc<ElementInner>,
}

/// Non-owning handle, used by links and bridge elements.
#[derive(Clone, Default)]
pub struct WeakElement(Weak<ElementInner>);

impl WeakElement {
    pub fn new() -> Self {
        Self(Weak::new())
    }

    pub fn upgrade(&self) -> Option<Element> {
        self.0.upgrade().map(|inner| Element { inner })
    }
}

impl fmt::Debug for WeakElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(element) => write!(f, "WeakElement({})", element.name()),
            None => write!(f, "WeakElement(<dropped>)"),
        }
    }
}

impl Element {
    pub(crate) fn with_role(
        name: impl Into<String>,
        role: ElementRole,
        inputs: &[&str],
        outputs: &[&str],
        producer: Option<Box<dyn Produce>>,
        processor: Option<Box<dyn Process>>,
    ) -> Self {
        let name = name.into();
        let mut ports = PortSet::new(name.clone());
        // Infallible: the set is fresh and the names are distinct.
        for input in inputs {
            let _ = ports.register_input(input, None);
        }
        for output in outputs {
            let _ = ports.register_output(output, None);
        }
        Self {
            inner: Arc::new(ElementInner {
                id: ElementId::next(),
                name,
                role,
                has_routine: producer.is_some(),
                ports: RwLock::new(ports),
                state: Mutex::new(ElementState {
                    lifecycle: Lifecycle::NotStarted,
                    worker_active: false,
                    held: false,
                    source: SourceRun::Idle,
                    finished: false,
                }),
                stop_requested: AtomicBool::new(false),
                activity: AtomicU64::new(0),
                producer: Mutex::new(producer),
                processor: Mutex::new(processor),
                source_handle: Mutex::new(None),
                parameters: RwLock::new(ParameterSet::new()),
                hooks: RwLock::new(Vec::new()),
                last_error: Mutex::new(None),
                registry: RwLock::new(Arc::new(CompatibilityRegistry::new())),
                subgraph: RwLock::new(None),
                worker_prefix: RwLock::new(DEFAULT_WORKER_PREFIX.to_string()),
            }),
        }
    }

    /// A Source with a `main` output, running `producer` on its own thread.
    pub fn source(name: impl Into<String>, producer: impl Produce + 'static) -> Self {
        Self::with_role(
            name,
            ElementRole::Source,
            &[],
            &[MAIN_PORT],
            Some(Box::new(producer)),
            None,
        )
    }

    pub fn source_fn<F>(name: impl Into<String>, f: F) -> Self
    where
        F: FnMut(&mut SourceContext<'_>) -> anyhow::Result<()> + Send + 'static,
    {
        Self::source(name, FnProduce(f))
    }

    /// A passive Source with a `main` output and no thread of its own.
    pub fn pump(name: impl Into<String>) -> Self {
        Self::with_role(name, ElementRole::Source, &[], &[MAIN_PORT], None, None)
    }

    /// A Sink with a `main` input.
    pub fn sink(name: impl Into<String>, processor: impl Process + 'static) -> Self {
        Self::with_role(
            name,
            ElementRole::Sink,
            &[MAIN_PORT],
            &[],
            None,
            Some(Box::new(processor)),
        )
    }

    pub fn sink_fn<F>(name: impl Into<String>, f: F) -> Self
    where
        F: FnMut(&mut ProcessContext<'_>) -> anyhow::Result<()> + Send + 'static,
    {
        Self::sink(name, FnProcess(f))
    }

    /// A Transform with `main` input and output.
    pub fn transform(name: impl Into<String>, processor: impl Process + 'static) -> Self {
        Self::with_role(
            name,
            ElementRole::Transform,
            &[MAIN_PORT],
            &[MAIN_PORT],
            None,
            Some(Box::new(processor)),
        )
    }

    pub fn transform_fn<F>(name: impl Into<String>, f: F) -> Self
    where
        F: FnMut(&mut ProcessContext<'_>) -> anyhow::Result<()> + Send + 'static,
    {
        Self::transform(name, FnProcess(f))
    }

    pub fn id(&self) -> ElementId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn role(&self) -> ElementRole {
        self.inner.role
    }

    pub fn downgrade(&self) -> WeakElement {
        WeakElement(Arc::downgrade(&self.inner))
    }

    pub fn ptr_eq(&self, other: &Element) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ── Ports ──

    pub fn register_input(&self, name: &str, sample: Option<Value>) -> PipelineResult<()> {
        self.inner.ports.write().register_input(name, sample)
    }

    pub fn register_output(&self, name: &str, sample: Option<Value>) -> PipelineResult<()> {
        self.inner.ports.write().register_output(name, sample)
    }

    /// Remove an input port, disconnecting its link.
    pub fn remove_input(&self, name: &str) -> PipelineResult<()> {
        let port = self.inner.ports.write().remove_input(name)?;
        for link in port.links() {
            disconnect(link);
        }
        Ok(())
    }

    /// Remove an output port, disconnecting all of its links.
    pub fn remove_output(&self, name: &str) -> PipelineResult<()> {
        let port = self.inner.ports.write().remove_output(name)?;
        for link in port.links() {
            disconnect(link);
        }
        Ok(())
    }

    pub fn set_input_sample(&self, name: &str, sample: Option<Value>) -> PipelineResult<()> {
        self.inner.ports.write().input_mut(name)?.set_sample(sample);
        Ok(())
    }

    pub fn set_output_sample(&self, name: &str, sample: Option<Value>) -> PipelineResult<()> {
        self.inner.ports.write().output_mut(name)?.set_sample(sample);
        Ok(())
    }

    pub fn input_names(&self) -> Vec<String> {
        self.with_ports(|ports| ports.inputs().map(|p| p.name().to_string()).collect())
    }

    pub fn output_names(&self) -> Vec<String> {
        self.with_ports(|ports| ports.outputs().map(|p| p.name().to_string()).collect())
    }

    pub fn ports(&self) -> Vec<PortDescriptor> {
        self.with_ports(PortSet::descriptors)
    }

    pub fn input_links(&self) -> Vec<Arc<Link>> {
        self.with_ports(|ports| {
            ports
                .inputs()
                .flat_map(|p| p.links().iter().cloned())
                .collect()
        })
    }

    pub fn output_links(&self) -> Vec<Arc<Link>> {
        self.with_ports(|ports| {
            ports
                .outputs()
                .flat_map(|p| p.links().iter().cloned())
                .collect()
        })
    }

    pub fn input_link(&self, port: &str) -> PipelineResult<Option<Arc<Link>>> {
        self.with_ports(|ports| Ok(ports.input(port)?.link().cloned()))
    }

    pub(crate) fn with_ports<R>(&self, f: impl FnOnce(&PortSet) -> R) -> R {
        f(&self.inner.ports.read())
    }

    pub(crate) fn with_ports_mut<R>(&self, f: impl FnOnce(&mut PortSet) -> R) -> R {
        f(&mut self.inner.ports.write())
    }

    // ── Data path ──

    /// Push `value` onto every link of output `port`.
    pub fn emit(&self, port: &str, value: impl Into<Value>) -> PipelineResult<()> {
        self.emit_shared(port, Arc::new(value.into()))
    }

    /// Broadcast one shared value to every link of output `port`. Every
    /// link is type-checked before anything is pushed.
    pub fn emit_shared(&self, port: &str, value: Arc<Value>) -> PipelineResult<()> {
        let links = self.inner.ports.read().output(port)?.links().to_vec();
        for link in &links {
            link.check(&value)?;
        }
        for link in links {
            link.push_unchecked(Arc::clone(&value));
        }
        Ok(())
    }

    /// Called by a link after a value was queued for this element.
    pub(crate) fn notify_filled(&self) {
        self.bump();
        self.try_activate();
    }

    fn try_activate(&self) {
        if self.inner.role == ElementRole::Source {
            return;
        }
        let spawn = {
            let mut state = self.inner.state.lock();
            if state.worker_active || state.held || !self.inner.ports.read().all_inputs_ready() {
                false
            } else {
                state.worker_active = true;
                true
            }
        };
        if spawn {
            self.spawn_worker();
        }
    }

    fn thread_name(&self) -> String {
        format!("{}-{}", self.inner.worker_prefix.read(), self.inner.name)
    }

    fn spawn_worker(&self) {
        let element = self.clone();
        let spawned = thread::Builder::new()
            .name(self.thread_name())
            .spawn(move || element.drain());
        if let Err(err) = spawned {
            self.inner.state.lock().worker_active = false;
            self.bump();
            self.report_error(format!("failed to spawn worker: {}", err));
        }
    }

    fn drain(&self) {
        let mut guard = WorkerGuard {
            element: self,
            armed: true,
        };
        tracing::debug!(element = %self.inner.name, "Worker started");
        let mut iterations = 0u64;
        let mut failed = false;
        loop {
            let inputs = {
                let mut state = self.inner.state.lock();
                let snapshot = if state.held {
                    None
                } else {
                    self.inner.ports.read().pop_all()
                };
                match snapshot {
                    Some(inputs) => inputs,
                    None => {
                        state.worker_active = false;
                        break;
                    }
                }
            };
            iterations += 1;

            let mut ctx = ProcessContext {
                element: self,
                inputs,
            };
            let result = match self.inner.processor.lock().as_mut() {
                Some(processor) => processor.process(&mut ctx),
                None => Ok(()),
            };
            if let Err(err) = result {
                self.inner.state.lock().worker_active = false;
                self.report_error(format!("{:#}", err));
                failed = true;
                break;
            }
        }
        guard.armed = false;
        self.bump();
        tracing::debug!(element = %self.inner.name, iterations, "Worker exited");
        // Inputs queued behind the failed iteration get a fresh worker.
        if failed {
            self.try_activate();
        }
    }

    // ── Lifecycle ──

    /// Start the element. A Source with a routine gets a fresh worker
    /// thread; composites start their inner elements too.
    pub fn start(&self) -> PipelineResult<()> {
        {
            let mut state = self.inner.state.lock();
            if state.lifecycle != Lifecycle::NotStarted {
                return Err(PipelineError::AlreadyStarted(self.inner.name.clone()));
            }
            state.lifecycle = Lifecycle::Running;
        }
        self.inner.stop_requested.store(false, Ordering::SeqCst);
        if let Some(subgraph) = self.subgraph() {
            subgraph.start_all()?;
        }
        if self.inner.role == ElementRole::Source && self.inner.has_routine {
            self.spawn_source()?;
        }
        tracing::debug!(element = %self.inner.name, "Started");
        self.fire(ElementEvent::Started {
            element: self.inner.name.clone(),
        });
        Ok(())
    }

    fn spawn_source(&self) -> PipelineResult<()> {
        self.inner.state.lock().source = SourceRun::Running;
        let element = self.clone();
        let spawned = thread::Builder::new()
            .name(self.thread_name())
            .spawn(move || element.run_source());
        match spawned {
            Ok(handle) => {
                *self.inner.source_handle.lock() = Some(handle);
                Ok(())
            }
            Err(err) => {
                let mut state = self.inner.state.lock();
                state.source = SourceRun::Idle;
                state.lifecycle = Lifecycle::NotStarted;
                Err(err.into())
            }
        }
    }

    fn run_source(&self) {
        let mut guard = SourceGuard {
            element: self,
            armed: true,
        };
        tracing::debug!(element = %self.inner.name, "Source started");
        let result = {
            let mut ctx = SourceContext { element: self };
            match self.inner.producer.lock().as_mut() {
                Some(producer) => producer.produce(&mut ctx),
                None => Ok(()),
            }
        };
        if let Err(err) = result {
            self.report_error(format!("{:#}", err));
        }
        guard.armed = false;
        self.inner.state.lock().source = SourceRun::Done;
        self.bump();
        tracing::debug!(element = %self.inner.name, "Source exited");
    }

    /// Request termination. Cooperative: the source routine observes it
    /// through [`SourceContext::should_stop`], and buffered inputs are
    /// still drained.
    pub fn stop(&self) {
        self.inner.stop_requested.store(true, Ordering::SeqCst);
        {
            let mut state = self.inner.state.lock();
            if state.lifecycle != Lifecycle::Finished {
                state.lifecycle = Lifecycle::Stopped;
            }
        }
        if let Some(subgraph) = self.subgraph() {
            subgraph.stop_all();
        }
        self.bump();
        tracing::debug!(element = %self.inner.name, "Stop requested");
        self.fire(ElementEvent::Stopped {
            element: self.inner.name.clone(),
        });
    }

    /// Reset for another run: stop, join the source thread, drop pending
    /// input values and return to `NotStarted`.
    ///
    /// Blocks until the source routine returns.
    pub fn reinit(&self) {
        self.inner.stop_requested.store(true, Ordering::SeqCst);
        let handle = self.inner.source_handle.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                tracing::warn!(element = %self.inner.name, "Source thread panicked");
            }
        }
        for link in self.input_links() {
            link.clear();
        }
        if let Some(subgraph) = self.subgraph() {
            subgraph.reinit_all();
        }
        {
            let mut state = self.inner.state.lock();
            state.lifecycle = Lifecycle::NotStarted;
            state.held = false;
            state.source = SourceRun::Idle;
            state.finished = false;
        }
        *self.inner.last_error.lock() = None;
        self.inner.stop_requested.store(false, Ordering::SeqCst);
        self.bump();
        tracing::debug!(element = %self.inner.name, "Reinitialized");
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.inner.state.lock().lifecycle
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle() == Lifecycle::Running
    }

    pub fn stop_requested(&self) -> bool {
        self.inner.stop_requested.load(Ordering::SeqCst)
    }

    /// Whether a worker or source thread is currently executing.
    pub fn is_active(&self) -> bool {
        let state = self.inner.state.lock();
        state.worker_active || state.source == SourceRun::Running
    }

    /// Whether a Source's routine has run and returned.
    pub fn source_done(&self) -> bool {
        self.inner.state.lock().source == SourceRun::Done
    }

    /// Poll until no worker or source thread is active.
    pub fn wait_idle(&self, timeout: Duration, poll: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.is_active() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(poll);
        }
        true
    }

    /// Whether this element and everything upstream of it is done.
    ///
    /// A Source is finished once its routine returned, or once stopped if
    /// it never ran. A Sink or Transform needs a stop request, no active
    /// worker or loop activation, empty input links, a quiescent internal
    /// sub-graph, and every upstream producer finished. The walk is an
    /// explicit DFS over input links; the graph outside loop wrappers is
    /// assumed acyclic, and revisits are skipped. The result is latched
    /// until [`reinit`](Self::reinit).
    pub fn is_finished(&self) -> bool {
        if self.inner.state.lock().finished {
            return true;
        }
        let mut epochs = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![self.clone()];
        while let Some(element) = stack.pop() {
            if !visited.insert(element.id()) {
                continue;
            }
            if element.inner.state.lock().finished {
                continue;
            }
            if !element.locally_finished(&mut epochs) {
                return false;
            }
            for link in element.input_links() {
                if let Some(producer) = link.producer() {
                    stack.push(producer);
                }
            }
        }
        // Anything that moved while we were looking invalidates the walk.
        if epochs.iter().any(|(element, seen)| element.activity() != *seen) {
            return false;
        }
        let mut state = self.inner.state.lock();
        state.finished = true;
        state.lifecycle = Lifecycle::Finished;
        true
    }

    fn locally_finished(&self, epochs: &mut Vec<(Element, u64)>) -> bool {
        match self.inner.role {
            ElementRole::Source => {
                epochs.push((self.clone(), self.activity()));
                match self.inner.state.lock().source {
                    SourceRun::Running => false,
                    SourceRun::Done => true,
                    SourceRun::Idle => self.stop_requested(),
                }
            }
            ElementRole::Sink | ElementRole::Transform => {
                self.stop_requested() && self.is_idle(epochs)
            }
        }
    }

    /// No worker, no hold, no pending input and a quiescent sub-graph.
    pub(crate) fn is_idle(&self, epochs: &mut Vec<(Element, u64)>) -> bool {
        epochs.push((self.clone(), self.activity()));
        {
            let state = self.inner.state.lock();
            if state.worker_active || state.held || state.source == SourceRun::Running {
                return false;
            }
        }
        if self.input_links().iter().any(|link| !link.is_empty()) {
            return false;
        }
        match self.subgraph() {
            Some(subgraph) => subgraph.is_quiescent(epochs),
            None => true,
        }
    }

    fn activity(&self) -> u64 {
        self.inner.activity.load(Ordering::SeqCst)
    }

    fn bump(&self) {
        self.inner.activity.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn is_held(&self) -> bool {
        self.inner.state.lock().held
    }

    /// Block new activations until [`release`](Self::release).
    pub(crate) fn hold(&self) {
        self.inner.state.lock().held = true;
        self.bump();
    }

    /// Lift a hold and resume draining any inputs that queued meanwhile.
    pub(crate) fn release(&self) {
        self.inner.state.lock().held = false;
        self.bump();
        self.try_activate();
    }

    // ── Hooks and errors ──

    /// Register a callback for start, stop and error notifications.
    pub fn on_event(&self, hook: impl Fn(&ElementEvent) + Send + Sync + 'static) {
        self.inner.hooks.write().push(Arc::new(hook));
    }

    fn fire(&self, event: ElementEvent) {
        let hooks = self.inner.hooks.read().clone();
        for hook in hooks {
            hook(&event);
        }
    }

    fn report_error(&self, message: String) {
        tracing::error!(element = %self.inner.name, "{}", message);
        *self.inner.last_error.lock() = Some(message.clone());
        self.fire(ElementEvent::Error {
            element: self.inner.name.clone(),
            message,
        });
    }

    /// Message of the most recent routine failure since the last reinit.
    pub fn last_error(&self) -> Option<String> {
        self.inner.last_error.lock().clone()
    }

    // ── Parameters ──

    pub fn declare_parameter(
        &self,
        name: &str,
        sample: Value,
        default: Option<Value>,
    ) -> PipelineResult<()> {
        self.inner.parameters.write().declare(name, sample, default)
    }

    pub fn parameter(&self, name: &str) -> PipelineResult<Value> {
        self.inner.parameters.read().get(name).cloned()
    }

    pub fn set_parameter(&self, name: &str, value: impl Into<Value>) -> PipelineResult<()> {
        let registry = self.registry();
        self.inner.parameters.write().set(name, value, &registry)
    }

    pub fn parameter_names(&self) -> Vec<String> {
        self.inner
            .parameters
            .read()
            .names()
            .map(str::to_string)
            .collect()
    }

    pub fn parameter_record(&self) -> Record {
        self.inner.parameters.read().to_record()
    }

    pub fn apply_parameter_record(&self, record: &Record) -> PipelineResult<()> {
        let registry = self.registry();
        self.inner.parameters.write().apply_record(record, &registry)
    }

    pub fn with_parameters<R>(&self, f: impl FnOnce(&mut ParameterSet) -> R) -> R {
        f(&mut self.inner.parameters.write())
    }

    // ── Shared settings ──

    pub fn registry(&self) -> Arc<CompatibilityRegistry> {
        Arc::clone(&self.inner.registry.read())
    }

    /// Use `registry` for links created into this element from now on.
    pub fn set_registry(&self, registry: Arc<CompatibilityRegistry>) {
        *self.inner.registry.write() = Arc::clone(&registry);
        if let Some(subgraph) = self.subgraph() {
            subgraph.set_registry(registry);
        }
    }

    pub fn set_worker_prefix(&self, prefix: &str) {
        *self.inner.worker_prefix.write() = prefix.to_string();
        if let Some(subgraph) = self.subgraph() {
            subgraph.set_worker_prefix(prefix);
        }
    }

    pub(crate) fn subgraph(&self) -> Option<Arc<Subgraph>> {
        self.inner.subgraph.read().clone()
    }

    pub(crate) fn set_subgraph(&self, subgraph: Arc<Subgraph>) {
        *self.inner.subgraph.write() = Some(subgraph);
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("role", &self.inner.role)
            .finish()
    }
}

/// Clears the worker flag if the routine panics and hands any queued
/// inputs to a fresh worker.
struct WorkerGuard<'a> {
    element: &'a Element,
    armed: bool,
}

impl Drop for WorkerGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.element.inner.state.lock().worker_active = false;
            self.element.bump();
            self.element.report_error("worker panicked".to_string());
            self.element.try_activate();
        }
    }
}

/// Marks the source as done if the routine panics.
struct SourceGuard<'a> {
    element: &'a Element,
    armed: bool,
}

impl Drop for SourceGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.element.inner.state.lock().source = SourceRun::Done;
            self.element.bump();
            self.element.report_error("source panicked".to_string());
        }
    }
}

/// What a [`Process`] routine sees on each iteration.
pub struct ProcessContext<'a> {
    element: &'a Element,
    inputs: IndexMap<String, Arc<Value>>,
}

impl<'a> ProcessContext<'a> {
    pub fn element(&self) -> &Element {
        self.element
    }

    pub fn name(&self) -> &str {
        self.element.name()
    }

    pub fn input(&self, port: &str) -> PipelineResult<&Value> {
        self.inputs
            .get(port)
            .map(|v| v.as_ref())
            .ok_or_else(|| self.unknown(port))
    }

    pub fn shared_input(&self, port: &str) -> PipelineResult<Arc<Value>> {
        self.inputs
            .get(port)
            .cloned()
            .ok_or_else(|| self.unknown(port))
    }

    /// Take ownership of an input, copying only if another consumer
    /// still shares it.
    pub fn take(&mut self, port: &str) -> PipelineResult<Value> {
        let value = self
            .inputs
            .shift_remove(port)
            .ok_or_else(|| self.unknown(port))?;
        Ok(Arc::unwrap_or_clone(value))
    }

    pub fn inputs(&self) -> impl Iterator<Item = (&str, &Arc<Value>)> {
        self.inputs.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn take_all(&mut self) -> IndexMap<String, Arc<Value>> {
        std::mem::take(&mut self.inputs)
    }

    pub fn emit(&self, port: &str, value: impl Into<Value>) -> PipelineResult<()> {
        self.element.emit(port, value)
    }

    pub fn emit_shared(&self, port: &str, value: Arc<Value>) -> PipelineResult<()> {
        self.element.emit_shared(port, value)
    }

    pub fn parameter(&self, name: &str) -> PipelineResult<Value> {
        self.element.parameter(name)
    }

    fn unknown(&self, port: &str) -> PipelineError {
        PipelineError::UnknownPort {
            element: self.element.name().to_string(),
            port: port.to_string(),
        }
    }
}

/// What a [`Produce`] routine sees.
pub struct SourceContext<'a> {
    element: &'a Element,
}

impl<'a> SourceContext<'a> {
    pub fn element(&self) -> &Element {
        self.element
    }

    pub fn name(&self) -> &str {
        self.element.name()
    }

    pub fn should_stop(&self) -> bool {
        self.element.stop_requested()
    }

    pub fn emit(&self, port: &str, value: impl Into<Value>) -> PipelineResult<()> {
        self.element.emit(port, value)
    }

    pub fn emit_shared(&self, port: &str, value: Arc<Value>) -> PipelineResult<()> {
        self.element.emit_shared(port, value)
    }

    pub fn parameter(&self, name: &str) -> PipelineResult<Value> {
        self.element.parameter(name)
    }
}
