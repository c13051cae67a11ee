//! Links: single-producer/single-consumer FIFO channels between ports.
//!
//! A link connects exactly one output port to one input port. Pushing a
//! value appends it to the queue and then notifies the consuming element,
//! on the producer's thread, after the queue lock has been released.

use crate::pipeline::element::{Element, WeakElement};
use crate::pipeline::error::{describe, PipelineError, PipelineResult};
use crate::pipeline::id::LinkId;
use crate::value::{CompatibilityRegistry, Value};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

/// One end of a link.
#[derive(Debug, Clone)]
struct Endpoint {
    element: WeakElement,
    name: String,
    port: String,
}

impl Endpoint {
    fn unbound() -> Self {
        Self {
            element: WeakElement::new(),
            name: String::new(),
            port: String::new(),
        }
    }
}

/// FIFO channel carrying shared values from one port to another.
pub struct Link {
    id: LinkId,
    queue: Mutex<VecDeque<Arc<Value>>>,
    sample: Option<Value>,
    registry: Arc<CompatibilityRegistry>,
    producer: Endpoint,
    consumer: Endpoint,
}

impl Link {
    /// A link attached to no element. Pushing never notifies anyone.
    pub fn unbound(sample: Option<Value>, registry: Arc<CompatibilityRegistry>) -> Arc<Link> {
        Arc::new(Self {
            id: LinkId::next(),
            queue: Mutex::new(VecDeque::new()),
            sample,
            registry,
            producer: Endpoint::unbound(),
            consumer: Endpoint::unbound(),
        })
    }

    pub fn id(&self) -> LinkId {
        self.id
    }

    /// Type sample copied from the producing port.
    pub fn sample(&self) -> Option<&Value> {
        self.sample.as_ref()
    }

    pub fn producer(&self) -> Option<Element> {
        self.producer.element.upgrade()
    }

    pub fn consumer(&self) -> Option<Element> {
        self.consumer.element.upgrade()
    }

    pub fn producer_name(&self) -> &str {
        &self.producer.name
    }

    pub fn producer_port(&self) -> &str {
        &self.producer.port
    }

    pub fn consumer_name(&self) -> &str {
        &self.consumer.name
    }

    pub fn consumer_port(&self) -> &str {
        &self.consumer.port
    }

    /// Check `value` against the link's sample.
    pub fn check(&self, value: &Value) -> PipelineResult<()> {
        match &self.sample {
            Some(sample) if !value.is_compatible(sample, &self.registry) => {
                Err(PipelineError::TypeMismatch {
                    context: self.to_string(),
                    expected: describe(sample),
                    found: describe(value),
                })
            }
            _ => Ok(()),
        }
    }

    /// Type-check and enqueue `value`, then notify the consumer.
    pub fn push(&self, value: impl Into<Arc<Value>>) -> PipelineResult<()> {
        let value = value.into();
        self.check(&value)?;
        self.push_unchecked(value);
        Ok(())
    }

    pub(crate) fn push_unchecked(&self, value: Arc<Value>) {
        self.queue.lock().push_back(value);
        if let Some(consumer) = self.consumer() {
            consumer.notify_filled();
        }
    }

    /// Remove and return the oldest pending value.
    pub fn pop(&self) -> PipelineResult<Arc<Value>> {
        self.queue
            .lock()
            .pop_front()
            .ok_or(PipelineError::EmptyChannel(self.id))
    }

    pub fn is_ready(&self) -> bool {
        !self.queue.lock().is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Discard all pending values.
    pub fn clear(&self) {
        self.queue.lock().clear();
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("id", &self.id)
            .field("from", &format_args!("{}.{}", self.producer.name, self.producer.port))
            .field("to", &format_args!("{}.{}", self.consumer.name, self.consumer.port))
            .field("pending", &self.len())
            .finish()
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} -> {}.{}",
            self.producer.name, self.producer.port, self.consumer.name, self.consumer.port
        )
    }
}

/// Connect `producer.out_port` to `consumer.in_port` with a new link.
///
/// The producer port's sample must be compatible with the consumer
/// port's sample when both are declared. An input port that already has
/// a link is left untouched and the call fails with `TooManyInputs`.
pub fn connect(
    producer: &Element,
    out_port: &str,
    consumer: &Element,
    in_port: &str,
) -> PipelineResult<Arc<Link>> {
    let registry = consumer.registry();
    let produced = producer.with_ports(|ports| {
        ports.output(out_port).map(|p| p.sample().cloned())
    })?;
    let expected = consumer.with_ports(|ports| {
        let port = ports.input(in_port)?;
        if port.is_attached() {
            return Err(PipelineError::TooManyInputs {
                element: consumer.name().to_string(),
                port: in_port.to_string(),
            });
        }
        Ok(port.sample().cloned())
    })?;

    if let (Some(produced), Some(expected)) = (&produced, &expected) {
        if !produced.is_compatible(expected, &registry) {
            return Err(PipelineError::TypeMismatch {
                context: format!(
                    "{}.{} -> {}.{}",
                    producer.name(),
                    out_port,
                    consumer.name(),
                    in_port
                ),
                expected: describe(expected),
                found: describe(produced),
            });
        }
    }

    let link = Arc::new(Link {
        id: LinkId::next(),
        queue: Mutex::new(VecDeque::new()),
        sample: produced,
        registry,
        producer: Endpoint {
            element: producer.downgrade(),
            name: producer.name().to_string(),
            port: out_port.to_string(),
        },
        consumer: Endpoint {
            element: consumer.downgrade(),
            name: consumer.name().to_string(),
            port: in_port.to_string(),
        },
    });

    let consumer_name = consumer.name().to_string();
    consumer.with_ports_mut(|ports| {
        ports
            .input_mut(in_port)?
            .attach(&consumer_name, Arc::clone(&link))
    })?;
    let producer_name = producer.name().to_string();
    let attached = producer.with_ports_mut(|ports| {
        ports
            .output_mut(out_port)?
            .attach(&producer_name, Arc::clone(&link))
    });
    if let Err(err) = attached {
        consumer.with_ports_mut(|ports| {
            if let Ok(port) = ports.input_mut(in_port) {
                port.detach(link.id);
            }
        });
        return Err(err);
    }

    tracing::debug!("Connected {}", link);
    Ok(link)
}

/// Detach `link` from both of its ports. Pending values are dropped.
pub fn disconnect(link: &Link) {
    if let Some(producer) = link.producer() {
        producer.with_ports_mut(|ports| {
            if let Ok(port) = ports.output_mut(link.producer_port()) {
                port.detach(link.id);
            }
        });
    }
    if let Some(consumer) = link.consumer() {
        consumer.with_ports_mut(|ports| {
            if let Ok(port) = ports.input_mut(link.consumer_port()) {
                port.detach(link.id);
            }
        });
    }
    link.clear();
    tracing::debug!("Disconnected {}", link);
}
