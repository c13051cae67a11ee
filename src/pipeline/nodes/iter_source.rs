//! IterSource: emits a prepared sequence of values on `main`.

use crate::pipeline::element::{Element, Produce, SourceContext, MAIN_PORT};
use crate::value::Value;
use std::time::Duration;

/// Source that emits each value once, in order, then returns.
///
/// Stops early when the element is asked to stop. An optional interval
/// paces emission, which is handy for exercising slow producers.
#[derive(Debug, Clone, Default)]
pub struct IterSource {
    values: Vec<Value>,
    interval: Option<Duration>,
}

impl IterSource {
    pub fn new<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            values: values.into_iter().map(Into::into).collect(),
            interval: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_element(self, name: impl Into<String>) -> Element {
        Element::source(name, self)
    }
}

impl Produce for IterSource {
    fn produce(&mut self, ctx: &mut SourceContext<'_>) -> anyhow::Result<()> {
        for value in &self.values {
            if ctx.should_stop() {
                tracing::debug!(element = %ctx.name(), "Stopped before end of sequence");
                break;
            }
            ctx.emit(MAIN_PORT, value.clone())?;
            if let Some(interval) = self.interval {
                std::thread::sleep(interval);
            }
        }
        Ok(())
    }
}
