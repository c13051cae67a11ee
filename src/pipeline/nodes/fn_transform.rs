//! FnTransform: a `main` → `main` map over owned values.

use crate::pipeline::element::{Element, Process, ProcessContext, MAIN_PORT};
use crate::value::Value;

/// Applies `f` to each value on `main` and emits the result.
///
/// The input is taken by value; it is only copied if another consumer
/// still shares it.
pub struct FnTransform<F> {
    f: F,
}

impl<F> FnTransform<F>
where
    F: FnMut(Value) -> anyhow::Result<Value> + Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }

    pub fn element(name: impl Into<String>, f: F) -> Element {
        Element::transform(name, Self::new(f))
    }
}

impl<F> Process for FnTransform<F>
where
    F: FnMut(Value) -> anyhow::Result<Value> + Send,
{
    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> anyhow::Result<()> {
        let input = ctx.take(MAIN_PORT)?;
        let output = (self.f)(input)?;
        ctx.emit(MAIN_PORT, output)?;
        Ok(())
    }
}
