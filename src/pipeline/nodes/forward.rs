//! ForwardNode: identity transform.
//!
//! Re-emits every input on the output port of the same name, sharing the
//! value rather than copying it. The loop wrapper uses one per declared
//! port as the point the loop body connects its result to.

use crate::pipeline::element::{Element, Process, ProcessContext};

#[derive(Debug, Default, Clone, Copy)]
pub struct ForwardNode;

impl ForwardNode {
    /// A Transform with `main` in and out running a `ForwardNode`.
    pub fn element(name: impl Into<String>) -> Element {
        Element::transform(name, ForwardNode)
    }
}

impl Process for ForwardNode {
    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> anyhow::Result<()> {
        for (port, value) in ctx.take_all() {
            ctx.emit_shared(&port, value)?;
        }
        Ok(())
    }
}
