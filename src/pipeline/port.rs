//! Ports: named, typed attachment points on an element.
//!
//! Each element owns a [`PortSet`] of input and output ports. A port
//! carries an optional sample value describing what it accepts or
//! produces (`None` accepts anything) and the links attached to it. An
//! input port takes at most one link; an output port fans out to many.

use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::id::LinkId;
use crate::pipeline::link::Link;
use crate::value::Value;
use indexmap::IndexMap;
use std::sync::Arc;

/// Whether a port is an input or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    Input,
    Output,
}

/// A named port and the links attached to it.
#[derive(Debug)]
pub struct Port {
    name: String,
    direction: PortDirection,
    sample: Option<Value>,
    links: Vec<Arc<Link>>,
}

impl Port {
    pub fn new(name: impl Into<String>, direction: PortDirection, sample: Option<Value>) -> Self {
        Self {
            name: name.into(),
            direction,
            sample,
            links: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self) -> PortDirection {
        self.direction
    }

    pub fn sample(&self) -> Option<&Value> {
        self.sample.as_ref()
    }

    pub fn set_sample(&mut self, sample: Option<Value>) {
        self.sample = sample;
    }

    pub fn links(&self) -> &[Arc<Link>] {
        &self.links
    }

    /// The single link of an input port, if attached.
    pub fn link(&self) -> Option<&Arc<Link>> {
        self.links.first()
    }

    pub fn is_attached(&self) -> bool {
        !self.links.is_empty()
    }

    /// Record `link` on this port. Fails for an input port that already
    /// has one; the existing link is left in place.
    pub fn attach(&mut self, element: &str, link: Arc<Link>) -> PipelineResult<()> {
        if self.direction == PortDirection::Input && self.is_attached() {
            return Err(PipelineError::TooManyInputs {
                element: element.to_string(),
                port: self.name.clone(),
            });
        }
        self.links.push(link);
        Ok(())
    }

    /// Remove the link with `id`. Returns whether it was attached.
    pub fn detach(&mut self, id: LinkId) -> bool {
        let before = self.links.len();
        self.links.retain(|l| l.id() != id);
        self.links.len() != before
    }

    /// An input port is ready when its link has a pending value.
    pub fn is_ready(&self) -> bool {
        self.link().map(|l| l.is_ready()).unwrap_or(false)
    }

    pub fn descriptor(&self) -> PortDescriptor {
        PortDescriptor {
            name: self.name.clone(),
            direction: self.direction,
            sample: self.sample.clone(),
            link_count: self.links.len(),
        }
    }
}

/// Snapshot of a port for introspection.
#[derive(Debug, Clone, PartialEq)]
pub struct PortDescriptor {
    pub name: String,
    pub direction: PortDirection,
    pub sample: Option<Value>,
    pub link_count: usize,
}

/// The input and output ports of one element, in declaration order.
#[derive(Debug)]
pub struct PortSet {
    element: String,
    inputs: IndexMap<String, Port>,
    outputs: IndexMap<String, Port>,
}

impl PortSet {
    pub fn new(element: impl Into<String>) -> Self {
        Self {
            element: element.into(),
            inputs: IndexMap::new(),
            outputs: IndexMap::new(),
        }
    }

    fn unknown(&self, port: &str) -> PipelineError {
        PipelineError::UnknownPort {
            element: self.element.clone(),
            port: port.to_string(),
        }
    }

    fn duplicate(&self, port: &str) -> PipelineError {
        PipelineError::DuplicatePort {
            element: self.element.clone(),
            port: port.to_string(),
        }
    }

    pub fn register_input(&mut self, name: &str, sample: Option<Value>) -> PipelineResult<()> {
        if self.inputs.contains_key(name) {
            return Err(self.duplicate(name));
        }
        self.inputs
            .insert(name.to_string(), Port::new(name, PortDirection::Input, sample));
        Ok(())
    }

    pub fn register_output(&mut self, name: &str, sample: Option<Value>) -> PipelineResult<()> {
        if self.outputs.contains_key(name) {
            return Err(self.duplicate(name));
        }
        self.outputs
            .insert(name.to_string(), Port::new(name, PortDirection::Output, sample));
        Ok(())
    }

    pub fn remove_input(&mut self, name: &str) -> PipelineResult<Port> {
        self.inputs
            .shift_remove(name)
            .ok_or_else(|| self.unknown(name))
    }

    pub fn remove_output(&mut self, name: &str) -> PipelineResult<Port> {
        self.outputs
            .shift_remove(name)
            .ok_or_else(|| self.unknown(name))
    }

    pub fn input(&self, name: &str) -> PipelineResult<&Port> {
        self.inputs.get(name).ok_or_else(|| self.unknown(name))
    }

    pub fn input_mut(&mut self, name: &str) -> PipelineResult<&mut Port> {
        match self.inputs.get_mut(name) {
            Some(port) => Ok(port),
            None => Err(PipelineError::UnknownPort {
                element: self.element.clone(),
                port: name.to_string(),
            }),
        }
    }

    pub fn output(&self, name: &str) -> PipelineResult<&Port> {
        self.outputs.get(name).ok_or_else(|| self.unknown(name))
    }

    pub fn output_mut(&mut self, name: &str) -> PipelineResult<&mut Port> {
        match self.outputs.get_mut(name) {
            Some(port) => Ok(port),
            None => Err(PipelineError::UnknownPort {
                element: self.element.clone(),
                port: name.to_string(),
            }),
        }
    }

    pub fn inputs(&self) -> impl Iterator<Item = &Port> {
        self.inputs.values()
    }

    pub fn outputs(&self) -> impl Iterator<Item = &Port> {
        self.outputs.values()
    }

    /// True when at least one input is declared and every input has a
    /// pending value.
    pub fn all_inputs_ready(&self) -> bool {
        !self.inputs.is_empty() && self.inputs.values().all(Port::is_ready)
    }

    /// Pop one value from every input link, keyed by port name. Returns
    /// `None` without popping anything unless all inputs are ready.
    pub(crate) fn pop_all(&self) -> Option<IndexMap<String, Arc<Value>>> {
        if !self.all_inputs_ready() {
            return None;
        }
        let mut snapshot = IndexMap::with_capacity(self.inputs.len());
        for (name, port) in &self.inputs {
            let value = port.link()?.pop().ok()?;
            snapshot.insert(name.clone(), value);
        }
        Some(snapshot)
    }

    pub fn descriptors(&self) -> Vec<PortDescriptor> {
        self.inputs
            .values()
            .chain(self.outputs.values())
            .map(Port::descriptor)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_remove() {
        let mut ports = PortSet::new("el");
        ports.register_input("main", None).unwrap();
        ports.register_input("aux", Some(Value::from(0.0))).unwrap();
        assert!(matches!(
            ports.register_input("main", None),
            Err(PipelineError::DuplicatePort { .. })
        ));
        ports.register_output("main", None).unwrap();

        let names: Vec<_> = ports.inputs().map(Port::name).collect();
        assert_eq!(names, ["main", "aux"]);
        assert_eq!(ports.descriptors().len(), 3);

        ports.remove_input("main").unwrap();
        assert!(matches!(
            ports.input("main"),
            Err(PipelineError::UnknownPort { .. })
        ));
    }

    #[test]
    fn test_no_inputs_is_never_ready() {
        let ports = PortSet::new("el");
        assert!(!ports.all_inputs_ready());
        assert!(ports.pop_all().is_none());
    }

    #[test]
    fn test_unattached_input_is_not_ready() {
        let mut ports = PortSet::new("el");
        ports.register_input("main", None).unwrap();
        assert!(!ports.input("main").unwrap().is_ready());
        assert!(!ports.all_inputs_ready());
    }
}
