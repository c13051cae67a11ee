//! Named, typed parameters of an element.
//!
//! Parameters sit beside the port/link data path. Each one is declared
//! with an expected sample (kind, concrete type, unit, abstract type) and
//! every assignment is coerced into that shape after its abstract type
//! has been checked against a [`CompatibilityRegistry`]. The whole set projects
//! into a single [`Record`] for bulk inspection and editing, and that
//! record round-trips through [`ValueTree`](crate::value::ValueTree).

use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::value::{CompatibilityRegistry, Record, Value};
use indexmap::IndexMap;

#[derive(Debug, Clone, PartialEq)]
struct Parameter {
    expected: Value,
    value: Value,
    label: String,
}

/// Ordered collection of declared parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSet {
    params: IndexMap<String, Parameter>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `name` with the expected shape `sample`.
    ///
    /// The initial value is `default` coerced into the sample, or the
    /// sample itself. Redeclaring a name replaces it.
    pub fn declare(
        &mut self,
        name: &str,
        sample: Value,
        default: Option<Value>,
    ) -> PipelineResult<()> {
        let mut value = sample.clone();
        if let Some(default) = default {
            value.assign(default)?;
        }
        self.params.insert(
            name.to_string(),
            Parameter {
                expected: sample,
                value,
                label: name.to_string(),
            },
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> PipelineResult<&Value> {
        self.params
            .get(name)
            .map(|p| &p.value)
            .ok_or_else(|| PipelineError::UnknownParameter(name.to_string()))
    }

    /// Assign a new value, coerced to the declared kind, unit and
    /// abstract type.
    ///
    /// A value carrying its own abstract type must be compatible with the
    /// declared one under `registry`; an untagged value takes the
    /// declared type.
    pub fn set(
        &mut self,
        name: &str,
        value: impl Into<Value>,
        registry: &CompatibilityRegistry,
    ) -> PipelineResult<()> {
        let value = value.into();
        let param = self
            .params
            .get_mut(name)
            .ok_or_else(|| PipelineError::UnknownParameter(name.to_string()))?;
        let declared = param.expected.abstract_type();
        let found = value.abstract_type();
        if !found.is_empty() && !registry.is_compatible(found, declared) {
            return Err(PipelineError::TypeMismatch {
                context: format!("parameter '{}'", name),
                expected: declared.to_string(),
                found: found.to_string(),
            });
        }
        param.value.assign(value)?;
        Ok(())
    }

    /// The sample `name` was declared with.
    pub fn expected(&self, name: &str) -> PipelineResult<&Value> {
        self.params
            .get(name)
            .map(|p| &p.expected)
            .ok_or_else(|| PipelineError::UnknownParameter(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.params.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Display label used by [`to_record`](Self::to_record).
    pub fn set_label(&mut self, name: &str, label: impl Into<String>) -> PipelineResult<()> {
        let param = self
            .params
            .get_mut(name)
            .ok_or_else(|| PipelineError::UnknownParameter(name.to_string()))?;
        param.label = label.into();
        Ok(())
    }

    /// Project every parameter into one record, in declaration order.
    pub fn to_record(&self) -> Record {
        let mut record = Record::new();
        for (name, param) in &self.params {
            record.insert(name.clone(), param.value.clone());
            if param.label != *name {
                // Infallible: the field was just inserted.
                let _ = record.set_showing(name, param.label.clone(), None);
            }
        }
        record
    }

    /// Assign every field of `record`. Every field must name a declared
    /// parameter; nothing is assigned if one does not.
    pub fn apply_record(
        &mut self,
        record: &Record,
        registry: &CompatibilityRegistry,
    ) -> PipelineResult<()> {
        if let Some(unknown) = record.keys().find(|k| !self.params.contains_key(*k)) {
            return Err(PipelineError::UnknownParameter(unknown.to_string()));
        }
        let mut updated = self.clone();
        for (name, value) in record.iter() {
            updated.set(name, value.clone(), registry)?;
        }
        *self = updated;
        Ok(())
    }
}
