//! Ordered sequences of values.

use crate::value::error::{ValueError, ValueResult};
use crate::value::unit::Unit;
use crate::value::Value;

/// An ordered sequence of values. `set` coerces into the existing slot
/// the same way [`Record::set`](crate::value::Record::set) does.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct List {
    items: Vec<Value>,
    abstract_type: String,
}

impl List {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_items(items: impl IntoIterator<Item = Value>) -> Self {
        Self {
            items: items.into_iter().collect(),
            abstract_type: String::new(),
        }
    }

    pub fn with_abstract_type(mut self, abstract_type: impl Into<String>) -> Self {
        self.abstract_type = abstract_type.into();
        self
    }

    pub fn abstract_type(&self) -> &str {
        &self.abstract_type
    }

    pub fn set_abstract_type(&mut self, abstract_type: impl Into<String>) {
        self.abstract_type = abstract_type.into();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.items.iter()
    }

    pub fn get(&self, index: usize) -> ValueResult<&Value> {
        let len = self.items.len();
        self.items
            .get(index)
            .ok_or(ValueError::IndexOutOfRange { index, len })
    }

    pub fn get_mut(&mut self, index: usize) -> ValueResult<&mut Value> {
        let len = self.items.len();
        self.items
            .get_mut(index)
            .ok_or(ValueError::IndexOutOfRange { index, len })
    }

    pub fn set(&mut self, index: usize, value: impl Into<Value>) -> ValueResult<()> {
        self.get_mut(index)?.assign(value.into())
    }

    pub fn push(&mut self, value: impl Into<Value>) {
        self.items.push(value.into());
    }

    /// Insert at `index`; `index == len` appends.
    pub fn insert(&mut self, index: usize, value: impl Into<Value>) -> ValueResult<()> {
        let len = self.items.len();
        if index > len {
            return Err(ValueError::IndexOutOfRange { index, len });
        }
        self.items.insert(index, value.into());
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> ValueResult<Value> {
        let len = self.items.len();
        if index >= len {
            return Err(ValueError::IndexOutOfRange { index, len });
        }
        Ok(self.items.remove(index))
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn convert_units(&mut self, targets: &[Unit]) -> ValueResult<()> {
        for item in &mut self.items {
            item.convert_units(targets)?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a List {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl FromIterator<Value> for List {
    fn from_iter<T: IntoIterator<Item = Value>>(iter: T) -> Self {
        List::from_items(iter)
    }
}
