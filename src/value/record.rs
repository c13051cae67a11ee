//! Ordered named collections of values.

use crate::value::error::{ValueError, ValueResult};
use crate::value::unit::Unit;
use crate::value::Value;
use indexmap::IndexMap;

/// One entry of a record's display metadata: which field to show and
/// under what label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShowingEntry {
    pub key: String,
    pub label: String,
}

/// An ordered mapping from field names to values.
///
/// Field order is insertion order. `set` only replaces existing fields
/// and coerces the new value into the slot; growing the record is an
/// explicit `insert`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    fields: IndexMap<String, Value>,
    showing: Vec<ShowingEntry>,
    abstract_type: String,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a record from `(name, value)` pairs. Every field is shown
    /// under its own name.
    pub fn from_fields<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut record = Record::new();
        for (key, value) in fields {
            record.insert(key, value);
        }
        record
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
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn get(&self, key: &str) -> ValueResult<&Value> {
        self.fields
            .get(key)
            .ok_or_else(|| ValueError::UnknownKey(key.to_string()))
    }

    pub fn get_mut(&mut self, key: &str) -> ValueResult<&mut Value> {
        self.fields
            .get_mut(key)
            .ok_or_else(|| ValueError::UnknownKey(key.to_string()))
    }

    /// Replace an existing field, coercing `value` into the slot's kind,
    /// concrete type, unit and abstract type.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> ValueResult<()> {
        let slot = self.get_mut(key)?;
        slot.assign(value.into())
    }

    /// Add a field, or overwrite it without coercion if it already exists.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        if !self.fields.contains_key(&key) {
            self.showing.push(ShowingEntry {
                key: key.clone(),
                label: key.clone(),
            });
        }
        self.fields.insert(key, value.into());
    }

    /// Remove a field and its display entries.
    pub fn remove(&mut self, key: &str) -> ValueResult<Value> {
        let value = self
            .fields
            .shift_remove(key)
            .ok_or_else(|| ValueError::UnknownKey(key.to_string()))?;
        self.showing.retain(|entry| entry.key != key);
        Ok(value)
    }

    pub fn showing_info(&self) -> &[ShowingEntry] {
        &self.showing
    }

    /// Show `key` under `label`, at `position` if given, else at the end.
    /// An existing entry for `key` is replaced.
    pub fn set_showing(
        &mut self,
        key: &str,
        label: impl Into<String>,
        position: Option<usize>,
    ) -> ValueResult<()> {
        if !self.fields.contains_key(key) {
            return Err(ValueError::UnknownKey(key.to_string()));
        }
        self.showing.retain(|entry| entry.key != key);
        let entry = ShowingEntry {
            key: key.to_string(),
            label: label.into(),
        };
        let position = position.unwrap_or(self.showing.len()).min(self.showing.len());
        self.showing.insert(position, entry);
        Ok(())
    }

    /// Hide `key` from display without removing the field.
    pub fn hide(&mut self, key: &str) {
        self.showing.retain(|entry| entry.key != key);
    }

    pub(crate) fn replace_showing(&mut self, showing: Vec<ShowingEntry>) {
        self.showing = showing;
    }

    /// Fields in display order with their labels.
    pub fn shown(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.showing.iter().filter_map(move |entry| {
            self.fields
                .get(&entry.key)
                .map(|value| (entry.label.as_str(), value))
        })
    }

    /// Convert every quantity in the record, recursively, whose unit has
    /// the same dimension as one of `targets`.
    pub fn convert_units(&mut self, targets: &[Unit]) -> ValueResult<()> {
        for value in self.fields.values_mut() {
            value.convert_units(targets)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Quantity, Scalar};

    fn sample() -> Record {
        Record::from_fields([
            ("name", Value::from("sample")),
            ("count", Value::from(3i64)),
            (
                "thickness",
                Quantity::new(2.0, Unit::parse("mm").unwrap()).into(),
            ),
        ])
    }

    #[test]
    fn test_preserves_insertion_order() {
        let r = sample();
        let keys: Vec<_> = r.keys().collect();
        assert_eq!(keys, ["name", "count", "thickness"]);
    }

    #[test]
    fn test_set_unknown_key_fails() {
        let mut r = sample();
        let err = r.set("missing", 1i64).unwrap_err();
        assert!(matches!(err, ValueError::UnknownKey(k) if k == "missing"));
    }

    #[test]
    fn test_set_coerces_raw_number_into_quantity_slot() {
        let mut r = sample();
        r.set("thickness", 5.0).unwrap();
        let q = r.get("thickness").unwrap().as_quantity().unwrap();
        assert_eq!(q.magnitude().as_f64(), Some(5.0));
        assert_eq!(q.unit().symbol(), "mm");
    }

    #[test]
    fn test_set_converts_quantity_into_slot_unit() {
        let mut r = sample();
        r.set("thickness", Quantity::new(1.0, Unit::parse("cm").unwrap()))
            .unwrap();
        let q = r.get("thickness").unwrap().as_quantity().unwrap();
        assert!((q.magnitude().as_f64().unwrap() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_set_keeps_slot_abstract_type() {
        let mut r = Record::new();
        r.insert("count", Scalar::new(1i64).with_abstract_type("counter"));
        r.set("count", 7i64).unwrap();
        assert_eq!(r.get("count").unwrap().abstract_type(), "counter");
    }

    #[test]
    fn test_set_does_not_retag_field() {
        let mut r = Record::from_fields([("theta", Value::from(0.0).with_abstract_type("angle"))]);
        r.set("theta", Value::from(1.0).with_abstract_type("energy"))
            .unwrap();
        let theta = r.get("theta").unwrap();
        assert_eq!(theta.abstract_type(), "angle");
        assert_eq!(theta.as_f64(), Some(1.0));
    }

    #[test]
    fn test_showing_order_and_remove() {
        let mut r = sample();
        r.set_showing("count", "N", Some(0)).unwrap();
        let labels: Vec<_> = r.shown().map(|(label, _)| label).collect();
        assert_eq!(labels, ["N", "name", "thickness"]);

        r.remove("count").unwrap();
        assert_eq!(r.showing_info().len(), 2);
        assert!(r.set_showing("count", "N", None).is_err());
    }
}
