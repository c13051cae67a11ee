//! Typed value model carried between pipeline elements.
//!
//! Every value has a [`ValueKind`], an optional [`ConcreteType`] derived
//! from its payload, and a free-form abstract type name checked against a
//! [`CompatibilityRegistry`]. Values are owned trees: `clone` is a deep
//! copy and nothing aliases across copies.

pub mod codec;
pub mod error;
pub mod factory;
pub mod list;
pub mod primitive;
pub mod record;
pub mod registry;
pub mod tree;
pub mod unit;

pub use codec::DataFile;
pub use error::{ValueError, ValueResult};
pub use factory::{make_value, make_value_from_json, ValueSpec};
pub use list::List;
pub use primitive::{ConcreteType, Primitive};
pub use record::{Record, ShowingEntry};
pub use registry::CompatibilityRegistry;
pub use tree::ValueTree;
pub use unit::{Dimension, Magnitude, Quantity, Unit};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Structural kind of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Scalar,
    Quantity,
    Record,
    List,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Scalar => "scalar",
            ValueKind::Quantity => "quantity",
            ValueKind::Record => "record",
            ValueKind::List => "list",
        };
        f.write_str(name)
    }
}

/// A primitive with an abstract type. `None` is an unset value whose
/// concrete type is still open.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Scalar {
    value: Option<Primitive>,
    abstract_type: String,
}

impl Scalar {
    pub fn new(value: impl Into<Primitive>) -> Self {
        Self {
            value: Some(value.into()),
            abstract_type: String::new(),
        }
    }

    pub fn unset() -> Self {
        Self::default()
    }

    pub fn with_abstract_type(mut self, abstract_type: impl Into<String>) -> Self {
        self.abstract_type = abstract_type.into();
        self
    }

    pub fn value(&self) -> Option<&Primitive> {
        self.value.as_ref()
    }

    pub fn set_value(&mut self, value: Option<Primitive>) {
        self.value = value;
    }

    pub fn abstract_type(&self) -> &str {
        &self.abstract_type
    }

    pub fn concrete_type(&self) -> Option<ConcreteType> {
        self.value.as_ref().map(Primitive::concrete_type)
    }
}

/// A value flowing through the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(Scalar),
    Quantity(Quantity),
    Record(Record),
    List(List),
}

impl Value {
    /// An unset scalar.
    pub fn unset() -> Value {
        Value::Scalar(Scalar::unset())
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Scalar(_) => ValueKind::Scalar,
            Value::Quantity(_) => ValueKind::Quantity,
            Value::Record(_) => ValueKind::Record,
            Value::List(_) => ValueKind::List,
        }
    }

    pub fn concrete_type(&self) -> Option<ConcreteType> {
        match self {
            Value::Scalar(s) => s.concrete_type(),
            Value::Quantity(q) => Some(q.concrete_type()),
            Value::Record(_) => Some(ConcreteType::Record),
            Value::List(_) => Some(ConcreteType::List),
        }
    }

    pub fn abstract_type(&self) -> &str {
        match self {
            Value::Scalar(s) => &s.abstract_type,
            Value::Quantity(q) => q.abstract_type(),
            Value::Record(r) => r.abstract_type(),
            Value::List(l) => l.abstract_type(),
        }
    }

    pub fn set_abstract_type(&mut self, abstract_type: impl Into<String>) {
        match self {
            Value::Scalar(s) => s.abstract_type = abstract_type.into(),
            Value::Quantity(q) => q.set_abstract_type(abstract_type),
            Value::Record(r) => r.set_abstract_type(abstract_type),
            Value::List(l) => l.set_abstract_type(abstract_type),
        }
    }

    pub fn with_abstract_type(mut self, abstract_type: impl Into<String>) -> Self {
        self.set_abstract_type(abstract_type);
        self
    }

    /// Independent copy of the whole tree.
    pub fn deep_copy(&self) -> Value {
        self.clone()
    }

    /// Whether `self` may be delivered where `expected` is declared.
    ///
    /// Kinds must match, concrete types must agree when both are known,
    /// quantities must share a dimension, and the abstract types must be
    /// compatible in `registry`. An expected record also requires each of
    /// its fields to be present and compatible in `self`.
    pub fn is_compatible(&self, expected: &Value, registry: &CompatibilityRegistry) -> bool {
        if self.kind() != expected.kind() {
            return false;
        }
        if let (Some(a), Some(b)) = (self.concrete_type(), expected.concrete_type()) {
            if a != b {
                return false;
            }
        }
        if !registry.is_compatible(self.abstract_type(), expected.abstract_type()) {
            return false;
        }
        match (self, expected) {
            (Value::Quantity(a), Value::Quantity(b)) => {
                a.unit().dimension() == b.unit().dimension()
            }
            (Value::Record(a), Value::Record(b)) => b.iter().all(|(key, want)| {
                a.get(key)
                    .map(|have| have.is_compatible(want, registry))
                    .unwrap_or(false)
            }),
            _ => true,
        }
    }

    /// Replace `self` with `raw`, coerced into this slot's shape.
    ///
    /// The slot keeps its kind, its unit and its abstract type; `raw`'s
    /// abstract type is only taken when the slot has none. A plain number
    /// assigned to a quantity is taken in the slot's unit; a quantity is
    /// converted into it.
    pub fn assign(&mut self, raw: Value) -> ValueResult<()> {
        let coerced = self.coerce(raw)?;
        *self = coerced;
        Ok(())
    }

    fn coerce(&self, raw: Value) -> ValueResult<Value> {
        let keep_abstract = |mut value: Value, slot: &Value| {
            if !slot.abstract_type().is_empty() {
                value.set_abstract_type(slot.abstract_type().to_string());
            }
            value
        };
        let coerced = match (self, raw) {
            (Value::Scalar(slot), Value::Scalar(raw)) => {
                let value = match (slot.concrete_type(), raw.value) {
                    (Some(target), Some(p)) => {
                        let found = p.concrete_type();
                        Some(p.cast(target).map_err(|_| ValueError::TypeMismatch {
                            expected: target.to_string(),
                            found: found.to_string(),
                        })?)
                    }
                    (_, value) => value,
                };
                Value::Scalar(Scalar {
                    value,
                    abstract_type: raw.abstract_type,
                })
            }
            (Value::Quantity(slot), Value::Scalar(raw)) => {
                let magnitude = match raw.value {
                    Some(Primitive::Array(values)) => Magnitude::Array(values),
                    Some(p) => match p.as_f64() {
                        Some(v) => Magnitude::Single(v),
                        None => {
                            return Err(ValueError::TypeMismatch {
                                expected: slot.concrete_type().to_string(),
                                found: p.concrete_type().to_string(),
                            })
                        }
                    },
                    None => {
                        return Err(ValueError::TypeMismatch {
                            expected: slot.concrete_type().to_string(),
                            found: "unset".to_string(),
                        })
                    }
                };
                let q = Quantity::new(magnitude, slot.unit().clone())
                    .with_abstract_type(raw.abstract_type);
                Value::Quantity(q)
            }
            (Value::Quantity(slot), Value::Quantity(mut raw)) => {
                raw.set_unit(slot.unit().clone())?;
                Value::Quantity(raw)
            }
            (Value::Record(_), raw @ Value::Record(_)) => raw,
            (Value::List(_), raw @ Value::List(_)) => raw,
            (slot, raw) => {
                return Err(ValueError::KindMismatch {
                    expected: slot.kind(),
                    found: raw.kind(),
                })
            }
        };
        Ok(keep_abstract(coerced, self))
    }

    /// Convert quantities, recursively, into whichever of `targets` shares
    /// their dimension. Quantities with no matching target are left alone.
    pub fn convert_units(&mut self, targets: &[Unit]) -> ValueResult<()> {
        match self {
            Value::Quantity(q) => {
                let dimension = q.unit().dimension();
                if let Some(target) = targets.iter().find(|u| u.dimension() == dimension) {
                    q.set_unit(target.clone())?;
                }
                Ok(())
            }
            Value::Record(r) => r.convert_units(targets),
            Value::List(l) => l.convert_units(targets),
            Value::Scalar(_) => Ok(()),
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Value::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_quantity(&self) -> Option<&Quantity> {
        match self {
            Value::Quantity(q) => Some(q),
            _ => None,
        }
    }

    pub fn as_quantity_mut(&mut self) -> Option<&mut Quantity> {
        match self {
            Value::Quantity(q) => Some(q),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_record_mut(&mut self) -> Option<&mut Record> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&List> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_list_mut(&mut self) -> Option<&mut List> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    /// Numeric view of a scalar or single-magnitude quantity.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Scalar(s) => s.value().and_then(Primitive::as_f64),
            Value::Quantity(q) => q.magnitude().as_f64(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_scalar()
            .and_then(Scalar::value)
            .and_then(Primitive::as_i64)
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_scalar()
            .and_then(Scalar::value)
            .and_then(Primitive::as_str)
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::unset()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Scalar(s) => match s.value() {
                Some(p) => write!(f, "{}", p),
                None => f.write_str("<unset>"),
            },
            Value::Quantity(q) => write!(f, "{}", q),
            Value::Record(r) => {
                f.write_str("{")?;
                for (i, (label, value)) in r.shown().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", label, value)?;
                }
                f.write_str("}")
            }
            Value::List(l) => {
                f.write_str("[")?;
                for (i, value) in l.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", value)?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<Scalar> for Value {
    fn from(v: Scalar) -> Self {
        Value::Scalar(v)
    }
}

impl From<Quantity> for Value {
    fn from(v: Quantity) -> Self {
        Value::Quantity(v)
    }
}

impl From<Record> for Value {
    fn from(v: Record) -> Self {
        Value::Record(v)
    }
}

impl From<List> for Value {
    fn from(v: List) -> Self {
        Value::List(v)
    }
}

impl From<Primitive> for Value {
    fn from(v: Primitive) -> Self {
        Value::Scalar(Scalar::new(v))
    }
}

macro_rules! value_from_primitive {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::Scalar(Scalar::new(v))
                }
            }
        )*
    };
}

value_from_primitive!(i64, i32, f64, bool, &str, String, Vec<f64>, num_complex::Complex64);

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_unset_scalar_accepts_any_type() {
        let mut v = Value::unset();
        assert_eq!(v.concrete_type(), None);
        v.assign(Value::from("hello")).unwrap();
        assert_eq!(v.as_str(), Some("hello"));
    }

    #[test]
    fn test_assign_keeps_slot_abstract_type() {
        let mut slot = Value::from(0.0).with_abstract_type("angle");
        slot.assign(Value::from(1.5).with_abstract_type("energy"))
            .unwrap();
        assert_eq!(slot.abstract_type(), "angle");
        assert_eq!(slot.as_f64(), Some(1.5));

        let mut open = Value::from(0.0);
        open.assign(Value::from(2.0).with_abstract_type("energy"))
            .unwrap();
        assert_eq!(open.abstract_type(), "energy");
    }

    #[test]
    fn test_assign_kind_mismatch() {
        let mut v = Value::from(Record::new());
        let err = v.assign(Value::from(1i64)).unwrap_err();
        assert!(matches!(
            err,
            ValueError::KindMismatch {
                expected: ValueKind::Record,
                found: ValueKind::Scalar
            }
        ));
    }

    #[test]
    fn test_compatibility_checks_concrete_and_abstract() {
        let reg = CompatibilityRegistry::new().with_rule("angle", ["theta"]);
        let int = Value::from(1i64);
        let float = Value::from(1.0);
        assert!(!int.is_compatible(&float, &reg));
        assert!(int.is_compatible(&Value::unset(), &reg));

        let angle = Value::from(1.0).with_abstract_type("angle");
        let theta = Value::from(0.0).with_abstract_type("theta");
        assert!(angle.is_compatible(&theta, &reg));
        assert!(!theta.is_compatible(&angle, &reg));
    }

    #[test]
    fn test_quantity_compatibility_requires_same_dimension() {
        let reg = CompatibilityRegistry::new();
        let mm: Value = Quantity::new(1.0, Unit::parse("mm").unwrap()).into();
        let nm: Value = Quantity::new(1.0, Unit::parse("nm").unwrap()).into();
        let ev: Value = Quantity::new(1.0, Unit::parse("eV").unwrap()).into();
        assert!(mm.is_compatible(&nm, &reg));
        assert!(!mm.is_compatible(&ev, &reg));
    }

    #[test]
    fn test_record_compatibility_requires_expected_fields() {
        let reg = CompatibilityRegistry::new();
        let full: Value = Record::from_fields([
            ("a", Value::from(1i64)),
            ("b", Value::from(2.0)),
        ])
        .into();
        let expects_a: Value = Record::from_fields([("a", Value::from(0i64))]).into();
        let expects_c: Value = Record::from_fields([("c", Value::from(0i64))]).into();
        assert!(full.is_compatible(&expects_a, &reg));
        assert!(!full.is_compatible(&expects_c, &reg));
        assert!(full.is_compatible(&Value::from(Record::new()), &reg));
    }

    #[test]
    fn test_deep_copy_is_independent() {
        let original: Value = Record::from_fields([(
            "items",
            Value::from(List::from_items([Value::from(1i64)])),
        )])
        .into();
        let mut copy = original.deep_copy();
        copy.as_record_mut()
            .unwrap()
            .get_mut("items")
            .unwrap()
            .as_list_mut()
            .unwrap()
            .push(2i64);
        assert_eq!(
            original
                .as_record()
                .unwrap()
                .get("items")
                .unwrap()
                .as_list()
                .unwrap()
                .len(),
            1
        );
        assert_ne!(original, copy);
    }

    #[test]
    fn test_convert_units_recurses() {
        let mut v: Value = Record::from_fields([
            ("d", Quantity::new(1.0, Unit::parse("mm").unwrap()).into()),
            (
                "nested",
                Value::from(List::from_items([Quantity::new(
                    2.0,
                    Unit::parse("cm").unwrap(),
                )
                .into()])),
            ),
            ("e", Quantity::new(1.0, Unit::parse("keV").unwrap()).into()),
        ])
        .into();
        v.convert_units(&[Unit::parse("um").unwrap()]).unwrap();
        let r = v.as_record().unwrap();
        assert_eq!(r.get("d").unwrap().as_quantity().unwrap().unit().symbol(), "um");
        let nested = r.get("nested").unwrap().as_list().unwrap().get(0).unwrap();
        assert!((nested.as_f64().unwrap() - 20_000.0).abs() < 1e-6);
        assert_eq!(r.get("e").unwrap().as_quantity().unwrap().unit().symbol(), "keV");
    }

    proptest! {
        #[test]
        fn prop_int_always_assigns_into_float_slot(n in -1_000_000i64..1_000_000) {
            let mut slot = Value::from(0.0);
            slot.assign(Value::from(n)).unwrap();
            prop_assert_eq!(slot.as_f64(), Some(n as f64));
            prop_assert_eq!(slot.concrete_type(), Some(ConcreteType::Float));
        }

        #[test]
        fn prop_compatibility_is_reflexive(x in any::<f64>(), tag in "[a-z]{0,6}") {
            let reg = CompatibilityRegistry::new();
            let v = Value::from(x).with_abstract_type(tag);
            prop_assert!(v.is_compatible(&v, &reg));
        }
    }
}
