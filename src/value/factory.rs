//! Building values from loosely shaped input.
//!
//! [`make_value`] picks the value kind from the requested shape: a unit
//! makes a quantity, named fields make a record, a sequence makes a list,
//! and anything else is a scalar. [`make_value_from_json`] does the same
//! for JSON documents, where an object may carry the reserved keys
//! `value`, `unit`, `abstract` and `composite`.

use crate::value::error::{ValueError, ValueResult};
use crate::value::unit::{Magnitude, Quantity, Unit};
use crate::value::{List, Primitive, Record, Scalar, Value};

/// Requested shape of a value.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueSpec {
    Unset,
    Primitive(Primitive),
    Quantity { magnitude: Magnitude, unit: String },
    Record(Vec<(String, ValueSpec)>),
    List(Vec<ValueSpec>),
    /// An already built value, taken as-is.
    Value(Value),
}

impl ValueSpec {
    pub fn quantity(magnitude: impl Into<Magnitude>, unit: impl Into<String>) -> Self {
        ValueSpec::Quantity {
            magnitude: magnitude.into(),
            unit: unit.into(),
        }
    }

    pub fn record<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, ValueSpec)>,
        K: Into<String>,
    {
        ValueSpec::Record(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

macro_rules! spec_from_primitive {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for ValueSpec {
                fn from(v: $ty) -> Self {
                    ValueSpec::Primitive(v.into())
                }
            }
        )*
    };
}

spec_from_primitive!(i64, i32, f64, bool, &str, String, Vec<f64>, Primitive);

impl From<Value> for ValueSpec {
    fn from(v: Value) -> Self {
        ValueSpec::Value(v)
    }
}

/// Build a value of the kind `spec` asks for, tagged with `abstract_type`.
pub fn make_value(spec: ValueSpec, abstract_type: &str) -> ValueResult<Value> {
    let value = match spec {
        ValueSpec::Unset => Value::Scalar(Scalar::unset()),
        ValueSpec::Primitive(p) => Value::Scalar(Scalar::new(p)),
        ValueSpec::Quantity { magnitude, unit } => {
            Value::Quantity(Quantity::new(magnitude, Unit::parse(&unit)?))
        }
        ValueSpec::Record(fields) => {
            let mut record = Record::new();
            for (key, field) in fields {
                record.insert(key, make_value(field, "")?);
            }
            Value::Record(record)
        }
        ValueSpec::List(items) => Value::List(List::from_items(
            items
                .into_iter()
                .map(|item| make_value(item, ""))
                .collect::<ValueResult<Vec<_>>>()?,
        )),
        ValueSpec::Value(value) => return Ok(value.with_abstract_type(abstract_type)),
    };
    Ok(value.with_abstract_type(abstract_type))
}

/// Build a value from a JSON document.
///
/// Numbers keep their integer/float distinction, arrays of numbers become
/// numeric arrays, other arrays become lists, and plain objects become
/// records. An object with a `unit` key becomes a quantity; `abstract`
/// sets the abstract type; `composite: true` forces a record out of its
/// `value` object.
pub fn make_value_from_json(json: &serde_json::Value) -> ValueResult<Value> {
    use serde_json::Value as Json;

    match json {
        Json::Null => Ok(Value::unset()),
        Json::Bool(b) => Ok(Value::from(*b)),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Ok(Value::from(i)),
            None => Ok(Value::from(n.as_f64().unwrap_or(f64::NAN))),
        },
        Json::String(s) => Ok(Value::from(s.as_str())),
        Json::Array(items) => {
            if !items.is_empty() && items.iter().all(Json::is_number) {
                let values = items.iter().filter_map(Json::as_f64).collect::<Vec<_>>();
                return Ok(Value::from(values));
            }
            let items = items
                .iter()
                .map(make_value_from_json)
                .collect::<ValueResult<Vec<_>>>()?;
            Ok(Value::List(List::from_items(items)))
        }
        Json::Object(map) => {
            let reserved = ["value", "unit", "abstract", "composite"];
            if !map.keys().any(|k| reserved.contains(&k.as_str())) {
                let mut record = Record::new();
                for (key, field) in map {
                    record.insert(key.clone(), make_value_from_json(field)?);
                }
                return Ok(Value::Record(record));
            }

            let abstract_type = match map.get("abstract") {
                Some(Json::String(s)) => s.clone(),
                Some(other) => {
                    return Err(ValueError::TypeMismatch {
                        expected: "string".to_string(),
                        found: other.to_string(),
                    })
                }
                None => String::new(),
            };
            let null = Json::Null;
            let inner = map.get("value").unwrap_or(&null);
            let composite = map.get("composite").and_then(Json::as_bool).unwrap_or(false);

            let value = if composite {
                match inner {
                    Json::Object(fields) => {
                        let mut record = Record::new();
                        for (key, field) in fields {
                            record.insert(key.clone(), make_value_from_json(field)?);
                        }
                        Value::Record(record)
                    }
                    Json::Null => Value::Record(Record::new()),
                    other => {
                        return Err(ValueError::TypeMismatch {
                            expected: "object".to_string(),
                            found: other.to_string(),
                        })
                    }
                }
            } else if let Some(unit) = map.get("unit") {
                let unit = unit.as_str().ok_or_else(|| ValueError::TypeMismatch {
                    expected: "string".to_string(),
                    found: unit.to_string(),
                })?;
                let magnitude = match inner {
                    Json::Number(n) => Magnitude::Single(n.as_f64().unwrap_or(f64::NAN)),
                    Json::Array(items) => Magnitude::Array(
                        items
                            .iter()
                            .map(|item| {
                                item.as_f64().ok_or_else(|| ValueError::TypeMismatch {
                                    expected: "number".to_string(),
                                    found: item.to_string(),
                                })
                            })
                            .collect::<ValueResult<Vec<f64>>>()?,
                    ),
                    other => {
                        return Err(ValueError::TypeMismatch {
                            expected: "number".to_string(),
                            found: other.to_string(),
                        })
                    }
                };
                Value::Quantity(Quantity::new(magnitude, Unit::parse(unit)?))
            } else {
                make_value_from_json(inner)?
            };
            Ok(value.with_abstract_type(abstract_type))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{ConcreteType, ValueKind};
    use serde_json::json;

    #[test]
    fn test_make_value_picks_kind_from_shape() {
        assert_eq!(make_value(ValueSpec::Unset, "").unwrap().concrete_type(), None);
        assert_eq!(
            make_value(ValueSpec::from(2i64), "count").unwrap().abstract_type(),
            "count"
        );
        let q = make_value(ValueSpec::quantity(1.0, "eV"), "energy").unwrap();
        assert_eq!(q.kind(), ValueKind::Quantity);
        assert_eq!(q.abstract_type(), "energy");

        let r = make_value(
            ValueSpec::record([("a", ValueSpec::from(1.0)), ("b", ValueSpec::from("x"))]),
            "",
        )
        .unwrap();
        assert_eq!(r.as_record().unwrap().len(), 2);

        let l = make_value(ValueSpec::List(vec![ValueSpec::from(true)]), "").unwrap();
        assert_eq!(l.as_list().unwrap().len(), 1);
    }

    #[test]
    fn test_make_value_unknown_unit() {
        assert!(matches!(
            make_value(ValueSpec::quantity(1.0, "parsec"), ""),
            Err(ValueError::UnknownUnit(_))
        ));
    }

    #[test]
    fn test_json_reserved_keys() {
        let v = make_value_from_json(&json!({
            "value": [1.0, 2.0],
            "unit": "deg",
            "abstract": "angle"
        }))
        .unwrap();
        let q = v.as_quantity().unwrap();
        assert_eq!(q.unit().symbol(), "deg");
        assert_eq!(q.concrete_type(), ConcreteType::Array);
        assert_eq!(v.abstract_type(), "angle");

        let c = make_value_from_json(&json!({
            "composite": true,
            "abstract": "layer",
            "value": { "name": "Si", "rho": { "value": 2.33, "unit": "g/cm3" } }
        }))
        .unwrap();
        let r = c.as_record().unwrap();
        assert_eq!(c.abstract_type(), "layer");
        assert_eq!(r.get("name").unwrap().as_str(), Some("Si"));
        assert_eq!(r.get("rho").unwrap().kind(), ValueKind::Quantity);
    }

    #[test]
    fn test_json_plain_shapes() {
        assert_eq!(make_value_from_json(&json!(3)).unwrap().as_i64(), Some(3));
        assert_eq!(
            make_value_from_json(&json!([1, 2.5])).unwrap().concrete_type(),
            Some(ConcreteType::Array)
        );
        let mixed = make_value_from_json(&json!([1, "a"])).unwrap();
        assert_eq!(mixed.as_list().unwrap().len(), 2);
        let obj = make_value_from_json(&json!({"x": 1})).unwrap();
        assert_eq!(obj.kind(), ValueKind::Record);
    }
}
