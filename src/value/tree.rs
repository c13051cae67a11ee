//! Self-describing tree form of values.
//!
//! Each node carries a tag naming its kind (`pumpflow::value::Scalar` and
//! so on) and string attributes: `name`, `abstract`, `type`, `value`,
//! `unit`, and `showing` for records. Record fields and list items are
//! child nodes in order. The tree is plain data and serializes with serde.

use crate::value::error::{ValueError, ValueResult};
use crate::value::primitive::{decode_array, encode_array, ConcreteType, Primitive};
use crate::value::record::ShowingEntry;
use crate::value::unit::{Magnitude, Quantity, Unit};
use crate::value::{List, Record, Scalar, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub const TAG_SCALAR: &str = "pumpflow::value::Scalar";
pub const TAG_QUANTITY: &str = "pumpflow::value::Quantity";
pub const TAG_RECORD: &str = "pumpflow::value::Record";
pub const TAG_LIST: &str = "pumpflow::value::List";

/// A serialized value node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueTree {
    pub tag: String,
    #[serde(default)]
    pub attributes: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ValueTree>,
}

impl ValueTree {
    fn new(tag: &str, name: &str, abstract_type: &str) -> Self {
        let mut attributes = IndexMap::new();
        attributes.insert("name".to_string(), name.to_string());
        attributes.insert("abstract".to_string(), abstract_type.to_string());
        Self {
            tag: tag.to_string(),
            attributes,
            children: Vec::new(),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.attr("name")
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    fn set(&mut self, key: &str, value: impl Into<String>) {
        self.attributes.insert(key.to_string(), value.into());
    }

    fn required(&self, key: &str) -> ValueResult<&str> {
        self.attr(key).ok_or_else(|| {
            ValueError::MalformedTree(format!("<{}> is missing attribute '{}'", self.tag, key))
        })
    }
}

fn malformed(msg: impl Into<String>) -> ValueError {
    ValueError::MalformedTree(msg.into())
}

impl Value {
    /// Serialize to a tree node named `name`.
    pub fn to_tree(&self, name: &str) -> ValueTree {
        match self {
            Value::Scalar(s) => {
                let mut node = ValueTree::new(TAG_SCALAR, name, s.abstract_type());
                if let Some(p) = s.value() {
                    node.set("type", p.concrete_type().as_str());
                    node.set("value", p.encode());
                }
                node
            }
            Value::Quantity(q) => {
                let mut node = ValueTree::new(TAG_QUANTITY, name, q.abstract_type());
                node.set("type", q.concrete_type().as_str());
                let encoded = match q.magnitude() {
                    Magnitude::Single(v) => v.to_string(),
                    Magnitude::Array(values) => encode_array(values),
                };
                node.set("value", encoded);
                node.set("unit", q.unit().symbol());
                node
            }
            Value::Record(r) => {
                let mut node = ValueTree::new(TAG_RECORD, name, r.abstract_type());
                let showing: Vec<(&str, &str)> = r
                    .showing_info()
                    .iter()
                    .map(|e| (e.key.as_str(), e.label.as_str()))
                    .collect();
                // Infallible for a list of string pairs.
                node.set(
                    "showing",
                    serde_json::to_string(&showing).unwrap_or_else(|_| "[]".to_string()),
                );
                node.children = r.iter().map(|(key, value)| value.to_tree(key)).collect();
                node
            }
            Value::List(l) => {
                let mut node = ValueTree::new(TAG_LIST, name, l.abstract_type());
                node.children = l
                    .iter()
                    .enumerate()
                    .map(|(i, value)| value.to_tree(&i.to_string()))
                    .collect();
                node
            }
        }
    }

    /// Rebuild a value from a tree node produced by [`Value::to_tree`].
    pub fn from_tree(node: &ValueTree) -> ValueResult<Value> {
        let abstract_type = node.attr("abstract").unwrap_or_default();
        match node.tag.as_str() {
            TAG_SCALAR => {
                let scalar = match node.attr("type") {
                    None => Scalar::unset(),
                    Some(ty) => {
                        let ty = ConcreteType::parse(ty)
                            .ok_or_else(|| malformed(format!("unknown type '{}'", ty)))?;
                        let raw = node.required("value")?;
                        let p = Primitive::decode(ty, raw).ok_or_else(|| {
                            malformed(format!("cannot decode '{}' as {}", raw, ty))
                        })?;
                        Scalar::new(p)
                    }
                };
                Ok(Value::Scalar(scalar.with_abstract_type(abstract_type)))
            }
            TAG_QUANTITY => {
                let raw = node.required("value")?;
                let magnitude = match node.required("type")? {
                    "float" => Magnitude::Single(
                        raw.parse()
                            .map_err(|_| malformed(format!("cannot decode '{}' as float", raw)))?,
                    ),
                    "array" => Magnitude::Array(
                        decode_array(raw)
                            .ok_or_else(|| malformed(format!("cannot decode '{}' as array", raw)))?,
                    ),
                    other => return Err(malformed(format!("quantity of type '{}'", other))),
                };
                let unit = Unit::parse(node.required("unit")?)?;
                Ok(Value::Quantity(
                    Quantity::new(magnitude, unit).with_abstract_type(abstract_type),
                ))
            }
            TAG_RECORD => {
                let mut record = Record::new().with_abstract_type(abstract_type);
                for child in &node.children {
                    let key = child.required("name")?;
                    record.insert(key, Value::from_tree(child)?);
                }
                if let Some(raw) = node.attr("showing") {
                    let pairs: Vec<(String, String)> = serde_json::from_str(raw)?;
                    let showing = pairs
                        .into_iter()
                        .map(|(key, label)| ShowingEntry { key, label })
                        .collect();
                    record.replace_showing(showing);
                }
                Ok(Value::Record(record))
            }
            TAG_LIST => {
                let items = node
                    .children
                    .iter()
                    .map(Value::from_tree)
                    .collect::<ValueResult<Vec<_>>>()?;
                Ok(Value::List(
                    List::from_items(items).with_abstract_type(abstract_type),
                ))
            }
            other => Err(malformed(format!("unknown tag '{}'", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(value: &Value) -> Value {
        Value::from_tree(&value.to_tree("v")).unwrap()
    }

    #[test]
    fn test_scalar_attributes() {
        let v = Value::from(42i64).with_abstract_type("count");
        let node = v.to_tree("n");
        assert_eq!(node.tag, TAG_SCALAR);
        assert_eq!(node.name(), Some("n"));
        assert_eq!(node.attr("type"), Some("int"));
        assert_eq!(node.attr("value"), Some("42"));
        assert_eq!(node.attr("abstract"), Some("count"));
        assert_eq!(round_trip(&v), v);
    }

    #[test]
    fn test_unset_scalar_round_trip() {
        let v = Value::unset();
        assert_eq!(v.to_tree("u").attr("type"), None);
        assert_eq!(round_trip(&v), v);
    }

    #[test]
    fn test_quantity_round_trip_in_two_units() {
        let nm: Value = Quantity::new(1.54, Unit::parse("nm").unwrap()).into();
        let deg: Value = Quantity::new(vec![10.0, 20.5], Unit::parse("deg").unwrap())
            .with_abstract_type("two_theta")
            .into();
        assert_eq!(round_trip(&nm), nm);
        assert_eq!(round_trip(&deg), deg);
        assert_eq!(deg.to_tree("x").attr("unit"), Some("deg"));
    }

    #[test]
    fn test_record_keeps_order_and_showing() {
        let mut inner = Record::from_fields([
            ("z", Value::from(1i64)),
            ("a", Value::from("text")),
        ]);
        inner.set_showing("a", "Label A", Some(0)).unwrap();
        inner.hide("z");
        let outer: Value = Record::from_fields([
            ("inner", Value::from(inner)),
            ("flag", Value::from(true)),
        ])
        .with_abstract_type("outer")
        .into();

        let back = round_trip(&outer);
        assert_eq!(back, outer);
        let keys: Vec<_> = back.as_record().unwrap().keys().collect();
        assert_eq!(keys, ["inner", "flag"]);
    }

    #[test]
    fn test_list_of_records() {
        let list: Value = List::from_items((0..3).map(|i| {
            Value::from(Record::from_fields([("i", Value::from(i as i64))]))
        }))
        .into();
        assert_eq!(round_trip(&list), list);
    }

    #[test]
    fn test_malformed_trees() {
        let mut node = Value::from(1.0).to_tree("x");
        node.tag = "something::Else".to_string();
        assert!(matches!(
            Value::from_tree(&node),
            Err(ValueError::MalformedTree(_))
        ));

        let mut node = Value::from(1.0).to_tree("x");
        node.attributes.insert("value".to_string(), "abc".to_string());
        assert!(Value::from_tree(&node).is_err());
    }
}
