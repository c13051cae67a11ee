//! Primitive payloads carried by scalar values.
//!
//! A [`Primitive`] is the leaf of the value model. Its [`ConcreteType`] is
//! derived from the payload and is what compatibility checks compare.
//! Primitives encode to and decode from the attribute strings used by
//! [`ValueTree`](crate::value::ValueTree).

use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Concrete type tag derived from a value's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConcreteType {
    Int,
    Float,
    Bool,
    Complex,
    Text,
    Array,
    /// A reference to a named type (stored by name).
    Type,
    Record,
    List,
}

impl ConcreteType {
    /// Name used in serialized trees.
    pub fn as_str(self) -> &'static str {
        match self {
            ConcreteType::Int => "int",
            ConcreteType::Float => "float",
            ConcreteType::Bool => "bool",
            ConcreteType::Complex => "complex",
            ConcreteType::Text => "text",
            ConcreteType::Array => "array",
            ConcreteType::Type => "type",
            ConcreteType::Record => "record",
            ConcreteType::List => "list",
        }
    }

    /// Parse a serialized type name.
    pub fn parse(name: &str) -> Option<Self> {
        let ty = match name {
            "int" => ConcreteType::Int,
            "float" => ConcreteType::Float,
            "bool" => ConcreteType::Bool,
            "complex" => ConcreteType::Complex,
            "text" => ConcreteType::Text,
            "array" => ConcreteType::Array,
            "type" => ConcreteType::Type,
            "record" => ConcreteType::Record,
            "list" => ConcreteType::List,
            _ => return None,
        };
        Some(ty)
    }
}

impl fmt::Display for ConcreteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A primitive payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Primitive {
    Int(i64),
    Float(f64),
    Bool(bool),
    Complex(Complex64),
    Text(String),
    Array(Vec<f64>),
    Type(String),
}

impl Primitive {
    pub fn concrete_type(&self) -> ConcreteType {
        match self {
            Primitive::Int(_) => ConcreteType::Int,
            Primitive::Float(_) => ConcreteType::Float,
            Primitive::Bool(_) => ConcreteType::Bool,
            Primitive::Complex(_) => ConcreteType::Complex,
            Primitive::Text(_) => ConcreteType::Text,
            Primitive::Array(_) => ConcreteType::Array,
            Primitive::Type(_) => ConcreteType::Type,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Primitive::Int(v) => Some(*v as f64),
            Primitive::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Primitive::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Primitive::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Primitive::Text(v) | Primitive::Type(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[f64]> {
        match self {
            Primitive::Array(v) => Some(v),
            _ => None,
        }
    }

    /// Convert to `target` when the conversion loses nothing.
    ///
    /// Int widens to Float and Complex; a Float with no fractional part
    /// narrows to Int; numbers promote to a one-element Array.
    pub fn cast(self, target: ConcreteType) -> Result<Primitive, Primitive> {
        if self.concrete_type() == target {
            return Ok(self);
        }
        match (self, target) {
            (Primitive::Int(v), ConcreteType::Float) => Ok(Primitive::Float(v as f64)),
            (Primitive::Int(v), ConcreteType::Complex) => {
                Ok(Primitive::Complex(Complex64::new(v as f64, 0.0)))
            }
            (Primitive::Float(v), ConcreteType::Complex) => {
                Ok(Primitive::Complex(Complex64::new(v, 0.0)))
            }
            (Primitive::Float(v), ConcreteType::Int) if v.fract() == 0.0 && v.is_finite() => {
                Ok(Primitive::Int(v as i64))
            }
            (Primitive::Int(v), ConcreteType::Array) => Ok(Primitive::Array(vec![v as f64])),
            (Primitive::Float(v), ConcreteType::Array) => Ok(Primitive::Array(vec![v])),
            (other, _) => Err(other),
        }
    }

    /// Encode the payload as a tree attribute string.
    pub fn encode(&self) -> String {
        match self {
            Primitive::Int(v) => v.to_string(),
            Primitive::Float(v) => v.to_string(),
            Primitive::Bool(v) => v.to_string(),
            Primitive::Complex(c) => format!("({},{})", c.re, c.im),
            Primitive::Text(v) | Primitive::Type(v) => v.clone(),
            Primitive::Array(values) => encode_array(values),
        }
    }

    /// Decode a payload previously produced by [`Primitive::encode`].
    pub fn decode(ty: ConcreteType, raw: &str) -> Option<Primitive> {
        match ty {
            ConcreteType::Int => raw.parse().ok().map(Primitive::Int),
            ConcreteType::Float => raw.parse().ok().map(Primitive::Float),
            ConcreteType::Bool => match raw {
                "true" | "True" => Some(Primitive::Bool(true)),
                "false" | "False" => Some(Primitive::Bool(false)),
                _ => None,
            },
            ConcreteType::Complex => {
                let inner = raw.strip_prefix('(')?.strip_suffix(')')?;
                let (re, im) = inner.split_once(',')?;
                Some(Primitive::Complex(Complex64::new(
                    re.trim().parse().ok()?,
                    im.trim().parse().ok()?,
                )))
            }
            ConcreteType::Text => Some(Primitive::Text(raw.to_string())),
            ConcreteType::Type => Some(Primitive::Type(raw.to_string())),
            ConcreteType::Array => decode_array(raw).map(Primitive::Array),
            ConcreteType::Record | ConcreteType::List => None,
        }
    }
}

pub(crate) fn encode_array(values: &[f64]) -> String {
    let parts: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    format!("[{}]", parts.join(","))
}

pub(crate) fn decode_array(raw: &str) -> Option<Vec<f64>> {
    let inner = raw.trim().strip_prefix('[')?.strip_suffix(']')?;
    if inner.trim().is_empty() {
        return Some(Vec::new());
    }
    inner.split(',').map(|p| p.trim().parse().ok()).collect()
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Primitive::Text(v) | Primitive::Type(v) => f.write_str(v),
            other => f.write_str(&other.encode()),
        }
    }
}

impl From<i64> for Primitive {
    fn from(v: i64) -> Self {
        Primitive::Int(v)
    }
}

impl From<i32> for Primitive {
    fn from(v: i32) -> Self {
        Primitive::Int(v as i64)
    }
}

impl From<f64> for Primitive {
    fn from(v: f64) -> Self {
        Primitive::Float(v)
    }
}

impl From<bool> for Primitive {
    fn from(v: bool) -> Self {
        Primitive::Bool(v)
    }
}

impl From<Complex64> for Primitive {
    fn from(v: Complex64) -> Self {
        Primitive::Complex(v)
    }
}

impl From<&str> for Primitive {
    fn from(v: &str) -> Self {
        Primitive::Text(v.to_string())
    }
}

impl From<String> for Primitive {
    fn from(v: String) -> Self {
        Primitive::Text(v)
    }
}

impl From<Vec<f64>> for Primitive {
    fn from(v: Vec<f64>) -> Self {
        Primitive::Array(v)
    }
}
