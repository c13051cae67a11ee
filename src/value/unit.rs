//! Physical units and quantities.
//!
//! Units come from a fixed table. Each unit belongs to a [`Dimension`] and
//! carries its scale relative to the dimension's base unit; conversion is
//! only defined between units of the same dimension.

use crate::value::error::{ValueError, ValueResult};
use crate::value::primitive::ConcreteType;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;

/// Physical dimension of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimension {
    Dimensionless,
    Length,
    Angle,
    Energy,
    Time,
    Mass,
    MassDensity,
}

// (symbol, dimension, scale to base unit)
const UNIT_TABLE: &[(&str, Dimension, f64)] = &[
    ("dimensionless", Dimension::Dimensionless, 1.0),
    ("m", Dimension::Length, 1.0),
    ("cm", Dimension::Length, 1e-2),
    ("mm", Dimension::Length, 1e-3),
    ("um", Dimension::Length, 1e-6),
    ("nm", Dimension::Length, 1e-9),
    ("angstrom", Dimension::Length, 1e-10),
    ("rad", Dimension::Angle, 1.0),
    ("mrad", Dimension::Angle, 1e-3),
    ("deg", Dimension::Angle, PI / 180.0),
    ("eV", Dimension::Energy, 1.0),
    ("keV", Dimension::Energy, 1e3),
    ("MeV", Dimension::Energy, 1e6),
    ("s", Dimension::Time, 1.0),
    ("ms", Dimension::Time, 1e-3),
    ("us", Dimension::Time, 1e-6),
    ("kg", Dimension::Mass, 1.0),
    ("g", Dimension::Mass, 1e-3),
    ("g/cm3", Dimension::MassDensity, 1e3),
    ("kg/m3", Dimension::MassDensity, 1.0),
];

fn canonical_symbol(symbol: &str) -> &str {
    match symbol {
        "" => "dimensionless",
        "Å" | "A" | "Angstrom" => "angstrom",
        "µm" | "micrometer" => "um",
        "degree" | "degrees" => "deg",
        "radian" | "radians" => "rad",
        other => other,
    }
}

/// A unit from the built-in table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    symbol: String,
    dimension: Dimension,
    scale: f64,
}

impl Unit {
    /// Look a unit up by symbol. A few common aliases are accepted.
    pub fn parse(symbol: &str) -> ValueResult<Unit> {
        let canonical = canonical_symbol(symbol.trim());
        UNIT_TABLE
            .iter()
            .find(|(s, _, _)| *s == canonical)
            .map(|(s, dimension, scale)| Unit {
                symbol: (*s).to_string(),
                dimension: *dimension,
                scale: *scale,
            })
            .ok_or_else(|| ValueError::UnknownUnit(symbol.to_string()))
    }

    pub fn dimensionless() -> Unit {
        Unit {
            symbol: "dimensionless".to_string(),
            dimension: Dimension::Dimensionless,
            scale: 1.0,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn dimension(&self) -> Dimension {
        self.dimension
    }

    /// Multiplicative factor taking a magnitude in `self` to `target`.
    pub fn factor_to(&self, target: &Unit) -> ValueResult<f64> {
        if self.dimension != target.dimension {
            return Err(ValueError::IncompatibleUnits {
                from: self.symbol.clone(),
                to: target.symbol.clone(),
            });
        }
        Ok(self.scale / target.scale)
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.symbol)
    }
}

/// Magnitude of a quantity: a single number or an array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Magnitude {
    Single(f64),
    Array(Vec<f64>),
}

impl Magnitude {
    pub fn concrete_type(&self) -> ConcreteType {
        match self {
            Magnitude::Single(_) => ConcreteType::Float,
            Magnitude::Array(_) => ConcreteType::Array,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Magnitude::Single(v) => Some(*v),
            Magnitude::Array(_) => None,
        }
    }

    pub fn as_array(&self) -> Option<&[f64]> {
        match self {
            Magnitude::Single(_) => None,
            Magnitude::Array(v) => Some(v),
        }
    }

    fn scaled(&self, factor: f64) -> Magnitude {
        match self {
            Magnitude::Single(v) => Magnitude::Single(v * factor),
            Magnitude::Array(values) => Magnitude::Array(values.iter().map(|v| v * factor).collect()),
        }
    }
}

impl From<f64> for Magnitude {
    fn from(v: f64) -> Self {
        Magnitude::Single(v)
    }
}

impl From<Vec<f64>> for Magnitude {
    fn from(v: Vec<f64>) -> Self {
        Magnitude::Array(v)
    }
}

/// A numeric magnitude with a unit and an abstract type.
#[derive(Debug, Clone, PartialEq)]
pub struct Quantity {
    magnitude: Magnitude,
    unit: Unit,
    abstract_type: String,
}

impl Quantity {
    pub fn new(magnitude: impl Into<Magnitude>, unit: Unit) -> Self {
        Self {
            magnitude: magnitude.into(),
            unit,
            abstract_type: String::new(),
        }
    }

    pub fn with_abstract_type(mut self, abstract_type: impl Into<String>) -> Self {
        self.abstract_type = abstract_type.into();
        self
    }

    pub fn magnitude(&self) -> &Magnitude {
        &self.magnitude
    }

    pub fn unit(&self) -> &Unit {
        &self.unit
    }

    pub fn abstract_type(&self) -> &str {
        &self.abstract_type
    }

    pub fn set_abstract_type(&mut self, abstract_type: impl Into<String>) {
        self.abstract_type = abstract_type.into();
    }

    pub fn concrete_type(&self) -> ConcreteType {
        self.magnitude.concrete_type()
    }

    /// The magnitude expressed in `unit`, leaving `self` untouched.
    pub fn value_in(&self, unit: &Unit) -> ValueResult<Magnitude> {
        Ok(self.magnitude.scaled(self.unit.factor_to(unit)?))
    }

    /// Change the unit, rescaling the magnitude so the physical value is kept.
    pub fn set_unit(&mut self, unit: Unit) -> ValueResult<()> {
        let factor = self.unit.factor_to(&unit)?;
        self.magnitude = self.magnitude.scaled(factor);
        self.unit = unit;
        Ok(())
    }

    /// Replace the magnitude. The new magnitude is taken as-is in the
    /// current unit.
    pub fn set_magnitude(&mut self, magnitude: impl Into<Magnitude>) {
        self.magnitude = magnitude.into();
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.magnitude {
            Magnitude::Single(v) => write!(f, "{} {}", v, self.unit),
            Magnitude::Array(values) => write!(f, "{:?} {}", values, self.unit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aliases() {
        assert_eq!(Unit::parse("Å").unwrap().symbol(), "angstrom");
        assert_eq!(Unit::parse("degree").unwrap().symbol(), "deg");
        assert_eq!(Unit::parse("").unwrap(), Unit::dimensionless());
        assert!(matches!(
            Unit::parse("furlong"),
            Err(ValueError::UnknownUnit(_))
        ));
    }

    #[test]
    fn test_set_unit_rescales() {
        let mut q = Quantity::new(1.5, Unit::parse("nm").unwrap());
        q.set_unit(Unit::parse("angstrom").unwrap()).unwrap();
        let v = q.magnitude().as_f64().unwrap();
        assert!((v - 15.0).abs() < 1e-9);
        assert_eq!(q.unit().symbol(), "angstrom");
    }

    #[test]
    fn test_value_in_does_not_mutate() {
        let q = Quantity::new(vec![90.0, 180.0], Unit::parse("deg").unwrap());
        let rad = q.value_in(&Unit::parse("rad").unwrap()).unwrap();
        let rad = rad.as_array().unwrap();
        assert!((rad[0] - PI / 2.0).abs() < 1e-12);
        assert!((rad[1] - PI).abs() < 1e-12);
        assert_eq!(q.unit().symbol(), "deg");
    }

    #[test]
    fn test_incompatible_units() {
        let mut q = Quantity::new(1.0, Unit::parse("eV").unwrap());
        let err = q.set_unit(Unit::parse("mm").unwrap()).unwrap_err();
        assert!(matches!(err, ValueError::IncompatibleUnits { .. }));
        assert_eq!(q.unit().symbol(), "eV");
    }
}
