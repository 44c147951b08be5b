//! Physical units with dimensional checking.
//!
//! Units are parsed from compact expressions such as `nm3`, `g/cm3`,
//! `amu*nm/ps` or `kg*m^2/s^2` and carry a scale factor relative to SI base
//! units together with their dimension exponents.

use crate::domain::{AnalysisError, ErrorKind};
use std::fmt::{Display, Formatter};
use std::ops::{Div, Mul};

pub const AVOGADRO: f64 = 6.022_140_76e23;
pub const ELEMENTARY_CHARGE: f64 = 1.602_176_634e-19;
pub const ATOMIC_MASS_UNIT_KG: f64 = 1.660_539_066_60e-27;

const DIMENSION_COUNT: usize = 7;
const DIMENSION_LABELS: [&str; DIMENSION_COUNT] = ["m", "kg", "s", "A", "K", "mol", "cd"];

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UnitError {
    #[error("empty unit expression")]
    Empty,
    #[error("unknown unit '{0}'")]
    UnknownUnit(String),
    #[error("invalid exponent in unit token '{0}'")]
    InvalidExponent(String),
    #[error("incompatible dimensions: '{left}' vs '{right}'")]
    Incompatible { left: String, right: String },
}

impl From<UnitError> for AnalysisError {
    fn from(error: UnitError) -> Self {
        AnalysisError::new(ErrorKind::Units, "INPUT.UNITS", error.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Unit {
    factor: f64,
    dimensions: [i32; DIMENSION_COUNT],
}

impl Unit {
    pub const DIMENSIONLESS: Unit = Unit {
        factor: 1.0,
        dimensions: [0; DIMENSION_COUNT],
    };

    const fn base(index: usize, factor: f64) -> Self {
        let mut dimensions = [0; DIMENSION_COUNT];
        dimensions[index] = 1;
        Self { factor, dimensions }
    }

    pub fn parse(expression: &str) -> Result<Self, UnitError> {
        parse_expression(expression)
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }

    pub fn dimensions(&self) -> [i32; DIMENSION_COUNT] {
        self.dimensions
    }

    pub fn is_compatible(&self, other: &Unit) -> bool {
        self.dimensions == other.dimensions
    }

    pub fn powi(&self, exponent: i32) -> Self {
        let mut dimensions = self.dimensions;
        for dimension in &mut dimensions {
            *dimension *= exponent;
        }
        Self {
            factor: self.factor.powi(exponent),
            dimensions,
        }
    }

    /// Factor converting a value expressed in `self` into `target`.
    pub fn conversion_factor(&self, target: &Unit) -> Result<f64, UnitError> {
        if !self.is_compatible(target) {
            return Err(UnitError::Incompatible {
                left: self.to_string(),
                right: target.to_string(),
            });
        }
        Ok(self.factor / target.factor)
    }
}

impl Mul for Unit {
    type Output = Unit;

    fn mul(self, rhs: Unit) -> Unit {
        let mut dimensions = self.dimensions;
        for (dimension, other) in dimensions.iter_mut().zip(rhs.dimensions) {
            *dimension += other;
        }
        Unit {
            factor: self.factor * rhs.factor,
            dimensions,
        }
    }
}

impl Div for Unit {
    type Output = Unit;

    fn div(self, rhs: Unit) -> Unit {
        self * rhs.powi(-1)
    }
}

impl Display for Unit {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        for (label, exponent) in DIMENSION_LABELS.iter().zip(self.dimensions) {
            match exponent {
                0 => {}
                1 => parts.push((*label).to_string()),
                _ => parts.push(format!("{label}^{exponent}")),
            }
        }
        if parts.is_empty() {
            write!(f, "{:e}", self.factor)
        } else {
            write!(f, "{:e} {}", self.factor, parts.join("*"))
        }
    }
}

/// A value tagged with its unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measure {
    value: f64,
    unit: Unit,
}

pub fn measure(value: f64, unit: &str) -> Result<Measure, UnitError> {
    Measure::new(value, unit)
}

impl Measure {
    pub fn new(value: f64, unit: &str) -> Result<Self, UnitError> {
        Ok(Self {
            value,
            unit: Unit::parse(unit)?,
        })
    }

    pub fn with_unit(value: f64, unit: Unit) -> Self {
        Self { value, unit }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn unit(&self) -> Unit {
        self.unit
    }

    /// Numeric value of this measure expressed in `unit`.
    pub fn toval(&self, unit: &str) -> Result<f64, UnitError> {
        let target = Unit::parse(unit)?;
        Ok(self.value * self.unit.conversion_factor(&target)?)
    }

    pub fn checked_add(&self, other: &Measure) -> Result<Measure, UnitError> {
        let factor = other.unit.conversion_factor(&self.unit)?;
        Ok(Measure {
            value: self.value + other.value * factor,
            unit: self.unit,
        })
    }

    pub fn checked_sub(&self, other: &Measure) -> Result<Measure, UnitError> {
        let factor = other.unit.conversion_factor(&self.unit)?;
        Ok(Measure {
            value: self.value - other.value * factor,
            unit: self.unit,
        })
    }
}

impl Mul for Measure {
    type Output = Measure;

    fn mul(self, rhs: Measure) -> Measure {
        Measure {
            value: self.value * rhs.value,
            unit: self.unit * rhs.unit,
        }
    }
}

impl Div for Measure {
    type Output = Measure;

    fn div(self, rhs: Measure) -> Measure {
        Measure {
            value: self.value / rhs.value,
            unit: self.unit / rhs.unit,
        }
    }
}

/// Factor converting `from` into `to`, e.g. `conversion_factor("ang", "nm") == 0.1`.
pub fn conversion_factor(from: &str, to: &str) -> Result<f64, UnitError> {
    Unit::parse(from)?.conversion_factor(&Unit::parse(to)?)
}

const PREFIXES: [(&str, f64); 20] = [
    ("Y", 1e24),
    ("Z", 1e21),
    ("E", 1e18),
    ("P", 1e15),
    ("T", 1e12),
    ("G", 1e9),
    ("M", 1e6),
    ("k", 1e3),
    ("h", 1e2),
    ("da", 1e1),
    ("d", 1e-1),
    ("c", 1e-2),
    ("m", 1e-3),
    ("u", 1e-6),
    ("µ", 1e-6),
    ("n", 1e-9),
    ("p", 1e-12),
    ("f", 1e-15),
    ("a", 1e-18),
    ("z", 1e-21),
];

fn named_unit(name: &str) -> Option<Unit> {
    let length = |factor| Unit::base(0, factor);
    let mass = |factor| Unit::base(1, factor);
    let time = |factor| Unit::base(2, factor);
    let unit = match name {
        "1" | "au" | "rad" | "sr" => Unit::DIMENSIONLESS,
        "deg" => Unit {
            factor: std::f64::consts::PI / 180.0,
            dimensions: [0; DIMENSION_COUNT],
        },
        "m" => length(1.0),
        "ang" | "Ang" | "angstrom" | "Angstrom" | "Å" => length(1e-10),
        "g" => mass(1e-3),
        "amu" | "uma" | "Da" => mass(ATOMIC_MASS_UNIT_KG),
        "s" => time(1.0),
        "min" => time(60.0),
        "h" => time(3600.0),
        "A" => Unit::base(3, 1.0),
        "K" => Unit::base(4, 1.0),
        "mol" => Unit::base(5, 1.0),
        "cd" => Unit::base(6, 1.0),
        "Hz" => time(1.0).powi(-1),
        "N" => mass(1.0) * length(1.0) / time(1.0).powi(2),
        "J" => mass(1.0) * length(1.0).powi(2) / time(1.0).powi(2),
        "W" => mass(1.0) * length(1.0).powi(2) / time(1.0).powi(3),
        "Pa" => mass(1.0) / length(1.0) / time(1.0).powi(2),
        "C" => Unit::base(3, 1.0) * time(1.0),
        "e" => Unit {
            factor: ELEMENTARY_CHARGE,
            ..Unit::base(3, 1.0) * time(1.0)
        },
        "eV" => Unit {
            factor: ELEMENTARY_CHARGE,
            ..mass(1.0) * length(1.0).powi(2) / time(1.0).powi(2)
        },
        "b" | "barn" => length(1e-14).powi(2),
        _ => return None,
    };
    Some(unit)
}

fn simple_unit(symbol: &str) -> Result<Unit, UnitError> {
    if let Some(unit) = named_unit(symbol) {
        return Ok(unit);
    }
    for (prefix, scale) in PREFIXES {
        let Some(rest) = symbol.strip_prefix(prefix) else {
            continue;
        };
        match named_unit(rest) {
            Some(unit) if unit.dimensions != [0; DIMENSION_COUNT] => {
                return Ok(Unit {
                    factor: unit.factor * scale,
                    dimensions: unit.dimensions,
                });
            }
            _ => {}
        }
    }
    Err(UnitError::UnknownUnit(symbol.to_string()))
}

fn parse_token(token: &str) -> Result<Unit, UnitError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(UnitError::Empty);
    }
    if token.chars().all(|c| c.is_ascii_digit()) {
        return if token == "1" {
            Ok(Unit::DIMENSIONLESS)
        } else {
            Err(UnitError::UnknownUnit(token.to_string()))
        };
    }

    let (symbol, exponent) = if let Some((symbol, exponent)) = token.split_once('^') {
        let exponent = exponent
            .parse::<i32>()
            .map_err(|_| UnitError::InvalidExponent(token.to_string()))?;
        (symbol, exponent)
    } else {
        let split = token
            .char_indices()
            .rev()
            .take_while(|(_, c)| c.is_ascii_digit() || *c == '-')
            .last()
            .map(|(index, _)| index)
            .unwrap_or(token.len());
        if split == token.len() {
            (token, 1)
        } else {
            let exponent = token[split..]
                .parse::<i32>()
                .map_err(|_| UnitError::InvalidExponent(token.to_string()))?;
            (&token[..split], exponent)
        }
    };

    Ok(simple_unit(symbol)?.powi(exponent))
}

fn parse_expression(expression: &str) -> Result<Unit, UnitError> {
    let expression = expression.trim();
    if expression.is_empty() {
        return Err(UnitError::Empty);
    }

    let mut unit = Unit::DIMENSIONLESS;
    let mut divide = false;
    let mut token = String::new();
    for character in expression.chars().chain(std::iter::once('*')) {
        match character {
            '*' | '/' | ' ' => {
                if !token.is_empty() {
                    let parsed = parse_token(&token)?;
                    unit = if divide { unit / parsed } else { unit * parsed };
                    token.clear();
                }
                match character {
                    '/' => divide = true,
                    '*' => divide = false,
                    _ => {}
                }
            }
            other => token.push(other),
        }
    }
    Ok(unit)
}
