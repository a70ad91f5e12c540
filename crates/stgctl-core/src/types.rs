//! Shared data model
//!
//! Axis identifiers as the controller numbers them and the integer 2D vector
//! used for grid sizes, step sizes and index coordinates.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Neg, Sub};
use std::str::FromStr;

/// Stage axis, mapped to the controller-side motor number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    /// Motor 1
    X,
    /// Motor 2
    Y,
    /// Motor 3
    Z,
}

impl Axis {
    /// All axes in motor order
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Controller motor number for this axis
    pub fn motor(&self) -> u8 {
        match self {
            Self::X => 1,
            Self::Y => 2,
            Self::Z => 3,
        }
    }

    /// Look up an axis by its controller motor number
    pub fn from_motor(motor: u8) -> Option<Self> {
        match motor {
            1 => Some(Self::X),
            2 => Some(Self::Y),
            3 => Some(Self::Z),
            _ => None,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::X => write!(f, "X"),
            Self::Y => write!(f, "Y"),
            Self::Z => write!(f, "Z"),
        }
    }
}

/// Index size in two dimensions
///
/// Always integral: fractional inputs are rounded to the nearest integer when
/// the value is built with [`Size::from_f64`]. Iterates X then Y and
/// serializes as a two element `[x, y]` array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "[i64; 2]", into = "[i64; 2]")]
pub struct Size {
    /// Index count along X
    pub x: i64,
    /// Index count along Y
    pub y: i64,
}

impl Size {
    /// Create a size from integer components
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    /// Create a size from fractional components, rounding each to the nearest integer
    pub fn from_f64(x: f64, y: f64) -> Self {
        Self {
            x: x.round() as i64,
            y: y.round() as i64,
        }
    }

    /// Component for the given axis; Z has no component and yields `None`
    pub fn get(&self, axis: Axis) -> Option<i64> {
        match axis {
            Axis::X => Some(self.x),
            Axis::Y => Some(self.y),
            Axis::Z => None,
        }
    }

    /// Product of both components, clamped at zero for negative sizes
    pub fn area(&self) -> usize {
        (self.x.max(0) as usize) * (self.y.max(0) as usize)
    }
}

impl From<[i64; 2]> for Size {
    fn from(value: [i64; 2]) -> Self {
        Self::new(value[0], value[1])
    }
}

impl From<Size> for [i64; 2] {
    fn from(value: Size) -> Self {
        [value.x, value.y]
    }
}

impl From<(i64, i64)> for Size {
    fn from(value: (i64, i64)) -> Self {
        Self::new(value.0, value.1)
    }
}

impl IntoIterator for Size {
    type Item = i64;
    type IntoIter = std::array::IntoIter<i64, 2>;

    fn into_iter(self) -> Self::IntoIter {
        [self.x, self.y].into_iter()
    }
}

impl Add for Size {
    type Output = Size;

    fn add(self, rhs: Size) -> Size {
        Size::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Size {
    type Output = Size;

    fn sub(self, rhs: Size) -> Size {
        Size::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Neg for Size {
    type Output = Size;

    fn neg(self) -> Size {
        Size::new(-self.x, -self.y)
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl FromStr for Size {
    type Err = String;

    /// Parse `"x,y"`; fractional components are rounded
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches(['(', '[']).trim_end_matches([')', ']']);
        let mut parts = trimmed.split(',').map(str::trim);
        let (Some(x), Some(y), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(format!("Expected two comma separated values, got '{}'", s));
        };
        let x: f64 = x
            .parse()
            .map_err(|_| format!("Invalid X component '{}'", x))?;
        let y: f64 = y
            .parse()
            .map_err(|_| format!("Invalid Y component '{}'", y))?;
        Ok(Size::from_f64(x, y))
    }
}
