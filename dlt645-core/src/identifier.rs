//! Data identifiers and their categories

use crate::error::{Dlt645Error, Dlt645Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Length of a data identifier on the wire
pub const IDENTIFIER_LENGTH: usize = 4;

/// Data identifier (DI) naming one physical quantity
///
/// A DI is four bytes `DI3 DI2 DI1 DI0`. DI3 selects the category, DI2 and DI1 the
/// quantity, DI0 the settlement day (0 = current). The identifier is written
/// little-endian, so `DI0` is the first byte on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DataIdentifier(u32);

impl DataIdentifier {
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u32 {
        self.0
    }

    /// Category byte (DI3)
    pub const fn di3(self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Settlement-day byte (DI0)
    pub const fn di0(self) -> u8 {
        self.0 as u8
    }

    /// Replace the settlement-day byte
    pub const fn with_di0(self, di0: u8) -> Self {
        Self((self.0 & 0xFFFF_FF00) | di0 as u32)
    }

    /// Wire representation (little-endian)
    pub fn to_wire(self) -> [u8; IDENTIFIER_LENGTH] {
        self.0.to_le_bytes()
    }

    /// Read an identifier from the first four bytes of a data field
    pub fn from_wire(bytes: &[u8]) -> Dlt645Result<Self> {
        let raw: [u8; IDENTIFIER_LENGTH] = bytes
            .get(..IDENTIFIER_LENGTH)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| {
                Dlt645Error::MalformedValue(format!(
                    "data field of {} bytes cannot hold a data identifier",
                    bytes.len()
                ))
            })?;
        Ok(Self(u32::from_le_bytes(raw)))
    }

    /// Category implied by DI3, if it is one of the registry partitions
    pub fn category(self) -> Option<Category> {
        Category::from_di3(self.di3())
    }
}

impl From<u32> for DataIdentifier {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl fmt::Display for DataIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08X}", self.0)
    }
}

impl FromStr for DataIdentifier {
    type Err = Dlt645Error;

    /// Parse the hexadecimal notation used in configuration files, e.g. `"0201FF00"`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim().trim_start_matches("0x").trim_start_matches("0X");
        u32::from_str_radix(digits, 16)
            .map(Self)
            .map_err(|e| Dlt645Error::InvalidData(format!("Invalid data identifier {s:?}: {e}")))
    }
}

/// Registry partition a data identifier belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    /// Accumulated energy (DI3 = 0x00)
    Energy,
    /// Maximum demand and its time of occurrence (DI3 = 0x01)
    Demand,
    /// Instantaneous variables: voltage, current, power... (DI3 = 0x02)
    Variable,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Energy, Category::Demand, Category::Variable];

    pub fn from_di3(di3: u8) -> Option<Self> {
        match di3 {
            0x00 => Some(Category::Energy),
            0x01 => Some(Category::Demand),
            0x02 => Some(Category::Variable),
            _ => None,
        }
    }

    pub fn di3(self) -> u8 {
        match self {
            Category::Energy => 0x00,
            Category::Demand => 0x01,
            Category::Variable => 0x02,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::Energy => "energy",
            Category::Demand => "demand",
            Category::Variable => "variable",
        };
        f.write_str(name)
    }
}
