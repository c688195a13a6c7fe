//! Semantic values carried in data fields

use crate::format::FixedPoint;
use crate::identifier::DataIdentifier;
use crate::registry::DataItemDefinition;
use chrono::NaiveDateTime;
use std::fmt;

/// Decoded value of one data item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Energy or instantaneous variable
    Number(FixedPoint),
    /// Maximum demand and the minute it occurred
    Demand {
        value: FixedPoint,
        occurred_at: NaiveDateTime,
    },
}

impl Value {
    /// The numeric part of the value
    pub fn number(&self) -> FixedPoint {
        match self {
            Value::Number(value) => *value,
            Value::Demand { value, .. } => *value,
        }
    }

    pub fn to_f64(&self) -> f64 {
        self.number().to_f64()
    }
}

impl From<FixedPoint> for Value {
    fn from(value: FixedPoint) -> Self {
        Value::Number(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(value) => write!(f, "{value}"),
            Value::Demand { value, occurred_at } => {
                write!(f, "{value} @ {}", occurred_at.format("%Y-%m-%d %H:%M"))
            }
        }
    }
}

/// A reading: a definition from the registry together with its decoded value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataItem {
    definition: DataItemDefinition,
    value: Value,
}

impl DataItem {
    pub fn new(definition: DataItemDefinition, value: Value) -> Self {
        Self { definition, value }
    }

    pub fn identifier(&self) -> DataIdentifier {
        self.definition.identifier()
    }

    pub fn name(&self) -> &str {
        self.definition.name()
    }

    pub fn unit(&self) -> &str {
        self.definition.unit()
    }

    pub fn definition(&self) -> &DataItemDefinition {
        &self.definition
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }
}

impl fmt::Display for DataItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {} {}", self.name(), self.identifier(), self.value, self.unit())
    }
}
