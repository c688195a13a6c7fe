//! Data type definitions loaded from JSON
//!
//! Definitions are arrays of objects such as
//! `{ "Di": "00010000", "Name": "...", "Unit": "kWh", "DataFormat": "XXXXXX.XX" }`.
//! An optional `"Signed": false` marks a format without sign bit. Energy and demand
//! definitions describe the current value (DI0 = 0); [`expand_settlement_days`]
//! derives the identifiers of the twelve previous settlement days.
//!
//! A default set of common DLT/645-2007 identifiers is embedded in the crate, see
//! [`default_registry`].

use crate::error::{Dlt645Error, Dlt645Result};
use crate::format::DataFormat;
use crate::identifier::{Category, DataIdentifier};
use crate::registry::{DataItemDefinition, Registry, RegistryBuilder};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::io::Read;

/// Number of previous settlement days a meter keeps
pub const SETTLEMENT_DAYS: u8 = 12;

const ENERGY_TYPES: &str = include_str!("../config/energy_types.json");
const DEMAND_TYPES: &str = include_str!("../config/demand_types.json");
const VARIABLE_TYPES: &str = include_str!("../config/variable_types.json");

/// One entry of a data type configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataTypeConfig {
    #[serde(rename = "Di", serialize_with = "serialize_hex", deserialize_with = "deserialize_hex")]
    pub identifier: DataIdentifier,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Unit", default)]
    pub unit: String,
    #[serde(rename = "DataFormat")]
    pub data_format: String,
    #[serde(rename = "Signed", default = "default_signed")]
    pub signed: bool,
}

fn default_signed() -> bool {
    true
}

fn serialize_hex<S: Serializer>(identifier: &DataIdentifier, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&identifier.to_string())
}

fn deserialize_hex<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DataIdentifier, D::Error> {
    let text = String::deserialize(deserializer)?;
    text.parse().map_err(serde::de::Error::custom)
}

impl DataTypeConfig {
    /// Turn the entry into a definition of the given category
    pub fn into_definition(self, category: Category) -> Dlt645Result<DataItemDefinition> {
        let parsed: DataFormat = self.data_format.parse()?;
        let format = if self.signed {
            parsed
        } else {
            DataFormat::unsigned(parsed.digits(), parsed.decimals())
        };

        if self.identifier.category() != Some(category) {
            log::warn!(
                "Data identifier {} ({}) loaded as {category} but its DI3 says otherwise",
                self.identifier,
                self.name
            );
        }

        Ok(DataItemDefinition::new(self.identifier, self.name, format, self.unit, category))
    }
}

/// Read definitions of one category from a JSON array
pub fn load_definitions<R: Read>(reader: R, category: Category) -> Dlt645Result<Vec<DataItemDefinition>> {
    let entries: Vec<DataTypeConfig> = serde_json::from_reader(reader)
        .map_err(|e| Dlt645Error::InvalidData(format!("Invalid {category} definitions: {e}")))?;

    entries
        .into_iter()
        .map(|entry| entry.into_definition(category))
        .collect()
}

/// Derive the previous settlement day identifiers (DI0 = 1..=12) of every definition
///
/// The result contains the given definitions (DI0 = 0) followed by their history.
pub fn expand_settlement_days(items: &[DataItemDefinition]) -> Vec<DataItemDefinition> {
    let mut expanded = Vec::with_capacity(items.len() * (SETTLEMENT_DAYS as usize + 1));
    for item in items {
        for day in 0..=SETTLEMENT_DAYS {
            let name = if day == 0 {
                format!("(current) {}", item.name())
            } else {
                format!("(settlement day -{day}) {}", item.name())
            };
            expanded.push(item.renamed(item.identifier().with_di0(day), name));
        }
    }
    expanded
}

/// Load one category into a registry builder
///
/// Energy and demand definitions are expanded over the settlement days.
pub fn load_category<R: Read>(
    builder: RegistryBuilder,
    category: Category,
    reader: R,
) -> Dlt645Result<RegistryBuilder> {
    let items = load_definitions(reader, category)?;
    let items = match category {
        Category::Energy | Category::Demand => expand_settlement_days(&items),
        Category::Variable => items,
    };
    builder.load(category, items)
}

/// Registry holding the embedded default definitions of all three categories
pub fn default_registry() -> Dlt645Result<Registry> {
    let builder = Registry::builder();
    let builder = load_category(builder, Category::Energy, ENERGY_TYPES.as_bytes())?;
    let builder = load_category(builder, Category::Demand, DEMAND_TYPES.as_bytes())?;
    let builder = load_category(builder, Category::Variable, VARIABLE_TYPES.as_bytes())?;
    Ok(builder.build())
}
