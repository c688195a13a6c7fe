//! Data identifier registry
//!
//! The registry maps every data identifier the stack understands to its definition:
//! name, unit and wire format. It is filled once at start-up, one category at a time,
//! through a [`RegistryBuilder`] and is immutable afterwards, so it can be shared between
//! any number of connection tasks behind an `Arc` without locking.

use crate::bcd;
use crate::error::{Dlt645Error, Dlt645Result};
use crate::format::DataFormat;
use crate::identifier::{Category, DataIdentifier};
use crate::value::Value;
use std::collections::{HashMap, HashSet};

/// Definition of one data item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataItemDefinition {
    identifier: DataIdentifier,
    name: String,
    format: DataFormat,
    unit: String,
    category: Category,
}

impl DataItemDefinition {
    pub fn new(
        identifier: DataIdentifier,
        name: impl Into<String>,
        format: DataFormat,
        unit: impl Into<String>,
        category: Category,
    ) -> Self {
        Self {
            identifier,
            name: name.into(),
            format,
            unit: unit.into(),
            category,
        }
    }

    pub fn identifier(&self) -> DataIdentifier {
        self.identifier
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn format(&self) -> DataFormat {
        self.format
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn category(&self) -> Category {
        self.category
    }

    /// Copy of this definition with another identifier and name
    pub fn renamed(&self, identifier: DataIdentifier, name: impl Into<String>) -> Self {
        Self {
            identifier,
            name: name.into(),
            ..self.clone()
        }
    }

    /// Number of value bytes following the identifier in a data field
    pub fn value_width(&self) -> usize {
        match self.category {
            Category::Demand => self.format.width() + bcd::MINUTE_TIMESTAMP_LENGTH,
            Category::Energy | Category::Variable => self.format.width(),
        }
    }

    /// Decode the value bytes of a data field (offset already removed)
    pub fn decode_value(&self, raw: &[u8]) -> Dlt645Result<Value> {
        if raw.len() != self.value_width() {
            return Err(Dlt645Error::MalformedValue(format!(
                "{} expects {} value bytes, got {}",
                self.identifier,
                self.value_width(),
                raw.len()
            )));
        }

        match self.category {
            Category::Demand => {
                let (value, time) = raw.split_at(self.format.width());
                Ok(Value::Demand {
                    value: self.format.decode(value)?,
                    occurred_at: bcd::decode_minutes(time)?,
                })
            }
            Category::Energy | Category::Variable => Ok(Value::Number(self.format.decode(raw)?)),
        }
    }

    /// Encode a value into data field bytes (offset not yet applied)
    pub fn encode_value(&self, value: &Value) -> Dlt645Result<Vec<u8>> {
        match (self.category, value) {
            (Category::Demand, Value::Demand { value, occurred_at }) => {
                let mut raw = self.format.encode(value)?;
                raw.extend_from_slice(&bcd::encode_minutes(occurred_at)?);
                Ok(raw)
            }
            (Category::Energy | Category::Variable, Value::Number(value)) => self.format.encode(value),
            (category, value) => Err(Dlt645Error::InvalidData(format!(
                "{value} is not a valid {category} value for {}",
                self.identifier
            ))),
        }
    }
}

/// Immutable mapping from data identifier to definition
#[derive(Debug, Clone, Default)]
pub struct Registry {
    items: HashMap<DataIdentifier, DataItemDefinition>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Look up a definition, failing with `UnknownIdentifier`
    pub fn lookup(&self, identifier: DataIdentifier) -> Dlt645Result<&DataItemDefinition> {
        self.items
            .get(&identifier)
            .ok_or(Dlt645Error::UnknownIdentifier(identifier))
    }

    pub fn get(&self, identifier: DataIdentifier) -> Option<&DataItemDefinition> {
        self.items.get(&identifier)
    }

    pub fn contains(&self, identifier: DataIdentifier) -> bool {
        self.items.contains_key(&identifier)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DataItemDefinition> {
        self.items.values()
    }
}

/// Builder filling a [`Registry`] one category at a time
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    items: HashMap<DataIdentifier, DataItemDefinition>,
    loaded: HashSet<Category>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the definitions of one category
    ///
    /// # Errors
    /// - `CategoryAlreadyLoaded` if this category was loaded before
    /// - `InvalidData` if a definition belongs to another category
    /// - `DuplicateIdentifier` if an identifier is already known with a different
    ///   definition; an identical re-definition is accepted
    pub fn load(
        mut self,
        category: Category,
        items: impl IntoIterator<Item = DataItemDefinition>,
    ) -> Dlt645Result<Self> {
        if !self.loaded.insert(category) {
            return Err(Dlt645Error::CategoryAlreadyLoaded(category));
        }

        let mut count = 0;
        for item in items {
            if item.category() != category {
                return Err(Dlt645Error::InvalidData(format!(
                    "{} is a {} item, cannot load it as {category}",
                    item.identifier(),
                    item.category()
                )));
            }

            match self.items.get(&item.identifier()) {
                Some(existing) if *existing == item => continue,
                Some(_) => return Err(Dlt645Error::DuplicateIdentifier(item.identifier())),
                None => {
                    self.items.insert(item.identifier(), item);
                    count += 1;
                }
            }
        }

        log::info!("Loaded {count} {category} data item definitions");
        Ok(self)
    }

    /// Whether a category has been loaded
    pub fn is_loaded(&self, category: Category) -> bool {
        self.loaded.contains(&category)
    }

    pub fn build(self) -> Registry {
        Registry { items: self.items }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::FixedPoint;
    use chrono::NaiveDate;

    fn energy(di: u32, name: &str) -> DataItemDefinition {
        DataItemDefinition::new(DataIdentifier::new(di), name, DataFormat::ENERGY, "kWh", Category::Energy)
    }

    fn demand(di: u32) -> DataItemDefinition {
        DataItemDefinition::new(DataIdentifier::new(di), "forward active max demand", DataFormat::DEMAND, "kW", Category::Demand)
    }

    #[test]
    fn test_load_and_lookup() {
        let registry = Registry::builder()
            .load(Category::Energy, [energy(0x0001_0000, "forward active energy")])
            .unwrap()
            .load(Category::Demand, [demand(0x0101_0000)])
            .unwrap()
            .build();

        assert_eq!(registry.len(), 2);
        let item = registry.lookup(DataIdentifier::new(0x0001_0000)).unwrap();
        assert_eq!(item.name(), "forward active energy");
        assert_eq!(item.unit(), "kWh");
        assert!(matches!(
            registry.lookup(DataIdentifier::new(0x0201_0100)),
            Err(Dlt645Error::UnknownIdentifier(_))
        ));
    }

    #[test]
    fn test_duplicate_detection() {
        let conflicting = Registry::builder().load(
            Category::Energy,
            [energy(0x0001_0000, "a"), energy(0x0001_0000, "b")],
        );
        assert!(matches!(conflicting, Err(Dlt645Error::DuplicateIdentifier(_))));

        let identical = Registry::builder()
            .load(Category::Energy, [energy(0x0001_0000, "a"), energy(0x0001_0000, "a")])
            .unwrap()
            .build();
        assert_eq!(identical.len(), 1);
    }

    #[test]
    fn test_category_loaded_once() {
        let builder = Registry::builder().load(Category::Energy, []).unwrap();
        assert!(builder.is_loaded(Category::Energy));
        assert!(matches!(
            builder.load(Category::Energy, []),
            Err(Dlt645Error::CategoryAlreadyLoaded(Category::Energy))
        ));
    }

    #[test]
    fn test_wrong_category_rejected() {
        let result = Registry::builder().load(Category::Variable, [energy(0x0001_0000, "a")]);
        assert!(matches!(result, Err(Dlt645Error::InvalidData(_))));
    }

    #[test]
    fn test_demand_value_layout() {
        let def = demand(0x0101_0000);
        assert_eq!(def.value_width(), 8);

        let value = Value::Demand {
            value: FixedPoint::new(12_3456, 4),
            occurred_at: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap().and_hms_opt(8, 30, 0).unwrap(),
        };
        let raw = def.encode_value(&value).unwrap();
        assert_eq!(raw, [0x56, 0x34, 0x12, 0x30, 0x08, 0x01, 0x06, 0x25]);
        assert_eq!(def.decode_value(&raw).unwrap(), value);

        let wrong = Value::Number(FixedPoint::new(1, 4));
        assert!(def.encode_value(&wrong).is_err());
        assert!(def.decode_value(&raw[..7]).is_err());
    }

    #[test]
    fn test_registry_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Registry>();
    }
}
