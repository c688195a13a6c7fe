use crate::error::{Dlt645Error, Dlt645Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Length of a device address
pub const ADDRESS_LENGTH: usize = 6;

/// Device address of a meter
///
/// Stored in natural (printed) order: the address printed on the nameplate as
/// `000000000001` is `[0x00, 0x00, 0x00, 0x00, 0x00, 0x01]`. On the wire the bytes are
/// transmitted in reverse order; use [`Address::to_wire`] / [`Address::from_wire`] to
/// cross that boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    bytes: [u8; ADDRESS_LENGTH],
}

impl Address {
    /// Broadcast address, used when the meter address is not known (e.g. read address)
    pub const BROADCAST: Address = Address::new([0xAA; ADDRESS_LENGTH]);

    /// Broadcast time synchronisation address
    pub const TIME_SYNC: Address = Address::new([0x99; ADDRESS_LENGTH]);

    /// All-zero address meaning "any" / unaddressed
    pub const ZERO: Address = Address::new([0x00; ADDRESS_LENGTH]);

    pub const fn new(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self { bytes }
    }

    /// Build an address from its reversed wire representation
    pub fn from_wire(wire: [u8; ADDRESS_LENGTH]) -> Self {
        let mut bytes = wire;
        bytes.reverse();
        Self { bytes }
    }

    /// Bytes in transmission order
    pub fn to_wire(&self) -> [u8; ADDRESS_LENGTH] {
        let mut wire = self.bytes;
        wire.reverse();
        wire
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.bytes
    }

    /// Whether this is one of the reserved broadcast patterns
    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST || *self == Self::TIME_SYNC
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.bytes {
            write!(f, "{b:02X}")?;
        }
        Ok(())
    }
}

impl FromStr for Address {
    type Err = Dlt645Error;

    /// Parse the 12 digit nameplate notation, e.g. `"000000000001"`
    fn from_str(s: &str) -> Dlt645Result<Self> {
        let s = s.trim();
        if s.len() != ADDRESS_LENGTH * 2 || !s.is_ascii() {
            return Err(Dlt645Error::InvalidData(format!(
                "Address must have {} hex digits: {s:?}",
                ADDRESS_LENGTH * 2
            )));
        }

        let mut bytes = [0u8; ADDRESS_LENGTH];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .map_err(|e| Dlt645Error::InvalidData(format!("Invalid address {s:?}: {e}")))?;
        }
        Ok(Self { bytes })
    }
}

impl From<[u8; ADDRESS_LENGTH]> for Address {
    fn from(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self::new(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_order_is_reversed() {
        let addr: Address = "000000000001".parse().unwrap();
        assert_eq!(addr.as_bytes(), &[0, 0, 0, 0, 0, 1]);
        assert_eq!(addr.to_wire(), [1, 0, 0, 0, 0, 0]);
        assert_eq!(Address::from_wire(addr.to_wire()), addr);
        assert_eq!(addr.to_string(), "000000000001");
    }

    #[test]
    fn test_reserved_addresses() {
        assert!(Address::BROADCAST.is_broadcast());
        assert!(Address::TIME_SYNC.is_broadcast());
        assert!(!Address::ZERO.is_broadcast());
        assert_eq!(Address::BROADCAST.to_string(), "AAAAAAAAAAAA");
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!("12345".parse::<Address>().is_err());
        assert!("00000000000G".parse::<Address>().is_err());
    }
}
