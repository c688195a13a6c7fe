//! Value transcoder
//!
//! Meter readings travel as packed BCD, least significant byte first. A [`DataFormat`]
//! says how many digits a value has, where the decimal point sits and whether the most
//! significant bit carries a sign. Decoding produces an exact [`FixedPoint`] number,
//! encoding is its exact inverse.

use crate::error::{Dlt645Error, Dlt645Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const SIGN_BIT: u8 = 0x80;
const MAX_DIGITS: u8 = 18;

/// Layout of a BCD encoded number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawDataFormat")]
pub struct DataFormat {
    digits: u8,
    decimals: u8,
    signed: bool,
}

impl DataFormat {
    /// Accumulated energy, `XXXXXX.XX` kWh
    pub const ENERGY: DataFormat = DataFormat::signed(8, 2);
    /// Maximum demand, `XX.XXXX` kW
    pub const DEMAND: DataFormat = DataFormat::signed(6, 4);
    /// Phase voltage, `XXX.X` V
    pub const VOLTAGE: DataFormat = DataFormat::unsigned(4, 1);
    /// Phase current, `XXX.XXX` A
    pub const CURRENT: DataFormat = DataFormat::signed(6, 3);
    /// Active/reactive/apparent power, `XX.XXXX`
    pub const POWER: DataFormat = DataFormat::signed(6, 4);
    /// Power factor, `X.XXX`
    pub const POWER_FACTOR: DataFormat = DataFormat::signed(4, 3);
    /// Grid frequency, `XX.XX` Hz
    pub const FREQUENCY: DataFormat = DataFormat::unsigned(4, 2);

    /// A format whose most significant bit is the sign
    pub const fn signed(digits: u8, decimals: u8) -> Self {
        assert!(digits > 0 && digits <= MAX_DIGITS && decimals <= digits);
        Self {
            digits,
            decimals,
            signed: true,
        }
    }

    /// A format holding only non-negative values
    pub const fn unsigned(digits: u8, decimals: u8) -> Self {
        assert!(digits > 0 && digits <= MAX_DIGITS && decimals <= digits);
        Self {
            digits,
            decimals,
            signed: false,
        }
    }

    /// Checked constructor for layouts that come from outside the crate
    ///
    /// # Errors
    /// `InvalidData` unless `0 < digits <= 18` and `decimals <= digits`.
    pub fn new(digits: u8, decimals: u8, signed: bool) -> Dlt645Result<Self> {
        if digits == 0 || digits > MAX_DIGITS || decimals > digits {
            return Err(Dlt645Error::InvalidData(format!(
                "invalid data format: {digits} digits, {decimals} decimals"
            )));
        }
        Ok(Self {
            digits,
            decimals,
            signed,
        })
    }

    pub fn digits(&self) -> u8 {
        self.digits
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    pub fn is_signed(&self) -> bool {
        self.signed
    }

    /// Number of bytes a value occupies on the wire
    pub fn width(&self) -> usize {
        (self.digits as usize).div_ceil(2)
    }

    /// Largest representable magnitude, as an unscaled integer
    ///
    /// With an even digit count in a signed format the top digit shares its byte with
    /// the sign bit and is limited to 7.
    pub fn max_magnitude(&self) -> u64 {
        let all_nines = 10u64.pow(self.digits as u32) - 1;
        if self.signed && self.digits % 2 == 0 {
            8 * 10u64.pow(self.digits as u32 - 1) - 1
        } else {
            all_nines
        }
    }

    /// Decode raw BCD bytes (least significant byte first)
    pub fn decode(&self, raw: &[u8]) -> Dlt645Result<FixedPoint> {
        if raw.len() != self.width() {
            return Err(Dlt645Error::MalformedValue(format!(
                "format {self} needs {} bytes, got {}",
                self.width(),
                raw.len()
            )));
        }

        let msb = raw.len() - 1;
        let negative = self.signed && raw[msb] & SIGN_BIT != 0;

        let mut magnitude: i64 = 0;
        for (i, &byte) in raw.iter().enumerate().rev() {
            let byte = if i == msb && self.signed {
                byte & !SIGN_BIT
            } else {
                byte
            };
            let (high, low) = (byte >> 4, byte & 0x0F);
            if high > 9 || low > 9 {
                return Err(Dlt645Error::MalformedValue(format!(
                    "0x{byte:02X} is not a BCD byte"
                )));
            }
            if i == msb && self.digits % 2 == 1 && high != 0 {
                return Err(Dlt645Error::MalformedValue(format!(
                    "padding nibble of format {self} is not zero"
                )));
            }
            magnitude = magnitude * 100 + (high as i64) * 10 + low as i64;
        }

        let mantissa = if negative { -magnitude } else { magnitude };
        Ok(FixedPoint::new(mantissa, self.decimals))
    }

    /// Encode a number into raw BCD bytes (least significant byte first)
    pub fn encode(&self, value: &FixedPoint) -> Dlt645Result<Vec<u8>> {
        let value = value.rescale(self.decimals)?;
        if value.mantissa < 0 && !self.signed {
            return Err(Dlt645Error::ValueOutOfRange(format!(
                "{value} is negative, format {self} is unsigned"
            )));
        }

        let mut magnitude = value.mantissa.unsigned_abs();
        if magnitude > self.max_magnitude() {
            return Err(Dlt645Error::ValueOutOfRange(format!(
                "{value} does not fit format {self}"
            )));
        }

        let mut raw = vec![0u8; self.width()];
        for byte in raw.iter_mut() {
            let low = (magnitude % 10) as u8;
            magnitude /= 10;
            let high = (magnitude % 10) as u8;
            magnitude /= 10;
            *byte = (high << 4) | low;
        }

        if value.mantissa < 0 {
            if let Some(msb) = raw.last_mut() {
                *msb |= SIGN_BIT;
            }
        }
        Ok(raw)
    }
}

#[derive(Deserialize)]
struct RawDataFormat {
    digits: u8,
    decimals: u8,
    signed: bool,
}

impl TryFrom<RawDataFormat> for DataFormat {
    type Error = Dlt645Error;

    fn try_from(raw: RawDataFormat) -> Result<Self, Self::Error> {
        DataFormat::new(raw.digits, raw.decimals, raw.signed)
    }
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let integer = (self.digits - self.decimals) as usize;
        let decimals = self.decimals as usize;
        write!(f, "{}", "X".repeat(integer))?;
        if decimals > 0 {
            write!(f, ".{}", "X".repeat(decimals))?;
        }
        Ok(())
    }
}

impl FromStr for DataFormat {
    type Err = Dlt645Error;

    /// Parse the configuration notation, e.g. `"XXXXXX.XX"`
    ///
    /// Formats read this way are signed.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Dlt645Error::InvalidData(format!("Invalid data format: {s:?}"));

        let (integer, fraction) = match s.split_once('.') {
            Some((integer, fraction)) => (integer, fraction),
            None => (s, ""),
        };
        let is_placeholder = |part: &str| part.chars().all(|c| c == 'X' || c == 'x');
        if !is_placeholder(integer) || !is_placeholder(fraction) {
            return Err(invalid());
        }

        let digits = integer.len() + fraction.len();
        if digits == 0 || digits > MAX_DIGITS as usize {
            return Err(invalid());
        }
        Ok(DataFormat::signed(digits as u8, fraction.len() as u8))
    }
}

/// Exact decimal number: `mantissa × 10^-scale`
///
/// Equality is structural, so `1.50` (scale 2) and `1.5` (scale 1) are different values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FixedPoint {
    mantissa: i64,
    scale: u8,
}

impl FixedPoint {
    pub const fn new(mantissa: i64, scale: u8) -> Self {
        Self { mantissa, scale }
    }

    /// Round a float to `scale` decimals
    pub fn from_f64(value: f64, scale: u8) -> Dlt645Result<Self> {
        let scaled = (value * 10f64.powi(scale as i32)).round();
        if !scaled.is_finite() || scaled.abs() >= i64::MAX as f64 {
            return Err(Dlt645Error::ValueOutOfRange(format!(
                "{value} cannot be represented with {scale} decimals"
            )));
        }
        Ok(Self::new(scaled as i64, scale))
    }

    pub fn mantissa(&self) -> i64 {
        self.mantissa
    }

    pub fn scale(&self) -> u8 {
        self.scale
    }

    pub fn to_f64(&self) -> f64 {
        self.mantissa as f64 / 10f64.powi(self.scale as i32)
    }

    /// Change the number of decimals, rounding half away from zero when dropping digits
    pub fn rescale(&self, scale: u8) -> Dlt645Result<Self> {
        let overflow = || {
            Dlt645Error::ValueOutOfRange(format!(
                "{}e-{} cannot be rescaled to {scale} decimals",
                self.mantissa, self.scale
            ))
        };

        if scale >= self.scale {
            let factor = 10i64.checked_pow((scale - self.scale) as u32).ok_or_else(overflow)?;
            let mantissa = self.mantissa.checked_mul(factor).ok_or_else(overflow)?;
            return Ok(Self::new(mantissa, scale));
        }

        let divisor = 10i64.checked_pow((self.scale - scale) as u32).ok_or_else(overflow)?;
        let mut quotient = self.mantissa / divisor;
        let remainder = self.mantissa % divisor;
        if remainder.unsigned_abs() * 2 >= divisor.unsigned_abs() {
            quotient += self.mantissa.signum();
        }
        Ok(Self::new(quotient, scale))
    }
}

impl fmt::Display for FixedPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.mantissa < 0 { "-" } else { "" };
        let magnitude = self.mantissa.unsigned_abs();
        if self.scale == 0 {
            return write!(f, "{sign}{magnitude}");
        }
        let Some(divisor) = 10u64.checked_pow(self.scale as u32) else {
            return write!(f, "{}e-{}", self.mantissa, self.scale);
        };
        write!(
            f,
            "{sign}{}.{:0width$}",
            magnitude / divisor,
            magnitude % divisor,
            width = self.scale as usize
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_energy() {
        // 123456.78 kWh, least significant byte first
        let raw = [0x78, 0x56, 0x34, 0x12];
        let value = DataFormat::ENERGY.decode(&raw).unwrap();
        assert_eq!(value, FixedPoint::new(12_345_678, 2));
        assert_eq!(value.to_string(), "123456.78");
        assert_eq!(DataFormat::ENERGY.encode(&value).unwrap(), raw);
    }

    #[test]
    fn test_sign_bit() {
        let raw = [0x00, 0x50, 0x81];
        let value = DataFormat::CURRENT.decode(&raw).unwrap();
        assert_eq!(value.to_string(), "-15.000");
        assert_eq!(DataFormat::CURRENT.encode(&value).unwrap(), raw);
    }

    #[test]
    fn test_unsigned_format_reads_high_bit_as_digit() {
        let raw = [0x05, 0x92];
        let value = DataFormat::VOLTAGE.decode(&raw).unwrap();
        assert_eq!(value.to_string(), "920.5");
    }

    #[test]
    fn test_malformed_values() {
        assert!(matches!(
            DataFormat::ENERGY.decode(&[0x00, 0x00, 0x00]),
            Err(Dlt645Error::MalformedValue(_))
        ));
        assert!(matches!(
            DataFormat::ENERGY.decode(&[0x0A, 0x00, 0x00, 0x00]),
            Err(Dlt645Error::MalformedValue(_))
        ));
        // five digits: the top nibble is padding
        let odd = DataFormat::signed(5, 2);
        assert!(odd.decode(&[0x00, 0x00, 0x10]).is_err());
        assert!(odd.decode(&[0x45, 0x23, 0x01]).is_ok());
    }

    #[test]
    fn test_out_of_range() {
        let too_big = FixedPoint::new(80_000_000, 2);
        assert!(matches!(
            DataFormat::ENERGY.encode(&too_big),
            Err(Dlt645Error::ValueOutOfRange(_))
        ));
        assert!(DataFormat::ENERGY.encode(&FixedPoint::new(79_999_999, 2)).is_ok());
        assert!(matches!(
            DataFormat::VOLTAGE.encode(&FixedPoint::new(-1, 1)),
            Err(Dlt645Error::ValueOutOfRange(_))
        ));
        assert_eq!(DataFormat::VOLTAGE.max_magnitude(), 9999);
        assert_eq!(DataFormat::signed(5, 0).max_magnitude(), 99_999);
    }

    #[test]
    fn test_huge_scale_is_out_of_range() {
        for scale in [21, 25, u8::MAX] {
            let tiny = FixedPoint::new(1, scale);
            assert!(matches!(
                DataFormat::ENERGY.encode(&tiny),
                Err(Dlt645Error::ValueOutOfRange(_))
            ));
        }
        // still representable: rounds to zero
        assert_eq!(DataFormat::ENERGY.encode(&FixedPoint::new(1, 20)).unwrap(), [0; 4]);
        assert_eq!(FixedPoint::new(-7, 25).to_string(), "-7e-25");
        assert_eq!(FixedPoint::new(5, 19).to_string(), "0.0000000000000000005");
    }

    #[test]
    fn test_deserialize_checks_layout() {
        let format: DataFormat =
            serde_json::from_str(r#"{"digits":8,"decimals":2,"signed":true}"#).unwrap();
        assert_eq!(format, DataFormat::ENERGY);
        assert_eq!(
            serde_json::from_str::<DataFormat>(&serde_json::to_string(&DataFormat::VOLTAGE).unwrap())
                .unwrap(),
            DataFormat::VOLTAGE
        );

        for invalid in [
            r#"{"digits":0,"decimals":3,"signed":true}"#,
            r#"{"digits":4,"decimals":5,"signed":false}"#,
            r#"{"digits":20,"decimals":0,"signed":true}"#,
        ] {
            assert!(serde_json::from_str::<DataFormat>(invalid).is_err(), "{invalid}");
        }
        assert!(DataFormat::new(0, 0, true).is_err());
        assert_eq!(DataFormat::new(4, 1, false).unwrap(), DataFormat::VOLTAGE);
    }

    #[test]
    fn test_encode_rounds_extra_decimals() {
        let value = FixedPoint::from_f64(220.46, 2).unwrap();
        assert_eq!(DataFormat::VOLTAGE.encode(&value).unwrap(), [0x05, 0x22]);
        let negative = FixedPoint::new(-1_2345, 4);
        assert_eq!(negative.rescale(3).unwrap(), FixedPoint::new(-1_235, 3));
    }

    #[test]
    fn test_exhaustive_two_byte_round_trip() {
        for format in [DataFormat::POWER_FACTOR, DataFormat::VOLTAGE, DataFormat::signed(3, 1)] {
            for hi in 0..=0xFFu8 {
                for lo in 0..=0xFFu8 {
                    let raw = [lo, hi];
                    if let Ok(value) = format.decode(&raw) {
                        let canonical = !(format.is_signed() && value.mantissa() == 0 && hi & SIGN_BIT != 0);
                        if canonical {
                            assert_eq!(format.encode(&value).unwrap(), raw, "{format} {raw:02X?}");
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_parse_format() {
        let format: DataFormat = "XXXXXX.XX".parse().unwrap();
        assert_eq!(format, DataFormat::ENERGY);
        assert_eq!(format.width(), 4);
        assert_eq!(format.to_string(), "XXXXXX.XX");
        let integer: DataFormat = "XXXX".parse().unwrap();
        assert_eq!(integer.decimals(), 0);
        assert!("YYMMDD".parse::<DataFormat>().is_err());
        assert!("".parse::<DataFormat>().is_err());
    }
}
