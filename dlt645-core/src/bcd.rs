//! BCD helpers for timestamps and hex dumps

use crate::error::{Dlt645Error, Dlt645Result};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

/// Width of a `YYMMDDhhmm` timestamp
pub const MINUTE_TIMESTAMP_LENGTH: usize = 5;
/// Width of a `YYMMDDhhmmss` timestamp
pub const SECOND_TIMESTAMP_LENGTH: usize = 6;

/// Decode one packed BCD byte
pub fn from_bcd(byte: u8) -> Dlt645Result<u8> {
    let (high, low) = (byte >> 4, byte & 0x0F);
    if high > 9 || low > 9 {
        return Err(Dlt645Error::MalformedValue(format!(
            "0x{byte:02X} is not a BCD byte"
        )));
    }
    Ok(high * 10 + low)
}

/// Encode a value below 100 as one packed BCD byte
pub fn to_bcd(value: u8) -> Dlt645Result<u8> {
    if value > 99 {
        return Err(Dlt645Error::ValueOutOfRange(format!(
            "{value} does not fit in one BCD byte"
        )));
    }
    Ok(((value / 10) << 4) | (value % 10))
}

/// Decode a `YYMMDDhhmm` timestamp (least significant field first on the wire)
pub fn decode_minutes(raw: &[u8]) -> Dlt645Result<NaiveDateTime> {
    if raw.len() != MINUTE_TIMESTAMP_LENGTH {
        return Err(Dlt645Error::MalformedValue(format!(
            "timestamp needs {MINUTE_TIMESTAMP_LENGTH} bytes, got {}",
            raw.len()
        )));
    }
    build_datetime(raw[4], raw[3], raw[2], raw[1], raw[0], 0x00)
}

/// Encode a `YYMMDDhhmm` timestamp
pub fn encode_minutes(time: &NaiveDateTime) -> Dlt645Result<[u8; MINUTE_TIMESTAMP_LENGTH]> {
    let [yy, mo, dd, hh, mi, _] = split_datetime(time)?;
    Ok([mi, hh, dd, mo, yy])
}

/// Decode a `YYMMDDhhmmss` timestamp (least significant field first on the wire)
pub fn decode_seconds(raw: &[u8]) -> Dlt645Result<NaiveDateTime> {
    if raw.len() != SECOND_TIMESTAMP_LENGTH {
        return Err(Dlt645Error::MalformedValue(format!(
            "timestamp needs {SECOND_TIMESTAMP_LENGTH} bytes, got {}",
            raw.len()
        )));
    }
    build_datetime(raw[5], raw[4], raw[3], raw[2], raw[1], raw[0])
}

/// Encode a `YYMMDDhhmmss` timestamp
pub fn encode_seconds(time: &NaiveDateTime) -> Dlt645Result<[u8; SECOND_TIMESTAMP_LENGTH]> {
    let [yy, mo, dd, hh, mi, ss] = split_datetime(time)?;
    Ok([ss, mi, hh, dd, mo, yy])
}

fn build_datetime(yy: u8, mo: u8, dd: u8, hh: u8, mi: u8, ss: u8) -> Dlt645Result<NaiveDateTime> {
    let year = 2000 + from_bcd(yy)? as i32;
    let (month, day) = (from_bcd(mo)? as u32, from_bcd(dd)? as u32);
    let (hour, minute, second) = (from_bcd(hh)? as u32, from_bcd(mi)? as u32, from_bcd(ss)? as u32);

    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(hour, minute, second))
        .ok_or_else(|| {
            Dlt645Error::MalformedValue(format!(
                "invalid timestamp {yy:02X}-{mo:02X}-{dd:02X} {hh:02X}:{mi:02X}:{ss:02X}"
            ))
        })
}

fn split_datetime(time: &NaiveDateTime) -> Dlt645Result<[u8; 6]> {
    if !(2000..2100).contains(&time.year()) {
        return Err(Dlt645Error::ValueOutOfRange(format!(
            "year {} cannot be encoded in two digits",
            time.year()
        )));
    }
    Ok([
        to_bcd((time.year() - 2000) as u8)?,
        to_bcd(time.month() as u8)?,
        to_bcd(time.day() as u8)?,
        to_bcd(time.hour() as u8)?,
        to_bcd(time.minute() as u8)?,
        to_bcd(time.second() as u8)?,
    ])
}

/// Format bytes as space separated hex, e.g. `68 AA 16`
pub fn to_spaced_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}
