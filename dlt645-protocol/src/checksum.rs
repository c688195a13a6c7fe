//! Frame checksum

/// Modulo-256 sum of all bytes
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |sum, &b| sum.wrapping_add(b))
}

/// Check a received checksum
///
/// Returns the calculated value on mismatch.
pub fn verify(bytes: &[u8], received: u8) -> Result<(), u8> {
    let calculated = checksum(bytes);
    if calculated == received {
        Ok(())
    } else {
        Err(calculated)
    }
}
