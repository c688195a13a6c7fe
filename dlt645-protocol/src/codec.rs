//! Frame encoding and decoding

use crate::checksum;
use crate::control::{ControlCode, Function};
use crate::frame::{
    Frame, Payload, CONTROL_OFFSET, DATA_OFFSET, END, HEADER_LEN, LENGTH_OFFSET, MAX_DATA_LEN,
    MIN_FRAME_LEN, PREAMBLE, SECOND_START_OFFSET, START,
};
use dlt645_core::address::ADDRESS_LENGTH;
use dlt645_core::bcd::{self, SECOND_TIMESTAMP_LENGTH};
use dlt645_core::identifier::IDENTIFIER_LENGTH;
use dlt645_core::{Address, DataIdentifier, Dlt645Error, Dlt645Result, ErrorCode, Registry, Value};
use std::sync::Arc;

/// Result of looking for a frame at the front of a byte stream
#[derive(Debug)]
pub enum ParseOutcome {
    /// The bytes may still become a frame; read more
    NeedMoreData,
    /// The first `discard` bytes cannot be used
    Malformed { error: Dlt645Error, discard: usize },
    /// A frame ended after `consumed` bytes
    Complete { frame: Frame, consumed: usize },
}

/// What a start marker at some position looks like
enum Candidate {
    Rejected,
    Incomplete,
    Complete { end: usize },
}

/// Result of the structural scan over a buffer
enum Scan {
    NoStart,
    AllRejected,
    Pending { start: usize },
    Found { start: usize, end: usize },
}

fn inspect(bytes: &[u8], start: usize) -> Candidate {
    let rest = &bytes[start..];
    if rest.len() > SECOND_START_OFFSET && rest[SECOND_START_OFFSET] != START {
        return Candidate::Rejected;
    }
    if rest.len() < HEADER_LEN {
        return Candidate::Incomplete;
    }

    let total = MIN_FRAME_LEN + rest[LENGTH_OFFSET] as usize;
    if rest.len() < total {
        return Candidate::Incomplete;
    }
    if rest[total - 1] != END {
        return Candidate::Rejected;
    }
    Candidate::Complete { end: start + total }
}

fn checksum_matches(frame: &[u8]) -> bool {
    let cs = frame.len() - 2;
    checksum::verify(&frame[..cs], frame[cs]).is_ok()
}

/// Find the first start marker that begins a structurally complete frame
///
/// A checksum-valid frame found behind a start marker that is still waiting for data
/// wins over that marker: the earlier one was noise announcing a long data field.
fn scan(bytes: &[u8]) -> Scan {
    let mut pending = None;
    let mut seen_start = false;

    for start in (0..bytes.len()).filter(|&i| bytes[i] == START) {
        seen_start = true;
        match inspect(bytes, start) {
            Candidate::Rejected => continue,
            Candidate::Incomplete => {
                pending.get_or_insert(start);
            }
            Candidate::Complete { end } => {
                if pending.is_none() || checksum_matches(&bytes[start..end]) {
                    return Scan::Found { start, end };
                }
            }
        }
    }

    match pending {
        Some(start) => Scan::Pending { start },
        None if seen_start => Scan::AllRejected,
        None => Scan::NoStart,
    }
}

/// Error for a one-shot decode of bytes that hold only the beginning of a frame
fn incomplete(from_start: &[u8]) -> Dlt645Error {
    match from_start.iter().rposition(|&b| b == END) {
        Some(last_end) if last_end + 1 < MIN_FRAME_LEN => Dlt645Error::FrameTooShort(last_end + 1),
        _ => Dlt645Error::IncompleteFrame,
    }
}

/// Converts between [`Frame`] values and wire bytes
///
/// The codec resolves data identifiers through a shared, read-only [`Registry`].
#[derive(Debug, Clone)]
pub struct FrameCodec {
    registry: Arc<Registry>,
    lenient: bool,
    preamble: bool,
}

impl FrameCodec {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            lenient: false,
            preamble: false,
        }
    }

    /// Expose the data field of unknown identifiers as [`Payload::Raw`] instead of failing
    pub fn lenient(mut self) -> Self {
        self.lenient = true;
        self
    }

    /// Prefix encoded frames with the `FE FE FE FE` wake-up preamble
    pub fn with_preamble(mut self, preamble: bool) -> Self {
        self.preamble = preamble;
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn is_lenient(&self) -> bool {
        self.lenient
    }

    /// Build a frame for one data identifier
    ///
    /// Fails with `UnknownIdentifier` if the identifier is not registered, even when no
    /// value is given.
    pub fn serialize(
        &self,
        address: Address,
        control: ControlCode,
        identifier: DataIdentifier,
        value: Option<&Value>,
    ) -> Dlt645Result<Vec<u8>> {
        self.registry.lookup(identifier)?;
        let payload = match value {
            Some(value) => Payload::Value(value.clone()),
            None => Payload::Empty,
        };
        self.encode(&Frame::new(address, control, Some(identifier), payload))
    }

    /// Encode any frame into wire bytes
    pub fn encode(&self, frame: &Frame) -> Dlt645Result<Vec<u8>> {
        let mut data = Vec::new();
        if let Some(identifier) = frame.identifier() {
            data.extend_from_slice(&identifier.to_wire());
        }

        match frame.payload() {
            Payload::Empty => {}
            Payload::Value(value) => {
                let identifier = frame.identifier().ok_or_else(|| {
                    Dlt645Error::InvalidData("a value needs a data identifier".to_string())
                })?;
                let definition = self.registry.lookup(identifier)?;
                data.extend_from_slice(&definition.encode_value(value)?);
            }
            Payload::Address(address) => data.extend_from_slice(&address.to_wire()),
            Payload::Time(time) => data.extend_from_slice(&bcd::encode_seconds(time)?),
            Payload::Exception(code) => data.push(code.value()),
            Payload::Raw(raw) => data.extend_from_slice(raw),
        }

        self.assemble(frame.address(), frame.control(), &data)
    }

    fn assemble(&self, address: Address, control: ControlCode, data: &[u8]) -> Dlt645Result<Vec<u8>> {
        if data.len() > MAX_DATA_LEN {
            return Err(Dlt645Error::InvalidData(format!(
                "data field of {} bytes exceeds {} bytes",
                data.len(),
                MAX_DATA_LEN
            )));
        }

        let mut bytes = Vec::with_capacity(PREAMBLE.len() + MIN_FRAME_LEN + data.len());
        if self.preamble {
            bytes.extend_from_slice(&PREAMBLE);
        }
        let start = bytes.len();

        bytes.push(START);
        bytes.extend_from_slice(&address.to_wire());
        bytes.push(START);
        bytes.push(control.value());
        bytes.push(data.len() as u8);
        bytes.extend(data.iter().map(|b| b.wrapping_add(DATA_OFFSET)));
        let cs = checksum::checksum(&bytes[start..]);
        bytes.push(cs);
        bytes.push(END);
        Ok(bytes)
    }

    /// Decode exactly one frame from a complete byte sequence
    ///
    /// # Errors
    /// - `NoStartMarker` if there is no `68` at all
    /// - `FrameTooShort` / `IncompleteFrame` if the frame is not complete yet
    /// - `MalformedFrame` if no start marker begins a well-formed frame
    /// - `ChecksumMismatch` on integrity failure
    /// - semantic errors from the data field (`UnknownIdentifier`, `MalformedValue`)
    pub fn deserialize(&self, bytes: &[u8]) -> Dlt645Result<Frame> {
        match scan(bytes) {
            Scan::NoStart => Err(Dlt645Error::NoStartMarker),
            Scan::AllRejected => Err(Dlt645Error::MalformedFrame(format!(
                "no well-formed frame in {} bytes",
                bytes.len()
            ))),
            Scan::Pending { start } => Err(incomplete(&bytes[start..])),
            Scan::Found { start, end } => self.decode_checked(&bytes[start..end]),
        }
    }

    /// Look for a frame at the front of a stream buffer
    pub fn parse(&self, bytes: &[u8]) -> ParseOutcome {
        match scan(bytes) {
            Scan::NoStart if bytes.iter().all(|&b| b == PREAMBLE[0]) => ParseOutcome::NeedMoreData,
            Scan::NoStart => ParseOutcome::Malformed {
                error: Dlt645Error::NoStartMarker,
                discard: bytes.len(),
            },
            Scan::AllRejected => ParseOutcome::Malformed {
                error: Dlt645Error::MalformedFrame(format!(
                    "no well-formed frame in {} bytes",
                    bytes.len()
                )),
                discard: bytes.len(),
            },
            Scan::Pending { .. } => ParseOutcome::NeedMoreData,
            Scan::Found { start, end } => {
                if start > 0 {
                    log::debug!(
                        "Skipping {} bytes before frame: {}",
                        start,
                        bcd::to_spaced_hex(&bytes[..start])
                    );
                }
                match self.decode_checked(&bytes[start..end]) {
                    Ok(frame) => ParseOutcome::Complete {
                        frame,
                        consumed: end,
                    },
                    Err(error) => ParseOutcome::Malformed {
                        error,
                        discard: end,
                    },
                }
            }
        }
    }

    /// Whether the bytes contain a structurally complete frame (checksum not verified)
    pub fn is_structurally_complete(bytes: &[u8]) -> bool {
        matches!(scan(bytes), Scan::Found { .. })
    }

    fn decode_checked(&self, raw: &[u8]) -> Dlt645Result<Frame> {
        let cs = raw.len() - 2;
        checksum::verify(&raw[..cs], raw[cs]).map_err(|calculated| Dlt645Error::ChecksumMismatch {
            expected: calculated,
            actual: raw[cs],
        })?;

        let mut wire = [0u8; ADDRESS_LENGTH];
        wire.copy_from_slice(&raw[1..1 + ADDRESS_LENGTH]);
        let address = Address::from_wire(wire);
        let control = ControlCode::new(raw[CONTROL_OFFSET]);
        let data: Vec<u8> = raw[HEADER_LEN..cs]
            .iter()
            .map(|b| b.wrapping_sub(DATA_OFFSET))
            .collect();

        let (identifier, payload) = self.decode_data(control, &data)?;
        Ok(Frame::new(address, control, identifier, payload))
    }

    fn decode_data(
        &self,
        control: ControlCode,
        data: &[u8],
    ) -> Dlt645Result<(Option<DataIdentifier>, Payload)> {
        if control.is_exception() {
            let code = data.first().ok_or_else(|| {
                Dlt645Error::MalformedValue("exception response without status byte".to_string())
            })?;
            return Ok((None, Payload::Exception(ErrorCode::new(*code))));
        }

        match control.function() {
            Function::ReadData => {
                let identifier = DataIdentifier::from_wire(data)?;
                let rest = &data[IDENTIFIER_LENGTH..];
                let payload = if control.is_response() && !control.has_follow_up() {
                    self.decode_value(identifier, rest)?
                } else {
                    raw_or_empty(rest)
                };
                Ok((Some(identifier), payload))
            }
            Function::ReadFollowUp | Function::WriteData if data.len() >= IDENTIFIER_LENGTH => {
                let identifier = DataIdentifier::from_wire(data)?;
                Ok((Some(identifier), raw_or_empty(&data[IDENTIFIER_LENGTH..])))
            }
            Function::ReadAddress | Function::WriteAddress => match data.len() {
                0 => Ok((None, Payload::Empty)),
                ADDRESS_LENGTH => {
                    let mut wire = [0u8; ADDRESS_LENGTH];
                    wire.copy_from_slice(data);
                    Ok((None, Payload::Address(Address::from_wire(wire))))
                }
                n => Err(Dlt645Error::MalformedValue(format!(
                    "address field of {n} bytes"
                ))),
            },
            Function::BroadcastTimeSync => {
                if data.len() != SECOND_TIMESTAMP_LENGTH {
                    return Err(Dlt645Error::MalformedValue(format!(
                        "time synchronisation needs {SECOND_TIMESTAMP_LENGTH} bytes, got {}",
                        data.len()
                    )));
                }
                Ok((None, Payload::Time(bcd::decode_seconds(data)?)))
            }
            _ => Ok((None, raw_or_empty(data))),
        }
    }

    fn decode_value(&self, identifier: DataIdentifier, raw: &[u8]) -> Dlt645Result<Payload> {
        match self.registry.get(identifier) {
            Some(definition) => Ok(Payload::Value(definition.decode_value(raw)?)),
            None if self.lenient => Ok(Payload::Raw(raw.to_vec())),
            None => Err(Dlt645Error::UnknownIdentifier(identifier)),
        }
    }
}

fn raw_or_empty(data: &[u8]) -> Payload {
    if data.is_empty() {
        Payload::Empty
    } else {
        Payload::Raw(data.to_vec())
    }
}
