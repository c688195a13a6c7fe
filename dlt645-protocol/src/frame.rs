//! Frame structure

use crate::control::{ControlCode, Function};
use chrono::NaiveDateTime;
use dlt645_core::error::ErrorCode;
use dlt645_core::{Address, DataIdentifier, Value};
use std::fmt;

/// Start marker, present before the address and again after it
pub const START: u8 = 0x68;
/// End marker
pub const END: u8 = 0x16;
/// Added to every data byte on transmission
pub const DATA_OFFSET: u8 = 0x33;
/// Wake-up preamble sent before a frame
pub const PREAMBLE: [u8; 4] = [0xFE; 4];

/// `68 A0..A5 68 C L`
pub const HEADER_LEN: usize = 10;
/// Header plus checksum and end marker, i.e. a frame without data
pub const MIN_FRAME_LEN: usize = HEADER_LEN + 2;
/// Largest data field the length byte can announce
pub const MAX_DATA_LEN: usize = u8::MAX as usize;
/// Largest frame including preamble
pub const MAX_FRAME_LEN: usize = PREAMBLE.len() + MIN_FRAME_LEN + MAX_DATA_LEN;

/// Offset of the second start marker
pub(crate) const SECOND_START_OFFSET: usize = 7;
pub(crate) const CONTROL_OFFSET: usize = 8;
pub(crate) const LENGTH_OFFSET: usize = 9;

/// Content of the data field after the identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Nothing beyond the identifier, e.g. a read request
    Empty,
    /// A decoded reading
    Value(Value),
    /// Read address response or write address request
    Address(Address),
    /// Broadcast time synchronisation
    Time(NaiveDateTime),
    /// Exception response status
    Exception(ErrorCode),
    /// Bytes the codec does not interpret (offset already removed)
    Raw(Vec<u8>),
}

/// One DLT/645 frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    address: Address,
    control: ControlCode,
    identifier: Option<DataIdentifier>,
    payload: Payload,
}

impl Frame {
    pub fn new(
        address: Address,
        control: ControlCode,
        identifier: Option<DataIdentifier>,
        payload: Payload,
    ) -> Self {
        Self {
            address,
            control,
            identifier,
            payload,
        }
    }

    /// Read data request for one identifier
    pub fn read_request(address: Address, identifier: DataIdentifier) -> Self {
        Self::new(address, ControlCode::READ_DATA, Some(identifier), Payload::Empty)
    }

    /// Read data response carrying a value
    pub fn read_response(address: Address, identifier: DataIdentifier, value: Value) -> Self {
        Self::new(
            address,
            ControlCode::READ_DATA.response(),
            Some(identifier),
            Payload::Value(value),
        )
    }

    /// Read address request, sent to the broadcast address
    pub fn read_address_request() -> Self {
        Self::new(Address::BROADCAST, ControlCode::READ_ADDRESS, None, Payload::Empty)
    }

    pub fn read_address_response(address: Address) -> Self {
        Self::new(
            address,
            ControlCode::READ_ADDRESS.response(),
            None,
            Payload::Address(address),
        )
    }

    /// Write address request, sent to the broadcast address
    pub fn write_address_request(new_address: Address) -> Self {
        Self::new(
            Address::BROADCAST,
            ControlCode::WRITE_ADDRESS,
            None,
            Payload::Address(new_address),
        )
    }

    /// Broadcast time synchronisation, never answered
    pub fn time_sync(time: NaiveDateTime) -> Self {
        Self::new(
            Address::TIME_SYNC,
            ControlCode::BROADCAST_TIME_SYNC,
            None,
            Payload::Time(time),
        )
    }

    /// Exception response from `address` to a request of `function`
    pub fn exception(address: Address, function: Function, code: ErrorCode) -> Self {
        Self::new(
            address,
            ControlCode::request(function).exception(),
            None,
            Payload::Exception(code),
        )
    }

    /// Empty acknowledgement of a request
    pub fn acknowledge(address: Address, request: ControlCode) -> Self {
        Self::new(address, request.response(), None, Payload::Empty)
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn control(&self) -> ControlCode {
        self.control
    }

    pub fn function(&self) -> Function {
        self.control.function()
    }

    pub fn identifier(&self) -> Option<DataIdentifier> {
        self.identifier
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn into_payload(self) -> Payload {
        self.payload
    }

    /// The decoded value, if this frame carries one
    pub fn value(&self) -> Option<&Value> {
        match &self.payload {
            Payload::Value(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] C={} {:?}", self.address, self.control, self.function())?;
        if let Some(identifier) = self.identifier {
            write!(f, " DI={identifier}")?;
        }
        match &self.payload {
            Payload::Empty => Ok(()),
            Payload::Value(value) => write!(f, " value={value}"),
            Payload::Address(address) => write!(f, " address={address}"),
            Payload::Time(time) => write!(f, " time={}", time.format("%Y-%m-%d %H:%M:%S")),
            Payload::Exception(code) => write!(f, " error={code}"),
            Payload::Raw(raw) => write!(f, " raw={}", dlt645_core::bcd::to_spaced_hex(raw)),
        }
    }
}
