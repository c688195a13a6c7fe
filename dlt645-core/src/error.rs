use crate::address::Address;
use crate::identifier::{Category, DataIdentifier};
use std::fmt;
use thiserror::Error;

/// Main error type for DLT/645 operations
#[derive(Error, Debug)]
pub enum Dlt645Error {
    #[error("Connection error: {0}")]
    Connection(#[from] std::io::Error),

    #[error("Timeout")]
    Timeout,

    #[error("Short write: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },

    #[error("All {attempts} attempts failed")]
    RetriesExhausted { attempts: usize },

    #[error("No start marker in buffer")]
    NoStartMarker,

    #[error("Incomplete frame")]
    IncompleteFrame,

    #[error("Frame too short: {0} bytes")]
    FrameTooShort(usize),

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Checksum mismatch: calculated 0x{expected:02X}, received 0x{actual:02X}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    #[error("Unknown data identifier: {0}")]
    UnknownIdentifier(DataIdentifier),

    #[error("Malformed value: {0}")]
    MalformedValue(String),

    #[error("Value out of range: {0}")]
    ValueOutOfRange(String),

    #[error("Data identifier {0} is already registered with a different definition")]
    DuplicateIdentifier(DataIdentifier),

    #[error("Category {0} has already been loaded")]
    CategoryAlreadyLoaded(Category),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Exception response: {0}")]
    ExceptionResponse(ErrorCode),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Response from {actual}, expected {expected}")]
    AddressMismatch { expected: Address, actual: Address },
}

/// Result type alias for DLT/645 operations
pub type Dlt645Result<T> = Result<T, Dlt645Error>;

/// Coarse classification of [`Dlt645Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Framing problems: missing markers, truncated or short frames
    Structural,
    /// Checksum failures
    Integrity,
    /// Identifier, value and registry problems
    Semantic,
    /// Stream level failures
    Transport,
    /// The peer answered, but not with what was asked for
    Response,
}

impl Dlt645Error {
    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        use Dlt645Error::*;

        match self {
            NoStartMarker | IncompleteFrame | FrameTooShort(_) | MalformedFrame(_) => {
                ErrorKind::Structural
            }
            ChecksumMismatch { .. } => ErrorKind::Integrity,
            UnknownIdentifier(_)
            | MalformedValue(_)
            | ValueOutOfRange(_)
            | DuplicateIdentifier(_)
            | CategoryAlreadyLoaded(_)
            | InvalidData(_) => ErrorKind::Semantic,
            Connection(_) | Timeout | ShortWrite { .. } | RetriesExhausted { .. } => {
                ErrorKind::Transport
            }
            ExceptionResponse(_) | UnexpectedResponse(_) | AddressMismatch { .. } => {
                ErrorKind::Response
            }
        }
    }

    /// Whether the error only means "keep reading"
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Dlt645Error::IncompleteFrame)
    }
}

/// Status byte carried by an exception response
///
/// Each bit reports one failure reason; several may be set at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode(u8);

impl ErrorCode {
    pub const OTHER: ErrorCode = ErrorCode(0x01);
    pub const NO_REQUESTED_DATA: ErrorCode = ErrorCode(0x02);
    pub const UNAUTHORIZED: ErrorCode = ErrorCode(0x04);
    pub const BAUD_RATE_IMMUTABLE: ErrorCode = ErrorCode(0x08);
    pub const YEAR_ZONES_EXCEEDED: ErrorCode = ErrorCode(0x10);
    pub const DAY_SLOTS_EXCEEDED: ErrorCode = ErrorCode(0x20);
    pub const TARIFFS_EXCEEDED: ErrorCode = ErrorCode(0x40);

    const DESCRIPTIONS: [(ErrorCode, &'static str); 7] = [
        (Self::OTHER, "other error"),
        (Self::NO_REQUESTED_DATA, "no requested data"),
        (Self::UNAUTHORIZED, "authorisation failed"),
        (Self::BAUD_RATE_IMMUTABLE, "baud rate cannot be changed"),
        (Self::YEAR_ZONES_EXCEEDED, "too many year zones"),
        (Self::DAY_SLOTS_EXCEEDED, "too many day slots"),
        (Self::TARIFFS_EXCEEDED, "too many tariffs"),
    ];

    pub const fn new(value: u8) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u8 {
        self.0
    }

    /// Check whether every bit of `other` is set
    pub fn contains(self, other: ErrorCode) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reasons: Vec<&str> = Self::DESCRIPTIONS
            .iter()
            .filter(|(code, _)| self.contains(*code))
            .map(|(_, text)| *text)
            .collect();

        if reasons.is_empty() {
            write!(f, "0x{:02X}", self.0)
        } else {
            write!(f, "0x{:02X} ({})", self.0, reasons.join(", "))
        }
    }
}
