//! Control code of a frame

use std::fmt;

const DIRECTION_BIT: u8 = 0x80;
const EXCEPTION_BIT: u8 = 0x40;
const FOLLOW_UP_BIT: u8 = 0x20;
const FUNCTION_MASK: u8 = 0x1F;

/// Function selected by the low five bits of the control code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    BroadcastTimeSync,
    ReadData,
    ReadFollowUp,
    ReadAddress,
    WriteData,
    WriteAddress,
    Freeze,
    ChangeBaudRate,
    ChangePassword,
    ClearMaxDemand,
    ClearMeter,
    ClearEvents,
    /// Reserved function code
    Other(u8),
}

impl Function {
    pub fn from_code(code: u8) -> Self {
        match code & FUNCTION_MASK {
            0x08 => Function::BroadcastTimeSync,
            0x11 => Function::ReadData,
            0x12 => Function::ReadFollowUp,
            0x13 => Function::ReadAddress,
            0x14 => Function::WriteData,
            0x15 => Function::WriteAddress,
            0x16 => Function::Freeze,
            0x17 => Function::ChangeBaudRate,
            0x18 => Function::ChangePassword,
            0x19 => Function::ClearMaxDemand,
            0x1A => Function::ClearMeter,
            0x1B => Function::ClearEvents,
            other => Function::Other(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Function::BroadcastTimeSync => 0x08,
            Function::ReadData => 0x11,
            Function::ReadFollowUp => 0x12,
            Function::ReadAddress => 0x13,
            Function::WriteData => 0x14,
            Function::WriteAddress => 0x15,
            Function::Freeze => 0x16,
            Function::ChangeBaudRate => 0x17,
            Function::ChangePassword => 0x18,
            Function::ClearMaxDemand => 0x19,
            Function::ClearMeter => 0x1A,
            Function::ClearEvents => 0x1B,
            Function::Other(code) => code & FUNCTION_MASK,
        }
    }
}

/// Control code byte `C`
///
/// - bit 7: direction, set on frames sent by the meter
/// - bit 6: exception response
/// - bit 5: more data follows in another frame
/// - bits 4..0: [`Function`]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ControlCode(u8);

impl ControlCode {
    pub const BROADCAST_TIME_SYNC: ControlCode = ControlCode(0x08);
    pub const READ_DATA: ControlCode = ControlCode(0x11);
    pub const READ_FOLLOW_UP: ControlCode = ControlCode(0x12);
    pub const READ_ADDRESS: ControlCode = ControlCode(0x13);
    pub const WRITE_DATA: ControlCode = ControlCode(0x14);
    pub const WRITE_ADDRESS: ControlCode = ControlCode(0x15);
    pub const FREEZE: ControlCode = ControlCode(0x16);
    pub const CHANGE_BAUD_RATE: ControlCode = ControlCode(0x17);
    pub const CHANGE_PASSWORD: ControlCode = ControlCode(0x18);
    pub const CLEAR_MAX_DEMAND: ControlCode = ControlCode(0x19);
    pub const CLEAR_METER: ControlCode = ControlCode(0x1A);
    pub const CLEAR_EVENTS: ControlCode = ControlCode(0x1B);

    pub const fn new(value: u8) -> Self {
        Self(value)
    }

    /// Request control code for a function
    pub fn request(function: Function) -> Self {
        Self(function.code())
    }

    pub const fn value(self) -> u8 {
        self.0
    }

    pub fn function(self) -> Function {
        Function::from_code(self.0)
    }

    /// Sent by the meter
    pub const fn is_response(self) -> bool {
        self.0 & DIRECTION_BIT != 0
    }

    pub const fn is_exception(self) -> bool {
        self.0 & EXCEPTION_BIT != 0
    }

    pub const fn has_follow_up(self) -> bool {
        self.0 & FOLLOW_UP_BIT != 0
    }

    /// Normal response to this request
    pub const fn response(self) -> Self {
        Self((self.0 & FUNCTION_MASK) | DIRECTION_BIT)
    }

    /// Exception response to this request
    pub const fn exception(self) -> Self {
        Self((self.0 & FUNCTION_MASK) | DIRECTION_BIT | EXCEPTION_BIT)
    }

    /// Same control code with the follow-up flag set
    pub const fn with_follow_up(self) -> Self {
        Self(self.0 | FOLLOW_UP_BIT)
    }
}

impl From<u8> for ControlCode {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

impl fmt::Debug for ControlCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ControlCode(0x{:02X} {:?}", self.0, self.function())?;
        if self.is_response() {
            f.write_str(" response")?;
        }
        if self.is_exception() {
            f.write_str(" exception")?;
        }
        if self.has_follow_up() {
            f.write_str(" follow-up")?;
        }
        f.write_str(")")
    }
}

impl fmt::Display for ControlCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags() {
        let code = ControlCode::new(0xD1);
        assert!(code.is_response());
        assert!(code.is_exception());
        assert!(!code.has_follow_up());
        assert_eq!(code.function(), Function::ReadData);

        let follow_up = ControlCode::new(0xB1);
        assert!(follow_up.has_follow_up());
        assert!(!follow_up.is_exception());
    }

    #[test]
    fn test_response_codes() {
        assert_eq!(ControlCode::READ_DATA.response().value(), 0x91);
        assert_eq!(ControlCode::READ_DATA.exception().value(), 0xD1);
        assert_eq!(ControlCode::READ_ADDRESS.response().value(), 0x93);
        assert_eq!(ControlCode::WRITE_ADDRESS.exception().value(), 0xD5);
        assert_eq!(ControlCode::request(Function::ClearEvents), ControlCode::CLEAR_EVENTS);
    }

    #[test]
    fn test_function_codes() {
        for code in 0x00..=0x1F {
            assert_eq!(Function::from_code(code).code(), code);
        }
        assert_eq!(Function::from_code(0x01), Function::Other(0x01));
    }
}
