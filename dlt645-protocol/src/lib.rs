//! Frame codec for the DLT/645 protocol
//!
//! A frame on the wire looks like
//!
//! ```text
//! [FE FE FE FE] 68 A0 A1 A2 A3 A4 A5 68 C L DATA... CS 16
//! ```
//!
//! - the optional `FE` preamble wakes up the receiver of a serial line
//! - `A0..A5` is the device address, least significant byte first
//! - `C` is the control code, `L` the length of the data field
//! - every data byte is transmitted with `0x33` added
//! - `CS` is the modulo-256 sum of every byte from the first `68` to the end of the data
//!
//! This crate turns [`Frame`] values into such byte sequences and back.
//!
//! # TODO
//!
//! - [x] 帧编码 / 解码
//! - [x] 校验和计算和验证
//! - [x] 流式重组（分片、噪声）
//! - [x] 读数据、读地址、写地址、广播校时
//! - [ ] 后续帧（0x12）的数据拼接

pub mod buffer;
pub mod checksum;
pub mod codec;
pub mod control;
pub mod frame;
pub mod statistics;

pub use buffer::FrameBuffer;
pub use codec::{FrameCodec, ParseOutcome};
pub use control::{ControlCode, Function};
pub use frame::{Frame, Payload};
pub use statistics::LinkStatistics;

pub use dlt645_core::{Dlt645Error, Dlt645Result};
