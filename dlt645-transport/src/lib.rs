//! Transport layer module for the DLT/645 protocol
//!
//! This crate provides byte-stream transports for TCP and serial (RS-485) links.

pub mod serial;
pub mod stream;
pub mod tcp;

pub use dlt645_core::{Dlt645Error, Dlt645Result};
pub use serial::{SerialSettings, SerialTransport};
pub use stream::{StreamAccessor, TransportLayer};
pub use tcp::{TcpSettings, TcpTransport};
