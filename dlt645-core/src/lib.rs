//! Core types and utilities for the DLT/645 protocol
//!
//! This crate provides the fundamental vocabulary shared by every other crate in the
//! workspace: error handling, device addresses, data identifiers, the BCD value
//! transcoder and the data identifier registry.

pub mod address;
pub mod bcd;
pub mod config;
pub mod error;
pub mod format;
pub mod identifier;
pub mod registry;
pub mod value;

pub use address::Address;
pub use error::{Dlt645Error, Dlt645Result, ErrorCode, ErrorKind};
pub use format::{DataFormat, FixedPoint};
pub use identifier::{Category, DataIdentifier};
pub use registry::{DataItemDefinition, Registry, RegistryBuilder};
pub use value::{DataItem, Value};
