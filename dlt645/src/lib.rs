//! DLT/645 - Rust implementation of the DLT/645 electricity meter protocol
//!
//! Master (client) and slave (server) sides over TCP and RS-485.
//!
//! # Architecture
//!
//! This library is organized as a workspace with multiple crates:
//!
//! - `dlt645-core`: Error handling, addresses, data identifiers, BCD values, registry
//! - `dlt645-transport`: Byte-stream transports (TCP, Serial)
//! - `dlt645-protocol`: Frame layout, codec, reassembly buffer
//! - `dlt645-client`: Request engine and meter client
//! - `dlt645-server`: Dispatch loop, TCP and serial servers, simulated meter
//!
//! # Implementation Status
//!
//! ## ✅ 已完成
//! - BCD 编解码、数据标识注册表（电能、需量、变量）
//! - 帧编解码、校验和、分片重组
//! - TCP / 串口传输
//! - 客户端：读数据、读写通讯地址、广播校时、重试和重连
//! - 服务端：TCP 监听、串口服务、模拟电表
//!
//! ## 📋 待实现
//! - 写数据、冻结、清零等控制命令
//! - 后续帧
//!
//! # Usage
//!
//! ```no_run
//! use dlt645::client::ClientBuilder;
//! use dlt645::DataIdentifier;
//!
//! # async fn example() -> dlt645::Dlt645Result<()> {
//! let mut client = ClientBuilder::new()
//!     .tcp("192.168.1.100:8001")
//!     .meter_address("000000000001".parse()?)
//!     .build_tcp()?;
//! client.connect().await?;
//! let energy = client.read_energy(DataIdentifier::new(0x0001_0000)).await?;
//! println!("{energy}");
//! # Ok(())
//! # }
//! ```

// Re-export core types
pub use dlt645_core::{
    Address, Category, DataFormat, DataIdentifier, DataItem, DataItemDefinition, Dlt645Error,
    Dlt645Result, ErrorCode, ErrorKind, FixedPoint, Registry, RegistryBuilder, Value,
};

/// Data identifier tables
pub mod config {
    pub use dlt645_core::config::*;
}

/// Frame layout and codec
pub mod protocol {
    pub use dlt645_protocol::*;
}

/// Byte-stream transports
pub mod transport {
    pub use dlt645_transport::*;
}

// Re-export client API
pub mod client {
    pub use dlt645_client::*;
}

// Re-export server API
pub mod server {
    pub use dlt645_server::*;
}
