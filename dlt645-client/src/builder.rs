//! Client builder
//!
//! ```rust,no_run
//! use dlt645_client::ClientBuilder;
//!
//! # async fn example() -> dlt645_client::Dlt645Result<()> {
//! // meter behind a serial-to-Ethernet converter
//! let client = ClientBuilder::new()
//!     .tcp("192.168.1.100:8001")
//!     .meter_address("000000000001".parse()?)
//!     .build_tcp()?;
//!
//! // meter on an RS-485 line
//! let client = ClientBuilder::new()
//!     .serial("/dev/ttyUSB0", 2400)
//!     .preamble(true)
//!     .build_serial()?;
//! # Ok(())
//! # }
//! ```

use crate::engine::{ClientConfig, RequestEngine};
use crate::service::MeterClient;
use dlt645_core::config::default_registry;
use dlt645_core::{Address, Dlt645Error, Dlt645Result, Registry};
use dlt645_protocol::FrameCodec;
use dlt645_transport::{SerialSettings, SerialTransport, TcpSettings, TcpTransport};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
enum TransportType {
    Tcp { address: String },
    Serial { port_name: String, baud_rate: u32 },
    None,
}

/// Builder for [`MeterClient`]
///
/// Without an explicit registry the built-in data identifier tables are used.
#[derive(Debug, Clone)]
pub struct ClientBuilder {
    transport_type: TransportType,
    meter_address: Address,
    config: ClientConfig,
    timeout: Option<Duration>,
    registry: Option<Arc<Registry>>,
    lenient: bool,
}

impl ClientBuilder {
    /// Create a builder
    ///
    /// # Default Settings
    /// - Meter address: broadcast (`AAAAAAAAAAAA`)
    /// - Retries: 3, backoff 500 ms
    /// - Transport timeout: the transport's own default
    pub fn new() -> Self {
        Self {
            transport_type: TransportType::None,
            meter_address: Address::BROADCAST,
            config: ClientConfig::default(),
            timeout: None,
            registry: None,
            lenient: false,
        }
    }

    /// Connect over TCP, `address` as `"host:port"`
    pub fn tcp(mut self, address: &str) -> Self {
        self.transport_type = TransportType::Tcp {
            address: address.to_string(),
        };
        self
    }

    /// Connect over a serial line (8E1)
    pub fn serial(mut self, port_name: &str, baud_rate: u32) -> Self {
        self.transport_type = TransportType::Serial {
            port_name: port_name.to_string(),
            baud_rate,
        };
        self
    }

    pub fn meter_address(mut self, address: Address) -> Self {
        self.meter_address = address;
        self
    }

    pub fn retries(mut self, max_retries: usize) -> Self {
        self.config.max_retries = max_retries;
        self
    }

    pub fn backoff(mut self, backoff: Duration) -> Self {
        self.config.backoff = backoff;
        self
    }

    /// Connect/read/write timeout of the transport
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Send the `FE FE FE FE` preamble before every request
    pub fn preamble(mut self, preamble: bool) -> Self {
        self.config.preamble = preamble;
        self
    }

    pub fn registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Expose values of unregistered identifiers raw instead of failing
    pub fn lenient(mut self, lenient: bool) -> Self {
        self.lenient = lenient;
        self
    }

    /// Build a client for a TCP link
    ///
    /// # Errors
    /// `InvalidData` if no TCP address was configured or it does not parse.
    pub fn build_tcp(self) -> Dlt645Result<MeterClient<TcpTransport>> {
        let address = match &self.transport_type {
            TransportType::Tcp { address } => address.clone(),
            _ => {
                return Err(Dlt645Error::InvalidData(
                    "TCP transport must be configured".to_string(),
                ));
            }
        };
        let address: SocketAddr = address
            .parse()
            .map_err(|e| Dlt645Error::InvalidData(format!("Invalid TCP address: {}", e)))?;

        let settings = match self.timeout {
            Some(timeout) => TcpSettings::with_timeout(address, timeout),
            None => TcpSettings::new(address),
        };
        self.finish(TcpTransport::new(settings))
    }

    /// Build a client for a serial line
    pub fn build_serial(self) -> Dlt645Result<MeterClient<SerialTransport>> {
        let settings = match &self.transport_type {
            TransportType::Serial {
                port_name,
                baud_rate,
            } => match self.timeout {
                Some(timeout) => SerialSettings::with_timeout(port_name.as_str(), *baud_rate, timeout),
                None => SerialSettings::new(port_name.as_str(), *baud_rate),
            },
            _ => {
                return Err(Dlt645Error::InvalidData(
                    "Serial transport must be configured".to_string(),
                ));
            }
        };
        self.finish(SerialTransport::new(settings))
    }

    fn finish<T: dlt645_transport::TransportLayer>(self, transport: T) -> Dlt645Result<MeterClient<T>> {
        let registry = match self.registry {
            Some(registry) => registry,
            None => Arc::new(default_registry()?),
        };

        let mut codec = FrameCodec::new(registry).with_preamble(self.config.preamble);
        if self.lenient {
            codec = codec.lenient();
        }

        let engine = RequestEngine::new(transport, self.config);
        Ok(MeterClient::new(engine, codec, self.meter_address))
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
