//! TCP transport implementation

use crate::stream::{StreamAccessor, TransportLayer};
use async_trait::async_trait;
use dlt645_core::{Dlt645Error, Dlt645Result};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Wrapper for TcpStream that implements Debug
struct DebugTcpStream(TcpStream);

impl fmt::Debug for DebugTcpStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpStream").finish()
    }
}

/// TCP transport layer settings
#[derive(Debug, Clone)]
pub struct TcpSettings {
    pub address: SocketAddr,
    /// Applied to connecting, reading and writing
    pub timeout: Option<Duration>,
}

impl TcpSettings {
    /// Create new TCP settings with a 5 second timeout
    pub fn new(address: SocketAddr) -> Self {
        Self {
            address,
            timeout: Some(Duration::from_secs(5)),
        }
    }

    /// Create TCP settings with timeout
    pub fn with_timeout(address: SocketAddr, timeout: Duration) -> Self {
        Self {
            address,
            timeout: Some(timeout),
        }
    }
}

/// TCP transport layer implementation
#[derive(Debug)]
pub struct TcpTransport {
    stream: Option<DebugTcpStream>,
    settings: TcpSettings,
    closed: bool,
}

fn not_connected() -> Dlt645Error {
    Dlt645Error::Connection(std::io::Error::new(
        std::io::ErrorKind::NotConnected,
        "TCP stream not connected",
    ))
}

impl TcpTransport {
    /// Create a new TCP transport layer
    pub fn new(settings: TcpSettings) -> Self {
        Self {
            stream: None,
            settings,
            closed: true,
        }
    }

    /// Create TCP transport from address string, e.g. `"192.168.1.10:8001"`
    pub fn from_address(address: &str) -> Dlt645Result<Self> {
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| Dlt645Error::InvalidData(format!("Invalid TCP address: {}", e)))?;
        Ok(Self::new(TcpSettings::new(addr)))
    }

    /// Create TCP transport from an already-connected TcpStream (for server use)
    ///
    /// # Arguments
    /// * `stream` - The already-connected TCP stream
    /// * `timeout` - Optional read/write timeout
    pub fn from_connected_stream(stream: TcpStream, timeout: Option<Duration>) -> Self {
        let address = stream
            .peer_addr()
            .unwrap_or_else(|_| SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0));
        Self {
            stream: Some(DebugTcpStream(stream)),
            settings: TcpSettings { address, timeout },
            closed: false,
        }
    }

    /// Remote address of the connection
    pub fn peer_address(&self) -> SocketAddr {
        self.settings.address
    }
}

#[async_trait]
impl TransportLayer for TcpTransport {
    async fn open(&mut self) -> Dlt645Result<()> {
        if !self.closed && self.stream.is_some() {
            return Ok(());
        }

        let stream = if let Some(timeout) = self.settings.timeout {
            tokio::time::timeout(timeout, TcpStream::connect(self.settings.address))
                .await
                .map_err(|_| Dlt645Error::Timeout)??
        } else {
            TcpStream::connect(self.settings.address).await?
        };
        // Frames are small request/response exchanges, do not wait for coalescing
        stream.set_nodelay(true)?;

        log::info!("TCP connection to {} established", self.settings.address);
        self.stream = Some(DebugTcpStream(stream));
        self.closed = false;
        Ok(())
    }
}

#[async_trait]
impl StreamAccessor for TcpTransport {
    async fn set_timeout(&mut self, timeout: Option<Duration>) -> Dlt645Result<()> {
        self.settings.timeout = timeout;
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Dlt645Result<usize> {
        let stream = &mut self.stream.as_mut().ok_or_else(not_connected)?.0;

        let result = if let Some(timeout) = self.settings.timeout {
            tokio::time::timeout(timeout, stream.read(buf))
                .await
                .map_err(|_| Dlt645Error::Timeout)?
                .map_err(Dlt645Error::Connection)
        } else {
            stream.read(buf).await.map_err(Dlt645Error::Connection)
        };

        match result {
            Ok(0) => {
                self.closed = true;
                Ok(0)
            }
            Ok(n) => Ok(n),
            Err(e) => {
                self.closed = true;
                Err(e)
            }
        }
    }

    async fn write(&mut self, buf: &[u8]) -> Dlt645Result<usize> {
        let stream = &mut self.stream.as_mut().ok_or_else(not_connected)?.0;

        let result = if let Some(timeout) = self.settings.timeout {
            tokio::time::timeout(timeout, stream.write(buf))
                .await
                .map_err(|_| Dlt645Error::Timeout)?
                .map_err(Dlt645Error::Connection)
        } else {
            stream.write(buf).await.map_err(Dlt645Error::Connection)
        };

        if result.is_err() {
            self.closed = true;
        }
        result
    }

    async fn flush(&mut self) -> Dlt645Result<()> {
        let stream = &mut self.stream.as_mut().ok_or_else(not_connected)?.0;
        stream.flush().await.map_err(Dlt645Error::Connection)
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    async fn close(&mut self) -> Dlt645Result<()> {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.0.shutdown().await;
        }
        self.closed = true;
        Ok(())
    }
}
