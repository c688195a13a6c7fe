//! Serial port transport implementation

use crate::stream::{StreamAccessor, TransportLayer};
use async_trait::async_trait;
use dlt645_core::{Dlt645Error, Dlt645Result};
use std::fmt;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{ClearBuffer, SerialPort, SerialStream};

/// Wrapper for SerialStream that implements Debug
struct DebugSerialStream(SerialStream);

impl fmt::Debug for DebugSerialStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialStream").finish()
    }
}

/// Serial port transport layer settings
///
/// Defaults follow the usual RS-485 meter line: 2400 baud, 8 data bits, even parity,
/// 1 stop bit.
#[derive(Debug, Clone)]
pub struct SerialSettings {
    pub port_name: String,
    pub baud_rate: u32,
    pub data_bits: tokio_serial::DataBits,
    pub stop_bits: tokio_serial::StopBits,
    pub parity: tokio_serial::Parity,
    pub flow_control: tokio_serial::FlowControl,
    pub timeout: Option<Duration>,
}

impl SerialSettings {
    /// Create new serial settings with default parameters
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            data_bits: tokio_serial::DataBits::Eight,
            stop_bits: tokio_serial::StopBits::One,
            parity: tokio_serial::Parity::Even,
            flow_control: tokio_serial::FlowControl::None,
            timeout: Some(Duration::from_secs(2)),
        }
    }

    /// Create serial settings with timeout
    pub fn with_timeout(port_name: impl Into<String>, baud_rate: u32, timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..Self::new(port_name, baud_rate)
        }
    }

    pub fn with_parity(mut self, parity: tokio_serial::Parity) -> Self {
        self.parity = parity;
        self
    }
}

/// Serial port transport layer implementation
///
/// A serial line has no end of stream: a read returning no bytes leaves the port open.
#[derive(Debug)]
pub struct SerialTransport {
    stream: Option<DebugSerialStream>,
    settings: SerialSettings,
    closed: bool,
}

fn not_connected() -> Dlt645Error {
    Dlt645Error::Connection(std::io::Error::new(
        std::io::ErrorKind::NotConnected,
        "Serial stream not connected",
    ))
}

impl SerialTransport {
    /// Create a new serial transport layer
    pub fn new(settings: SerialSettings) -> Self {
        Self {
            stream: None,
            settings,
            closed: true,
        }
    }

    /// Create serial transport with port name and baud rate
    pub fn new_simple(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self::new(SerialSettings::new(port_name, baud_rate))
    }

    pub fn settings(&self) -> &SerialSettings {
        &self.settings
    }
}

#[async_trait]
impl TransportLayer for SerialTransport {
    async fn open(&mut self) -> Dlt645Result<()> {
        if !self.closed && self.stream.is_some() {
            return Ok(());
        }

        let builder = tokio_serial::new(&self.settings.port_name, self.settings.baud_rate)
            .data_bits(self.settings.data_bits)
            .stop_bits(self.settings.stop_bits)
            .parity(self.settings.parity)
            .flow_control(self.settings.flow_control);

        let stream = SerialStream::open(&builder).map_err(|e| {
            Dlt645Error::Connection(std::io::Error::other(format!(
                "Failed to open serial port {}: {}",
                self.settings.port_name, e
            )))
        })?;

        log::info!(
            "Serial port {} opened at {} baud",
            self.settings.port_name,
            self.settings.baud_rate
        );
        self.stream = Some(DebugSerialStream(stream));
        self.closed = false;
        Ok(())
    }
}

#[async_trait]
impl StreamAccessor for SerialTransport {
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

        if result.is_err() {
            self.closed = true;
        }
        result
    }

    async fn write(&mut self, buf: &[u8]) -> Dlt645Result<usize> {
        let stream = &mut self.stream.as_mut().ok_or_else(not_connected)?.0;

        if let Some(timeout) = self.settings.timeout {
            tokio::time::timeout(timeout, stream.write(buf))
                .await
                .map_err(|_| Dlt645Error::Timeout)?
                .map_err(Dlt645Error::Connection)
        } else {
            stream.write(buf).await.map_err(Dlt645Error::Connection)
        }
    }

    async fn flush(&mut self) -> Dlt645Result<()> {
        let stream = &mut self.stream.as_mut().ok_or_else(not_connected)?.0;
        stream.flush().await.map_err(Dlt645Error::Connection)
    }

    async fn clear_buffers(&mut self) -> Dlt645Result<()> {
        let stream = &self.stream.as_ref().ok_or_else(not_connected)?.0;
        stream.clear(ClearBuffer::All).map_err(|e| {
            Dlt645Error::Connection(std::io::Error::other(format!(
                "Failed to clear serial buffers: {}",
                e
            )))
        })
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    async fn close(&mut self) -> Dlt645Result<()> {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.0.flush().await;
        }
        self.closed = true;
        Ok(())
    }
}
