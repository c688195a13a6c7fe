//! Stream accessor trait for transport layer

use dlt645_core::{Dlt645Error, Dlt645Result};
use async_trait::async_trait;
use std::time::Duration;

/// Stream accessor interface to access a physical stream to a remote meter
#[async_trait]
pub trait StreamAccessor: Send + Sync {
    /// Set the read timeout
    ///
    /// # Arguments
    ///
    /// * `timeout` - The timeout duration. None means infinite timeout.
    async fn set_timeout(&mut self, timeout: Option<Duration>) -> Dlt645Result<()>;

    /// Read data from the stream
    ///
    /// # Arguments
    ///
    /// * `buf` - Buffer to read into
    ///
    /// # Returns
    ///
    /// Number of bytes read. 0 means end of stream on TCP; a serial line may return 0
    /// when nothing arrived.
    async fn read(&mut self, buf: &mut [u8]) -> Dlt645Result<usize>;

    /// Write data to the stream
    ///
    /// # Returns
    ///
    /// Number of bytes written
    async fn write(&mut self, buf: &[u8]) -> Dlt645Result<usize>;

    /// Write all data to the stream
    ///
    /// Fails with `ShortWrite` if the stream stops accepting bytes part way.
    async fn write_all(&mut self, buf: &[u8]) -> Dlt645Result<()> {
        let mut written = 0;
        while written < buf.len() {
            let n = self.write(&buf[written..]).await?;
            if n == 0 {
                return Err(Dlt645Error::ShortWrite {
                    written,
                    expected: buf.len(),
                });
            }
            written += n;
        }
        Ok(())
    }

    /// Flush any buffered data
    async fn flush(&mut self) -> Dlt645Result<()>;

    /// Drop bytes still pending in the driver's input and output buffers
    ///
    /// Only meaningful for serial lines; stream sockets have nothing to clear.
    async fn clear_buffers(&mut self) -> Dlt645Result<()> {
        Ok(())
    }

    /// Check if the stream is closed
    fn is_closed(&self) -> bool;

    /// Close the stream
    async fn close(&mut self) -> Dlt645Result<()>;
}

/// Transport layer trait that extends StreamAccessor
#[async_trait]
pub trait TransportLayer: StreamAccessor {
    /// Open the physical layer connection
    ///
    /// Opening a transport that is already open does nothing.
    async fn open(&mut self) -> Dlt645Result<()>;
}
