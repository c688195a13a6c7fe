//! Request/response engine
//!
//! The engine owns one transport and runs one logical request at a time:
//!
//! ```text
//! Disconnected -> Connecting -> Sending -> AwaitingResponse -> Complete | Failed
//! ```
//!
//! A request is written, then chunks are read into a [`FrameBuffer`] until it holds a
//! structurally complete frame. Any failure of an attempt (write error, short write,
//! timeout, end of stream) is logged and the request is repeated after a linearly
//! growing backoff. A link that dropped is reopened at the start of the next attempt.

use dlt645_core::bcd::to_spaced_hex;
use dlt645_core::{Dlt645Error, Dlt645Result};
use dlt645_protocol::frame::MAX_FRAME_LEN;
use dlt645_protocol::{FrameBuffer, LinkStatistics};
use dlt645_transport::TransportLayer;
use std::time::Duration;

/// Client side configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Number of repetitions after the first attempt
    pub max_retries: usize,
    /// Base backoff; attempt `n` waits `backoff * (n + 1)` before the next one
    pub backoff: Duration,
    /// Size of a single read
    pub read_chunk_size: usize,
    /// Send the `FE FE FE FE` preamble before every frame
    pub preamble: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Duration::from_millis(500),
            read_chunk_size: 256,
            preamble: false,
        }
    }
}

impl ClientConfig {
    pub fn with_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_preamble(mut self, preamble: bool) -> Self {
        self.preamble = preamble;
        self
    }
}

/// Progress of the current (or last) request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// No link
    Disconnected,
    /// Opening the link
    Connecting,
    /// Writing the request
    Sending,
    /// Reading the response
    AwaitingResponse,
    /// The last request, or the connect without request, succeeded; the link is ready
    Complete,
    /// The last request failed
    Failed,
}

impl RequestState {
    /// Whether a request is in progress
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            RequestState::Connecting | RequestState::Sending | RequestState::AwaitingResponse
        )
    }
}

/// Retrying, reconnecting request/response cycle over one transport
#[derive(Debug)]
pub struct RequestEngine<T: TransportLayer> {
    transport: T,
    config: ClientConfig,
    buffer: FrameBuffer,
    state: RequestState,
    statistics: LinkStatistics,
}

impl<T: TransportLayer> RequestEngine<T> {
    pub fn new(transport: T, config: ClientConfig) -> Self {
        Self {
            transport,
            config,
            buffer: FrameBuffer::new(),
            state: RequestState::Disconnected,
            statistics: LinkStatistics::new(),
        }
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn statistics(&self) -> &LinkStatistics {
        &self.statistics
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Open the transport; does nothing if it is already open
    pub async fn connect(&mut self) -> Dlt645Result<()> {
        if !self.transport.is_closed() {
            return Ok(());
        }

        self.state = RequestState::Connecting;
        match self.transport.open().await {
            Ok(()) => {
                self.state = RequestState::Complete;
                Ok(())
            }
            Err(e) => {
                self.state = RequestState::Disconnected;
                Err(e)
            }
        }
    }

    /// Reopen the link if it is absent or closed
    ///
    /// Any failure is reported as `Connection`.
    pub async fn ensure_connection(&mut self) -> Dlt645Result<()> {
        if !self.transport.is_closed() {
            return Ok(());
        }

        log::info!("Link is closed, connecting");
        self.connect().await.map_err(|e| match e {
            Dlt645Error::Connection(io) => Dlt645Error::Connection(io),
            Dlt645Error::Timeout => Dlt645Error::Connection(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "timed out while connecting",
            )),
            other => Dlt645Error::Connection(std::io::Error::other(other.to_string())),
        })
    }

    pub async fn close(&mut self) -> Dlt645Result<()> {
        self.transport.close().await?;
        self.buffer.clear();
        self.state = RequestState::Disconnected;
        Ok(())
    }

    /// Send with the configured number of retries
    pub async fn exchange(&mut self, data: &[u8]) -> Dlt645Result<Vec<u8>> {
        let max_retries = self.config.max_retries;
        self.send_request(data, max_retries).await
    }

    /// Send a request and return the bytes of a structurally complete response
    ///
    /// The checksum of the response is not verified here.
    ///
    /// # Errors
    /// - `Connection` if the link cannot be established before the first attempt
    /// - `RetriesExhausted` after `max_retries + 1` failed attempts
    pub async fn send_request(&mut self, data: &[u8], max_retries: usize) -> Dlt645Result<Vec<u8>> {
        if let Err(e) = self.ensure_connection().await {
            self.state = RequestState::Failed;
            return Err(e);
        }

        let attempts = max_retries + 1;
        for attempt in 0..attempts {
            if attempt > 0 {
                self.statistics.increment_retries();
            }

            match self.attempt(data).await {
                Ok(response) => {
                    self.state = RequestState::Complete;
                    return Ok(response);
                }
                Err(e) => {
                    if matches!(e, Dlt645Error::Timeout) {
                        self.statistics.increment_timeouts();
                    }
                    log::warn!("Request attempt {}/{} failed: {}", attempt + 1, attempts, e);
                }
            }

            if attempt + 1 < attempts {
                let delay = self.config.backoff * (attempt as u32 + 1);
                log::debug!("Retrying in {:?}", delay);
                tokio::time::sleep(delay).await;
            }
        }

        self.state = RequestState::Failed;
        log::error!("Request failed after {} attempts", attempts);
        Err(Dlt645Error::RetriesExhausted { attempts })
    }

    /// Write a frame that gets no answer (broadcasts)
    pub async fn send_only(&mut self, data: &[u8]) -> Dlt645Result<()> {
        if let Err(e) = self.ensure_connection().await {
            self.state = RequestState::Failed;
            return Err(e);
        }

        self.state = RequestState::Sending;
        match self.write_request(data).await {
            Ok(()) => {
                self.state = RequestState::Complete;
                Ok(())
            }
            Err(e) => {
                self.state = RequestState::Failed;
                Err(e)
            }
        }
    }

    async fn write_request(&mut self, data: &[u8]) -> Dlt645Result<()> {
        log::debug!("TX: {}", to_spaced_hex(data));
        let written = self.transport.write(data).await?;
        if written < data.len() {
            return Err(Dlt645Error::ShortWrite {
                written,
                expected: data.len(),
            });
        }
        self.transport.flush().await?;
        self.statistics.increment_frames_sent();
        Ok(())
    }

    async fn attempt(&mut self, data: &[u8]) -> Dlt645Result<Vec<u8>> {
        if self.transport.is_closed() {
            self.connect().await?;
        }

        self.buffer.clear();
        if let Err(e) = self.transport.clear_buffers().await {
            log::warn!("Failed to clear stale buffers: {}", e);
        }

        self.state = RequestState::Sending;
        self.write_request(data).await?;

        self.state = RequestState::AwaitingResponse;
        let mut chunk = vec![0u8; self.config.read_chunk_size];
        loop {
            let n = self.transport.read(&mut chunk).await?;
            if n == 0 {
                return Err(Dlt645Error::Connection(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "no response data",
                )));
            }

            log::debug!("RX: {}", to_spaced_hex(&chunk[..n]));
            self.buffer.extend(&chunk[..n]);

            if self.buffer.is_structurally_complete() {
                self.statistics.increment_frames_received();
                return Ok(self.buffer.take());
            }
            if self.buffer.len() > 2 * MAX_FRAME_LEN {
                let error = Dlt645Error::MalformedFrame(format!(
                    "no frame in {} bytes of response",
                    self.buffer.len()
                ));
                self.statistics.record_rejection(&error);
                return Err(error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dlt645_transport::StreamAccessor;
    use std::collections::VecDeque;
    use tokio::time::Instant;
    use tokio_test::{assert_err, assert_ok};

    const RESPONSE: [u8; 20] = [
        0x68, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x68, 0x91, 0x08, 0x33, 0x33, 0x34, 0x33, 0xAB,
        0x89, 0x67, 0x45, 0x17, 0x16,
    ];
    const REQUEST: [u8; 16] = [
        0x68, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x68, 0x11, 0x04, 0x33, 0x33, 0x34, 0x33, 0xB3,
        0x16,
    ];

    /// What a read returns
    enum Reply {
        Chunk(Vec<u8>),
        Eof,
        Timeout,
        Drop,
    }

    #[derive(Default)]
    struct ScriptedTransport {
        replies: VecDeque<Reply>,
        writes: Vec<(Instant, Vec<u8>)>,
        opens: usize,
        fail_open: bool,
        short_write: bool,
        closed: bool,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<Reply>) -> Self {
            Self {
                replies: replies.into(),
                closed: true,
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl StreamAccessor for ScriptedTransport {
        async fn set_timeout(&mut self, _timeout: Option<Duration>) -> Dlt645Result<()> {
            Ok(())
        }

        async fn read(&mut self, buf: &mut [u8]) -> Dlt645Result<usize> {
            match self.replies.pop_front() {
                Some(Reply::Chunk(bytes)) => {
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok(bytes.len())
                }
                Some(Reply::Eof) => Ok(0),
                Some(Reply::Drop) => {
                    self.closed = true;
                    Err(Dlt645Error::Connection(std::io::Error::new(
                        std::io::ErrorKind::ConnectionReset,
                        "reset",
                    )))
                }
                Some(Reply::Timeout) | None => Err(Dlt645Error::Timeout),
            }
        }

        async fn write(&mut self, buf: &[u8]) -> Dlt645Result<usize> {
            self.writes.push((Instant::now(), buf.to_vec()));
            if self.short_write {
                Ok(buf.len() / 2)
            } else {
                Ok(buf.len())
            }
        }

        async fn flush(&mut self) -> Dlt645Result<()> {
            Ok(())
        }

        fn is_closed(&self) -> bool {
            self.closed
        }

        async fn close(&mut self) -> Dlt645Result<()> {
            self.closed = true;
            Ok(())
        }
    }

    #[async_trait]
    impl TransportLayer for ScriptedTransport {
        async fn open(&mut self) -> Dlt645Result<()> {
            self.opens += 1;
            if self.fail_open {
                return Err(Dlt645Error::Timeout);
            }
            self.closed = false;
            Ok(())
        }
    }

    fn engine(replies: Vec<Reply>) -> RequestEngine<ScriptedTransport> {
        RequestEngine::new(ScriptedTransport::new(replies), ClientConfig::default())
    }

    #[tokio::test]
    async fn test_single_exchange() {
        let mut engine = engine(vec![Reply::Chunk(RESPONSE.to_vec())]);
        assert_eq!(engine.state(), RequestState::Disconnected);

        let response = assert_ok!(engine.send_request(&REQUEST, 0).await);
        assert_eq!(response, RESPONSE);
        assert_eq!(engine.state(), RequestState::Complete);
        assert_eq!(engine.transport().writes.len(), 1);
        assert_eq!(engine.transport().writes[0].1, REQUEST);
        assert_eq!(engine.statistics().frames_sent, 1);
        assert_eq!(engine.statistics().frames_received, 1);
    }

    #[tokio::test]
    async fn test_fragmented_response() {
        let mut engine = engine(vec![
            Reply::Chunk(vec![0xFE, 0xFE]),
            Reply::Chunk(RESPONSE[..5].to_vec()),
            Reply::Chunk(RESPONSE[5..].to_vec()),
        ]);
        let response = assert_ok!(engine.send_request(&REQUEST, 0).await);
        assert_eq!(&response[2..], &RESPONSE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_grows_linearly() {
        let mut engine = engine(vec![Reply::Eof, Reply::Timeout, Reply::Chunk(RESPONSE.to_vec())]);
        let start = Instant::now();

        assert_ok!(engine.send_request(&REQUEST, 2).await);

        let writes = &engine.transport().writes;
        assert_eq!(writes.len(), 3);
        assert_eq!(writes[1].0 - writes[0].0, Duration::from_millis(500));
        assert_eq!(writes[2].0 - writes[1].0, Duration::from_millis(1000));
        assert_eq!(start.elapsed(), Duration::from_millis(1500));
        assert_eq!(engine.statistics().retries, 2);
        assert_eq!(engine.statistics().timeouts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted() {
        let mut engine = engine(vec![]);
        let start = Instant::now();

        let error = assert_err!(engine.send_request(&REQUEST, 2).await);
        assert!(matches!(error, Dlt645Error::RetriesExhausted { attempts: 3 }));
        // no sleep after the last attempt
        assert_eq!(start.elapsed(), Duration::from_millis(1500));
        assert_eq!(engine.transport().writes.len(), 3);
        assert_eq!(engine.state(), RequestState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_after_drop() {
        let mut engine = engine(vec![Reply::Drop, Reply::Chunk(RESPONSE.to_vec())]);
        assert_ok!(engine.send_request(&REQUEST, 1).await);
        assert_eq!(engine.transport().opens, 2);
    }

    #[tokio::test]
    async fn test_connect_failure_aborts() {
        let mut transport = ScriptedTransport::new(vec![]);
        transport.fail_open = true;
        let mut engine = RequestEngine::new(transport, ClientConfig::default());

        let error = assert_err!(engine.send_request(&REQUEST, 3).await);
        assert!(matches!(error, Dlt645Error::Connection(_)));
        assert!(engine.transport().writes.is_empty());
        assert_eq!(engine.state(), RequestState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_write_fails_attempt() {
        let mut transport = ScriptedTransport::new(vec![Reply::Chunk(RESPONSE.to_vec())]);
        transport.short_write = true;
        let mut engine = RequestEngine::new(transport, ClientConfig::default());

        let error = assert_err!(engine.send_request(&REQUEST, 1).await);
        assert!(matches!(error, Dlt645Error::RetriesExhausted { attempts: 2 }));
        assert_eq!(engine.statistics().frames_sent, 0);
    }

    #[tokio::test]
    async fn test_send_only() {
        let mut engine = engine(vec![]);
        assert_ok!(engine.send_only(&REQUEST).await);
        assert_eq!(engine.transport().writes.len(), 1);
        assert_eq!(engine.state(), RequestState::Complete);
        assert!(!engine.state().is_busy());
    }
}
