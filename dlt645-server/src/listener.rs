//! TCP listener
//!
//! Each accepted connection gets its own task running [`serve_connection`]. The number
//! of concurrent connections is capped by a semaphore; when every permit is taken the
//! accept loop waits for a connection to finish before accepting the next one.

use crate::dispatch::{serve_connection, LinkMode};
use crate::handler::RequestHandler;
use dlt645_core::{Dlt645Error, Dlt645Result};
use dlt645_protocol::FrameCodec;
use dlt645_transport::TcpTransport;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;

/// TCP server settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: SocketAddr,
    /// A connection silent for this long is closed
    pub read_timeout: Option<Duration>,
    pub max_connections: usize,
    /// Hand frames with unregistered identifiers to the handler instead of dropping them
    pub lenient: bool,
}

impl ServerConfig {
    /// Settings for `bind_address` with a 30 second idle timeout and 64 connections
    pub fn new(bind_address: SocketAddr) -> Self {
        Self {
            bind_address,
            read_timeout: Some(Duration::from_secs(30)),
            max_connections: 64,
            lenient: false,
        }
    }

    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn with_lenient(mut self, lenient: bool) -> Self {
        self.lenient = lenient;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([0, 0, 0, 0], 8001)))
    }
}

/// Stops a running server
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub(crate) fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Ask the server and all of its connections to stop
    pub fn shutdown(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.sender.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

/// DLT/645 slave listening on TCP
pub struct TcpServer<H> {
    listener: TcpListener,
    config: ServerConfig,
    codec: FrameCodec,
    handler: Arc<H>,
    shutdown: ShutdownHandle,
}

impl<H> std::fmt::Debug for TcpServer<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpServer")
            .field("listener", &self.listener)
            .field("config", &self.config)
            .field("codec", &self.codec)
            .field("shutdown", &self.shutdown)
            .finish_non_exhaustive()
    }
}

impl<H: RequestHandler + 'static> TcpServer<H> {
    /// Bind the listening socket
    ///
    /// Binding to port 0 picks a free port; see [`local_addr`](Self::local_addr).
    pub async fn bind(config: ServerConfig, codec: FrameCodec, handler: H) -> Dlt645Result<Self> {
        let listener = TcpListener::bind(config.bind_address).await.map_err(|e| {
            Dlt645Error::Connection(io::Error::new(
                e.kind(),
                format!("Failed to bind to {}: {}", config.bind_address, e),
            ))
        })?;

        let codec = if config.lenient { codec.lenient() } else { codec };
        Ok(Self {
            listener,
            config,
            codec,
            handler: Arc::new(handler),
            shutdown: ShutdownHandle::new(),
        })
    }

    pub fn local_addr(&self) -> Dlt645Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Accept connections until shut down
    ///
    /// Returns `Ok` after a shutdown once every connection has finished. Transient accept
    /// errors are logged and skipped; any other accept error is returned.
    pub async fn run(self) -> Dlt645Result<()> {
        let local_addr = self.local_addr()?;
        log::info!(
            "DLT/645 server listening on {} (max {} connections)",
            local_addr,
            self.config.max_connections
        );

        let permits = Arc::new(Semaphore::new(self.config.max_connections));
        let mut shutdown = self.shutdown.subscribe();
        let mut connections = JoinSet::new();

        let result = loop {
            while connections.try_join_next().is_some() {}

            if *shutdown.borrow_and_update() {
                break Ok(());
            }

            let permit = tokio::select! {
                permit = permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break Ok(()),
                },
                _ = shutdown.changed() => continue,
            };

            let accepted = tokio::select! {
                accepted = self.listener.accept() => accepted,
                _ = shutdown.changed() => continue,
            };

            let (stream, peer) = match accepted {
                Ok(accepted) => accepted,
                Err(e) if is_transient(&e) => {
                    log::warn!("Accept failed, continuing: {}", e);
                    continue;
                }
                Err(e) => {
                    log::error!("Accept failed: {}", e);
                    break Err(Dlt645Error::Connection(e));
                }
            };

            log::info!("Accepted connection from {}", peer);
            let transport = TcpTransport::from_connected_stream(stream, self.config.read_timeout);
            let codec = self.codec.clone();
            let handler = Arc::clone(&self.handler);
            let connection_shutdown = self.shutdown.subscribe();

            connections.spawn(async move {
                let statistics = serve_connection(
                    transport,
                    &codec,
                    handler.as_ref(),
                    LinkMode::Tcp,
                    connection_shutdown,
                )
                .await;
                log::info!("Connection from {} closed ({})", peer, statistics);
                drop(permit);
            });
        };

        if result.is_ok() {
            log::info!("Server stopping, waiting for {} connections", connections.len());
        } else {
            self.shutdown.shutdown();
        }
        while connections.join_next().await.is_some() {}
        result
    }
}

/// Errors that concern one pending connection rather than the listening socket
fn is_transient(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::TimedOut
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use dlt645_core::config::default_registry;
    use dlt645_core::{Address, DataIdentifier};
    use dlt645_protocol::{ControlCode, Frame, Payload};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    fn codec() -> FrameCodec {
        FrameCodec::new(Arc::new(default_registry().unwrap()))
    }

    fn loopback() -> ServerConfig {
        ServerConfig::new("127.0.0.1:0".parse().unwrap())
    }

    /// Answer every request with the address it was sent to
    fn echo_address(frame: &Frame) -> Dlt645Result<Option<Vec<u8>>> {
        codec()
            .encode(&Frame::read_address_response(frame.address()))
            .map(Some)
    }

    #[tokio::test]
    async fn test_serve_and_shutdown() {
        let server = TcpServer::bind(loopback(), codec(), echo_address).await.unwrap();
        let addr = server.local_addr().unwrap();
        let handle = server.shutdown_handle();
        let task = tokio::spawn(server.run());

        let request = codec()
            .encode(&Frame::read_request(
                Address::new([0, 0, 0, 0, 0, 7]),
                DataIdentifier::new(0x0001_0000),
            ))
            .unwrap();
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(&request).await.unwrap();

        let mut response = vec![0u8; 18];
        stream.read_exact(&mut response).await.unwrap();
        let frame = codec().deserialize(&response).unwrap();
        assert_eq!(frame.control(), ControlCode::READ_ADDRESS.response());
        assert_eq!(frame.address(), Address::new([0, 0, 0, 0, 0, 7]));
        assert_eq!(frame.payload(), &Payload::Address(Address::new([0, 0, 0, 0, 0, 7])));

        // the open connection must not keep the server alive
        handle.shutdown();
        assert!(handle.is_shutdown());
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        // connection tasks close their stream on shutdown
        let mut rest = Vec::new();
        assert_eq!(stream.read_to_end(&mut rest).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_connection_limit() {
        let config = loopback().with_max_connections(1);
        let server = TcpServer::bind(config, codec(), echo_address).await.unwrap();
        let addr = server.local_addr().unwrap();
        let handle = server.shutdown_handle();
        let task = tokio::spawn(server.run());

        let request = codec().encode(&Frame::read_address_request()).unwrap();

        let mut first = TcpStream::connect(addr).await.unwrap();
        first.write_all(&request).await.unwrap();
        let mut response = vec![0u8; 18];
        first.read_exact(&mut response).await.unwrap();

        // queued in the backlog until the first connection ends
        let mut second = TcpStream::connect(addr).await.unwrap();
        second.write_all(&request).await.unwrap();
        let pending =
            tokio::time::timeout(Duration::from_millis(200), second.read_exact(&mut response)).await;
        assert!(pending.is_err());

        drop(first);
        tokio::time::timeout(Duration::from_secs(5), second.read_exact(&mut response))
            .await
            .unwrap()
            .unwrap();

        handle.shutdown();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_bind_failure() {
        let server = TcpServer::bind(loopback(), codec(), echo_address).await.unwrap();
        let taken = ServerConfig::new(server.local_addr().unwrap());
        let error = TcpServer::bind(taken, codec(), echo_address).await.unwrap_err();
        assert!(matches!(error, Dlt645Error::Connection(_)));
    }

    #[test]
    fn test_transient_errors() {
        assert!(is_transient(&io::Error::from(io::ErrorKind::ConnectionAborted)));
        assert!(!is_transient(&io::Error::from(io::ErrorKind::PermissionDenied)));
    }
}
