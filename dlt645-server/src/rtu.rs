//! Slave on a serial (RS-485) line

use crate::dispatch::{serve_connection, LinkMode};
use crate::handler::RequestHandler;
use crate::listener::ShutdownHandle;
use dlt645_core::Dlt645Result;
use dlt645_protocol::{FrameCodec, LinkStatistics};
use dlt645_transport::TransportLayer;

/// One dispatch loop on one transport
///
/// Usually a [`SerialTransport`](dlt645_transport::SerialTransport); any transport works.
#[derive(Debug)]
pub struct RtuServer<T, H> {
    transport: T,
    codec: FrameCodec,
    handler: H,
    shutdown: ShutdownHandle,
}

impl<T: TransportLayer, H: RequestHandler> RtuServer<T, H> {
    pub fn new(transport: T, codec: FrameCodec, handler: H) -> Self {
        Self {
            transport,
            codec,
            handler,
            shutdown: ShutdownHandle::new(),
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Open the line and serve it until shut down or the line fails
    pub async fn run(mut self) -> Dlt645Result<LinkStatistics> {
        self.transport.open().await?;
        log::info!("DLT/645 server running on serial line");

        let statistics = serve_connection(
            self.transport,
            &self.codec,
            &self.handler,
            LinkMode::Rtu,
            self.shutdown.subscribe(),
        )
        .await;
        log::info!("Serial server stopped ({})", statistics);
        Ok(statistics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dlt645_core::config::default_registry;
    use dlt645_core::{Address, DataIdentifier, Dlt645Error};
    use dlt645_protocol::Frame;
    use dlt645_transport::StreamAccessor;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Serial line that hands out queued chunks, then stays silent
    struct Line {
        incoming: VecDeque<Vec<u8>>,
        written: Arc<Mutex<Vec<Vec<u8>>>>,
        closed: bool,
    }

    #[async_trait]
    impl StreamAccessor for Line {
        async fn set_timeout(&mut self, _timeout: Option<Duration>) -> Dlt645Result<()> {
            Ok(())
        }

        async fn read(&mut self, buf: &mut [u8]) -> Dlt645Result<usize> {
            match self.incoming.pop_front() {
                Some(chunk) => {
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
                None => {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Err(Dlt645Error::Timeout)
                }
            }
        }

        async fn write(&mut self, buf: &[u8]) -> Dlt645Result<usize> {
            self.written.lock().unwrap().push(buf.to_vec());
            Ok(buf.len())
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
    impl TransportLayer for Line {
        async fn open(&mut self) -> Dlt645Result<()> {
            self.closed = false;
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_serves_until_shutdown() {
        let codec = FrameCodec::new(Arc::new(default_registry().unwrap()));
        let meter = Address::new([0, 0, 0, 0, 0, 1]);
        let request = codec
            .encode(&Frame::read_request(meter, DataIdentifier::new(0x0001_0000)))
            .unwrap();
        let answer = vec![0xAB, 0xCD];

        let written = Arc::new(Mutex::new(Vec::new()));
        let line = Line {
            incoming: VecDeque::from([request[..3].to_vec(), request[3..].to_vec()]),
            written: Arc::clone(&written),
            closed: true,
        };
        let reply = answer.clone();
        let server = RtuServer::new(line, codec, move |_: &Frame| -> Dlt645Result<Option<Vec<u8>>> {
            Ok(Some(reply.clone()))
        });
        let handle = server.shutdown_handle();
        let task = tokio::spawn(server.run());

        // several silent read timeouts pass without ending the loop
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!task.is_finished());
        handle.shutdown();

        let statistics = task.await.unwrap().unwrap();
        assert_eq!(statistics.frames_received, 1);
        assert!(statistics.timeouts >= 5);
        assert_eq!(*written.lock().unwrap(), vec![answer]);
    }
}
