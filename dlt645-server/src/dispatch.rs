//! Per-connection dispatch loop
//!
//! Reads chunks from one stream, reassembles frames and hands each complete frame to
//! the handler. Nothing that arrives on the line, and nothing the handler does, ends
//! the loop; only the stream itself or a shutdown signal does.

use crate::handler::RequestHandler;
use dlt645_core::bcd::to_spaced_hex;
use dlt645_core::Dlt645Error;
use dlt645_protocol::{Frame, FrameBuffer, FrameCodec, LinkStatistics};
use dlt645_transport::StreamAccessor;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;
use tokio::sync::watch;

const READ_CHUNK_SIZE: usize = 256;
/// Pause after an empty read on a serial line whose driver does not block
const RTU_IDLE_POLL: Duration = Duration::from_millis(10);

/// How the loop treats an idle or silent stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkMode {
    /// End of stream and read timeouts end the session
    Tcp,
    /// A serial line has no session; silence is waited out
    Rtu,
}

/// Serve one stream until it closes or `shutdown` turns true
///
/// The stream is closed before returning. A dropped shutdown sender counts as a
/// shutdown request.
pub async fn serve_connection<S, H>(
    mut stream: S,
    codec: &FrameCodec,
    handler: &H,
    mode: LinkMode,
    mut shutdown: watch::Receiver<bool>,
) -> LinkStatistics
where
    S: StreamAccessor,
    H: RequestHandler + ?Sized,
{
    let mut buffer = FrameBuffer::new();
    let mut statistics = LinkStatistics::new();
    let mut chunk = vec![0u8; READ_CHUNK_SIZE];

    loop {
        if *shutdown.borrow_and_update() {
            log::info!("Shutdown requested, closing link");
            break;
        }

        let read = tokio::select! {
            read = stream.read(&mut chunk) => read,
            changed = shutdown.changed() => {
                if changed.is_err() {
                    log::info!("Shutdown sender dropped, closing link");
                    break;
                }
                continue;
            }
        };

        match read {
            Ok(0) => match mode {
                LinkMode::Tcp => {
                    log::info!("Peer closed the connection");
                    break;
                }
                LinkMode::Rtu => {
                    tokio::time::sleep(RTU_IDLE_POLL).await;
                    continue;
                }
            },
            Ok(n) => {
                log::debug!("RX: {}", to_spaced_hex(&chunk[..n]));
                buffer.extend(&chunk[..n]);
                while let Some(result) = buffer.next_frame(codec) {
                    match result {
                        Ok(frame) => {
                            statistics.increment_frames_received();
                            dispatch(&mut stream, handler, &frame, &mut statistics).await;
                        }
                        Err(e) => {
                            log::warn!("Discarded malformed input: {}", e);
                            statistics.record_rejection(&e);
                        }
                    }
                }
            }
            Err(Dlt645Error::Timeout) => {
                statistics.increment_timeouts();
                match mode {
                    LinkMode::Tcp => {
                        log::info!("Connection idle, closing");
                        break;
                    }
                    LinkMode::Rtu => continue,
                }
            }
            Err(e) => {
                if mode == LinkMode::Tcp || stream.is_closed() {
                    log::info!("Link closed: {}", e);
                    break;
                }
                log::warn!("Read failed: {}", e);
            }
        }
    }

    if let Err(e) = stream.close().await {
        log::warn!("Failed to close link: {}", e);
    }
    log::debug!("Link statistics: {}", statistics);
    statistics
}

async fn dispatch<S, H>(stream: &mut S, handler: &H, frame: &Frame, statistics: &mut LinkStatistics)
where
    S: StreamAccessor,
    H: RequestHandler + ?Sized,
{
    log::debug!("Request: {}", frame);

    let response = match catch_unwind(AssertUnwindSafe(|| handler.handle_request(frame))) {
        Ok(Ok(Some(response))) if !response.is_empty() => response,
        Ok(Ok(_)) => return,
        Ok(Err(e)) => {
            log::error!("Handler failed on {}: {}", frame, e);
            return;
        }
        Err(_) => {
            log::error!("Handler panicked on {}", frame);
            return;
        }
    };

    log::debug!("TX: {}", to_spaced_hex(&response));
    let written = match stream.write_all(&response).await {
        Ok(()) => stream.flush().await,
        Err(e) => Err(e),
    };
    match written {
        Ok(()) => statistics.increment_frames_sent(),
        Err(e) => log::error!("Failed to send response: {}", e),
    }
}
