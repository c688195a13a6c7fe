//! Reassembly buffer for frames arriving in pieces
//!
//! Uses `bytes::BytesMut` so consumed bytes are released from the front without
//! copying the rest. The buffer never holds more than one maximum-size frame of
//! unparsed data: anything older cannot belong to a frame that is still arriving.

use crate::codec::{FrameCodec, ParseOutcome};
use crate::frame::{Frame, MAX_FRAME_LEN};
use bytes::{Buf, BytesMut};
use dlt645_core::Dlt645Result;

/// Accumulates stream chunks and yields frames as they complete
#[derive(Debug)]
pub struct FrameBuffer {
    buffer: BytesMut,
    max_len: usize,
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::with_max_len(MAX_FRAME_LEN)
    }

    /// Buffer keeping at most `max_len` unparsed bytes
    ///
    /// `max_len` below [`MAX_FRAME_LEN`] rejects frames with long data fields.
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(max_len),
            max_len,
        }
    }

    /// Append a chunk without extracting frames
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Extract the next frame
    ///
    /// Returns `None` when more data is needed, `Some(Err(_))` after discarding bytes
    /// that cannot form a frame.
    pub fn next_frame(&mut self, codec: &FrameCodec) -> Option<Dlt645Result<Frame>> {
        if self.buffer.is_empty() {
            return None;
        }

        match codec.parse(&self.buffer) {
            ParseOutcome::NeedMoreData => {
                self.enforce_bound();
                None
            }
            ParseOutcome::Malformed { error, discard } => {
                log::debug!("Discarding {} buffered bytes: {}", discard, error);
                self.buffer.advance(discard);
                Some(Err(error))
            }
            ParseOutcome::Complete { frame, consumed } => {
                self.buffer.advance(consumed);
                Some(Ok(frame))
            }
        }
    }

    /// Append a chunk and extract every frame it completes, in arrival order
    pub fn push(&mut self, data: &[u8], codec: &FrameCodec) -> Vec<Dlt645Result<Frame>> {
        self.extend(data);
        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame(codec) {
            frames.push(frame);
        }
        frames
    }

    /// Whether the buffered bytes hold a structurally complete frame
    pub fn is_structurally_complete(&self) -> bool {
        FrameCodec::is_structurally_complete(&self.buffer)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Take all buffered bytes, leaving the buffer empty
    pub fn take(&mut self) -> Vec<u8> {
        self.buffer.split().to_vec()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    fn enforce_bound(&mut self) {
        if self.buffer.len() > self.max_len {
            let excess = self.buffer.len() - self.max_len;
            log::warn!("Reassembly buffer full, dropping {} oldest bytes", excess);
            self.buffer.advance(excess);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::ControlCode;
    use dlt645_core::config::default_registry;
    use dlt645_core::{Address, DataIdentifier, Dlt645Error, FixedPoint, Value};
    use std::sync::Arc;

    fn codec() -> FrameCodec {
        FrameCodec::new(Arc::new(default_registry().unwrap()))
    }

    fn response(value: i64) -> (Frame, Vec<u8>) {
        let frame = Frame::read_response(
            Address::new([0, 0, 0, 0, 0, 1]),
            DataIdentifier::new(0x0001_0000),
            Value::Number(FixedPoint::new(value, 2)),
        );
        let bytes = codec().encode(&frame).unwrap();
        (frame, bytes)
    }

    #[test]
    fn test_byte_by_byte() {
        let codec = codec();
        let (frame, bytes) = response(12_345);
        let mut buffer = FrameBuffer::new();

        for (i, byte) in bytes.iter().enumerate() {
            let frames = buffer.push(&[*byte], &codec);
            if i + 1 < bytes.len() {
                assert!(frames.is_empty(), "frame completed early at byte {i}");
            } else {
                assert_eq!(frames.len(), 1);
                assert_eq!(frames[0].as_ref().unwrap(), &frame);
            }
        }
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_every_split_point() {
        let codec = codec();
        let (frame, bytes) = response(1);
        for split in 1..bytes.len() {
            let mut buffer = FrameBuffer::new();
            assert!(buffer.push(&bytes[..split], &codec).is_empty());
            assert!(!buffer.is_structurally_complete());
            let frames = buffer.push(&bytes[split..], &codec);
            assert_eq!(frames.len(), 1, "split at {split}");
            assert_eq!(frames[0].as_ref().unwrap(), &frame);
        }
    }

    #[test]
    fn test_two_frames_in_one_chunk() {
        let codec = codec();
        let (first, mut bytes) = response(1);
        let (second, more) = response(2);
        bytes.extend_from_slice(&more);

        let frames: Vec<Frame> = FrameBuffer::new()
            .push(&bytes, &codec)
            .into_iter()
            .map(|f| f.unwrap())
            .collect();
        assert_eq!(frames, vec![first, second]);
    }

    #[test]
    fn test_garbage_then_frame() {
        let codec = codec();
        let (frame, bytes) = response(7);
        let mut buffer = FrameBuffer::new();

        let results = buffer.push(&[0x01, 0x02, 0x03], &codec);
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(Dlt645Error::NoStartMarker)));
        assert!(buffer.is_empty());

        let frames = buffer.push(&bytes, &codec);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref().unwrap(), &frame);
    }

    #[test]
    fn test_corrupted_frame_is_discarded() {
        let codec = codec();
        let (_, mut bad) = response(1);
        bad[12] ^= 0x10;
        let (good, bytes) = response(2);
        bad.extend_from_slice(&bytes);

        let results = FrameBuffer::new().push(&bad, &codec);
        assert_eq!(results.len(), 2);
        assert!(matches!(results[0], Err(Dlt645Error::ChecksumMismatch { .. })));
        assert_eq!(results[1].as_ref().unwrap(), &good);
    }

    #[test]
    fn test_bounded() {
        let codec = codec();
        let mut buffer = FrameBuffer::with_max_len(32);
        // header announcing a long data field that never completes
        buffer.extend(&[0x68, 0, 0, 0, 0, 0, 0, 0x68, 0x91, 0xF0]);
        buffer.extend(&[0x33; 40]);
        assert!(buffer.next_frame(&codec).is_none());
        assert_eq!(buffer.len(), 32);
    }

    #[test]
    fn test_take() {
        let (_, bytes) = response(3);
        let mut buffer = FrameBuffer::new();
        buffer.extend(&bytes);
        assert!(buffer.is_structurally_complete());
        assert_eq!(buffer.take(), bytes);
        assert!(buffer.is_empty());
    }
}
