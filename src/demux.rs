use crate::frame::RawFrame;
use bytes::Bytes;
use tracing::{trace, warn};

/// JPEG start-of-image marker
const SOI: [u8; 2] = [0xFF, 0xD8];
/// JPEG end-of-image marker
const EOI: [u8; 2] = [0xFF, 0xD9];

/// Default buffer ceiling before the demuxer truncates a stalled stream
pub const DEFAULT_BUFFER_CEILING: usize = 1024 * 1024;

/// Incremental parser that turns an unframed camera byte stream into
/// discrete JPEG frames.
///
/// Chunks are appended to an internal buffer in arrival order. Whenever the
/// buffer holds a start-of-image marker followed by an end-of-image marker,
/// the inclusive range between them is emitted as a [`RawFrame`] and the
/// buffer advances past the end marker. A start marker without a matching
/// end marker simply waits for more data.
///
/// The parser is purely marker-driven: it never validates image content.
/// Frames that fail to decode are a downstream concern.
pub struct FrameDemuxer {
    buffer: Vec<u8>,
    next_seq: u64,
    ceiling: usize,
    stall_count: u64,
}

impl FrameDemuxer {
    pub fn new() -> Self {
        Self::with_ceiling(DEFAULT_BUFFER_CEILING)
    }

    /// Create a demuxer with a custom buffer ceiling.
    ///
    /// If the buffer exceeds the ceiling without producing a frame, it is
    /// truncated to the most recent half-ceiling window instead of growing
    /// unboundedly. This protects against a malformed or stalled source.
    pub fn with_ceiling(ceiling: usize) -> Self {
        Self {
            buffer: Vec::new(),
            next_seq: 0,
            ceiling: ceiling.max(4),
            stall_count: 0,
        }
    }

    /// Feed a chunk of bytes and collect every complete frame it unlocks,
    /// in stream order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<RawFrame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();

        while let Some(start) = find_marker(&self.buffer, &SOI) {
            // Search for the end marker after the start marker's two bytes
            let Some(end_rel) = find_marker(&self.buffer[start + 2..], &EOI) else {
                break;
            };
            let end = start + 2 + end_rel + 2;

            let frame_bytes = Bytes::copy_from_slice(&self.buffer[start..end]);
            self.buffer.drain(..end);

            let frame = RawFrame::new(self.next_seq, frame_bytes);
            self.next_seq += 1;
            trace!("Demuxed frame {} ({} bytes)", frame.seq, frame.len());
            frames.push(frame);
        }

        if self.buffer.len() > self.ceiling {
            let keep = self.ceiling / 2;
            let cut = self.buffer.len() - keep;
            self.buffer.drain(..cut);
            self.stall_count += 1;
            warn!(
                "Frame parse stalled: truncated {} buffered bytes to most recent {} (stall #{})",
                cut + keep,
                keep,
                self.stall_count
            );
        }

        frames
    }

    /// Bytes currently buffered awaiting a complete frame
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Number of times the buffer ceiling forced a truncation
    pub fn stall_count(&self) -> u64 {
        self.stall_count
    }

    /// Sequence number the next emitted frame will carry
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }
}

impl Default for FrameDemuxer {
    fn default() -> Self {
        Self::new()
    }
}

fn find_marker(haystack: &[u8], marker: &[u8; 2]) -> Option<usize> {
    haystack.windows(2).position(|w| w == marker)
}
