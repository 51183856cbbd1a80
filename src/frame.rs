use bytes::Bytes;
use std::time::SystemTime;

/// One complete encoded JPEG image extracted from the camera byte stream.
///
/// Frames are immutable once emitted by the demuxer. The payload is held in
/// a `Bytes` buffer so fan-out clones are cheap and the broadcaster never
/// borrows the producer's internal buffer.
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Monotonically increasing sequence number
    pub seq: u64,
    /// Timestamp when the frame was demultiplexed
    pub timestamp: SystemTime,
    /// Complete JPEG payload, start-of-image through end-of-image marker
    pub data: Bytes,
}

impl RawFrame {
    pub fn new(seq: u64, data: Bytes) -> Self {
        Self {
            seq,
            timestamp: SystemTime::now(),
            data,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Frame age in milliseconds
    pub fn age_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(self.timestamp)
            .unwrap_or_default()
            .as_millis() as u64
    }
}
