use crate::frame::RawFrame;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, trace};
use uuid::Uuid;

/// Content type header for the multipart stream response
pub const STREAM_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=--frame";

/// Identifier for one subscribed viewer connection
pub type ViewerId = Uuid;

/// Fans demultiplexed frames out to every connected HTTP viewer.
///
/// Each viewer is an unbounded byte-chunk channel drained by its HTTP
/// response body. Registration, removal and publishing all go through the
/// same lock, so the viewer set is never observed mid-mutation. A failed
/// send removes only the failing viewer; delivery to the others proceeds.
///
/// No per-viewer pacing or backpressure queue is maintained: a slow viewer
/// accumulates latency in its channel until its connection drops. This is an
/// accepted simplification for kiosk-scale viewer counts.
pub struct StreamBroadcaster {
    viewers: Mutex<HashMap<ViewerId, mpsc::UnboundedSender<Bytes>>>,
}

impl StreamBroadcaster {
    pub fn new() -> Self {
        Self {
            viewers: Mutex::new(HashMap::new()),
        }
    }

    /// Register a new viewer and return its id plus the byte-chunk receiver
    /// to drain into the HTTP response. The multipart prologue is already
    /// queued on the channel.
    pub fn subscribe(&self) -> (ViewerId, mpsc::UnboundedReceiver<Bytes>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        // Prologue: opening boundary before the first frame part
        let _ = tx.send(Bytes::from_static(b"--frame\r\n"));

        let mut viewers = self.viewers.lock();
        viewers.insert(id, tx);
        info!("Viewer {} subscribed ({} total)", id, viewers.len());

        (id, rx)
    }

    /// Remove a viewer. Idempotent: removing an unknown id is a no-op.
    pub fn unsubscribe(&self, id: ViewerId) {
        let mut viewers = self.viewers.lock();
        if viewers.remove(&id).is_some() {
            info!("Viewer {} unsubscribed ({} remaining)", id, viewers.len());
        }
    }

    /// Deliver one frame to every registered viewer.
    ///
    /// Writes the per-frame header block, the frame bytes and the boundary
    /// delimiter. Returns the number of viewers that received the frame.
    pub fn publish(&self, frame: &RawFrame) -> usize {
        let header = Bytes::from(format!(
            "Content-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
            frame.len()
        ));
        let footer = Bytes::from_static(b"\r\n--frame\r\n");

        let mut viewers = self.viewers.lock();
        let mut failed: Vec<ViewerId> = Vec::new();

        for (id, sink) in viewers.iter() {
            let ok = sink.send(header.clone()).is_ok()
                && sink.send(frame.data.clone()).is_ok()
                && sink.send(footer.clone()).is_ok();
            if !ok {
                failed.push(*id);
            }
        }

        for id in &failed {
            viewers.remove(id);
            debug!("Viewer {} removed after write failure", id);
        }

        let delivered = viewers.len();
        trace!(
            "Published frame {} ({} bytes) to {} viewers",
            frame.seq,
            frame.len(),
            delivered
        );
        delivered
    }

    /// Current number of connected viewers
    pub fn viewer_count(&self) -> usize {
        self.viewers.lock().len()
    }

    /// Drop every viewer connection, ending their response bodies
    pub fn close_all(&self) {
        let mut viewers = self.viewers.lock();
        let count = viewers.len();
        viewers.clear();
        if count > 0 {
            info!("Closed {} viewer connections", count);
        }
    }
}

impl Default for StreamBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
