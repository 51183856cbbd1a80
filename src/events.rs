use crate::camera::DetectedCamera;
use crate::effects::{EffectKind, EffectParams};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Outbound control-plane events pushed to every connected collaborator.
///
/// Variant and field names serialize to the wire protocol the kiosk UI
/// speaks: kebab-case event tags with camelCase payload fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
#[serde(rename_all_fields = "camelCase")]
pub enum BoothEvent {
    /// Live preview started (or failed to start when `success` is false)
    PreviewStarted { success: bool },
    /// Live preview stopped on request
    PreviewStopped,
    /// Preview could not be started or died unexpectedly
    PreviewError { error: String },
    /// The MJPEG fan-out endpoint is live
    MjpegStreamStarted { stream_url: String },
    /// The MJPEG fan-out endpoint stopped
    MjpegStreamStopped,
    /// A one-shot capture completed
    PhotoCaptured {
        filename: String,
        path: String,
        timestamp: u64,
    },
    /// A one-shot capture failed
    CaptureFailed { error: String },
    /// The active live-stream effect changed
    EffectChanged {
        effect: EffectKind,
        params: EffectParams,
    },
    /// Reply to a `get-effect` query
    CurrentEffect {
        effect: EffectKind,
        params: EffectParams,
    },
    /// Reply to a `detect-camera` query
    CameraDetected {
        success: bool,
        cameras: Vec<DetectedCamera>,
        count: usize,
    },
}

impl BoothEvent {
    /// Event tag as it appears on the wire, for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            BoothEvent::PreviewStarted { .. } => "preview-started",
            BoothEvent::PreviewStopped => "preview-stopped",
            BoothEvent::PreviewError { .. } => "preview-error",
            BoothEvent::MjpegStreamStarted { .. } => "mjpeg-stream-started",
            BoothEvent::MjpegStreamStopped => "mjpeg-stream-stopped",
            BoothEvent::PhotoCaptured { .. } => "photo-captured",
            BoothEvent::CaptureFailed { .. } => "capture-failed",
            BoothEvent::EffectChanged { .. } => "effect-changed",
            BoothEvent::CurrentEffect { .. } => "current-effect",
            BoothEvent::CameraDetected { .. } => "camera-detected",
        }
    }
}

/// Where a `set-effect` command should land
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
#[serde(rename_all_fields = "camelCase")]
pub enum EffectTarget {
    /// Apply to the live preview stream
    LiveStream,
    /// Apply to a stored capture, addressed by filename
    CapturedImage { filename: String },
}

/// Inbound control-plane commands from a collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "command", content = "data", rename_all = "kebab-case")]
#[serde(rename_all_fields = "camelCase")]
pub enum ControlCommand {
    DetectCamera,
    StartPreview {
        #[serde(default)]
        effect: Option<EffectKind>,
        #[serde(default)]
        params: Option<EffectParams>,
    },
    StopPreview,
    CapturePhoto {
        #[serde(default)]
        effect: Option<EffectKind>,
        #[serde(default)]
        params: Option<EffectParams>,
    },
    SetEffect {
        effect: EffectKind,
        #[serde(default)]
        params: EffectParams,
        #[serde(default)]
        target: Option<EffectTarget>,
    },
    GetEffect,
}

/// Async event bus fanning control-plane events to every collaborator
/// connection, built on a broadcast channel.
pub struct EventBus {
    sender: broadcast::Sender<BoothEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<BoothEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers.
    ///
    /// Returns the number of receivers the event reached. Zero receivers is
    /// normal when no collaborator is connected.
    pub fn publish(&self, event: BoothEvent) -> usize {
        let event_type = event.event_type();
        match self.sender.send(event) {
            Ok(count) => {
                trace!("Published {} to {} subscribers", event_type, count);
                count
            }
            Err(_) => {
                debug!("Published {} with no subscribers", event_type);
                0
            }
        }
    }

    /// Current number of subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_names() {
        let event = BoothEvent::MjpegStreamStarted {
            stream_url: "http://localhost:3001/stream.mjpg".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "mjpeg-stream-started");
        assert_eq!(json["data"]["streamUrl"], "http://localhost:3001/stream.mjpg");

        let event = BoothEvent::PhotoCaptured {
            filename: "photo_123.jpg".to_string(),
            path: "/uploads/photo_123.jpg".to_string(),
            timestamp: 123,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "photo-captured");
        assert_eq!(json["data"]["filename"], "photo_123.jpg");
    }

    #[test]
    fn test_command_wire_parsing() {
        let cmd: ControlCommand = serde_json::from_str(
            r#"{"command":"start-preview","data":{"effect":"grayscale","params":{"intensity":0.8}}}"#,
        )
        .unwrap();
        match cmd {
            ControlCommand::StartPreview { effect, params } => {
                assert_eq!(effect, Some(EffectKind::Grayscale));
                assert!((params.unwrap().intensity - 0.8).abs() < f32::EPSILON);
            }
            other => panic!("Unexpected command: {:?}", other),
        }

        let cmd: ControlCommand = serde_json::from_str(r#"{"command":"stop-preview"}"#).unwrap();
        assert_eq!(cmd, ControlCommand::StopPreview);

        let cmd: ControlCommand = serde_json::from_str(
            r#"{"command":"set-effect","data":{"effect":"sepia","target":{"kind":"captured-image","filename":"photo_1.jpg"}}}"#,
        )
        .unwrap();
        match cmd {
            ControlCommand::SetEffect { effect, target, .. } => {
                assert_eq!(effect, EffectKind::Sepia);
                assert_eq!(
                    target,
                    Some(EffectTarget::CapturedImage {
                        filename: "photo_1.jpg".to_string()
                    })
                );
            }
            other => panic!("Unexpected command: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_event_bus_fanout() {
        let bus = EventBus::new(16);
        let mut rx_a = bus.subscribe();
        let mut rx_b = bus.subscribe();

        let delivered = bus.publish(BoothEvent::PreviewStopped);
        assert_eq!(delivered, 2);

        assert_eq!(rx_a.recv().await.unwrap(), BoothEvent::PreviewStopped);
        assert_eq!(rx_b.recv().await.unwrap(), BoothEvent::PreviewStopped);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new(4);
        assert_eq!(bus.publish(BoothEvent::PreviewStopped), 0);
    }
}
