use crate::camera::{CameraProcessSupervisor, FrameSink, StreamHandle};
use crate::error::{BoothcamError, Result};
use crate::events::{BoothEvent, EventBus};
use crate::storage::{CaptureStore, CapturedImage};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Exclusive-access mode of the single camera device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceState {
    Idle,
    Streaming,
    Capturing,
}

impl DeviceState {
    fn as_u8(self) -> u8 {
        match self {
            DeviceState::Idle => 0,
            DeviceState::Streaming => 1,
            DeviceState::Capturing => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => DeviceState::Streaming,
            2 => DeviceState::Capturing,
            _ => DeviceState::Idle,
        }
    }
}

struct Inner {
    state: DeviceState,
    stream: Option<StreamHandle>,
    /// Bumped on every stream start so stale exit notifications are ignored
    generation: u64,
}

/// Mutual-exclusion state machine over the camera device.
///
/// All transitions run inside one mutex held for the full transition,
/// including the stop-settle-capture sequence. A command arriving while a
/// transition is in flight is rejected with `InvalidTransition` rather than
/// queued; the caller retries after observing the resulting event.
pub struct DeviceModeCoordinator {
    inner: Mutex<Inner>,
    /// Lock-free snapshot of the current state for status endpoints and
    /// rejection errors while the transition lock is held
    state_mirror: AtomicU8,
    supervisor: Arc<CameraProcessSupervisor>,
    event_bus: Arc<EventBus>,
    store: Arc<CaptureStore>,
    frame_sink: FrameSink,
    settle_delay: Duration,
    stream_url: String,
}

impl DeviceModeCoordinator {
    pub fn new(
        supervisor: Arc<CameraProcessSupervisor>,
        event_bus: Arc<EventBus>,
        store: Arc<CaptureStore>,
        frame_sink: FrameSink,
        settle_delay: Duration,
        stream_url: String,
    ) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                state: DeviceState::Idle,
                stream: None,
                generation: 0,
            }),
            state_mirror: AtomicU8::new(DeviceState::Idle.as_u8()),
            supervisor,
            event_bus,
            store,
            frame_sink,
            settle_delay,
            stream_url,
        })
    }

    /// Current device state without waiting on an in-flight transition
    pub fn state(&self) -> DeviceState {
        DeviceState::from_u8(self.state_mirror.load(Ordering::SeqCst))
    }

    fn set_state(&self, inner: &mut Inner, state: DeviceState) {
        inner.state = state;
        self.state_mirror.store(state.as_u8(), Ordering::SeqCst);
        debug!("Device state -> {:?}", state);
    }

    fn try_transition(
        &self,
        requested: &'static str,
    ) -> Result<tokio::sync::MutexGuard<'_, Inner>> {
        self.inner
            .try_lock()
            .map_err(|_| BoothcamError::InvalidTransition {
                from: self.state(),
                requested,
            })
    }

    /// Start the live preview stream. Legal only from `Idle`.
    pub async fn start_preview(self: &Arc<Self>) -> Result<()> {
        let mut inner = match self.try_transition("start-preview") {
            Ok(guard) => guard,
            Err(e) => {
                self.event_bus.publish(BoothEvent::PreviewError {
                    error: e.to_string(),
                });
                return Err(e);
            }
        };

        if inner.state != DeviceState::Idle {
            let err = BoothcamError::InvalidTransition {
                from: inner.state,
                requested: "start-preview",
            };
            self.event_bus.publish(BoothEvent::PreviewError {
                error: err.to_string(),
            });
            return Err(err);
        }

        inner.generation += 1;
        let generation = inner.generation;

        match self.supervisor.start_stream(Arc::clone(&self.frame_sink)).await {
            Ok((handle, exit_rx)) => {
                inner.stream = Some(handle);
                self.set_state(&mut inner, DeviceState::Streaming);

                // Watch for the stream source dying out from under us
                let coordinator = Arc::clone(self);
                tokio::spawn(async move {
                    let _ = exit_rx.await;
                    coordinator.handle_stream_exit(generation).await;
                });

                info!("Preview stream started");
                self.event_bus
                    .publish(BoothEvent::PreviewStarted { success: true });
                self.event_bus.publish(BoothEvent::MjpegStreamStarted {
                    stream_url: self.stream_url.clone(),
                });
                Ok(())
            }
            Err(e) => {
                self.set_state(&mut inner, DeviceState::Idle);
                self.event_bus.publish(BoothEvent::PreviewError {
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Stop the live preview stream. A no-op from `Idle`.
    pub async fn stop_preview(&self) -> Result<()> {
        let mut inner = match self.try_transition("stop-preview") {
            Ok(guard) => guard,
            Err(e) => {
                self.event_bus.publish(BoothEvent::PreviewError {
                    error: e.to_string(),
                });
                return Err(e);
            }
        };

        match inner.state {
            DeviceState::Idle => {
                debug!("stop-preview while idle: no-op");
                self.event_bus.publish(BoothEvent::PreviewStopped);
                Ok(())
            }
            DeviceState::Capturing => {
                let err = BoothcamError::InvalidTransition {
                    from: inner.state,
                    requested: "stop-preview",
                };
                self.event_bus.publish(BoothEvent::PreviewError {
                    error: err.to_string(),
                });
                Err(err)
            }
            DeviceState::Streaming => {
                if let Some(handle) = inner.stream.take() {
                    if let Err(e) = handle.stop().await {
                        warn!("Error stopping stream: {}", e);
                    }
                }
                self.set_state(&mut inner, DeviceState::Idle);
                info!("Preview stream stopped");
                self.event_bus.publish(BoothEvent::PreviewStopped);
                self.event_bus.publish(BoothEvent::MjpegStreamStopped);
                Ok(())
            }
        }
    }

    /// One-shot capture. Legal from `Idle` or `Streaming`; a running stream
    /// is stopped first and the device given a settle delay before the
    /// capture process touches it. Streaming is never resumed automatically.
    pub async fn capture(&self) -> Result<CapturedImage> {
        let mut inner = match self.try_transition("capture-photo") {
            Ok(guard) => guard,
            Err(e) => {
                self.event_bus.publish(BoothEvent::CaptureFailed {
                    error: e.to_string(),
                });
                return Err(e);
            }
        };

        if inner.state == DeviceState::Capturing {
            let err = BoothcamError::InvalidTransition {
                from: inner.state,
                requested: "capture-photo",
            };
            self.event_bus.publish(BoothEvent::CaptureFailed {
                error: err.to_string(),
            });
            return Err(err);
        }

        if inner.state == DeviceState::Streaming {
            info!("Stopping stream before capture");
            if let Some(handle) = inner.stream.take() {
                if let Err(e) = handle.stop().await {
                    warn!("Error stopping stream before capture: {}", e);
                }
            }
            self.set_state(&mut inner, DeviceState::Capturing);
            self.event_bus.publish(BoothEvent::MjpegStreamStopped);

            // Let the device driver release its I/O channel; capturing
            // while the streaming process still holds it is a known
            // hardware failure mode
            debug!("Settling {:?} before capture", self.settle_delay);
            tokio::time::sleep(self.settle_delay).await;
        } else {
            self.set_state(&mut inner, DeviceState::Capturing);
        }

        let result = self.supervisor.capture_one(&self.store).await;
        self.set_state(&mut inner, DeviceState::Idle);

        match result {
            Ok(image) => {
                info!("Captured {}", image.filename);
                self.event_bus.publish(BoothEvent::PhotoCaptured {
                    filename: image.filename.clone(),
                    path: image.path.clone(),
                    timestamp: image.timestamp,
                });
                Ok(image)
            }
            Err(e) => {
                warn!("Capture failed: {}", e);
                self.event_bus.publish(BoothEvent::CaptureFailed {
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Reset to `Idle` after the stream source died without a stop request
    async fn handle_stream_exit(&self, generation: u64) {
        let mut inner = self.inner.lock().await;
        if inner.generation != generation || inner.state != DeviceState::Streaming {
            // Deliberate stop or a newer stream; nothing to do
            return;
        }

        warn!("Streaming process exited unexpectedly, returning to idle");
        inner.stream = None;
        self.set_state(&mut inner, DeviceState::Idle);
        self.event_bus.publish(BoothEvent::MjpegStreamStopped);
        self.event_bus.publish(BoothEvent::PreviewError {
            error: "streaming process exited unexpectedly".to_string(),
        });
    }

    /// Stop any running stream and return to `Idle`. Waits for an in-flight
    /// transition instead of rejecting; used on service shutdown.
    pub async fn shutdown(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(handle) = inner.stream.take() {
            if let Err(e) = handle.stop().await {
                warn!("Error stopping stream during shutdown: {}", e);
            }
        }
        self.set_state(&mut inner, DeviceState::Idle);
    }
}
