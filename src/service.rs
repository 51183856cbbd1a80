use crate::broadcast::StreamBroadcaster;
use crate::camera::{CameraProcessSupervisor, FrameSink};
use crate::config::BoothcamConfig;
use crate::coordinator::{DeviceModeCoordinator, DeviceState};
use crate::effects::{EffectKind, EffectParams, EffectsPipeline};
use crate::error::{Result, StreamError};
use crate::events::{BoothEvent, ControlCommand, EffectTarget, EventBus};
use crate::frame::RawFrame;
use crate::storage::CaptureStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// The one explicit service object owning the booth's moving parts.
///
/// Construction wires event bus, coordinator, broadcaster, effects pipeline
/// and capture store from an injected configuration; `shutdown` tears the
/// stream and viewers down explicitly. Nothing lives in process-global
/// state.
pub struct BoothService {
    config: BoothcamConfig,
    event_bus: Arc<EventBus>,
    broadcaster: Arc<StreamBroadcaster>,
    supervisor: Arc<CameraProcessSupervisor>,
    coordinator: Arc<DeviceModeCoordinator>,
    effects: Arc<EffectsPipeline>,
    store: Arc<CaptureStore>,
    simulated: bool,
    cancel: CancellationToken,
}

impl BoothService {
    /// Build the service. Probes for a physical camera once; zero detected
    /// devices degrades to simulation mode with the same external contract.
    pub async fn new(config: BoothcamConfig) -> Result<Arc<Self>> {
        config.validate()?;

        let store = Arc::new(CaptureStore::new(&config.storage.uploads_dir)?);

        let simulated = if config.camera.simulate {
            info!("Simulation mode forced by configuration");
            true
        } else {
            let probe = CameraProcessSupervisor::new(
                config.camera.clone(),
                config.system.demux_buffer_ceiling,
                false,
            );
            match probe.detect().await {
                Ok(cameras) if !cameras.is_empty() => {
                    info!("Using camera: {}", cameras[0].model);
                    false
                }
                Ok(_) => {
                    warn!("No camera detected, degrading to simulation mode");
                    true
                }
                Err(e) => {
                    warn!("Camera detection failed ({}), degrading to simulation mode", e);
                    true
                }
            }
        };

        let supervisor = Arc::new(CameraProcessSupervisor::new(
            config.camera.clone(),
            config.system.demux_buffer_ceiling,
            simulated,
        ));
        let event_bus = Arc::new(EventBus::new(config.system.event_bus_capacity));
        let broadcaster = Arc::new(StreamBroadcaster::new());
        let effects = Arc::new(EffectsPipeline::new(config.effects.clone()));
        let cancel = CancellationToken::new();

        let frame_sink = spawn_frame_pump(
            Arc::clone(&broadcaster),
            Arc::clone(&effects),
            cancel.clone(),
        );

        let coordinator = DeviceModeCoordinator::new(
            Arc::clone(&supervisor),
            Arc::clone(&event_bus),
            Arc::clone(&store),
            frame_sink,
            Duration::from_millis(config.camera.settle_delay_ms),
            config.stream_url(),
        );

        Ok(Arc::new(Self {
            config,
            event_bus,
            broadcaster,
            supervisor,
            coordinator,
            effects,
            store,
            simulated,
            cancel,
        }))
    }

    pub fn config(&self) -> &BoothcamConfig {
        &self.config
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn broadcaster(&self) -> &Arc<StreamBroadcaster> {
        &self.broadcaster
    }

    pub fn effects(&self) -> &Arc<EffectsPipeline> {
        &self.effects
    }

    pub fn store(&self) -> &Arc<CaptureStore> {
        &self.store
    }

    pub fn coordinator(&self) -> &Arc<DeviceModeCoordinator> {
        &self.coordinator
    }

    pub fn is_simulated(&self) -> bool {
        self.simulated
    }

    pub fn state(&self) -> DeviceState {
        self.coordinator.state()
    }

    /// Serve HTTP and the control channel until shutdown
    pub async fn run(self: &Arc<Self>) -> Result<()> {
        let app = crate::server::router(Arc::clone(self));
        let addr = format!("{}:{}", self.config.server.host, self.config.server.port);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| StreamError::BindFailed {
                address: addr.clone(),
                source: e,
            })?;

        info!(
            "Booth server listening on {} ({})",
            addr,
            if self.simulated { "simulation mode" } else { "camera mode" }
        );

        let cancel = self.cancel.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await
            .map_err(|e| StreamError::StartupFailed {
                details: e.to_string(),
            })?;

        Ok(())
    }

    /// Stop the stream, drop all viewers and end `run`
    pub async fn shutdown(&self) {
        info!("Shutting down booth service");
        self.coordinator.shutdown().await;
        self.broadcaster.close_all();
        self.cancel.cancel();
    }

    /// Dispatch one control-plane command.
    ///
    /// State-change outcomes are published on the event bus so every
    /// collaborator stays in sync; query commands return a direct reply for
    /// the requesting connection only.
    pub async fn handle_command(self: &Arc<Self>, command: ControlCommand) -> Option<BoothEvent> {
        match command {
            ControlCommand::DetectCamera => {
                let reply = match self.supervisor.detect().await {
                    Ok(cameras) => BoothEvent::CameraDetected {
                        success: true,
                        count: cameras.len(),
                        cameras,
                    },
                    Err(e) => {
                        warn!("Camera detection failed: {}", e);
                        BoothEvent::CameraDetected {
                            success: false,
                            cameras: Vec::new(),
                            count: 0,
                        }
                    }
                };
                Some(reply)
            }

            ControlCommand::StartPreview { effect, params } => {
                if let Some(kind) = effect {
                    let params = params.unwrap_or_default();
                    self.effects.set_active(kind, params);
                    self.event_bus.publish(BoothEvent::EffectChanged {
                        effect: kind,
                        params,
                    });
                }
                if let Err(e) = self.coordinator.start_preview().await {
                    debug!("start-preview rejected: {}", e);
                }
                None
            }

            ControlCommand::StopPreview => {
                if let Err(e) = self.coordinator.stop_preview().await {
                    debug!("stop-preview rejected: {}", e);
                }
                None
            }

            ControlCommand::CapturePhoto { effect, params } => {
                // The capture sequence spans the settle delay; run it
                // detached so the control loop keeps answering commands
                let service = Arc::clone(self);
                tokio::spawn(async move {
                    match service.coordinator.capture().await {
                        Ok(image) => {
                            let kind = effect.unwrap_or(EffectKind::None);
                            if kind != EffectKind::None {
                                let params = params.unwrap_or_default();
                                match service.apply_to_photo(kind, params, &image.filename).await {
                                    Ok(processed) => {
                                        info!("Processed capture written as {}", processed)
                                    }
                                    Err(e) => warn!(
                                        "Failed to apply {:?} to {}: {}",
                                        kind, image.filename, e
                                    ),
                                }
                            }
                        }
                        Err(e) => debug!("capture-photo failed: {}", e),
                    }
                });
                None
            }

            ControlCommand::SetEffect {
                effect,
                params,
                target,
            } => match target {
                None | Some(EffectTarget::LiveStream) => {
                    self.effects.set_active(effect, params);
                    self.event_bus
                        .publish(BoothEvent::EffectChanged { effect, params });
                    None
                }
                Some(EffectTarget::CapturedImage { filename }) => {
                    let service = Arc::clone(self);
                    tokio::spawn(async move {
                        match service.apply_to_photo(effect, params, &filename).await {
                            Ok(processed) => {
                                info!("Applied {:?} to {} -> {}", effect, filename, processed);
                                service
                                    .event_bus
                                    .publish(BoothEvent::EffectChanged { effect, params });
                            }
                            Err(e) => warn!("Failed to apply {:?} to {}: {}", effect, filename, e),
                        }
                    });
                    None
                }
            },

            ControlCommand::GetEffect => {
                let (effect, params) = self.effects.active();
                Some(BoothEvent::CurrentEffect { effect, params })
            }
        }
    }

    /// Apply an effect to a stored capture, writing a processed sibling
    pub async fn apply_to_photo(
        &self,
        kind: EffectKind,
        params: EffectParams,
        filename: &str,
    ) -> Result<String> {
        let source = self.store.read(filename).await?;
        let processed = self.effects.apply(kind, params, source.into()).await?;
        self.store.write_processed(filename, &processed).await
    }
}

/// Spawn the frame pump: the single consumer that carries frames from the
/// supervisor's reader to the broadcaster, routing them through the effects
/// pipeline when a live effect is active.
///
/// The sink side only ever does a `try_send`, so the process reader never
/// blocks on pixel work; when the pump falls behind, excess frames are
/// dropped rather than queued. One consumer preserves per-viewer sequence
/// order.
fn spawn_frame_pump(
    broadcaster: Arc<StreamBroadcaster>,
    effects: Arc<EffectsPipeline>,
    cancel: CancellationToken,
) -> FrameSink {
    let (tx, mut rx) = mpsc::channel::<RawFrame>(4);

    tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                _ = cancel.cancelled() => break,
                received = rx.recv() => match received {
                    Some(frame) => frame,
                    None => break,
                },
            };

            let (kind, params) = effects.active();
            if kind == EffectKind::None {
                broadcaster.publish(&frame);
                continue;
            }

            match effects.apply(kind, params, frame.data.clone()).await {
                Ok(processed) => {
                    broadcaster.publish(&RawFrame {
                        seq: frame.seq,
                        timestamp: frame.timestamp,
                        data: processed,
                    });
                }
                Err(e) => {
                    warn!("Live effect {:?} failed ({}), publishing raw frame", kind, e);
                    broadcaster.publish(&frame);
                }
            }
        }
        debug!("Frame pump stopped");
    });

    Arc::new(move |frame: RawFrame| {
        if let Err(mpsc::error::TrySendError::Full(dropped)) = tx.try_send(frame) {
            trace!("Frame pump backlogged, dropping frame {}", dropped.seq);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::time::timeout;

    async fn test_service(tmp: &TempDir, settle_ms: u64) -> Arc<BoothService> {
        let mut config = BoothcamConfig::default();
        config.camera.simulate = true;
        config.camera.preview_fps = 30;
        config.camera.preview_resolution = (96, 72);
        config.camera.capture_resolution = (192, 144);
        config.camera.settle_delay_ms = settle_ms;
        config.storage.uploads_dir = tmp.path().to_string_lossy().to_string();
        BoothService::new(config).await.unwrap()
    }

    async fn wait_for_event(
        rx: &mut tokio::sync::broadcast::Receiver<BoothEvent>,
        event_type: &str,
    ) -> BoothEvent {
        timeout(Duration::from_secs(5), async {
            loop {
                let event = rx.recv().await.expect("event bus closed");
                if event.event_type() == event_type {
                    return event;
                }
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {}", event_type))
    }

    #[tokio::test]
    async fn test_no_camera_degrades_to_simulation_and_preview_works() {
        let tmp = TempDir::new().unwrap();
        let service = test_service(&tmp, 20).await;
        assert!(service.is_simulated());

        let mut rx = service.event_bus().subscribe();
        let (viewer_id, mut viewer) = service.broadcaster().subscribe();

        service
            .handle_command(ControlCommand::StartPreview {
                effect: None,
                params: None,
            })
            .await;
        wait_for_event(&mut rx, "preview-started").await;
        wait_for_event(&mut rx, "mjpeg-stream-started").await;

        // Synthetic frames reach the viewer as multipart chunks
        let mut saw_jpeg = false;
        for _ in 0..16 {
            let chunk = timeout(Duration::from_secs(5), viewer.recv())
                .await
                .expect("timed out waiting for stream chunk")
                .expect("viewer channel closed");
            if chunk.len() >= 2 && chunk[0] == 0xFF && chunk[1] == 0xD8 {
                saw_jpeg = true;
                break;
            }
        }
        assert!(saw_jpeg, "no JPEG payload reached the viewer");

        service.handle_command(ControlCommand::StopPreview).await;
        wait_for_event(&mut rx, "mjpeg-stream-stopped").await;
        service.broadcaster().unsubscribe(viewer_id);
        assert_eq!(service.state(), DeviceState::Idle);
    }

    #[tokio::test]
    async fn test_capture_while_streaming_sequence() {
        let tmp = TempDir::new().unwrap();
        let service = test_service(&tmp, 30).await;

        let mut rx = service.event_bus().subscribe();
        service
            .handle_command(ControlCommand::StartPreview {
                effect: None,
                params: None,
            })
            .await;
        wait_for_event(&mut rx, "mjpeg-stream-started").await;

        service
            .handle_command(ControlCommand::CapturePhoto {
                effect: None,
                params: None,
            })
            .await;

        // The documented sequence: stream stops, then the capture lands
        wait_for_event(&mut rx, "mjpeg-stream-stopped").await;
        let captured = wait_for_event(&mut rx, "photo-captured").await;

        let BoothEvent::PhotoCaptured { filename, .. } = captured else {
            panic!("expected photo-captured payload");
        };
        assert!(tmp.path().join(&filename).exists());

        // Device returns to idle; streaming is not resumed automatically
        assert_eq!(service.state(), DeviceState::Idle);
    }

    #[tokio::test]
    async fn test_effect_query_and_broadcast() {
        let tmp = TempDir::new().unwrap();
        let service = test_service(&tmp, 20).await;
        let mut rx = service.event_bus().subscribe();

        let reply = service.handle_command(ControlCommand::GetEffect).await;
        match reply {
            Some(BoothEvent::CurrentEffect { effect, .. }) => {
                assert_eq!(effect, EffectKind::None)
            }
            other => panic!("expected current-effect reply, got {:?}", other),
        }

        let params = EffectParams {
            intensity: 0.7,
            ..EffectParams::default()
        };
        service
            .handle_command(ControlCommand::SetEffect {
                effect: EffectKind::Sepia,
                params,
                target: None,
            })
            .await;
        wait_for_event(&mut rx, "effect-changed").await;

        let reply = service.handle_command(ControlCommand::GetEffect).await;
        match reply {
            Some(BoothEvent::CurrentEffect { effect, params }) => {
                assert_eq!(effect, EffectKind::Sepia);
                assert!((params.intensity - 0.7).abs() < f32::EPSILON);
            }
            other => panic!("expected current-effect reply, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_detect_reply_in_simulation_mode() {
        let tmp = TempDir::new().unwrap();
        let service = test_service(&tmp, 20).await;

        let reply = service.handle_command(ControlCommand::DetectCamera).await;
        match reply {
            Some(BoothEvent::CameraDetected {
                success,
                cameras,
                count,
            }) => {
                assert!(success);
                assert!(cameras.is_empty());
                assert_eq!(count, 0);
            }
            other => panic!("expected camera-detected reply, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_live_effect_flows_through_frame_pump() {
        let tmp = TempDir::new().unwrap();
        let service = test_service(&tmp, 20).await;
        let mut rx = service.event_bus().subscribe();
        let (_viewer_id, mut viewer) = service.broadcaster().subscribe();

        service
            .handle_command(ControlCommand::StartPreview {
                effect: Some(EffectKind::Grayscale),
                params: Some(EffectParams::default()),
            })
            .await;
        wait_for_event(&mut rx, "effect-changed").await;
        wait_for_event(&mut rx, "mjpeg-stream-started").await;

        // Frames still reach viewers with the effect pipeline in the path
        let mut saw_jpeg = false;
        for _ in 0..16 {
            let chunk = timeout(Duration::from_secs(5), viewer.recv())
                .await
                .expect("timed out waiting for stream chunk")
                .expect("viewer channel closed");
            if chunk.len() >= 2 && chunk[0] == 0xFF && chunk[1] == 0xD8 {
                saw_jpeg = true;
                break;
            }
        }
        assert!(saw_jpeg, "no processed frame reached the viewer");

        service.handle_command(ControlCommand::StopPreview).await;
    }

    #[tokio::test]
    async fn test_apply_to_photo_writes_processed_sibling() {
        let tmp = TempDir::new().unwrap();
        let service = test_service(&tmp, 20).await;

        let image = service.coordinator().capture().await.unwrap();
        let processed = service
            .apply_to_photo(
                EffectKind::Invert,
                EffectParams::default(),
                &image.filename,
            )
            .await
            .unwrap();

        assert!(processed.ends_with("_fx.jpg"));
        assert!(tmp.path().join(&processed).exists());
    }
}
