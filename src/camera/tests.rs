use super::*;
use crate::config::CameraConfig;
use crate::frame::RawFrame;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn simulated_config() -> CameraConfig {
    CameraConfig {
        preview_fps: 30,
        preview_resolution: (96, 72),
        capture_resolution: (192, 144),
        ..CameraConfig::default()
    }
}

fn collecting_sink() -> (FrameSink, Arc<Mutex<Vec<RawFrame>>>) {
    let collected: Arc<Mutex<Vec<RawFrame>>> = Arc::new(Mutex::new(Vec::new()));
    let sink_frames = Arc::clone(&collected);
    let sink: FrameSink = Arc::new(move |frame| {
        sink_frames.lock().push(frame);
    });
    (sink, collected)
}

#[tokio::test]
async fn test_simulated_stream_emits_frames() {
    let supervisor = CameraProcessSupervisor::new(simulated_config(), 1024 * 1024, true);
    let (sink, collected) = collecting_sink();

    let (handle, _exit_rx) = supervisor.start_stream(sink).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    handle.stop().await.unwrap();

    let frames = collected.lock();
    assert!(frames.len() >= 2, "expected frames, got {}", frames.len());

    // Frames are JPEG and carry monotonically increasing sequence numbers
    for (idx, frame) in frames.iter().enumerate() {
        assert_eq!(frame.seq, idx as u64);
        assert_eq!(&frame.data[..2], &[0xFF, 0xD8]);
        assert_eq!(&frame.data[frame.len() - 2..], &[0xFF, 0xD9]);
    }
}

#[tokio::test]
async fn test_simulated_stream_stops_emitting_after_stop() {
    let supervisor = CameraProcessSupervisor::new(simulated_config(), 1024 * 1024, true);
    let (sink, collected) = collecting_sink();

    let (handle, _exit_rx) = supervisor.start_stream(sink).await.unwrap();
    tokio::time::sleep(Duration::from_millis(120)).await;
    handle.stop().await.unwrap();

    let count_after_stop = collected.lock().len();
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(collected.lock().len(), count_after_stop);
}

#[tokio::test]
async fn test_simulated_detect_reports_no_cameras() {
    let supervisor = CameraProcessSupervisor::new(simulated_config(), 1024 * 1024, true);
    let cameras = supervisor.detect().await.unwrap();
    assert!(cameras.is_empty());
}

#[tokio::test]
async fn test_simulated_capture_writes_file() {
    let tmp = TempDir::new().unwrap();
    let store = crate::storage::CaptureStore::new(tmp.path()).unwrap();
    let supervisor = CameraProcessSupervisor::new(simulated_config(), 1024 * 1024, true);

    let captured = supervisor.capture_one(&store).await.unwrap();
    assert!(captured.filename.starts_with("photo_"));
    assert!(captured.size_bytes > 0);
    assert!(tmp.path().join(&captured.filename).exists());
}

#[tokio::test]
async fn test_missing_binary_fails_to_spawn() {
    let config = CameraConfig {
        gphoto2_path: "/nonexistent/gphoto2".to_string(),
        ..simulated_config()
    };
    let supervisor = CameraProcessSupervisor::new(config, 1024 * 1024, false);
    let (sink, _collected) = collecting_sink();

    match supervisor.start_stream(sink).await {
        Err(crate::error::BoothcamError::Camera(crate::error::CameraError::SpawnFailed {
            ..
        })) => {}
        Ok(_) => panic!("spawn of a nonexistent binary should fail"),
        Err(e) => panic!("unexpected error: {}", e),
    }
}

#[tokio::test]
async fn test_stream_exit_notification_fires() {
    let supervisor = CameraProcessSupervisor::new(simulated_config(), 1024 * 1024, true);
    let (sink, _collected) = collecting_sink();

    let (handle, exit_rx) = supervisor.start_stream(sink).await.unwrap();
    handle.stop().await.unwrap();

    // The generator task ended, so the exit channel resolves (closed)
    let result = tokio::time::timeout(Duration::from_secs(1), exit_rx).await;
    assert!(result.is_ok());
}
