use super::detect::{parse_auto_detect, DetectedCamera};
use super::simulate;
use crate::config::CameraConfig;
use crate::demux::FrameDemuxer;
use crate::error::{CameraError, Result};
use crate::frame::RawFrame;
use crate::storage::{CaptureStore, CapturedImage};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Informational stderr line gphoto2 emits when movie capture starts.
/// It is a status message, not an error.
const STREAM_STATUS_LINE: &str = "Capturing preview frames";

/// Callback invoked for every demultiplexed frame
pub type FrameSink = Arc<dyn Fn(RawFrame) + Send + Sync>;

/// Owns the lifecycle of the external camera-control process.
///
/// The device is a singleton exclusive resource: at most one streaming
/// process runs at a time, enforced by the mode coordinator which holds the
/// [`StreamHandle`]. In simulation mode the same contract is served by a
/// synthetic frame generator instead of a child process.
pub struct CameraProcessSupervisor {
    config: CameraConfig,
    demux_ceiling: usize,
    simulated: bool,
}

/// Handle to a running preview stream, returned by
/// [`CameraProcessSupervisor::start_stream`].
///
/// Dropping the handle does not stop the stream cleanly; call
/// [`StreamHandle::stop`] for the graceful-signal-then-kill sequence.
pub struct StreamHandle {
    mode: StreamMode,
    stop_timeout: Duration,
}

enum StreamMode {
    Process {
        child: Child,
        reader: JoinHandle<()>,
        stderr_task: JoinHandle<()>,
    },
    Simulated {
        cancel: CancellationToken,
        task: JoinHandle<()>,
    },
}

impl CameraProcessSupervisor {
    pub fn new(config: CameraConfig, demux_ceiling: usize, simulated: bool) -> Self {
        Self {
            config,
            demux_ceiling,
            simulated,
        }
    }

    pub fn is_simulated(&self) -> bool {
        self.simulated
    }

    /// Enumerate attached devices.
    ///
    /// Used only as a status/health signal; mode decisions never depend on
    /// the result.
    pub async fn detect(&self) -> Result<Vec<DetectedCamera>> {
        if self.simulated {
            return Ok(Vec::new());
        }

        let dur = Duration::from_millis(self.config.detect_timeout_ms);
        let mut cmd = Command::new(&self.config.gphoto2_path);
        cmd.arg("--auto-detect")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = timeout(dur, cmd.output())
            .await
            .map_err(|_| CameraError::ProcessTimeout {
                operation: "detect".to_string(),
                timeout_ms: self.config.detect_timeout_ms,
            })?
            .map_err(|e| CameraError::DetectFailed {
                details: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(CameraError::DetectFailed {
                details: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .into());
        }

        let cameras = parse_auto_detect(&String::from_utf8_lossy(&output.stdout));
        info!("Detected {} camera(s)", cameras.len());
        Ok(cameras)
    }

    /// Spawn the streaming process (or the synthetic generator) and pump
    /// demultiplexed frames into `on_frame`.
    ///
    /// The returned receiver fires when the stream source finishes for any
    /// reason, deliberate stop included; the caller decides whether the
    /// exit was expected.
    pub async fn start_stream(
        &self,
        on_frame: FrameSink,
    ) -> Result<(StreamHandle, oneshot::Receiver<()>)> {
        let stop_timeout = Duration::from_millis(self.config.stop_timeout_ms);
        let (exit_tx, exit_rx) = oneshot::channel();

        if self.simulated {
            let handle = self.start_simulated_stream(on_frame, exit_tx);
            return Ok((
                StreamHandle {
                    mode: handle,
                    stop_timeout,
                },
                exit_rx,
            ));
        }

        info!(
            "Starting streaming process: {} --stdout --capture-movie",
            self.config.gphoto2_path
        );

        let mut child = Command::new(&self.config.gphoto2_path)
            .arg("--stdout")
            .arg("--capture-movie")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CameraError::SpawnFailed {
                details: e.to_string(),
            })?;

        let mut stdout = child.stdout.take().ok_or_else(|| CameraError::SpawnFailed {
            details: "streaming process has no stdout pipe".to_string(),
        })?;
        let stderr = child.stderr.take();

        let demux_ceiling = self.demux_ceiling;
        let reader = tokio::spawn(async move {
            let mut demuxer = FrameDemuxer::with_ceiling(demux_ceiling);
            let mut buf = [0u8; 8192];

            loop {
                match stdout.read(&mut buf).await {
                    Ok(0) => {
                        debug!("Streaming process stdout closed");
                        break;
                    }
                    Ok(n) => {
                        for frame in demuxer.push(&buf[..n]) {
                            on_frame(frame);
                        }
                    }
                    Err(e) => {
                        warn!("Error reading streaming process stdout: {}", e);
                        break;
                    }
                }
            }

            let _ = exit_tx.send(());
        });

        let stderr_task = tokio::spawn(async move {
            let Some(stderr) = stderr else { return };
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if line.contains(STREAM_STATUS_LINE) {
                    debug!("gphoto2: {}", line.trim());
                } else if !line.trim().is_empty() {
                    warn!("gphoto2 stderr: {}", line.trim());
                }
            }
        });

        Ok((
            StreamHandle {
                mode: StreamMode::Process {
                    child,
                    reader,
                    stderr_task,
                },
                stop_timeout,
            },
            exit_rx,
        ))
    }

    fn start_simulated_stream(&self, on_frame: FrameSink, exit_tx: oneshot::Sender<()>) -> StreamMode {
        let (width, height) = self.config.preview_resolution;
        let fps = self.config.preview_fps.max(1);
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();

        info!(
            "Starting simulated preview stream ({}x{} @ {}fps)",
            width, height, fps
        );

        let task = tokio::spawn(async move {
            // Hold the sender so the exit channel closes when this task ends
            let _exit_tx = exit_tx;
            let mut ticker = interval(Duration::from_millis((1000 / fps as u64).max(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut seq = 0u64;

            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        match simulate::render_preview_frame(seq, width, height) {
                            Ok(jpeg) => {
                                on_frame(RawFrame::new(seq, jpeg.into()));
                                seq += 1;
                            }
                            Err(e) => {
                                error!("Synthetic frame render failed: {}", e);
                                break;
                            }
                        }
                    }
                }
            }
        });

        StreamMode::Simulated { cancel, task }
    }

    /// Perform a one-shot high-resolution capture.
    ///
    /// Spawns a dedicated capture invocation, waits for it to exit within
    /// the configured timeout (force-killing on expiry) and resolves with
    /// the resulting file's metadata. The caller is responsible for making
    /// sure no streaming process holds the device.
    pub async fn capture_one(&self, store: &CaptureStore) -> Result<CapturedImage> {
        let timestamp_ms = chrono::Utc::now().timestamp_millis() as u64;

        if self.simulated {
            return store
                .write_simulated(timestamp_ms, self.config.capture_resolution)
                .await;
        }

        let filename = CaptureStore::capture_filename(timestamp_ms);
        let target = store.dir().join(&filename);

        info!("Capturing image to {}", target.display());

        let mut child = Command::new(&self.config.gphoto2_path)
            .arg("--capture-image-and-download")
            .arg("--filename")
            .arg(&target)
            .arg("--skip-existing")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CameraError::SpawnFailed {
                details: e.to_string(),
            })?;

        let stderr = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let mut text = String::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_string(&mut text).await;
            }
            text
        });

        let dur = Duration::from_millis(self.config.capture_timeout_ms);
        let status = match timeout(dur, child.wait()).await {
            Ok(result) => result.map_err(|e| CameraError::SpawnFailed {
                details: e.to_string(),
            })?,
            Err(_) => {
                warn!(
                    "Capture process did not exit within {}ms, force-killing",
                    self.config.capture_timeout_ms
                );
                let _ = child.start_kill();
                let _ = child.wait().await;
                return Err(CameraError::ProcessTimeout {
                    operation: "capture".to_string(),
                    timeout_ms: self.config.capture_timeout_ms,
                }
                .into());
            }
        };

        let stderr_text = stderr_task.await.unwrap_or_default();
        if !stderr_text.trim().is_empty() {
            // gphoto2 reports progress on stderr even on success
            debug!("gphoto2 capture stderr: {}", stderr_text.trim());
        }

        if !status.success() {
            if stderr_text.contains("No camera found") {
                return Err(CameraError::NotFound.into());
            }
            return Err(CameraError::CaptureFailed {
                details: format!(
                    "capture process exited with {}: {}",
                    status,
                    stderr_text.trim()
                ),
            }
            .into());
        }

        store.find_by_timestamp(timestamp_ms).await
    }
}

impl StreamHandle {
    /// Stop the stream: graceful termination signal, bounded wait, then
    /// force-kill. Safe to call once; the coordinator owns the handle.
    pub async fn stop(self) -> Result<()> {
        match self.mode {
            StreamMode::Process {
                mut child,
                reader,
                stderr_task,
            } => {
                if let Some(pid) = child.id() {
                    debug!("Sending SIGINT to streaming process {}", pid);
                    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGINT) };
                    if rc != 0 {
                        warn!("Failed to signal streaming process {}", pid);
                    }
                }

                match timeout(self.stop_timeout, child.wait()).await {
                    Ok(Ok(status)) => {
                        info!("Streaming process exited with {}", status);
                    }
                    Ok(Err(e)) => {
                        warn!("Error waiting for streaming process: {}", e);
                    }
                    Err(_) => {
                        warn!(
                            "Streaming process ignored SIGINT for {:?}, force-killing",
                            self.stop_timeout
                        );
                        let _ = child.start_kill();
                        let _ = child.wait().await;
                    }
                }

                // Reader finishes on stdout EOF once the process is gone
                let _ = timeout(Duration::from_secs(1), reader).await;
                stderr_task.abort();
            }
            StreamMode::Simulated { cancel, task } => {
                cancel.cancel();
                let _ = timeout(Duration::from_secs(1), task).await;
                info!("Simulated preview stream stopped");
            }
        }

        Ok(())
    }
}
