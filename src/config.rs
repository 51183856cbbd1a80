use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BoothcamConfig {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub effects: EffectsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Path to the gphoto2 binary
    #[serde(default = "default_gphoto2_path")]
    pub gphoto2_path: String,

    /// Force simulation mode even when a camera is attached
    #[serde(default = "default_simulate")]
    pub simulate: bool,

    /// Synthetic preview frame rate in simulation mode
    #[serde(default = "default_preview_fps")]
    pub preview_fps: u32,

    /// Synthetic preview resolution (width, height)
    #[serde(default = "default_preview_resolution")]
    pub preview_resolution: (u32, u32),

    /// Synthetic capture resolution (width, height)
    #[serde(default = "default_capture_resolution")]
    pub capture_resolution: (u32, u32),

    /// Grace period before the streaming process is force-killed
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,

    /// Timeout for a one-shot capture invocation
    #[serde(default = "default_capture_timeout_ms")]
    pub capture_timeout_ms: u64,

    /// Timeout for device enumeration
    #[serde(default = "default_detect_timeout_ms")]
    pub detect_timeout_ms: u64,

    /// Pause between stopping the stream and issuing a capture, so the
    /// device driver can release its I/O channel
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EffectsConfig {
    /// Images wider or taller than this are downscaled before processing
    #[serde(default = "default_preview_max_dimension")]
    pub preview_max_dimension: u32,

    /// Maximum number of cached effect results
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Maximum concurrent effect worker tasks
    #[serde(default = "default_worker_permits")]
    pub worker_permits: usize,

    /// JPEG quality for processed output
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    /// Directory where captured photos are stored
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    /// IP address to bind to
    #[serde(default = "default_server_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_server_port")]
    pub port: u16,

    /// Hostname advertised to collaborators in stream URLs
    #[serde(default = "default_public_host")]
    pub public_host: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Event bus channel capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,

    /// Frame demuxer buffer ceiling in bytes
    #[serde(default = "default_demux_ceiling")]
    pub demux_buffer_ceiling: usize,
}

impl BoothcamConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("boothcam.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            // Configuration file is optional; defaults cover everything
            .add_source(File::with_name(&path_str).required(false))
            // Environment variables with BOOTHCAM_ prefix
            .add_source(Environment::with_prefix("BOOTHCAM").separator("_"))
            .build()?;

        let config: BoothcamConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.camera.preview_fps == 0 {
            return Err(ConfigError::Message(
                "Camera preview_fps must be greater than 0".to_string(),
            ));
        }

        if self.camera.preview_resolution.0 == 0 || self.camera.preview_resolution.1 == 0 {
            return Err(ConfigError::Message(
                "Camera preview_resolution must be greater than 0".to_string(),
            ));
        }

        if self.camera.capture_resolution.0 == 0 || self.camera.capture_resolution.1 == 0 {
            return Err(ConfigError::Message(
                "Camera capture_resolution must be greater than 0".to_string(),
            ));
        }

        if self.effects.preview_max_dimension == 0 {
            return Err(ConfigError::Message(
                "Effects preview_max_dimension must be greater than 0".to_string(),
            ));
        }

        if self.effects.cache_capacity == 0 {
            return Err(ConfigError::Message(
                "Effects cache_capacity must be greater than 0".to_string(),
            ));
        }

        if self.effects.worker_permits == 0 {
            return Err(ConfigError::Message(
                "Effects worker_permits must be greater than 0".to_string(),
            ));
        }

        if self.effects.jpeg_quality == 0 || self.effects.jpeg_quality > 100 {
            return Err(ConfigError::Message(
                "Effects jpeg_quality must be between 1 and 100".to_string(),
            ));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        if self.system.demux_buffer_ceiling == 0 {
            return Err(ConfigError::Message(
                "Demux buffer ceiling must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Stream URL advertised to collaborators
    pub fn stream_url(&self) -> String {
        format!(
            "http://{}:{}/stream.mjpg",
            self.server.public_host, self.server.port
        )
    }
}

impl Default for BoothcamConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig::default(),
            effects: EffectsConfig::default(),
            storage: StorageConfig::default(),
            server: ServerConfig::default(),
            system: SystemConfig::default(),
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            gphoto2_path: default_gphoto2_path(),
            simulate: default_simulate(),
            preview_fps: default_preview_fps(),
            preview_resolution: default_preview_resolution(),
            capture_resolution: default_capture_resolution(),
            stop_timeout_ms: default_stop_timeout_ms(),
            capture_timeout_ms: default_capture_timeout_ms(),
            detect_timeout_ms: default_detect_timeout_ms(),
            settle_delay_ms: default_settle_delay_ms(),
        }
    }
}

impl Default for EffectsConfig {
    fn default() -> Self {
        Self {
            preview_max_dimension: default_preview_max_dimension(),
            cache_capacity: default_cache_capacity(),
            worker_permits: default_worker_permits(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            uploads_dir: default_uploads_dir(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
            public_host: default_public_host(),
        }
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            event_bus_capacity: default_event_bus_capacity(),
            demux_buffer_ceiling: default_demux_ceiling(),
        }
    }
}

// Default value functions
fn default_gphoto2_path() -> String {
    "gphoto2".to_string()
}
fn default_simulate() -> bool {
    false
}
fn default_preview_fps() -> u32 {
    10
}
fn default_preview_resolution() -> (u32, u32) {
    (640, 480)
}
fn default_capture_resolution() -> (u32, u32) {
    (1600, 1200)
}
fn default_stop_timeout_ms() -> u64 {
    2000
}
fn default_capture_timeout_ms() -> u64 {
    10_000
}
fn default_detect_timeout_ms() -> u64 {
    5000
}
fn default_settle_delay_ms() -> u64 {
    3000
}

fn default_preview_max_dimension() -> u32 {
    1920
}
fn default_cache_capacity() -> usize {
    50
}
fn default_worker_permits() -> usize {
    2
}
fn default_jpeg_quality() -> u8 {
    85
}

fn default_uploads_dir() -> String {
    "./uploads".to_string()
}

fn default_server_host() -> String {
    "0.0.0.0".to_string()
}
fn default_server_port() -> u16 {
    3001
}
fn default_public_host() -> String {
    "localhost".to_string()
}

fn default_event_bus_capacity() -> usize {
    100
}
fn default_demux_ceiling() -> usize {
    1024 * 1024
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = BoothcamConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.camera.gphoto2_path, "gphoto2");
        assert_eq!(config.server.port, 3001);
        assert_eq!(config.system.demux_buffer_ceiling, 1024 * 1024);
    }

    #[test]
    fn test_config_validation() {
        let mut config = BoothcamConfig::default();
        config.camera.preview_fps = 0;
        assert!(config.validate().is_err());

        config.camera.preview_fps = 10;
        assert!(config.validate().is_ok());

        config.effects.jpeg_quality = 101;
        assert!(config.validate().is_err());

        config.effects.jpeg_quality = 85;
        config.effects.cache_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_stream_url() {
        let mut config = BoothcamConfig::default();
        config.server.public_host = "booth.local".to_string();
        config.server.port = 8081;
        assert_eq!(config.stream_url(), "http://booth.local:8081/stream.mjpg");
    }
}
