use crate::coordinator::DeviceState;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BoothcamError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Effect error: {0}")]
    Effect(#[from] EffectError),

    #[error("Invalid transition: {requested} is not allowed from {from:?}")]
    InvalidTransition {
        from: DeviceState,
        requested: &'static str,
    },
}

/// Errors raised by the external camera process and its supervision
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("No camera detected")]
    NotFound,

    #[error("Failed to spawn camera process: {details}")]
    SpawnFailed { details: String },

    #[error("Camera process timed out during {operation} after {timeout_ms}ms")]
    ProcessTimeout { operation: String, timeout_ms: u64 },

    #[error("Capture failed: {details}")]
    CaptureFailed { details: String },

    #[error("Camera detection failed: {details}")]
    DetectFailed { details: String },
}

/// Errors raised by the HTTP streaming server
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Failed to bind to {address}: {source}")]
    BindFailed {
        address: String,
        source: std::io::Error,
    },

    #[error("Server startup failed: {details}")]
    StartupFailed { details: String },
}

/// Errors raised by the effects pipeline
#[derive(Error, Debug)]
pub enum EffectError {
    #[error("Image decode failed: {details}")]
    Decode { details: String },

    #[error("Image encode failed: {details}")]
    Encode { details: String },

    #[error("Effect processing failed: {details}")]
    ProcessingFailed { details: String },
}

pub type Result<T> = std::result::Result<T, BoothcamError>;
