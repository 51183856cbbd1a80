pub mod broadcast;
pub mod camera;
pub mod config;
pub mod control;
pub mod coordinator;
pub mod demux;
pub mod effects;
pub mod error;
pub mod events;
pub mod frame;
pub mod server;
pub mod service;
pub mod storage;

pub use broadcast::{StreamBroadcaster, ViewerId};
pub use camera::{CameraProcessSupervisor, DetectedCamera, StreamHandle};
pub use config::BoothcamConfig;
pub use coordinator::{DeviceModeCoordinator, DeviceState};
pub use demux::FrameDemuxer;
pub use effects::{EffectKind, EffectParams, EffectsPipeline};
pub use error::{BoothcamError, CameraError, EffectError, Result, StreamError};
pub use events::{BoothEvent, ControlCommand, EffectTarget, EventBus};
pub use frame::RawFrame;
pub use service::BoothService;
pub use storage::{CaptureStore, CapturedImage, PhotoEntry};
