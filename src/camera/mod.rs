mod detect;
pub mod simulate;
mod supervisor;
#[cfg(test)]
mod tests;

pub use detect::{parse_auto_detect, DetectedCamera};
pub use supervisor::{CameraProcessSupervisor, FrameSink, StreamHandle};
