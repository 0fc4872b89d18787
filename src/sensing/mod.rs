pub mod capture;
pub mod frames;
pub mod gate;
pub mod phash;

pub use capture::{CaptureConfig, CaptureHealth, CaptureOutcome, FrameCapturer, CAPTURE_HEALTH_FILE};
pub use frames::{sample_evenly, DirectoryFrameSource, Frame, FrameSource};
pub use gate::{ChangeGate, FrameDiff, GateConfig, GateDecision, GateReason};
