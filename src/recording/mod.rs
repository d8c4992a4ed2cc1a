//! Voice recording feature for babble.
//!
//! Capture lifecycle, real-time signal sampling, the recording state
//! machine, and the recorder UI.

pub mod artifact;
pub mod capture;
pub mod sampler;
pub mod state;
pub mod tap;
pub mod ui;

pub use artifact::{Artifact, ArtifactSlot};
pub use capture::{CaptureError, CaptureSession};
pub use sampler::{DriveSignals, SignalSampler};
pub use state::{reduce_from, CountdownTimer, Effect, RecordingEvent, RecordingState};
pub use ui::{RecorderCommand, RecorderTui};
