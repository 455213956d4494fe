//! greensort-eye: realtime detection pipeline
//!
//! Turns a stream of encoded camera frames into a flicker-free classification.
//! Frames are decoded, run through an [`InferenceAdapter`], filtered for
//! implausible boxes and fed to the [`Stabilizer`], whose events drive the
//! consumer-side [`GuidanceDebouncer`].

pub mod error;
pub mod frame;
pub mod inference;
pub mod presentation;
pub mod processing;
pub mod session;
pub mod stabilizer;

pub use error::VisionError;
pub use frame::{DecodedFrame, FrameDecoder};
pub use inference::{InferenceAdapter, NullAdapter, RemoteAdapter, ScriptedAdapter};
pub use presentation::{GuidanceDebouncer, PresentationChange};
pub use processing::{BoxSmoother, DetectionFilter};
pub use session::{BestGuess, FrameMetadata, FrameOutcome, RealtimeSession};
pub use stabilizer::{transition, Phase, StabilizationState, Stabilizer};
