//! greensort-core: shared domain model for the GreenSort realtime service
//!
//! Waste classes and their bin categories, detections and per-frame results,
//! the stabilization events exchanged between engine and consumers, localized
//! disposal guidance, box geometry and the service configuration.

pub mod bins;
pub mod config;
pub mod error;
pub mod geometry;
pub mod types;

pub use bins::{BinCategory, Guidance, Locale};
pub use config::{
    ConfidenceScale, FastPathPolicy, FilterConfig, GreensortConfig, InferenceConfig,
    PresentationConfig, ServerConfig, SizeConstraint, SmoothingConfig, StabilizerConfig,
    TransportConfig,
};
pub use error::{ConfigError, Error, Result};
pub use geometry::{BoundingBox, FrameSize};
pub use types::{
    Detection, EnginePhase, FrameDiagnostics, FrameResult, StableEvent, WasteClass,
};
