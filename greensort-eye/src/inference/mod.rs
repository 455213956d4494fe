//! Inference adapters
//!
//! The detector itself is a black box behind [`InferenceAdapter`]: one encoded
//! image in, zero or more ranked detections out.

pub mod remote;
pub mod scripted;

use crate::error::VisionError;
use crate::frame::DecodedFrame;
use async_trait::async_trait;
use greensort_core::Detection;

pub use remote::RemoteAdapter;
pub use scripted::ScriptedAdapter;

/// Trait for detector backends
#[async_trait]
pub trait InferenceAdapter: Send + Sync {
    /// Short description shown on the status endpoint
    fn name(&self) -> &str;

    /// Run detection on one frame. Ordering of the result is not assumed.
    async fn infer(&self, frame: &DecodedFrame) -> Result<Vec<Detection>, VisionError>;
}

/// Adapter used when no detector is configured; never sees anything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAdapter;

#[async_trait]
impl InferenceAdapter for NullAdapter {
    fn name(&self) -> &str {
        "null"
    }

    async fn infer(&self, _frame: &DecodedFrame) -> Result<Vec<Detection>, VisionError> {
        Ok(Vec::new())
    }
}
