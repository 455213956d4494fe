//! Error types for greensort-eye

use greensort_core::Error as CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Frame too large: {size} bytes (limit {limit})")]
    FrameTooLarge { size: usize, limit: usize },

    #[error("Stale frame {frame_id} (last processed {last})")]
    StaleFrame { frame_id: u64, last: u64 },

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Base64 error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),
}

impl VisionError {
    /// Short machine-readable code for wire-level error messages
    pub fn code(&self) -> &'static str {
        match self {
            VisionError::MalformedFrame(_) | VisionError::Base64(_) | VisionError::Image(_) => {
                "malformed_frame"
            }
            VisionError::FrameTooLarge { .. } => "frame_too_large",
            VisionError::StaleFrame { .. } => "stale_frame",
            VisionError::Inference(_) | VisionError::Network(_) => "inference_failed",
            VisionError::Config(_) | VisionError::Core(_) => "internal",
        }
    }

    /// The frame is dropped but the session carries on
    pub fn is_frame_rejection(&self) -> bool {
        matches!(
            self,
            VisionError::MalformedFrame(_)
                | VisionError::Base64(_)
                | VisionError::Image(_)
                | VisionError::FrameTooLarge { .. }
                | VisionError::StaleFrame { .. }
        )
    }
}
