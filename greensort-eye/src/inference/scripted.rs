//! Replays a fixed sequence of detection lists

use super::InferenceAdapter;
use crate::error::VisionError;
use crate::frame::DecodedFrame;
use async_trait::async_trait;
use greensort_core::Detection;
use parking_lot::Mutex;

/// Deterministic adapter for demos and tests
///
/// Each call returns the next scripted list; the script wraps around when
/// `looping` is set and yields empty lists once exhausted otherwise.
pub struct ScriptedAdapter {
    script: Vec<Vec<Detection>>,
    cursor: Mutex<usize>,
    looping: bool,
}

impl ScriptedAdapter {
    pub fn new(script: Vec<Vec<Detection>>) -> Self {
        Self {
            script,
            cursor: Mutex::new(0),
            looping: false,
        }
    }

    pub fn looping(script: Vec<Vec<Detection>>) -> Self {
        Self {
            looping: true,
            ..Self::new(script)
        }
    }

    /// Same detections on every call
    pub fn constant(detections: Vec<Detection>) -> Self {
        Self::looping(vec![detections])
    }

    pub fn calls(&self) -> usize {
        *self.cursor.lock()
    }
}

#[async_trait]
impl InferenceAdapter for ScriptedAdapter {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn infer(&self, _frame: &DecodedFrame) -> Result<Vec<Detection>, VisionError> {
        let mut cursor = self.cursor.lock();
        let index = *cursor;
        *cursor += 1;

        if self.script.is_empty() {
            return Ok(Vec::new());
        }
        let entry = if self.looping {
            self.script.get(index % self.script.len())
        } else {
            self.script.get(index)
        };
        Ok(entry.cloned().unwrap_or_default())
    }
}
