// Core detection types shared by the engine, the wire protocol and consumers

use crate::bins::BinCategory;
use crate::error::{Error, Result};
use crate::geometry::BoundingBox;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The closed set of waste categories the detector is trained on
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WasteClass {
    Battery,
    Biological,
    Cardboard,
    Glass,
    Metal,
    Paper,
    Plastic,
    Textile,
    Trash,
}

impl WasteClass {
    /// All classes in model output order
    pub const ALL: [WasteClass; 9] = [
        WasteClass::Battery,
        WasteClass::Biological,
        WasteClass::Cardboard,
        WasteClass::Glass,
        WasteClass::Metal,
        WasteClass::Paper,
        WasteClass::Plastic,
        WasteClass::Textile,
        WasteClass::Trash,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WasteClass::Battery => "battery",
            WasteClass::Biological => "biological",
            WasteClass::Cardboard => "cardboard",
            WasteClass::Glass => "glass",
            WasteClass::Metal => "metal",
            WasteClass::Paper => "paper",
            WasteClass::Plastic => "plastic",
            WasteClass::Textile => "textile",
            WasteClass::Trash => "trash",
        }
    }

    /// Index of this class in the model's output head
    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Label the Vietnamese-trained checkpoint emits for this class
    pub fn model_label_vi(&self) -> &'static str {
        match self {
            WasteClass::Battery => "Pin",
            WasteClass::Biological => "Huu co",
            WasteClass::Cardboard => "Hop giay",
            WasteClass::Glass => "Thuy tinh",
            WasteClass::Metal => "Kim loai",
            WasteClass::Paper => "Giay",
            WasteClass::Plastic => "Nhua",
            WasteClass::Textile => "Vai",
            WasteClass::Trash => "Rac thai",
        }
    }

    /// Resolve a detector label: English names (any case) or Vietnamese model labels
    pub fn from_label(label: &str) -> Option<Self> {
        let trimmed = label.trim();
        Self::ALL.iter().copied().find(|class| {
            class.as_str().eq_ignore_ascii_case(trimmed) || class.model_label_vi() == trimmed
        })
    }

    /// Disposal bin for this class. Exhaustive by construction.
    pub fn bin_category(&self) -> BinCategory {
        match self {
            WasteClass::Cardboard
            | WasteClass::Glass
            | WasteClass::Metal
            | WasteClass::Paper
            | WasteClass::Plastic => BinCategory::Recyclable,
            WasteClass::Biological => BinCategory::Organic,
            WasteClass::Battery => BinCategory::Hazardous,
            WasteClass::Textile | WasteClass::Trash => BinCategory::General,
        }
    }
}

impl fmt::Display for WasteClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WasteClass {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        WasteClass::from_label(s).ok_or_else(|| Error::UnknownClass(s.to_string()))
    }
}

/// One object found in one frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class: WasteClass,
    /// Confidence in [0, 1]
    pub confidence: f32,
    /// Corner box in reference frame coordinates
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(class: WasteClass, confidence: f32, bbox: BoundingBox) -> Self {
        Self { class, confidence, bbox }
    }

    pub fn bin_category(&self) -> BinCategory {
        self.class.bin_category()
    }

    /// Confidence is a finite number in [0, 1]
    pub fn has_valid_confidence(&self) -> bool {
        self.confidence.is_finite() && (0.0..=1.0).contains(&self.confidence)
    }
}

/// Adapter-level diagnostics attached to a frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameDiagnostics {
    pub processing_ms: f32,
    pub low_light: bool,
}

/// Inference output for one frame, consumed once by the stabilizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameResult {
    pub frame_id: u64,
    pub timestamp_ms: u64,
    /// Descending confidence
    pub detections: Vec<Detection>,
    pub diagnostics: FrameDiagnostics,
}

impl FrameResult {
    /// Build a result, ordering detections by descending confidence
    pub fn new(frame_id: u64, timestamp_ms: u64, mut detections: Vec<Detection>) -> Self {
        sort_by_confidence(&mut detections);
        Self {
            frame_id,
            timestamp_ms,
            detections,
            diagnostics: FrameDiagnostics::default(),
        }
    }

    /// A frame in which nothing was seen
    pub fn empty(frame_id: u64, timestamp_ms: u64) -> Self {
        Self::new(frame_id, timestamp_ms, Vec::new())
    }

    pub fn with_diagnostics(mut self, diagnostics: FrameDiagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Top-ranked detection, skipping entries with unusable confidence
    pub fn top(&self) -> Option<&Detection> {
        self.detections.iter().find(|d| d.has_valid_confidence())
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}

/// Sort detections by descending confidence; NaN sinks to the end
pub fn sort_by_confidence(detections: &mut [Detection]) {
    detections.sort_by(|a, b| {
        let ka = if a.confidence.is_nan() { f32::NEG_INFINITY } else { a.confidence };
        let kb = if b.confidence.is_nan() { f32::NEG_INFINITY } else { b.confidence };
        kb.partial_cmp(&ka).unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Phase of the stabilization state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnginePhase {
    Idle,
    Accumulating,
    Stable,
    Decaying,
}

impl EnginePhase {
    /// A confirmed class is held (including the grace band while decaying)
    pub fn holds_class(&self) -> bool {
        matches!(self, EnginePhase::Stable | EnginePhase::Decaying)
    }
}

/// What the stabilizer reports after each frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StableEvent {
    /// A class met the stability bar this frame (rising edge only)
    Confirmed { class: WasteClass, confidence: f32 },
    /// Candidate support so far, for progress display
    StillAccumulating { class: WasteClass, progress: u32, target: u32 },
    /// Already stable and supported again this frame
    Holding { class: WasteClass, confidence: f32 },
    /// Stable class unsupported this frame, still inside the grace band
    Decaying { class: WasteClass, misses: u32, miss_budget: u32 },
    /// Previously stable class cleared
    Lost { class: WasteClass },
    /// Nothing qualifying and nothing stable
    NoSignal,
}

impl StableEvent {
    pub fn class(&self) -> Option<WasteClass> {
        match self {
            StableEvent::Confirmed { class, .. }
            | StableEvent::StillAccumulating { class, .. }
            | StableEvent::Holding { class, .. }
            | StableEvent::Decaying { class, .. }
            | StableEvent::Lost { class } => Some(*class),
            StableEvent::NoSignal => None,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, StableEvent::Confirmed { .. })
    }

    pub fn is_lost(&self) -> bool {
        matches!(self, StableEvent::Lost { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_label_accepts_english_and_vietnamese() {
        assert_eq!(WasteClass::from_label("battery"), Some(WasteClass::Battery));
        assert_eq!(WasteClass::from_label("Plastic"), Some(WasteClass::Plastic));
        assert_eq!(WasteClass::from_label("Huu co"), Some(WasteClass::Biological));
        assert_eq!(WasteClass::from_label("Rac thai"), Some(WasteClass::Trash));
        assert_eq!(WasteClass::from_label("person"), None);
        assert!("styrofoam".parse::<WasteClass>().is_err());
    }

    #[test]
    fn test_index_round_trip() {
        for (i, class) in WasteClass::ALL.iter().enumerate() {
            assert_eq!(class.index(), i);
            assert_eq!(WasteClass::from_index(i), Some(*class));
        }
        assert_eq!(WasteClass::from_index(9), None);
    }

    #[test]
    fn test_bin_mapping_is_total() {
        for class in WasteClass::ALL {
            let first = class.bin_category();
            assert!(BinCategory::ALL.contains(&first));
            assert_eq!(first, class.bin_category());
        }
        assert_eq!(WasteClass::Battery.bin_category(), BinCategory::Hazardous);
        assert_eq!(WasteClass::Biological.bin_category(), BinCategory::Organic);
        assert_eq!(WasteClass::Textile.bin_category(), BinCategory::General);
        assert_eq!(WasteClass::Glass.bin_category(), BinCategory::Recyclable);
    }

    #[test]
    fn test_frame_result_sorted() {
        let bbox = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let frame = FrameResult::new(
            1,
            0,
            vec![
                Detection::new(WasteClass::Paper, 0.3, bbox),
                Detection::new(WasteClass::Glass, f32::NAN, bbox),
                Detection::new(WasteClass::Metal, 0.9, bbox),
            ],
        );
        assert_eq!(frame.detections[0].class, WasteClass::Metal);
        assert_eq!(frame.detections[1].class, WasteClass::Paper);
        assert_eq!(frame.top().map(|d| d.class), Some(WasteClass::Metal));
    }

    #[test]
    fn test_top_skips_invalid_confidence() {
        let bbox = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let frame = FrameResult::new(1, 0, vec![Detection::new(WasteClass::Glass, 1.7, bbox)]);
        assert!(frame.top().is_none());
        assert!(FrameResult::empty(2, 0).top().is_none());
    }

    #[test]
    fn test_event_serialization_tagged() {
        let event = StableEvent::Confirmed { class: WasteClass::Battery, confidence: 0.9 };
        let json = serde_json::to_value(event).unwrap();
        assert_eq!(json["kind"], "confirmed");
        assert_eq!(json["class"], "battery");
        assert_eq!(StableEvent::NoSignal.class(), None);
    }
}
