//! Plausibility filters for raw detector output

use greensort_core::types::sort_by_confidence;
use greensort_core::{Detection, FilterConfig, FrameSize};
use tracing::debug;

/// Drops boxes whose size or shape is implausible for their class
#[derive(Debug, Clone)]
pub struct DetectionFilter {
    config: FilterConfig,
    frame: FrameSize,
}

impl DetectionFilter {
    pub fn new(config: FilterConfig, frame: FrameSize) -> Self {
        Self { config, frame }
    }

    /// Keep plausible detections, ordered by descending confidence
    pub fn apply(&self, detections: Vec<Detection>) -> Vec<Detection> {
        let before = detections.len();
        let mut kept: Vec<Detection> = detections
            .into_iter()
            .filter(|d| d.bbox.is_valid() && d.has_valid_confidence())
            .filter(|d| !self.config.enabled || self.accepts(d))
            .collect();
        sort_by_confidence(&mut kept);

        if kept.len() != before {
            debug!("Filtered {} of {} detections", before - kept.len(), before);
        }
        kept
    }

    /// Size and aspect checks for a single detection
    pub fn accepts(&self, detection: &Detection) -> bool {
        let area = detection.bbox.area_ratio(self.frame);
        let min_area = if self.config.flat_classes.contains(&detection.class) {
            self.config.flat_min_area_ratio
        } else {
            self.config.min_area_ratio
        };
        if area < min_area {
            return false;
        }

        let Some(constraint) = self.config.constraints.get(&detection.class) else {
            return true;
        };

        if area > constraint.max_area && detection.confidence < self.config.oversize_min_confidence {
            return false;
        }

        let aspect = detection.bbox.aspect_ratio();
        let too_narrow = constraint.min_aspect.map_or(false, |lo| aspect < lo);
        let too_wide = constraint.max_aspect.map_or(false, |hi| aspect > hi);
        if (too_narrow || too_wide) && detection.confidence < self.config.aspect_min_confidence {
            return false;
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use greensort_core::{BoundingBox, WasteClass};
    use proptest::prelude::*;

    fn filter() -> DetectionFilter {
        DetectionFilter::new(FilterConfig::default(), FrameSize::reference())
    }

    fn det(class: WasteClass, confidence: f32, b: [f32; 4]) -> Detection {
        Detection::new(class, confidence, BoundingBox::from(b))
    }

    #[test]
    fn test_minimum_area() {
        let f = filter();
        // 60x50 = 3000px, just under 1% of 640x480
        assert!(!f.accepts(&det(WasteClass::Plastic, 0.9, [0.0, 0.0, 60.0, 50.0])));
        // 80x50 = 4000px, 1.3%
        assert!(f.accepts(&det(WasteClass::Plastic, 0.9, [0.0, 0.0, 80.0, 50.0])));
        // paper needs 2%
        assert!(!f.accepts(&det(WasteClass::Paper, 0.9, [0.0, 0.0, 80.0, 50.0])));
    }

    #[test]
    fn test_oversized_battery_needs_high_confidence() {
        let f = filter();
        // 300x240 = 23% of the frame
        let big = [100.0, 100.0, 400.0, 340.0];
        assert!(!f.accepts(&det(WasteClass::Battery, 0.80, big)));
        assert!(f.accepts(&det(WasteClass::Battery, 0.90, big)));
    }

    #[test]
    fn test_aspect_bounds() {
        let f = filter();
        // 400x40 -> aspect 10, area 5.2%
        let sliver = [0.0, 0.0, 400.0, 40.0];
        assert!(!f.accepts(&det(WasteClass::Glass, 0.7, sliver)));
        assert!(f.accepts(&det(WasteClass::Glass, 0.85, sliver)));
        // trash has no aspect bounds
        assert!(f.accepts(&det(WasteClass::Trash, 0.5, sliver)));
    }

    #[test]
    fn test_apply_drops_invalid_and_sorts() {
        let f = filter();
        let out = f.apply(vec![
            det(WasteClass::Metal, 0.6, [0.0, 0.0, 100.0, 100.0]),
            det(WasteClass::Glass, 0.9, [50.0, 50.0, 10.0, 10.0]),
            det(WasteClass::Plastic, 0.8, [0.0, 0.0, 100.0, 100.0]),
            det(WasteClass::Paper, f32::NAN, [0.0, 0.0, 200.0, 200.0]),
        ]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].class, WasteClass::Plastic);
        assert_eq!(out[1].class, WasteClass::Metal);
    }

    #[test]
    fn test_disabled_keeps_valid_boxes() {
        let config = FilterConfig { enabled: false, ..FilterConfig::default() };
        let f = DetectionFilter::new(config, FrameSize::reference());
        let out = f.apply(vec![det(WasteClass::Plastic, 0.9, [0.0, 0.0, 5.0, 5.0])]);
        assert_eq!(out.len(), 1);
    }

    proptest! {
        #[test]
        fn prop_output_is_sorted_subset(
            raw in prop::collection::vec(
                (0usize..9, 0.0f32..1.0, 0.0f32..640.0, 0.0f32..480.0, 1.0f32..400.0, 1.0f32..400.0),
                0..20,
            )
        ) {
            let input: Vec<Detection> = raw
                .iter()
                .map(|(c, conf, x, y, w, h)| {
                    det(WasteClass::ALL[*c], *conf, [*x, *y, x + w, y + h])
                })
                .collect();
            let out = filter().apply(input.clone());

            prop_assert!(out.len() <= input.len());
            prop_assert!(out.windows(2).all(|w| w[0].confidence >= w[1].confidence));
            for d in &out {
                prop_assert!(input.contains(d));
                prop_assert!(filter().accepts(d));
            }
        }
    }
}
