//! Display-side bounding box smoothing
//!
//! Purely cosmetic: the smoothed box never feeds back into stabilization.

use greensort_core::{BoundingBox, Detection, SmoothingConfig, WasteClass};

/// Exponential moving average over the displayed box of one class
#[derive(Debug, Clone)]
pub struct BoxSmoother {
    config: SmoothingConfig,
    previous: Option<(WasteClass, BoundingBox)>,
}

impl BoxSmoother {
    pub fn new(config: SmoothingConfig) -> Self {
        Self { config, previous: None }
    }

    /// Blend `detection` into the running box
    ///
    /// Higher confidence moves the box faster. A class change or a jump with
    /// IoU under `snap_iou` restarts from the raw box.
    pub fn smooth(&mut self, detection: &Detection) -> BoundingBox {
        let raw = detection.bbox;
        if !self.config.enabled || !raw.is_valid() {
            return raw;
        }

        let smoothed = match self.previous {
            Some((class, prev))
                if class == detection.class && raw.iou(&prev) >= self.config.snap_iou =>
            {
                let confidence = detection.confidence.clamp(0.0, 1.0);
                let alpha = self.config.alpha * (0.5 + 0.5 * confidence);
                raw.blend(&prev, alpha)
            }
            _ => raw,
        };

        self.previous = Some((detection.class, smoothed));
        smoothed
    }

    /// Last smoothed box, if the class still matches
    pub fn last(&self, class: WasteClass) -> Option<BoundingBox> {
        self.previous.filter(|(c, _)| *c == class).map(|(_, b)| b)
    }

    pub fn reset(&mut self) {
        self.previous = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(class: WasteClass, confidence: f32, b: [f32; 4]) -> Detection {
        Detection::new(class, confidence, BoundingBox::from(b))
    }

    #[test]
    fn test_first_box_is_raw() {
        let mut s = BoxSmoother::new(SmoothingConfig::default());
        let d = det(WasteClass::Glass, 0.9, [10.0, 10.0, 110.0, 110.0]);
        assert_eq!(s.smooth(&d), d.bbox);
    }

    #[test]
    fn test_small_motion_is_blended() {
        let mut s = BoxSmoother::new(SmoothingConfig::default());
        s.smooth(&det(WasteClass::Glass, 1.0, [0.0, 0.0, 100.0, 100.0]));
        let out = s.smooth(&det(WasteClass::Glass, 1.0, [10.0, 0.0, 110.0, 100.0]));
        // alpha 0.6 at full confidence
        assert!((out.x1 - 6.0).abs() < 1e-4);
        assert!((out.x2 - 106.0).abs() < 1e-4);
    }

    #[test]
    fn test_low_confidence_moves_slower() {
        let mut hi = BoxSmoother::new(SmoothingConfig::default());
        let mut lo = BoxSmoother::new(SmoothingConfig::default());
        for s in [&mut hi, &mut lo] {
            s.smooth(&det(WasteClass::Metal, 1.0, [0.0, 0.0, 100.0, 100.0]));
        }
        let a = hi.smooth(&det(WasteClass::Metal, 1.0, [20.0, 0.0, 120.0, 100.0]));
        let b = lo.smooth(&det(WasteClass::Metal, 0.2, [20.0, 0.0, 120.0, 100.0]));
        assert!(a.x1 > b.x1);
    }

    #[test]
    fn test_snap_on_jump_or_class_change() {
        let mut s = BoxSmoother::new(SmoothingConfig::default());
        s.smooth(&det(WasteClass::Paper, 0.9, [0.0, 0.0, 100.0, 100.0]));

        let far = det(WasteClass::Paper, 0.9, [300.0, 300.0, 400.0, 400.0]);
        assert_eq!(s.smooth(&far), far.bbox);

        let other = det(WasteClass::Plastic, 0.9, [305.0, 300.0, 405.0, 400.0]);
        assert_eq!(s.smooth(&other), other.bbox);
        assert!(s.last(WasteClass::Paper).is_none());
        assert_eq!(s.last(WasteClass::Plastic), Some(other.bbox));
    }

    #[test]
    fn test_disabled_passthrough() {
        let config = SmoothingConfig { enabled: false, ..SmoothingConfig::default() };
        let mut s = BoxSmoother::new(config);
        s.smooth(&det(WasteClass::Glass, 1.0, [0.0, 0.0, 100.0, 100.0]));
        let d = det(WasteClass::Glass, 1.0, [10.0, 0.0, 110.0, 100.0]);
        assert_eq!(s.smooth(&d), d.bbox);
    }
}
