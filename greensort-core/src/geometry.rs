//! Bounding box geometry
//!
//! Boxes are expressed as corner coordinates `(x1, y1, x2, y2)` in the pixel
//! space of the frame that was sent to inference. Rescaling to a display
//! surface is a pure transform and never touches stabilization state.

use serde::{Deserialize, Serialize};

/// Width and height of a frame in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Reference resolution frames are captured at before inference
    pub const fn reference() -> Self {
        Self::new(640, 480)
    }

    pub fn area(&self) -> f32 {
        self.width as f32 * self.height as f32
    }
}

impl Default for FrameSize {
    fn default() -> Self {
        Self::reference()
    }
}

/// Axis-aligned box in corner form
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl From<[f32; 4]> for BoundingBox {
    fn from(v: [f32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BoundingBox> for [f32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

impl BoundingBox {
    pub const fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f32 {
        if !self.is_valid() {
            return 0.0;
        }
        self.width() * self.height()
    }

    /// Width over height; 1.0 for degenerate boxes
    pub fn aspect_ratio(&self) -> f32 {
        let h = self.height();
        if h > 0.0 && h.is_finite() {
            self.width() / h
        } else {
            1.0
        }
    }

    /// Fraction of `frame` covered by this box
    pub fn area_ratio(&self, frame: FrameSize) -> f32 {
        let frame_area = frame.area();
        if frame_area <= 0.0 {
            return 0.0;
        }
        self.area() / frame_area
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// Finite coordinates with strictly positive extent
    pub fn is_valid(&self) -> bool {
        let finite = self.x1.is_finite()
            && self.y1.is_finite()
            && self.x2.is_finite()
            && self.y2.is_finite();
        finite && self.x2 > self.x1 && self.y2 > self.y1
    }

    /// Intersection over union, 0.0 for disjoint or invalid boxes
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        if !self.is_valid() || !other.is_valid() {
            return 0.0;
        }

        let inter_x_min = self.x1.max(other.x1);
        let inter_y_min = self.y1.max(other.y1);
        let inter_x_max = self.x2.min(other.x2);
        let inter_y_max = self.y2.min(other.y2);

        if inter_x_max <= inter_x_min || inter_y_max <= inter_y_min {
            return 0.0;
        }

        let inter_area = (inter_x_max - inter_x_min) * (inter_y_max - inter_y_min);
        let union_area = self.area() + other.area() - inter_area;

        if union_area <= 0.0 || !union_area.is_finite() {
            return 0.0;
        }

        let iou = inter_area / union_area;
        if iou.is_finite() && (0.0..=1.0).contains(&iou) {
            iou
        } else {
            0.0
        }
    }

    /// Rescale from the coordinate space of `from` into `to`
    pub fn scale(&self, from: FrameSize, to: FrameSize) -> BoundingBox {
        if from.width == 0 || from.height == 0 {
            return *self;
        }
        let sx = to.width as f32 / from.width as f32;
        let sy = to.height as f32 / from.height as f32;
        BoundingBox::new(self.x1 * sx, self.y1 * sy, self.x2 * sx, self.y2 * sy)
    }

    /// Exponential blend: `alpha * self + (1 - alpha) * previous`
    pub fn blend(&self, previous: &BoundingBox, alpha: f32) -> BoundingBox {
        let a = alpha.clamp(0.0, 1.0);
        let mix = |curr: f32, prev: f32| a * curr + (1.0 - a) * prev;
        BoundingBox::new(
            mix(self.x1, previous.x1),
            mix(self.y1, previous.y1),
            mix(self.x2, previous.x2),
            mix(self.y2, previous.y2),
        )
    }
}
