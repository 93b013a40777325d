use crate::{Detection, PixelBox, RawDetection, RawDetections};

/// Confidence (and optional class) gate applied to raw detector rows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionFilter {
    pub threshold: f32,
    /// Keep only this class id. `None` assumes a single-class person model.
    pub target_class: Option<i32>,
}

impl DetectionFilter {
    pub fn new(threshold: f32) -> Self {
        Self { threshold, target_class: None }
    }

    pub fn with_target_class(mut self, class_id: Option<i32>) -> Self {
        self.target_class = class_id;
        self
    }

    /// Strictly greater than the threshold; a row sitting exactly on it is rejected.
    pub fn accepts(&self, d: &RawDetection) -> bool {
        if let Some(c) = self.target_class {
            if d.class_id != c { return false; }
        }
        d.confidence > self.threshold
    }

    /// Accepted rows of the first image, in detector order, scaled to `width` x `height`.
    pub fn apply(&self, raw: &RawDetections, width: u32, height: u32) -> Vec<Detection> {
        raw.image(0)
            .iter()
            .filter(|d| self.accepts(d))
            .map(|d| Detection {
                class_id: d.class_id,
                confidence: d.confidence,
                bbox: PixelBox::from_normalized(d, width, height),
            })
            .collect()
    }
}
