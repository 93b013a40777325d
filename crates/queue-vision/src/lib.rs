mod filter;
pub mod config;
#[cfg(feature = "vision-tflite")]
pub mod tflite;

use anyhow::Result;
use image::RgbImage;

pub use filter::DetectionFilter;

/// One row of detector output. The box is normalized to 0..1 of the frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawDetection {
    pub image_id: i32,
    pub class_id: i32,
    pub confidence: f32,
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
}

/// Detector output, indexed `[image][detection]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawDetections {
    images: Vec<Vec<RawDetection>>,
}

impl RawDetections {
    pub fn new(images: Vec<Vec<RawDetection>>) -> Self {
        Self { images }
    }

    /// Output of a detector that ran on a single image.
    pub fn single(rows: Vec<RawDetection>) -> Self {
        Self { images: vec![rows] }
    }

    /// Rows for image `idx`; empty when the detector produced nothing for it.
    pub fn image(&self, idx: usize) -> &[RawDetection] {
        self.images.get(idx).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelBox {
    pub xmin: i32,
    pub ymin: i32,
    pub xmax: i32,
    pub ymax: i32,
}

impl PixelBox {
    /// Scales a normalized box to a `width` x `height` frame, truncating toward zero.
    pub fn from_normalized(d: &RawDetection, width: u32, height: u32) -> Self {
        let (w, h) = (width as f32, height as f32);
        Self {
            xmin: (d.xmin * w) as i32,
            ymin: (d.ymin * h) as i32,
            xmax: (d.xmax * w) as i32,
            ymax: (d.ymax * h) as i32,
        }
    }
}

/// A detection that passed the confidence (and class) filter, in frame pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub class_id: i32,
    pub confidence: f32,
    pub bbox: PixelBox,
}

pub trait Detector: Send {
    /// Runs one synchronous inference on `frame`.
    fn detect(&mut self, frame: &RgbImage) -> Result<RawDetections>;
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    fn detect(&mut self, frame: &RgbImage) -> Result<RawDetections> {
        (**self).detect(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_box_truncates_toward_zero() {
        let d = RawDetection {
            image_id: 0, class_id: 1, confidence: 0.9,
            xmin: 0.2349, ymin: 0.1, xmax: 0.75, ymax: 0.999,
        };
        let b = PixelBox::from_normalized(&d, 640, 480);
        assert_eq!(b, PixelBox { xmin: 150, ymin: 48, xmax: 480, ymax: 479 });
    }

    #[test]
    fn missing_image_is_empty() {
        let raw = RawDetections::default();
        assert!(raw.image(0).is_empty());
        assert!(RawDetections::single(vec![]).image(1).is_empty());
    }
}
