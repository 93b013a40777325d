use std::convert::Infallible;

use embedded_graphics::{
    mono_font::{ascii::FONT_10X20, MonoTextStyle},
    pixelcolor::Rgb888,
    prelude::*,
    primitives::{PrimitiveStyleBuilder, Rectangle, StrokeAlignment},
    text::{Baseline, Text},
};
use image::{Rgb, RgbImage};
use queue_vision::{Detection, DetectionFilter, PixelBox, RawDetections};
use queue_zones::OccupancyCount;

const BOX_COLOR: Rgb888 = Rgb888::new(255, 55, 0);
const TEXT_COLOR: Rgb888 = Rgb888::new(0, 255, 0);
const TEXT_X: i32 = 15;
const TEXT_Y: i32 = 25;
const LINE_STEP: i32 = 40;

/// Result of drawing one frame's detections.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotated {
    /// Accepted detections in the frame, regardless of zone.
    pub person_count: usize,
    pub accepted: Vec<Detection>,
}

#[derive(Debug, Clone)]
pub struct Annotator {
    filter: DetectionFilter,
    max_occupancy: u32,
}

impl Annotator {
    pub fn new(filter: DetectionFilter, max_occupancy: u32) -> Self {
        Self { filter, max_occupancy }
    }

    /// Outlines every accepted detection and hands the accepted set back for counting.
    pub fn draw_detections(&self, frame: &mut RgbImage, raw: &RawDetections) -> Annotated {
        let (w, h) = frame.dimensions();
        let accepted = self.filter.apply(raw, w, h);
        let mut target = Target(frame);
        for d in &accepted {
            draw_box(&mut target, &d.bbox);
        }
        Annotated { person_count: accepted.len(), accepted }
    }

    /// Stacks one status line per zone in the top-left corner.
    pub fn draw_occupancy(&self, frame: &mut RgbImage, occupancy: &OccupancyCount) {
        let style = MonoTextStyle::new(&FONT_10X20, TEXT_COLOR);
        let mut target = Target(frame);
        let mut y = TEXT_Y;
        for line in occupancy_lines(occupancy, self.max_occupancy) {
            match Text::with_baseline(&line, Point::new(TEXT_X, y), style, Baseline::Alphabetic).draw(&mut target) {
                Ok(_) => {}
                Err(infallible) => match infallible {},
            }
            y += LINE_STEP;
        }
    }
}

/// Overlay text for each zone, with a full notice at or above `max_occupancy`.
pub fn occupancy_lines(occupancy: &OccupancyCount, max_occupancy: u32) -> Vec<String> {
    occupancy
        .iter()
        .map(|(id, n)| {
            let mut line = format!("No. of People in Queue {} is {}", id, n);
            if n >= max_occupancy {
                line.push_str("  Queue full; Please move to next Queue");
            }
            line
        })
        .collect()
}

fn draw_box(target: &mut Target<'_>, b: &PixelBox) {
    // one pixel past each border keeps off-frame edges off-frame
    let size = target.size();
    let limit = |v: u32| v.min(i32::MAX as u32 - 1) as i32;
    let (w, h) = (limit(size.width), limit(size.height));
    let x0 = b.xmin.min(b.xmax).clamp(-1, w);
    let x1 = b.xmin.max(b.xmax).clamp(-1, w);
    let y0 = b.ymin.min(b.ymax).clamp(-1, h);
    let y1 = b.ymin.max(b.ymax).clamp(-1, h);
    let rect = Rectangle::new(Point::new(x0, y0), Size::new((x1 - x0) as u32 + 1, (y1 - y0) as u32 + 1));
    let style = PrimitiveStyleBuilder::new()
        .stroke_color(BOX_COLOR)
        .stroke_width(1)
        .stroke_alignment(StrokeAlignment::Inside)
        .build();
    match rect.into_styled(style).draw(target) {
        Ok(_) => {}
        Err(infallible) => match infallible {},
    }
}

struct Target<'a>(&'a mut RgbImage);

impl OriginDimensions for Target<'_> {
    fn size(&self) -> Size {
        let (width, height) = self.0.dimensions();
        Size { width, height }
    }
}

impl DrawTarget for Target<'_> {
    type Color = Rgb888;

    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let (width, height) = self.0.dimensions();
        for Pixel(p, c) in pixels {
            if p.x >= 0 && (p.x as u32) < width && p.y >= 0 && (p.y as u32) < height {
                self.0.put_pixel(p.x as u32, p.y as u32, Rgb([c.r(), c.g(), c.b()]));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use queue_vision::RawDetection;
    use queue_zones::{count_occupancy, ContainmentRule, Zone, ZoneRegistry};

    fn raw(confidence: f32, xmin: f32, xmax: f32) -> RawDetection {
        RawDetection { image_id: 0, class_id: 1, confidence, xmin, ymin: 0.25, xmax, ymax: 0.75 }
    }

    fn occupancy(counts: &[usize]) -> OccupancyCount {
        // zone i+1 holds counts[i] detections
        let zones: ZoneRegistry = (0..counts.len())
            .map(|i| Zone::new(i as i32 * 100, 0, i as i32 * 100 + 100, 100))
            .collect();
        let dets: Vec<Detection> = counts
            .iter()
            .enumerate()
            .flat_map(|(i, n)| {
                let x = i as i32 * 100;
                std::iter::repeat(Detection {
                    class_id: 1,
                    confidence: 0.9,
                    bbox: PixelBox { xmin: x + 10, ymin: 0, xmax: x + 90, ymax: 50 },
                })
                .take(*n)
            })
            .collect();
        count_occupancy(&zones, &dets, ContainmentRule::Horizontal)
    }

    #[test]
    fn full_notice_at_or_above_limit() {
        let lines = occupancy_lines(&occupancy(&[3, 1, 2]), 2);
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("No. of People in Queue 1 is 3"));
        assert!(lines[0].contains("Queue full"));
        assert!(!lines[1].contains("Queue full"));
        assert!(lines[2].contains("Queue full"));
    }

    #[test]
    fn no_zones_no_lines() {
        assert!(occupancy_lines(&OccupancyCount::default(), 2).is_empty());
    }

    #[test]
    fn low_confidence_is_neither_drawn_nor_returned() {
        let mut frame = RgbImage::new(100, 100);
        let ann = Annotator::new(DetectionFilter::new(0.6), 2);
        let out = ann.draw_detections(&mut frame, &RawDetections::single(vec![raw(0.59, 0.1, 0.5)]));
        assert_eq!(out.person_count, 0);
        assert!(out.accepted.is_empty());
        assert!(frame.pixels().all(|p| *p == Rgb([0, 0, 0])));
    }

    #[test]
    fn accepted_box_outline_is_drawn() {
        let mut frame = RgbImage::new(100, 100);
        let ann = Annotator::new(DetectionFilter::new(0.6), 2);
        let out = ann.draw_detections(&mut frame, &RawDetections::single(vec![raw(0.9, 0.125, 0.5), raw(0.1, 0.0, 1.0)]));
        assert_eq!(out.person_count, 1);
        assert_eq!(out.accepted[0].bbox, PixelBox { xmin: 12, ymin: 25, xmax: 50, ymax: 75 });
        let c = Rgb([255, 55, 0]);
        assert_eq!(*frame.get_pixel(12, 25), c);
        assert_eq!(*frame.get_pixel(50, 75), c);
        assert_eq!(*frame.get_pixel(30, 25), c);
        assert_eq!(*frame.get_pixel(30, 50), Rgb([0, 0, 0]));
    }

    #[test]
    fn boxes_past_the_border_are_clipped() {
        let mut frame = RgbImage::new(50, 50);
        let ann = Annotator::new(DetectionFilter::new(0.6), 2);
        let out = ann.draw_detections(&mut frame, &RawDetections::single(vec![raw(0.9, -0.5, 1.5)]));
        assert_eq!(out.person_count, 1);
        assert_eq!(*frame.get_pixel(10, 12), Rgb([255, 55, 0]));
    }

    #[test]
    fn extreme_boxes_are_clamped_to_the_frame() {
        let mut frame = RgbImage::new(40, 30);
        draw_box(&mut Target(&mut frame), &PixelBox { xmin: i32::MIN, ymin: 10, xmax: i32::MAX, ymax: 20 });
        let c = Rgb([255, 55, 0]);
        assert_eq!(*frame.get_pixel(0, 10), c);
        assert_eq!(*frame.get_pixel(39, 20), c);
        // side edges fall outside the frame
        assert_eq!(*frame.get_pixel(0, 15), Rgb([0, 0, 0]));
        assert_eq!(*frame.get_pixel(39, 15), Rgb([0, 0, 0]));
    }

    #[test]
    fn inverted_box_is_drawn_normalized() {
        let mut frame = RgbImage::new(40, 30);
        draw_box(&mut Target(&mut frame), &PixelBox { xmin: 30, ymin: 20, xmax: 10, ymax: 5 });
        assert_eq!(*frame.get_pixel(10, 5), Rgb([255, 55, 0]));
        assert_eq!(*frame.get_pixel(30, 20), Rgb([255, 55, 0]));
    }

    #[test]
    fn occupancy_text_is_drawn_in_green() {
        let mut frame = RgbImage::new(640, 200);
        let ann = Annotator::new(DetectionFilter::new(0.6), 2);
        ann.draw_occupancy(&mut frame, &occupancy(&[1, 0]));
        let green = frame.pixels().filter(|p| **p == Rgb([0, 255, 0])).count();
        assert!(green > 0);
        // nothing below the second line
        assert!(frame.enumerate_pixels().filter(|(_, y, _)| *y > 80).all(|(_, _, p)| *p == Rgb([0, 0, 0])));
    }
}
