use image::{Rgba, RgbaImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};
use serde::Serialize;

use crate::models::BoundingBox;

use super::OverlaySurface;

const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Where a label should be typeset. Glyph rendering is left to the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelPlacement {
    pub text: String,
    pub x: f64,
    pub y: f64,
    pub color: [u8; 4],
}

/// Transparent RGBA overlay. Rectangles are rasterized; labels are recorded.
pub struct RasterSurface {
    image: RgbaImage,
    labels: Vec<LabelPlacement>,
}

impl RasterSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::from_pixel(width, height, TRANSPARENT),
            labels: Vec::new(),
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn labels(&self) -> &[LabelPlacement] {
        &self.labels
    }

    pub fn is_blank(&self) -> bool {
        self.labels.is_empty() && self.image.pixels().all(|p| p.0[3] == 0)
    }
}

impl OverlaySurface for RasterSurface {
    fn resize(&mut self, width: u32, height: u32) {
        if self.image.dimensions() != (width, height) {
            self.image = RgbaImage::from_pixel(width, height, TRANSPARENT);
        }
    }

    fn clear(&mut self) {
        self.image.pixels_mut().for_each(|p| *p = TRANSPARENT);
        self.labels.clear();
    }

    fn stroke_rect(&mut self, rect: &BoundingBox, color: Rgba<u8>, line_width: u32) {
        let (surface_w, surface_h) = self.image.dimensions();
        let margin = f64::from(line_width);
        // Nothing beyond one stroke past the edge is visible.
        let clamp_x = |v: f64| to_pixel(v, -margin, f64::from(surface_w) + margin);
        let clamp_y = |v: f64| to_pixel(v, -margin, f64::from(surface_h) + margin);
        let left = clamp_x(rect.x);
        let top = clamp_y(rect.y);
        let right = clamp_x(rect.x + rect.width);
        let bottom = clamp_y(rect.y + rect.height);

        // The stroke straddles the path, like a canvas strokeRect.
        let half = (line_width / 2) as i64;
        for inset in -half..(i64::from(line_width) - half) {
            let width = right - left - 2 * inset;
            let height = bottom - top - 2 * inset;
            if width <= 0 || height <= 0 {
                continue;
            }
            let ring = Rect::at((left + inset) as i32, (top + inset) as i32)
                .of_size(width as u32, height as u32);
            draw_hollow_rect_mut(&mut self.image, ring, color);
        }
    }

    fn fill_text(&mut self, text: &str, x: f64, y: f64, color: Rgba<u8>) {
        self.labels.push(LabelPlacement {
            text: text.to_string(),
            x,
            y,
            color: color.0,
        });
    }
}

/// Rounds to a pixel inside `[min, max]`. NaN lands on `min`.
fn to_pixel(value: f64, min: f64, max: f64) -> i64 {
    if value.is_nan() {
        return min.round() as i64;
    }
    value.round().clamp(min, max) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RawDetection, Resolution};
    use crate::overlay::{DisplaySize, OverlayRenderer, IDENTIFIED_COLOR, UNIDENTIFIED_COLOR};

    #[test]
    fn new_surface_is_transparent() {
        assert!(RasterSurface::new(16, 9).is_blank());
    }

    #[test]
    fn draws_scaled_box_edges() {
        let renderer = OverlayRenderer::new(Resolution::new(1280, 720));
        let mut surface = RasterSurface::new(1, 1);
        let results = [RawDetection::identified(
            "u1",
            0.42,
            BoundingBox::new(100.0, 100.0, 200.0, 100.0),
        )];

        renderer.render(&results, DisplaySize::new(640.0, 360.0), &mut surface);

        assert_eq!(surface.image().dimensions(), (640, 360));
        assert_eq!(*surface.image().get_pixel(50, 50), IDENTIFIED_COLOR);
        assert_eq!(*surface.image().get_pixel(50, 70), IDENTIFIED_COLOR);
        assert_eq!(surface.image().get_pixel(100, 75).0[3], 0);
        assert_eq!(surface.labels()[0].text, "Similarity: 0.420");
        assert_eq!(surface.labels()[0].y, 45.0);
    }

    #[test]
    fn empty_render_wipes_previous_boxes() {
        let renderer = OverlayRenderer::new(Resolution::new(64, 36));
        let mut surface = RasterSurface::new(64, 36);
        let results = [RawDetection::visitor(BoundingBox::new(4.0, 4.0, 20.0, 20.0))];

        renderer.render(&results, DisplaySize::new(64.0, 36.0), &mut surface);
        assert_eq!(*surface.image().get_pixel(4, 4), UNIDENTIFIED_COLOR);
        assert!(surface.labels().is_empty());

        renderer.render(&[], DisplaySize::new(64.0, 36.0), &mut surface);
        assert!(surface.is_blank());
    }

    #[test]
    fn zero_size_box_draws_only_outer_ring() {
        let mut surface = RasterSurface::new(8, 8);
        surface.stroke_rect(&BoundingBox::new(2.0, 2.0, 0.0, 0.0), IDENTIFIED_COLOR, 3);
        assert_eq!(*surface.image().get_pixel(1, 1), IDENTIFIED_COLOR);
        assert_eq!(surface.image().get_pixel(3, 3).0[3], 0);
    }

    #[test]
    fn oversized_box_is_clipped_to_the_surface() {
        let renderer = OverlayRenderer::new(Resolution::new(1280, 720));
        let mut surface = RasterSurface::new(1, 1);
        let results = [RawDetection::visitor(BoundingBox::new(0.0, 0.0, 1e12, 1e12))];

        let boxes = renderer.render(&results, DisplaySize::new(640.0, 360.0), &mut surface);

        assert_eq!(boxes.len(), 1);
        assert_eq!(*surface.image().get_pixel(0, 0), UNIDENTIFIED_COLOR);
        assert_eq!(*surface.image().get_pixel(0, 200), UNIDENTIFIED_COLOR);
        assert_eq!(surface.image().get_pixel(320, 180).0[3], 0);
    }

    #[test]
    fn negative_and_non_finite_boxes_do_not_panic() {
        let mut surface = RasterSurface::new(32, 32);
        let malformed = [
            BoundingBox::new(-1e12, -1e12, 1e12, 1e12),
            BoundingBox::new(f64::NEG_INFINITY, 0.0, f64::INFINITY, 10.0),
            BoundingBox::new(f64::NAN, f64::NAN, 10.0, 10.0),
            BoundingBox::new(4.0, 4.0, -20.0, -20.0),
        ];
        for rect in &malformed {
            surface.stroke_rect(rect, IDENTIFIED_COLOR, 3);
        }

        // Far off-surface boxes leave nothing behind.
        let mut untouched = RasterSurface::new(32, 32);
        untouched.stroke_rect(&BoundingBox::new(-1e12, -1e12, 1e6, 1e6), IDENTIFIED_COLOR, 3);
        assert!(untouched.is_blank());
    }
}
