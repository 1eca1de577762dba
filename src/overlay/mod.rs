//! Bounding-box overlay drawn over the live video.
//!
//! Boxes arrive in sampled-frame coordinates and are scaled to whatever size
//! the video element currently occupies on screen.
mod raster;

pub use raster::{LabelPlacement, RasterSurface};

use image::Rgba;
use serde::Serialize;

use crate::models::{BoundingBox, RawDetection, Resolution};

pub const IDENTIFIED_COLOR: Rgba<u8> = Rgba([0x22, 0xc5, 0x5e, 0xff]);
pub const UNIDENTIFIED_COLOR: Rgba<u8> = Rgba([0xea, 0xb3, 0x08, 0xff]);
pub const LINE_WIDTH: u32 = 3;
/// Labels sit this many pixels above the top edge of their box.
pub const LABEL_OFFSET: f64 = 5.0;

/// On-screen size of the video element, in (possibly fractional) pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DisplaySize {
    pub width: f64,
    pub height: f64,
}

impl DisplaySize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScaleFactor {
    pub x: f64,
    pub y: f64,
}

impl ScaleFactor {
    pub fn between(sampling: Resolution, display: DisplaySize) -> Self {
        let ratio = |shown: f64, sampled: u32| {
            if sampled == 0 {
                0.0
            } else {
                shown / f64::from(sampled)
            }
        };
        Self {
            x: ratio(display.width, sampling.width),
            y: ratio(display.height, sampling.height),
        }
    }

    pub fn apply(&self, rect: &BoundingBox) -> BoundingBox {
        BoundingBox {
            x: rect.x * self.x,
            y: rect.y * self.y,
            width: rect.width * self.x,
            height: rect.height * self.y,
        }
    }
}

/// A transparent drawing surface stacked over the video.
pub trait OverlaySurface {
    /// Matches the backing store to the displayed size. Implementations may
    /// discard existing content.
    fn resize(&mut self, width: u32, height: u32);

    fn clear(&mut self);

    fn stroke_rect(&mut self, rect: &BoundingBox, color: Rgba<u8>, line_width: u32);

    fn fill_text(&mut self, text: &str, x: f64, y: f64, color: Rgba<u8>);
}

/// One box as drawn, in display coordinates.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayBox {
    pub rect: BoundingBox,
    #[serde(serialize_with = "serialize_color")]
    pub color: Rgba<u8>,
    pub label: String,
}

fn serialize_color<S: serde::Serializer>(color: &Rgba<u8>, serializer: S) -> Result<S::Ok, S::Error> {
    let [r, g, b, _] = color.0;
    serializer.serialize_str(&format!("#{r:02x}{g:02x}{b:02x}"))
}

#[derive(Debug, Clone, Copy)]
pub struct OverlayRenderer {
    sampling: Resolution,
}

impl OverlayRenderer {
    pub fn new(sampling: Resolution) -> Self {
        Self { sampling }
    }

    /// Redraws the whole surface. With no results the surface is left cleared,
    /// so boxes from an earlier frame never linger.
    pub fn render(
        &self,
        results: &[RawDetection],
        display: DisplaySize,
        surface: &mut dyn OverlaySurface,
    ) -> Vec<OverlayBox> {
        surface.resize(display.width.max(0.0) as u32, display.height.max(0.0) as u32);
        surface.clear();

        let scale = ScaleFactor::between(self.sampling, display);
        let boxes: Vec<OverlayBox> = results.iter().map(|result| style(result, &scale)).collect();

        for overlay in &boxes {
            surface.stroke_rect(&overlay.rect, overlay.color, LINE_WIDTH);
            if !overlay.label.is_empty() {
                surface.fill_text(
                    &overlay.label,
                    overlay.rect.x,
                    overlay.rect.y - LABEL_OFFSET,
                    overlay.color,
                );
            }
        }
        boxes
    }
}

fn style(result: &RawDetection, scale: &ScaleFactor) -> OverlayBox {
    let rect = scale.apply(&result.bounding_box);
    match result.subject() {
        Some(_) => OverlayBox {
            rect,
            color: IDENTIFIED_COLOR,
            label: format!("Similarity: {}", result.formatted_similarity()),
        },
        None => OverlayBox {
            rect,
            color: UNIDENTIFIED_COLOR,
            label: String::new(),
        },
    }
}
