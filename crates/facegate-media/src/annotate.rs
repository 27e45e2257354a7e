//! Annotated image rendering.
//!
//! Boxes, keypoints and score labels are drawn onto an RGB copy of the
//! source; the caller's image is never touched.

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use facegate_models::{AnnotationOptions, BoundingBox, Detection, DetectionSet, Point};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use tracing::debug;

use crate::error::{MediaError, MediaResult};
use crate::glyphs;

/// Vertical gap between a box's top edge and its score label.
pub const LABEL_MARGIN: i64 = 10;
pub const KEYPOINT_RADIUS: i32 = 2;
pub const BOX_THICKNESS: u32 = 2;

const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const KEYPOINT_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const LABEL_COLOR: Rgb<u8> = Rgb([255, 255, 0]);

const DEFAULT_GLYPH_SCALE: u32 = 2;
const DEFAULT_FONT_SIZE: f32 = 16.0;

/// Top-left corner of a score label for `bbox`.
pub fn label_origin(bbox: &BoundingBox) -> (i64, i64) {
    (bbox.x1(), bbox.y1().saturating_sub(LABEL_MARGIN).max(0))
}

pub fn format_score(score: f32) -> String {
    format!("{:.2}", score)
}

/// Font used for score labels.
#[derive(Clone)]
pub enum LabelFont {
    /// Built-in bitmap glyphs, each cell drawn as a `scale`x`scale` block.
    Builtin { scale: u32 },
    TrueType { font: FontArc, size: f32 },
}

impl Default for LabelFont {
    fn default() -> Self {
        Self::Builtin {
            scale: DEFAULT_GLYPH_SCALE,
        }
    }
}

impl std::fmt::Debug for LabelFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Builtin { scale } => f.debug_struct("Builtin").field("scale", scale).finish(),
            Self::TrueType { size, .. } => f.debug_struct("TrueType").field("size", size).finish(),
        }
    }
}

impl LabelFont {
    /// Load a TrueType/OpenType font from disk.
    pub fn from_path(path: impl AsRef<Path>) -> MediaResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(MediaError::FontNotFound(path.to_path_buf()));
        }

        let data = std::fs::read(path)?;
        let font = FontArc::try_from_vec(data).map_err(|e| MediaError::InvalidFont {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        Ok(Self::TrueType {
            font,
            size: DEFAULT_FONT_SIZE,
        })
    }
}

/// Draws detections onto images.
#[derive(Debug, Clone, Default)]
pub struct Annotator {
    font: LabelFont,
}

impl Annotator {
    pub fn new(font: LabelFont) -> Self {
        Self { font }
    }

    pub fn font(&self) -> &LabelFont {
        &self.font
    }

    /// Render `detections` onto a copy of `source`.
    pub fn render(
        &self,
        source: &DynamicImage,
        detections: &DetectionSet,
        options: &AnnotationOptions,
    ) -> RgbImage {
        let mut canvas = source.to_rgb8();

        for detection in detections {
            self.draw_detection(&mut canvas, detection, options);
        }

        canvas
    }

    fn draw_detection(&self, canvas: &mut RgbImage, detection: &Detection, options: &AnnotationOptions) {
        if !draw_box(canvas, &detection.bbox) {
            debug!(bbox = ?detection.bbox.to_array(), "Skipping undrawable box");
        }

        if options.draw_scores {
            if let Some(score) = detection.score {
                let (x, y) = label_origin(&detection.bbox);
                match (i32::try_from(x), i32::try_from(y)) {
                    (Ok(x), Ok(y)) => self.draw_label(canvas, x, y, &format_score(score)),
                    _ => debug!(x, y, "Skipping label outside drawable range"),
                }
            }
        }

        if options.draw_keypoints {
            for (name, point) in &detection.keypoints {
                if !draw_keypoint(canvas, point) {
                    debug!(keypoint = %name, "Skipping undrawable keypoint");
                }
            }
        }
    }

    fn draw_label(&self, canvas: &mut RgbImage, x: i32, y: i32, text: &str) {
        // Labels grow right and down; past the far edges nothing is visible.
        if x >= canvas.width() as i32 || y >= canvas.height() as i32 {
            return;
        }
        match &self.font {
            LabelFont::Builtin { scale } => draw_glyph_text(canvas, x, y, *scale, text),
            LabelFont::TrueType { font, size } => {
                draw_text_mut(canvas, LABEL_COLOR, x, y, PxScale::from(*size), font, text)
            }
        }
    }
}

/// Returns false if the box has no drawable representation.
fn draw_box(canvas: &mut RgbImage, bbox: &BoundingBox) -> bool {
    let corners = bbox.to_array();
    if corners.iter().any(|c| i32::try_from(*c).is_err()) {
        return false;
    }

    // Rect panics on zero size.
    if bbox.width() == 0 || bbox.height() == 0 {
        return false;
    }

    // Edges pushed just past the canvas stay invisible and keep Rect's
    // arithmetic inside i32.
    let margin = BOX_THICKNESS as i64;
    let (canvas_w, canvas_h) = (canvas.width() as i64, canvas.height() as i64);
    let clamp_x = |v: i64| v.clamp(-margin, canvas_w + margin);
    let clamp_y = |v: i64| v.clamp(-margin, canvas_h + margin);
    let (x1, y1) = (clamp_x(bbox.x1()), clamp_y(bbox.y1()));
    let (x2, y2) = (clamp_x(bbox.x2()), clamp_y(bbox.y2()));
    let (x, y) = (x1 as i32, y1 as i32);
    let (width, height) = ((x2 - x1) as u32, (y2 - y1) as u32);

    for inset in 0..BOX_THICKNESS {
        let (Some(w), Some(h)) = (
            width.checked_sub(2 * inset).filter(|w| *w > 0),
            height.checked_sub(2 * inset).filter(|h| *h > 0),
        ) else {
            break;
        };
        let rect = Rect::at(x + inset as i32, y + inset as i32).of_size(w, h);
        draw_hollow_rect_mut(canvas, rect, BOX_COLOR);
    }

    true
}

fn draw_keypoint(canvas: &mut RgbImage, point: &Point) -> bool {
    let (Ok(x), Ok(y)) = (i32::try_from(point[0]), i32::try_from(point[1])) else {
        return false;
    };
    let visible = |v: i32, dim: u32| {
        (-KEYPOINT_RADIUS..=dim as i32 + KEYPOINT_RADIUS).contains(&v)
    };
    if !visible(x, canvas.width()) || !visible(y, canvas.height()) {
        return true;
    }
    draw_filled_circle_mut(canvas, (x, y), KEYPOINT_RADIUS, KEYPOINT_COLOR);
    true
}

fn draw_glyph_text(canvas: &mut RgbImage, x: i32, y: i32, scale: u32, text: &str) {
    let scale = scale.max(1) as i64;
    let (width, height) = (canvas.width() as i64, canvas.height() as i64);

    for (col, row) in glyphs::lit_cells(text) {
        let left = x as i64 + col as i64 * scale;
        let top = y as i64 + row as i64 * scale;

        for py in top..top + scale {
            for px in left..left + scale {
                if (0..width).contains(&px) && (0..height).contains(&py) {
                    canvas.put_pixel(px as u32, py as u32, LABEL_COLOR);
                }
            }
        }
    }
}
