//! Coordinate-scaled overlay rendering.
//!
//! The renderer is the join point between the frame refresh and the
//! detection feed: it takes whatever payload and whatever display geometry
//! are current at render time, maps every bounding box from source-frame
//! pixels into display pixels, and emits a draw list for a transparent layer
//! registered above the image. Each pass is a stateless full redraw.
//!
//! The renderer also accumulates the per-pass classification summary
//! (`RenderSummary`) that drives the alert engine: whether any unmatched
//! subject was seen, and the distinct labels of matched criminal-category
//! detections in encounter order.

use crate::detect::{Category, Detection, DetectionPayload, FrameSize};

/// On-screen pixel size of the rendered image at the moment of a render
/// pass. Changes with viewport resize or frame load; never persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DisplayGeometry {
    pub width: u32,
    pub height: u32,
}

impl DisplayGeometry {
    /// Fit a frame into a viewport preserving aspect ratio (the image is
    /// laid out width-full, height-auto; the viewport bounds both axes).
    /// An empty frame keeps the viewport itself as the geometry.
    pub fn contain(frame: FrameSize, viewport_width: u32, viewport_height: u32) -> Self {
        if frame.is_empty() || viewport_width == 0 || viewport_height == 0 {
            return Self {
                width: viewport_width,
                height: viewport_height,
            };
        }
        let scale_w = viewport_width as f64 / frame.width() as f64;
        let scale_h = viewport_height as f64 / frame.height() as f64;
        let scale = scale_w.min(scale_h);
        Self {
            width: ((frame.width() as f64 * scale).round() as u32).max(1),
            height: ((frame.height() as f64 * scale).round() as u32).max(1),
        }
    }
}

/// Per-axis scale from frame space into display space.
///
/// Recomputed on every render pass; never cached across frame-size or
/// geometry changes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScaleTransform {
    pub scale_x: f64,
    pub scale_y: f64,
}

impl ScaleTransform {
    /// `None` when the frame has a zero dimension (no detection data yet);
    /// the caller skips the render pass.
    pub fn new(frame: FrameSize, display: DisplayGeometry) -> Option<Self> {
        if frame.is_empty() {
            return None;
        }
        Some(Self {
            scale_x: display.width as f64 / frame.width() as f64,
            scale_y: display.height as f64 / frame.height() as f64,
        })
    }

    pub fn apply(&self, bbox: [f64; 4]) -> [f64; 4] {
        [
            bbox[0] * self.scale_x,
            bbox[1] * self.scale_y,
            bbox[2] * self.scale_x,
            bbox[3] * self.scale_y,
        ]
    }
}

/// Stroke/fill color keyed by `(face_match, category)`. Closed mapping: a
/// new category value must be assigned a color here, not defaulted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoxColor {
    Green,
    Yellow,
    Red,
    Orange,
}

impl BoxColor {
    pub fn for_detection(detection: &Detection) -> Self {
        match detection.classified_category() {
            Some(Category::Official) => BoxColor::Green,
            Some(Category::Citizen) => BoxColor::Yellow,
            Some(Category::Criminal) => BoxColor::Red,
            // Matched but uncategorized subjects render as known/benign.
            Some(Category::Unknown) => BoxColor::Green,
            None if detection.face_match => BoxColor::Green,
            None => BoxColor::Orange,
        }
    }

    pub fn rgba(&self) -> [u8; 4] {
        match self {
            BoxColor::Green => [0, 255, 0, 255],
            BoxColor::Yellow => [255, 255, 0, 255],
            BoxColor::Red => [255, 0, 0, 255],
            BoxColor::Orange => [255, 165, 0, 255],
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Shape {
    /// Stroked and translucently filled rectangle in display pixels.
    Box {
        x: f64,
        y: f64,
        w: f64,
        h: f64,
        color: BoxColor,
    },
    /// Text anchored at its baseline origin in display pixels. The raster
    /// backend ignores text; text-capable surfaces draw it.
    Label { text: String, x: f64, y: f64 },
}

/// One render pass worth of shapes. Empty means a cleared surface.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DrawList {
    pub shapes: Vec<Shape>,
}

impl DrawList {
    pub fn is_cleared(&self) -> bool {
        self.shapes.is_empty()
    }

    pub fn boxes(&self) -> impl Iterator<Item = &Shape> {
        self.shapes
            .iter()
            .filter(|shape| matches!(shape, Shape::Box { .. }))
    }
}

/// Signals accumulated across one render pass, forwarded to the alert
/// engine once per pass (not per detection).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenderSummary {
    pub unknown_seen: bool,
    /// Distinct labels of matched criminal-category detections, in
    /// encounter order. A label seen on several boxes contributes once.
    pub criminal_labels: Vec<String>,
}

impl RenderSummary {
    pub fn is_quiet(&self) -> bool {
        !self.unknown_seen && self.criminal_labels.is_empty()
    }
}

/// Label anchor: 4px right of the box edge, 4px above its top, flipped to
/// 12px below the top when the above position would clip at the surface
/// origin.
fn label_anchor(x: f64, y: f64) -> (f64, f64) {
    let label_y = if y - 4.0 < 10.0 { y + 12.0 } else { y - 4.0 };
    (x + 4.0, label_y)
}

fn label_text(detection: &Detection) -> String {
    match (detection.classified_category(), detection.label.as_deref()) {
        (Some(category), Some(label)) => format!("{}: {}", category, label),
        _ => "unknown".to_string(),
    }
}

/// Run one render pass over the current payload and geometry.
///
/// A zero-sized frame or an empty detection list produces a cleared draw
/// list and a quiet summary. Bboxes partly outside the frame are mapped
/// as-is; the backend is trusted for geometry sanity.
pub fn render(payload: &DetectionPayload, display: DisplayGeometry) -> (DrawList, RenderSummary) {
    let Some(transform) = ScaleTransform::new(payload.frame_size, display) else {
        return (DrawList::default(), RenderSummary::default());
    };

    let mut list = DrawList::default();
    let mut summary = RenderSummary::default();

    for detection in &payload.detections {
        let [x, y, w, h] = transform.apply(detection.bbox);
        let color = BoxColor::for_detection(detection);
        list.shapes.push(Shape::Box { x, y, w, h, color });

        let (label_x, label_y) = label_anchor(x, y);
        list.shapes.push(Shape::Label {
            text: label_text(detection),
            x: label_x,
            y: label_y,
        });

        if !detection.face_match {
            summary.unknown_seen = true;
        } else if detection.classified_category() == Some(Category::Criminal) {
            if let Some(label) = detection.label.as_deref() {
                if !summary.criminal_labels.iter().any(|seen| seen == label) {
                    summary.criminal_labels.push(label.to_string());
                }
            }
        }
    }

    (list, summary)
}
