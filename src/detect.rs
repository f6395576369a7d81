//! Detection feed wire types.
//!
//! One `DetectionPayload` is one snapshot of the detector's output, always
//! scoped to the pixel dimensions of the frame it was computed on. Payloads
//! are replaced wholesale on each poll; there is no merging and no history.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Pixel dimensions of the source frame a payload was computed on.
/// Serialized as the backend's `[width, height]` array.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSize(pub u32, pub u32);

impl FrameSize {
    pub fn width(&self) -> u32 {
        self.0
    }

    pub fn height(&self) -> u32 {
        self.1
    }

    /// A zero dimension means "no detection data yet"; render passes skip it.
    pub fn is_empty(&self) -> bool {
        self.0 == 0 || self.1 == 0
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DetectionPayload {
    pub frame_size: FrameSize,
    #[serde(default)]
    pub detections: Vec<Detection>,
}

/// One bounding box plus classification metadata for a single subject.
///
/// `face_match = false` means the subject is unclassified regardless of any
/// category the backend attached.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Detection {
    /// `[x, y, w, h]` in source-frame pixels.
    pub bbox: [f64; 4],
    pub face_match: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl Detection {
    /// Matched subjects with a concrete category. `Unknown` does not count:
    /// the backend emits it as a placeholder, not a classification.
    pub fn classified_category(&self) -> Option<Category> {
        if !self.face_match {
            return None;
        }
        self.category.filter(|category| *category != Category::Unknown)
    }
}

/// Closed identity classification set. New values require a deliberate color
/// and label policy in `overlay`, not a silent default.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Official,
    Citizen,
    Criminal,
    Unknown,
}

impl Category {
    /// Lowercase form used on the wire (register-face form field).
    pub fn wire_name(&self) -> &'static str {
        match self {
            Category::Official => "official",
            Category::Citizen => "citizen",
            Category::Criminal => "criminal",
            Category::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::Official => "Official",
            Category::Citizen => "Citizen",
            Category::Criminal => "Criminal",
            Category::Unknown => "Unknown",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_backend_payload() {
        let json = r#"{
            "frame_size": [1280, 720],
            "detections": [
                {
                    "bbox": [10, 20, 30, 40],
                    "face_match": true,
                    "category": "criminal",
                    "label": "J.Doe",
                    "confidence": 42.5,
                    "timestamp": "2026-01-01T00:00:00Z",
                    "alert": true
                },
                {
                    "bbox": [0, 0, 5, 5],
                    "face_match": false,
                    "category": "unknown"
                }
            ]
        }"#;

        let payload: DetectionPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.frame_size, FrameSize(1280, 720));
        assert_eq!(payload.detections.len(), 2);

        let matched = &payload.detections[0];
        assert_eq!(matched.classified_category(), Some(Category::Criminal));
        assert_eq!(matched.label.as_deref(), Some("J.Doe"));

        let unmatched = &payload.detections[1];
        assert_eq!(unmatched.category, Some(Category::Unknown));
        assert_eq!(unmatched.classified_category(), None);
    }

    #[test]
    fn face_match_dominates_category() {
        let detection = Detection {
            bbox: [0.0, 0.0, 1.0, 1.0],
            face_match: false,
            category: Some(Category::Criminal),
            label: Some("X".to_string()),
            confidence: None,
        };
        assert_eq!(detection.classified_category(), None);
    }

    #[test]
    fn empty_frame_size() {
        assert!(FrameSize::default().is_empty());
        assert!(FrameSize(0, 480).is_empty());
        assert!(FrameSize(640, 0).is_empty());
        assert!(!FrameSize(640, 480).is_empty());
    }
}
