use serde::{Deserialize, Serialize};

/// Canonical face crop width in pixels.
pub const CROP_WIDTH: u32 = 50;
/// Canonical face crop height in pixels.
pub const CROP_HEIGHT: u32 = 50;
/// Channels per crop pixel (grayscale).
pub const CROP_CHANNELS: u32 = 1;
/// Length of every feature vector in the label store.
pub const FEATURE_LEN: usize = (CROP_WIDTH * CROP_HEIGHT * CROP_CHANNELS) as usize;

/// Axis-aligned bounding box for a detected face, in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

impl BoundingBox {
    /// Integer pixel rectangle `(x, y, width, height)` clipped to a frame.
    ///
    /// Returns `None` when nothing of the box lies inside the frame.
    pub fn clip_to(&self, frame_width: u32, frame_height: u32) -> Option<(u32, u32, u32, u32)> {
        if !(self.x.is_finite() && self.y.is_finite() && self.width.is_finite() && self.height.is_finite()) {
            return None;
        }
        let x0 = self.x.floor().clamp(0.0, frame_width as f32) as u32;
        let y0 = self.y.floor().clamp(0.0, frame_height as f32) as u32;
        let x1 = (self.x + self.width).ceil().clamp(0.0, frame_width as f32) as u32;
        let y1 = (self.y + self.height).ceil().clamp(0.0, frame_height as f32) as u32;

        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some((x0, y0, x1 - x0, y1 - y0))
    }
}

/// Flattened raw pixel intensities of a resized face crop, row-major.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector {
    pub values: Vec<u8>,
}

impl FeatureVector {
    pub fn new(values: Vec<u8>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Squared Euclidean distance over raw intensities.
    ///
    /// Monotone in the Euclidean distance, so neighbor ordering is the same
    /// while staying in exact integer arithmetic.
    pub fn squared_distance(&self, other: &FeatureVector) -> u64 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(&a, &b)| {
                let d = a as i64 - b as i64;
                (d * d) as u64
            })
            .sum()
    }
}

/// One stored training sample: a feature vector and the name it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledSample {
    pub name: String,
    pub features: FeatureVector,
}

/// Normalize an operator-supplied subject name.
///
/// Trims surrounding whitespace; rejects empty names and names containing
/// control characters (line breaks would split a ledger row).
pub fn normalize_name(raw: &str) -> Option<String> {
    let name = raw.trim();
    if name.is_empty() || name.chars().any(char::is_control) {
        return None;
    }
    Some(name.to_string())
}
