//! Face detector collaborator.
//!
//! Recognition and enrollment only need "grayscale frame in, face boxes out";
//! the [`FaceDetector`] trait is that seam. [`ScrfdDetector`] implements it
//! with an SCRFD ONNX model run through ONNX Runtime: letterbox to 640×640,
//! anchor-free decoding over strides 8/16/32, then non-maximum suppression.

use crate::types::BoundingBox;
use image::imageops::{self, FilterType};
use image::GrayImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const SCRFD_INPUT_SIZE: usize = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("detector model not found: {0} — place det_10g.onnx in the data directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("frame buffer too short: expected {expected} bytes, got {actual}")]
    ShortFrame { expected: usize, actual: usize },
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Anything that finds faces in a grayscale frame.
pub trait FaceDetector {
    /// Detect faces, returning boxes sorted by descending confidence.
    fn detect(&mut self, frame: &[u8], width: u32, height: u32) -> Result<Vec<BoundingBox>, DetectorError>;
}

/// Detector tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorParams {
    /// Minimum face score kept after decoding.
    pub confidence_threshold: f32,
    /// IoU above which the weaker of two boxes is suppressed.
    pub nms_threshold: f32,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            nms_threshold: 0.4,
        }
    }
}

/// Metadata for mapping letterboxed coordinates back to the frame.
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

/// SCRFD face detector.
pub struct ScrfdDetector {
    session: Session,
    params: DetectorParams,
    /// (score, bbox) output indices per stride.
    outputs: [(usize, usize); 3],
}

impl ScrfdDetector {
    /// Load the SCRFD model. A missing file is a startup error.
    pub fn load(model_path: &Path, params: DetectorParams) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();
        if names.len() < 6 {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model needs score and bbox outputs for 3 strides, got {} outputs",
                names.len()
            )));
        }
        let outputs = output_indices(&names);

        tracing::info!(
            path = %model_path.display(),
            outputs = ?names,
            mapping = ?outputs,
            confidence = params.confidence_threshold,
            nms = params.nms_threshold,
            "loaded SCRFD detector"
        );

        Ok(Self {
            session,
            params,
            outputs,
        })
    }

    /// Letterbox a grayscale frame into a normalized 1×3×640×640 tensor.
    fn preprocess(frame: GrayImage) -> (Array4<f32>, Letterbox) {
        let (width, height) = frame.dimensions();
        let size = SCRFD_INPUT_SIZE as f32;
        let scale = (size / width as f32).min(size / height as f32);
        let new_w = ((width as f32 * scale).round() as u32).clamp(1, SCRFD_INPUT_SIZE as u32);
        let new_h = ((height as f32 * scale).round() as u32).clamp(1, SCRFD_INPUT_SIZE as u32);
        let pad_x = (SCRFD_INPUT_SIZE as u32 - new_w) / 2;
        let pad_y = (SCRFD_INPUT_SIZE as u32 - new_h) / 2;

        let resized = imageops::resize(&frame, new_w, new_h, FilterType::Triangle);

        // Padding normalizes to 0.0.
        let mut tensor = Array4::<f32>::zeros((1, 3, SCRFD_INPUT_SIZE, SCRFD_INPUT_SIZE));
        for (x, y, pixel) in resized.enumerate_pixels() {
            let value = (pixel.0[0] as f32 - SCRFD_MEAN) / SCRFD_STD;
            let (ty, tx) = ((y + pad_y) as usize, (x + pad_x) as usize);
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = value;
            }
        }

        (
            tensor,
            Letterbox {
                scale,
                pad_x: pad_x as f32,
                pad_y: pad_y as f32,
            },
        )
    }
}

fn gray_image(frame: &[u8], width: u32, height: u32) -> Result<GrayImage, DetectorError> {
    let expected = width as usize * height as usize;
    frame
        .get(..expected)
        .and_then(|px| GrayImage::from_raw(width, height, px.to_vec()))
        .ok_or(DetectorError::ShortFrame {
            expected,
            actual: frame.len(),
        })
}

impl FaceDetector for ScrfdDetector {
    fn detect(&mut self, frame: &[u8], width: u32, height: u32) -> Result<Vec<BoundingBox>, DetectorError> {
        let image = gray_image(frame, width, height)?;
        let (input, letterbox) = Self::preprocess(image);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (pos, &stride) in SCRFD_STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx) = self.outputs[pos];
            let (_, scores) = outputs[score_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("scores stride {stride}: {e}")))?;
            let (_, bboxes) = outputs[bbox_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("bboxes stride {stride}: {e}")))?;

            candidates.extend(decode_stride(
                scores,
                bboxes,
                stride,
                &letterbox,
                self.params.confidence_threshold,
            ));
        }

        Ok(nms(candidates, self.params.nms_threshold))
    }
}

/// Map SCRFD outputs to (score, bbox) indices per stride.
///
/// Exports either name tensors `score_8`, `bbox_8`, … or use generic names in
/// the standard order: scores for strides 8/16/32 first, then boxes.
fn output_indices(names: &[String]) -> [(usize, usize); 3] {
    let find = |prefix: &str, stride: usize| names.iter().position(|n| *n == format!("{prefix}_{stride}"));

    let named: Option<Vec<(usize, usize)>> = SCRFD_STRIDES
        .iter()
        .map(|&stride| Some((find("score", stride)?, find("bbox", stride)?)))
        .collect();

    match named {
        Some(v) => [v[0], v[1], v[2]],
        None => [(0, 3), (1, 4), (2, 5)],
    }
}

/// Decode boxes for one stride level back into frame coordinates.
fn decode_stride(
    scores: &[f32],
    bboxes: &[f32],
    stride: usize,
    letterbox: &Letterbox,
    threshold: f32,
) -> Vec<BoundingBox> {
    let grid = SCRFD_INPUT_SIZE / stride;
    let anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;
    let s = stride as f32;

    (0..anchors)
        .filter_map(|idx| {
            let score = *scores.get(idx)?;
            if score <= threshold {
                return None;
            }
            let offsets = bboxes.get(idx * 4..idx * 4 + 4)?;

            let cell = idx / SCRFD_ANCHORS_PER_CELL;
            let cx = (cell % grid) as f32 * s;
            let cy = (cell / grid) as f32 * s;

            let x1 = (cx - offsets[0] * s - letterbox.pad_x) / letterbox.scale;
            let y1 = (cy - offsets[1] * s - letterbox.pad_y) / letterbox.scale;
            let x2 = (cx + offsets[2] * s - letterbox.pad_x) / letterbox.scale;
            let y2 = (cy + offsets[3] * s - letterbox.pad_y) / letterbox.scale;

            Some(BoundingBox {
                x: x1,
                y: y1,
                width: x2 - x1,
                height: y2 - y1,
                confidence: score,
            })
        })
        .collect()
}

/// Greedy non-maximum suppression; output sorted by confidence.
fn nms(mut boxes: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<BoundingBox> = Vec::new();
    for candidate in boxes {
        if keep.iter().all(|k| iou(k, &candidate) <= iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let inter_w = ((a.x + a.width).min(b.x + b.width) - a.x.max(b.x)).max(0.0);
    let inter_h = ((a.y + a.height).min(b.y + b.height) - a.y.max(b.y)).max(0.0);
    let inter = inter_w * inter_h;
    let union = a.width * a.height + b.width * b.height - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}
