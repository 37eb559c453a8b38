//! Face crop → feature vector.
//!
//! Crops the detection box out of a grayscale frame, resizes it to the
//! canonical crop size with bilinear filtering and flattens it row-major.
//! No other normalization is applied.

use crate::types::{BoundingBox, FeatureVector, CROP_HEIGHT, CROP_WIDTH};
use image::imageops::{self, FilterType};
use image::GrayImage;

/// Extract the feature vector for one detected face.
///
/// Returns `None` when the frame buffer is shorter than `width * height` or
/// the box does not overlap the frame.
pub fn extract(frame: &[u8], width: u32, height: u32, face: &BoundingBox) -> Option<FeatureVector> {
    let stride = width as usize;
    if frame.len() < stride * height as usize {
        return None;
    }
    let (x, y, w, h) = face.clip_to(width, height)?;

    let mut crop = Vec::with_capacity((w * h) as usize);
    for row in y..y + h {
        let start = row as usize * stride + x as usize;
        crop.extend_from_slice(&frame[start..start + w as usize]);
    }
    let crop = GrayImage::from_raw(w, h, crop)?;

    let resized = imageops::resize(&crop, CROP_WIDTH, CROP_HEIGHT, FilterType::Triangle);
    Some(FeatureVector::new(resized.into_raw()))
}
