//! Enrollment sample acquisition.
//!
//! Consumes per-frame face detections for a single subject and keeps a
//! bounded, subsampled set of feature vectors. Only every `cadence`-th
//! processed frame contributes samples, and collection stops at
//! `max_samples`.

use crate::features;
use crate::types::{normalize_name, BoundingBox, FeatureVector, LabeledSample};
use thiserror::Error;

/// Default upper bound on samples per enrollment session.
pub const MAX_SAMPLES: usize = 100;
/// Default frame interval at which detections are accepted as samples.
pub const SAMPLE_CADENCE: usize = 10;

#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error("subject name must be non-empty and contain no control characters")]
    InvalidName,
    #[error("invalid sampling policy: {0}")]
    InvalidPolicy(String),
    #[error("no face data collected")]
    NoData,
}

/// Sampling cadence and cap for one enrollment session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingPolicy {
    pub max_samples: usize,
    pub cadence: usize,
}

impl Default for SamplingPolicy {
    fn default() -> Self {
        Self {
            max_samples: MAX_SAMPLES,
            cadence: SAMPLE_CADENCE,
        }
    }
}

impl SamplingPolicy {
    pub fn validate(&self) -> Result<(), AcquisitionError> {
        if self.max_samples == 0 {
            return Err(AcquisitionError::InvalidPolicy("max_samples must be at least 1".into()));
        }
        if self.cadence == 0 {
            return Err(AcquisitionError::InvalidPolicy("cadence must be at least 1".into()));
        }
        Ok(())
    }
}

/// State of the collector after a frame has been offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Collecting { samples: usize },
    /// The cap was reached; the caller should stop capturing and persist.
    Complete { samples: usize },
}

/// Ephemeral sample accumulator for one enrollment session.
pub struct SampleCollector {
    name: String,
    policy: SamplingPolicy,
    frames_seen: usize,
    samples: Vec<FeatureVector>,
}

impl SampleCollector {
    pub fn new(name: &str, policy: SamplingPolicy) -> Result<Self, AcquisitionError> {
        let name = normalize_name(name).ok_or(AcquisitionError::InvalidName)?;
        policy.validate()?;
        Ok(Self {
            name,
            policy,
            frames_seen: 0,
            samples: Vec::with_capacity(policy.max_samples),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.samples.len() >= self.policy.max_samples
    }

    /// Whether the next offered frame falls on the sampling cadence.
    pub fn accepts_next_frame(&self) -> bool {
        self.frames_seen % self.policy.cadence == 0
    }

    /// Offer one processed frame and the faces detected in it.
    ///
    /// Every face of an accepted frame is taken as a sample of the subject:
    /// enrollment assumes a single person in front of the camera. Faces whose
    /// box falls outside the frame are skipped.
    pub fn offer(&mut self, frame: &[u8], width: u32, height: u32, faces: &[BoundingBox]) -> Progress {
        if self.accepts_next_frame() {
            for face in faces {
                if self.is_complete() {
                    break;
                }
                match features::extract(frame, width, height, face) {
                    Some(v) => self.samples.push(v),
                    None => tracing::debug!(?face, "face box outside frame; skipped"),
                }
            }
            if !faces.is_empty() {
                tracing::debug!(
                    frame = self.frames_seen,
                    samples = self.samples.len(),
                    "enroll: sampled frame"
                );
            }
        }
        self.frames_seen += 1;

        if self.is_complete() {
            Progress::Complete { samples: self.samples.len() }
        } else {
            Progress::Collecting { samples: self.samples.len() }
        }
    }

    /// End the session. Fails with `NoData` if nothing was collected.
    pub fn finish(self) -> Result<Enrollment, AcquisitionError> {
        if self.samples.is_empty() {
            return Err(AcquisitionError::NoData);
        }
        tracing::info!(
            name = %self.name,
            samples = self.samples.len(),
            frames = self.frames_seen,
            "enrollment acquisition finished"
        );
        Ok(Enrollment {
            name: self.name,
            samples: self.samples,
        })
    }
}

/// A finished, non-empty batch of samples for one subject.
#[derive(Debug, Clone)]
pub struct Enrollment {
    name: String,
    samples: Vec<FeatureVector>,
}

impl Enrollment {
    /// Build a batch from already-extracted vectors.
    pub fn new(name: &str, samples: Vec<FeatureVector>) -> Result<Self, AcquisitionError> {
        let name = normalize_name(name).ok_or(AcquisitionError::InvalidName)?;
        if samples.is_empty() {
            return Err(AcquisitionError::NoData);
        }
        Ok(Self { name, samples })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn samples(&self) -> &[FeatureVector] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Pair every vector with the subject name, preserving capture order.
    pub fn into_labeled(self) -> Vec<LabeledSample> {
        let name = self.name;
        self.samples
            .into_iter()
            .map(|features| LabeledSample {
                name: name.clone(),
                features,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FEATURE_LEN;

    const W: u32 = 160;
    const H: u32 = 120;

    fn frame() -> Vec<u8> {
        vec![100u8; (W * H) as usize]
    }

    fn face(x: f32) -> BoundingBox {
        BoundingBox { x, y: 10.0, width: 40.0, height: 40.0, confidence: 0.9 }
    }

    fn policy(max_samples: usize, cadence: usize) -> SamplingPolicy {
        SamplingPolicy { max_samples, cadence }
    }

    #[test]
    fn test_rejects_empty_name() {
        assert!(matches!(
            SampleCollector::new("  ", SamplingPolicy::default()),
            Err(AcquisitionError::InvalidName)
        ));
    }

    #[test]
    fn test_rejects_zero_cadence() {
        assert!(matches!(
            SampleCollector::new("Alice", policy(10, 0)),
            Err(AcquisitionError::InvalidPolicy(_))
        ));
    }

    #[test]
    fn test_cadence_accepts_every_kth_frame() {
        let mut c = SampleCollector::new("Alice", policy(100, 10)).unwrap();
        let f = frame();
        for _ in 0..25 {
            c.offer(&f, W, H, &[face(10.0)]);
        }
        // Frames 0, 10 and 20 are on cadence.
        assert_eq!(c.len(), 3);
    }

    #[test]
    fn test_frames_without_faces_still_advance_cadence() {
        let mut c = SampleCollector::new("Alice", policy(100, 10)).unwrap();
        let f = frame();
        c.offer(&f, W, H, &[]);
        for _ in 0..9 {
            c.offer(&f, W, H, &[face(10.0)]);
        }
        assert_eq!(c.len(), 0);
        assert!(c.accepts_next_frame());
        c.offer(&f, W, H, &[face(10.0)]);
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn test_every_face_in_accepted_frame_is_sampled() {
        let mut c = SampleCollector::new("Alice", policy(100, 1)).unwrap();
        let f = frame();
        c.offer(&f, W, H, &[face(10.0), face(80.0)]);
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn test_cap_stops_collection_mid_frame() {
        let mut c = SampleCollector::new("Alice", policy(3, 1)).unwrap();
        let f = frame();
        assert_eq!(c.offer(&f, W, H, &[face(10.0), face(80.0)]), Progress::Collecting { samples: 2 });
        assert_eq!(c.offer(&f, W, H, &[face(10.0), face(80.0)]), Progress::Complete { samples: 3 });
        assert_eq!(c.offer(&f, W, H, &[face(10.0)]), Progress::Complete { samples: 3 });
        assert_eq!(c.len(), 3);
    }

    #[test]
    fn test_sample_count_is_min_of_accepted_and_cap() {
        let f = frame();
        for (frames, cap, expected) in [(95usize, 100usize, 10usize), (2000, 100, 100), (1, 100, 1)] {
            let mut c = SampleCollector::new("Alice", policy(cap, 10)).unwrap();
            for _ in 0..frames {
                if c.is_complete() {
                    break;
                }
                c.offer(&f, W, H, &[face(10.0)]);
            }
            assert_eq!(c.finish().unwrap().len(), expected, "frames={frames}");
        }
    }

    #[test]
    fn test_out_of_frame_faces_are_skipped() {
        let mut c = SampleCollector::new("Alice", policy(10, 1)).unwrap();
        let f = frame();
        c.offer(&f, W, H, &[face(1000.0)]);
        assert!(c.is_empty());
    }

    #[test]
    fn test_finish_without_samples_is_no_data() {
        let mut c = SampleCollector::new("Alice", SamplingPolicy::default()).unwrap();
        let f = frame();
        c.offer(&f, W, H, &[]);
        assert!(matches!(c.finish(), Err(AcquisitionError::NoData)));
    }

    #[test]
    fn test_enrollment_labels_every_sample() {
        let mut c = SampleCollector::new(" Bob ", policy(5, 1)).unwrap();
        let f = frame();
        for _ in 0..5 {
            c.offer(&f, W, H, &[face(10.0)]);
        }
        let enrollment = c.finish().unwrap();
        assert_eq!(enrollment.name(), "Bob");
        let labeled = enrollment.into_labeled();
        assert_eq!(labeled.len(), 5);
        assert!(labeled.iter().all(|s| s.name == "Bob" && s.features.len() == FEATURE_LEN));
    }

    #[test]
    fn test_enrollment_new_rejects_empty_batch() {
        assert!(matches!(Enrollment::new("Alice", vec![]), Err(AcquisitionError::NoData)));
    }
}
