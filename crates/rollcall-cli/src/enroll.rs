//! Enrollment capture loop.

use crate::config::Config;
use crate::keys::{self, Key};
use anyhow::{Context, Result};
use rollcall_core::acquisition::{AcquisitionError, Progress};
use rollcall_core::{FaceDetector, LabelStore, SampleCollector, ScrfdDetector};
use rollcall_hw::{Camera, CameraError, Frame, FrameStream};
use tokio::sync::mpsc;

/// Where the capture loop gets its frames.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Frame, CameraError>;
}

impl FrameSource for FrameStream<'_> {
    fn next_frame(&mut self) -> Result<Frame, CameraError> {
        FrameStream::next_frame(self)
    }
}

/// Why the capture loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureEnd {
    Complete,
    Cancelled,
    CameraFailed,
    DetectorFailed,
}

/// Capture samples for `name` until the cap, a quit key, or a camera or
/// detector failure, then merge them into the label store.
pub fn run(config: &Config, name: &str, keys: &mut mpsc::Receiver<Key>) -> Result<()> {
    let mut collector = SampleCollector::new(name, config.sampling_policy())?;
    let mut detector = ScrfdDetector::load(&config.detector_model, config.detector_params())
        .context("face detector unavailable")?;
    let camera = Camera::open(&config.camera_device).context("cannot access the camera")?;

    println!(
        "Capturing face data for '{}'. Type q + Enter to stop early.",
        collector.name()
    );

    {
        let mut stream = camera.stream()?;
        let end = capture(&mut collector, &mut stream, &mut detector, keys);
        tracing::debug!(?end, samples = collector.len(), "capture ended");
    }
    drop(camera);

    let enrollment = match collector.finish() {
        Ok(enrollment) => enrollment,
        Err(AcquisitionError::NoData) => {
            anyhow::bail!("no face data collected; nothing saved")
        }
        Err(err) => return Err(err.into()),
    };
    let name = enrollment.name().to_string();
    let summary = LabelStore::new(&config.data_dir)
        .merge(enrollment)
        .context("failed to save face data")?;

    println!(
        "Saved {} face samples for '{name}' ({} samples enrolled in total).",
        summary.added, summary.total
    );
    Ok(())
}

/// Feed frames into `collector` until it is full or capture has to stop.
///
/// Camera and detector failures end capture without discarding what was
/// already collected.
pub fn capture(
    collector: &mut SampleCollector,
    source: &mut impl FrameSource,
    detector: &mut dyn FaceDetector,
    keys: &mut mpsc::Receiver<Key>,
) -> CaptureEnd {
    let mut reported = 0;
    loop {
        let frame = match source.next_frame() {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(error = %err, "failed to grab frame; ending capture");
                return CaptureEnd::CameraFailed;
            }
        };

        let faces = if frame.is_dark {
            Vec::new()
        } else {
            match detector.detect(&frame.data, frame.width, frame.height) {
                Ok(faces) => faces,
                Err(err) => {
                    tracing::warn!(
                        error = %err,
                        seq = frame.sequence,
                        samples = collector.len(),
                        "face detection failed; ending capture"
                    );
                    return CaptureEnd::DetectorFailed;
                }
            }
        };

        let progress = collector.offer(&frame.data, frame.width, frame.height, &faces);
        let (Progress::Collecting { samples } | Progress::Complete { samples }) = progress;
        if samples != reported {
            println!("Samples: {samples}");
            reported = samples;
        }
        if matches!(progress, Progress::Complete { .. }) {
            return CaptureEnd::Complete;
        }
        if keys::poll(keys) == Some(Key::Quit) {
            tracing::info!("enrollment cancelled by operator");
            return CaptureEnd::Cancelled;
        }
    }
}
