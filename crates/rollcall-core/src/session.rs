//! Live recognition session state machine.
//!
//! Each processed frame yields its own list of recognitions; nothing carries
//! over between frames. A confirm acts only on the frame it is given and
//! requires exactly one recognized face in it.

use crate::features;
use crate::ledger::{AttendanceLedger, LedgerError, MarkOutcome};
use crate::recognizer::{KnnClassifier, Prediction, RecognizerError};
use crate::types::BoundingBox;
use chrono::{Local, NaiveDateTime};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("session already stopped")]
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    /// A frame was searched and no face was classified.
    Detecting,
    /// At least one face in the latest frame was classified.
    Recognized,
    /// The last confirm reached the ledger.
    Marked,
    Stopped,
}

/// One classified face in the current frame.
#[derive(Debug, Clone)]
pub struct Recognition {
    pub face: BoundingBox,
    pub prediction: Prediction,
}

/// Everything recognized in a single frame, in detector order.
#[derive(Debug, Clone, Default)]
pub struct FrameRecognitions {
    pub faces: Vec<Recognition>,
}

impl FrameRecognitions {
    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.faces.iter().map(|r| r.prediction.name.clone()).collect()
    }
}

/// Result of an operator confirm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmOutcome {
    Marked(String),
    AlreadyMarked(String),
    /// No face was recognized in the frame; nothing written.
    NoFace,
    /// More than one face was recognized; nothing written.
    Ambiguous(Vec<String>),
}

pub struct RecognitionSession {
    classifier: KnnClassifier,
    ledger: AttendanceLedger,
    state: SessionState,
}

impl RecognitionSession {
    pub fn new(classifier: KnnClassifier, ledger: AttendanceLedger) -> Self {
        Self {
            classifier,
            ledger,
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn ledger(&self) -> &AttendanceLedger {
        &self.ledger
    }

    /// Classify every detected face in one grayscale frame.
    pub fn process_frame(
        &mut self,
        frame: &[u8],
        width: u32,
        height: u32,
        faces: &[BoundingBox],
    ) -> Result<FrameRecognitions, SessionError> {
        if self.state == SessionState::Stopped {
            return Err(SessionError::Stopped);
        }

        let mut out = FrameRecognitions::default();
        for face in faces {
            let Some(probe) = features::extract(frame, width, height, face) else {
                continue;
            };
            let prediction = self.classifier.predict(&probe)?;
            tracing::debug!(
                name = %prediction.name,
                votes = prediction.votes,
                distance = prediction.nearest_distance,
                "face recognized"
            );
            out.faces.push(Recognition {
                face: *face,
                prediction,
            });
        }

        self.state = if out.is_empty() {
            SessionState::Detecting
        } else {
            SessionState::Recognized
        };
        Ok(out)
    }

    /// Confirm attendance for the single face recognized in `current`.
    pub fn confirm(&mut self, current: &FrameRecognitions) -> Result<ConfirmOutcome, SessionError> {
        self.confirm_at(current, Local::now().naive_local())
    }

    pub fn confirm_at(
        &mut self,
        current: &FrameRecognitions,
        at: NaiveDateTime,
    ) -> Result<ConfirmOutcome, SessionError> {
        if self.state == SessionState::Stopped {
            return Err(SessionError::Stopped);
        }

        let name = match current.faces.as_slice() {
            [] => return Ok(ConfirmOutcome::NoFace),
            [only] => only.prediction.name.clone(),
            _ => {
                tracing::info!(faces = current.faces.len(), "confirm ignored: several faces in frame");
                return Ok(ConfirmOutcome::Ambiguous(current.names()));
            }
        };

        let outcome = match self.ledger.mark_at(&name, at)? {
            MarkOutcome::Marked => ConfirmOutcome::Marked(name),
            MarkOutcome::AlreadyMarked => ConfirmOutcome::AlreadyMarked(name),
        };
        self.state = SessionState::Marked;
        Ok(outcome)
    }

    pub fn stop(&mut self) {
        if self.state != SessionState::Stopped {
            tracing::info!("recognition session stopped");
        }
        self.state = SessionState::Stopped;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LEDGER_HEADER;
    use crate::store::LabelSet;
    use crate::types::{FeatureVector, LabeledSample, FEATURE_LEN};
    use chrono::NaiveDate;

    const W: u32 = 200;
    const H: u32 = 100;

    /// Left half of the frame is 20, right half 220.
    fn frame() -> Vec<u8> {
        (0..W * H).map(|i| if i % W < W / 2 { 20 } else { 220 }).collect()
    }

    fn left_face() -> BoundingBox {
        BoundingBox { x: 10.0, y: 10.0, width: 60.0, height: 60.0, confidence: 0.9 }
    }

    fn right_face() -> BoundingBox {
        BoundingBox { x: 120.0, y: 10.0, width: 60.0, height: 60.0, confidence: 0.8 }
    }

    fn session(dir: &std::path::Path) -> RecognitionSession {
        let mut set = LabelSet::default();
        for (name, fill) in [("Alice", 20u8), ("Bob", 220u8)] {
            for _ in 0..5 {
                set.samples.push(LabeledSample {
                    name: name.into(),
                    features: FeatureVector::new(vec![fill; FEATURE_LEN]),
                });
            }
        }
        let knn = KnnClassifier::train(set, 5).unwrap();
        RecognitionSession::new(knn, AttendanceLedger::new(dir))
    }

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 3).unwrap().and_hms_opt(12, 0, 0).unwrap()
    }

    #[test]
    fn test_state_transitions() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session(dir.path());
        let f = frame();
        assert_eq!(s.state(), SessionState::Idle);

        s.process_frame(&f, W, H, &[]).unwrap();
        assert_eq!(s.state(), SessionState::Detecting);

        let current = s.process_frame(&f, W, H, &[left_face()]).unwrap();
        assert_eq!(s.state(), SessionState::Recognized);

        s.confirm_at(&current, noon()).unwrap();
        assert_eq!(s.state(), SessionState::Marked);

        s.process_frame(&f, W, H, &[]).unwrap();
        assert_eq!(s.state(), SessionState::Detecting);

        s.stop();
        assert_eq!(s.state(), SessionState::Stopped);
        assert!(matches!(s.process_frame(&f, W, H, &[]), Err(SessionError::Stopped)));
    }

    #[test]
    fn test_each_face_is_classified() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session(dir.path());
        let current = s.process_frame(&frame(), W, H, &[left_face(), right_face()]).unwrap();
        assert_eq!(current.names(), vec!["Alice", "Bob"]);
    }

    #[test]
    fn test_confirm_single_face_marks_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session(dir.path());
        let current = s.process_frame(&frame(), W, H, &[right_face()]).unwrap();

        assert_eq!(s.confirm_at(&current, noon()).unwrap(), ConfirmOutcome::Marked("Bob".into()));
        assert_eq!(
            s.confirm_at(&current, noon()).unwrap(),
            ConfirmOutcome::AlreadyMarked("Bob".into())
        );
        let content = std::fs::read_to_string(s.ledger().path_for(noon().date())).unwrap();
        assert_eq!(content, format!("{LEDGER_HEADER}\nBob,12:00:00\n"));
    }

    #[test]
    fn test_confirm_with_several_faces_is_ambiguous() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session(dir.path());
        let current = s.process_frame(&frame(), W, H, &[left_face(), right_face()]).unwrap();

        assert_eq!(
            s.confirm_at(&current, noon()).unwrap(),
            ConfirmOutcome::Ambiguous(vec!["Alice".into(), "Bob".into()])
        );
        assert_eq!(s.state(), SessionState::Recognized);
        assert!(!s.ledger().path_for(noon().date()).exists());
    }

    #[test]
    fn test_confirm_uses_only_current_frame() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session(dir.path());
        let f = frame();
        s.process_frame(&f, W, H, &[left_face()]).unwrap();
        let current = s.process_frame(&f, W, H, &[]).unwrap();

        assert_eq!(s.confirm_at(&current, noon()).unwrap(), ConfirmOutcome::NoFace);
        assert!(!s.ledger().path_for(noon().date()).exists());
    }
}
