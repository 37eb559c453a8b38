//! rollcall-core — Enrollment and recognition pipeline for face attendance.
//!
//! Turns detected face crops into fixed-size pixel feature vectors, keeps them
//! in a persistent label store, classifies probes with k-nearest-neighbors and
//! records once-per-day attendance in date-partitioned CSV ledgers.

pub mod acquisition;
pub mod detector;
pub mod features;
pub mod ledger;
pub mod lock;
pub mod recognizer;
pub mod session;
pub mod store;
pub mod types;

pub use acquisition::{Enrollment, SampleCollector, SamplingPolicy};
pub use detector::{DetectorParams, FaceDetector, ScrfdDetector};
pub use ledger::{AttendanceLedger, AttendanceRecord, MarkOutcome, MatchRule};
pub use recognizer::{KnnClassifier, Prediction};
pub use session::{ConfirmOutcome, FrameRecognitions, RecognitionSession, SessionState};
pub use store::{LabelSet, LabelStore};
pub use types::{BoundingBox, FeatureVector, LabeledSample};
