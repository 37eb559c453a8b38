//! Enrollment through attendance, without camera or detector.

use chrono::NaiveDate;
use rollcall_core::{
    AttendanceLedger, BoundingBox, ConfirmOutcome, KnnClassifier, LabelStore, RecognitionSession,
    SampleCollector, SamplingPolicy,
};

const W: u32 = 120;
const H: u32 = 120;

fn face() -> BoundingBox {
    BoundingBox { x: 20.0, y: 20.0, width: 80.0, height: 80.0, confidence: 0.99 }
}

/// A frame whose face region has a subject-specific gradient.
fn frame(subject: u8) -> Vec<u8> {
    (0..W * H)
        .map(|i| {
            let (x, y) = (i % W, i / W);
            (subject as u32 * 40 + (x + y) / 8).min(255) as u8
        })
        .collect()
}

fn enroll(store: &LabelStore, name: &str, subject: u8, frames: usize) -> usize {
    let mut collector = SampleCollector::new(name, SamplingPolicy::default()).unwrap();
    let f = frame(subject);
    for _ in 0..frames {
        if collector.is_complete() {
            break;
        }
        collector.offer(&f, W, H, &[face()]);
    }
    store.merge(collector.finish().unwrap()).unwrap().added
}

#[test]
fn test_enroll_recognize_and_mark() {
    let dir = tempfile::tempdir().unwrap();
    let store = LabelStore::new(dir.path().join("data"));

    assert_eq!(enroll(&store, "Alice", 1, 5000), 100);
    assert_eq!(enroll(&store, "Bob", 4, 495), 50);

    let set = store.load().unwrap();
    assert_eq!(set.len(), 150);
    assert!(set.samples[..100].iter().all(|s| s.name == "Alice"));
    assert!(set.samples[100..].iter().all(|s| s.name == "Bob"));

    let knn = KnnClassifier::train(set, 5).unwrap();
    let ledger = AttendanceLedger::new(dir.path().join("Attendance"));
    let mut session = RecognitionSession::new(knn, ledger);
    let morning = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap().and_hms_opt(8, 30, 0).unwrap();

    let bob = session.process_frame(&frame(4), W, H, &[face()]).unwrap();
    assert_eq!(session.confirm_at(&bob, morning).unwrap(), ConfirmOutcome::Marked("Bob".into()));

    let alice = session.process_frame(&frame(1), W, H, &[face()]).unwrap();
    assert_eq!(session.confirm_at(&alice, morning).unwrap(), ConfirmOutcome::Marked("Alice".into()));
    assert_eq!(
        session.confirm_at(&alice, morning).unwrap(),
        ConfirmOutcome::AlreadyMarked("Alice".into())
    );

    let records = session.ledger().records(morning.date()).unwrap();
    let names: Vec<_> = records.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["Bob", "Alice"]);
}
