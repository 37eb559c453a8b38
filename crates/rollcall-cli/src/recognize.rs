//! Live recognition loop.

use crate::config::Config;
use crate::keys::{self, Key};
use crate::voice::Voice;
use anyhow::{Context, Result};
use rollcall_core::session::SessionError;
use rollcall_core::{
    AttendanceLedger, ConfirmOutcome, FaceDetector, KnnClassifier, LabelStore, RecognitionSession,
    ScrfdDetector,
};
use rollcall_hw::Camera;
use tokio::sync::mpsc;

/// Recognize faces from the camera and mark attendance on confirm.
///
/// The model is trained from the label store at start; enrollments made
/// while this runs take effect on the next session.
pub fn run(config: &Config, keys: &mut mpsc::Receiver<Key>) -> Result<()> {
    let mut detector = ScrfdDetector::load(&config.detector_model, config.detector_params())
        .context("face detector unavailable")?;
    let set = LabelStore::new(&config.data_dir)
        .load()
        .context("failed to load face data")?;
    let classifier = KnnClassifier::train(set, config.neighbors)?;
    let ledger = AttendanceLedger::new(&config.attendance_dir).with_match_rule(config.ledger_match);
    tracing::info!(
        samples = classifier.len(),
        k = classifier.neighbors(),
        ledger_match = ?ledger.match_rule(),
        "recognition session starting"
    );
    let mut session = RecognitionSession::new(classifier, ledger);

    let camera = Camera::open(&config.camera_device).context("cannot access the camera")?;
    let mut stream = camera.stream()?;
    let voice = Voice::new(config.tts_command.as_deref());

    println!("Type o + Enter to mark attendance, q + Enter to quit.");

    let mut shown: Vec<String> = Vec::new();
    loop {
        let frame = match stream.next_frame() {
            Ok(frame) => frame,
            Err(err) => {
                session.stop();
                return Err(err).context("camera stopped delivering frames");
            }
        };

        let faces = if frame.is_dark {
            Vec::new()
        } else {
            detector.detect(&frame.data, frame.width, frame.height)?
        };
        let current = session.process_frame(&frame.data, frame.width, frame.height, &faces)?;

        let names = current.names();
        if names != shown {
            if !names.is_empty() {
                println!("In view: {}", names.join(", "));
            }
            shown = names;
        }

        match keys::poll(keys) {
            Some(Key::Quit) => {
                session.stop();
                break;
            }
            Some(Key::Confirm) => match session.confirm(&current) {
                Ok(ConfirmOutcome::Marked(name)) => {
                    voice.say(&format!("Attendance taken for {name}"));
                    std::thread::sleep(config.confirm_cooldown);
                }
                Ok(ConfirmOutcome::AlreadyMarked(name)) => {
                    voice.say(&format!("Already marked for {name}"));
                    std::thread::sleep(config.confirm_cooldown);
                }
                Ok(ConfirmOutcome::NoFace) => println!("No face recognized; nothing marked."),
                Ok(ConfirmOutcome::Ambiguous(names)) => println!(
                    "Several people in view ({}); confirm one person at a time.",
                    names.join(", ")
                ),
                Err(SessionError::Ledger(err)) => {
                    tracing::error!(error = %err, "attendance write failed");
                    eprintln!("Attendance could not be recorded: {err}");
                }
                Err(err) => return Err(err.into()),
            },
            None => {}
        }
    }

    println!("Session ended.");
    Ok(())
}
