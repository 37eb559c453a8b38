//! Operator key input.
//!
//! Keys arrive as lines on stdin (`q` quits, `o` confirms) and from Ctrl-C,
//! funnelled into one channel the capture loops poll between frames.

use std::io::BufRead;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Quit,
    Confirm,
}

pub fn parse_key(line: &str) -> Option<Key> {
    match line.trim().to_ascii_lowercase().as_str() {
        "q" | "quit" => Some(Key::Quit),
        "o" | "ok" => Some(Key::Confirm),
        _ => None,
    }
}

/// Forward recognized stdin lines until stdin closes or the receiver is dropped.
pub fn spawn_stdin_reader(tx: mpsc::Sender<Key>) {
    let spawned = std::thread::Builder::new()
        .name("rollcall-keys".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                let Some(key) = parse_key(&line) else {
                    continue;
                };
                if tx.blocking_send(key).is_err() {
                    break;
                }
            }
            tracing::debug!("stdin key reader exiting");
        });
    if let Err(err) = spawned {
        tracing::warn!(error = %err, "failed to start key reader; only Ctrl-C will stop capture");
    }
}

/// Translate Ctrl-C into a quit key.
pub fn forward_ctrl_c(tx: mpsc::Sender<Key>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = tx.send(Key::Quit).await;
        }
    });
}

/// Next pending key, without blocking.
pub fn poll(rx: &mut mpsc::Receiver<Key>) -> Option<Key> {
    rx.try_recv().ok()
}
