//! Spoken and printed operator feedback.

use std::process::Command;

/// Announces attendance decisions.
///
/// With a configured TTS program (e.g. `espeak` or `spd-say -w`) the message
/// is passed as its final argument; the call blocks until speech ends.
pub struct Voice {
    command: Option<Vec<String>>,
}

impl Voice {
    pub fn new(command: Option<&str>) -> Self {
        let command = command
            .map(|c| c.split_whitespace().map(str::to_string).collect::<Vec<_>>())
            .filter(|parts| !parts.is_empty());
        Self { command }
    }

    pub fn say(&self, message: &str) {
        println!("{message}");
        let Some((program, args)) = self.command.as_ref().and_then(|c| c.split_first()) else {
            return;
        };
        match Command::new(program).args(args).arg(message).status() {
            Ok(status) if status.success() => {}
            Ok(status) => tracing::warn!(program = %program, %status, "speech command failed"),
            Err(err) => tracing::warn!(program = %program, error = %err, "speech command unavailable"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_is_split_into_program_and_args() {
        let voice = Voice::new(Some("spd-say -w"));
        assert_eq!(voice.command, Some(vec!["spd-say".to_string(), "-w".to_string()]));
        assert!(Voice::new(Some("   ")).command.is_none());
        assert!(Voice::new(None).command.is_none());
    }

    #[test]
    fn test_missing_program_does_not_panic() {
        Voice::new(Some("/nonexistent/tts-binary")).say("Attendance taken for Alice");
    }
}
