//! Inbound commands to the session controller.
//!
//! These represent everything the outside world can do to a running
//! session (taps, recognized speech, runtime ticks, speech-output
//! notifications) that the
//! [`SessionController`](super::service::SessionController) interprets and
//! acts upon, in order, through one entry point.

use std::fmt;
use std::str::FromStr;

use crate::protocol::StepId;
use crate::voice::{VoiceInput, VoiceIntent};

/// Commands that external adapters can send into the session core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// Manual "next" tap.
    Next,
    /// Manual "back" tap.
    Previous,
    /// Speak the current prompt again.
    Repeat,
    /// Tap answer to the open dialog or the current popup step.
    Answer(bool),
    /// Jump straight to a step (path selection screen).
    SelectPath(StepId),
    /// Recognized speech.
    Voice(VoiceInput),
    /// One runtime tick of `tick_interval_ms`.
    Tick,
    /// One metronome beat.
    Beat,
    /// Speech output began.
    SpeechStarted,
    /// Speech output completed.
    SpeechFinished,
    /// Ask to call emergency services (opens a confirmation dialog).
    CallEmergency,
    /// End the session now.
    Stop,
}

/// A text command that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseCommandError(pub String);

impl fmt::Display for ParseCommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unrecognized command '{}'", self.0)
    }
}

impl std::error::Error for ParseCommandError {}

/// Text form used by the simulator shell:
///
/// `next`, `back`, `repeat`, `yes`, `no`, `path <step>`, `say <phrase>`,
/// `intent <yes|no|next|back|repeat|call>`, `tick`, `beat`,
/// `speak-start`, `speak-end`, `call`, `stop`.
impl FromStr for SessionCommand {
    type Err = ParseCommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let line = s.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((w, r)) => (w, r.trim()),
            None => (line, ""),
        };
        let err = || ParseCommandError(line.to_owned());

        let cmd = match (word.to_lowercase().as_str(), rest.is_empty()) {
            ("next", true) => Self::Next,
            ("back" | "previous", true) => Self::Previous,
            ("repeat", true) => Self::Repeat,
            ("yes", true) => Self::Answer(true),
            ("no", true) => Self::Answer(false),
            ("tick", true) => Self::Tick,
            ("beat", true) => Self::Beat,
            ("speak-start", true) => Self::SpeechStarted,
            ("speak-end", true) => Self::SpeechFinished,
            ("call", true) => Self::CallEmergency,
            ("stop" | "quit", true) => Self::Stop,
            ("path", false) => Self::SelectPath(StepId::from(rest)),
            ("say", false) => Self::Voice(VoiceInput::Keyword(rest.to_owned())),
            ("intent", false) => Self::Voice(VoiceInput::Intent(parse_intent(rest).ok_or_else(err)?)),
            _ => return Err(err()),
        };
        Ok(cmd)
    }
}

fn parse_intent(word: &str) -> Option<VoiceIntent> {
    match word.to_lowercase().as_str() {
        "yes" => Some(VoiceIntent::Yes),
        "no" => Some(VoiceIntent::No),
        "next" => Some(VoiceIntent::Next),
        "back" | "previous" => Some(VoiceIntent::Previous),
        "repeat" => Some(VoiceIntent::Repeat),
        "call" => Some(VoiceIntent::CallEmergency),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_words() {
        assert_eq!("next".parse::<SessionCommand>(), Ok(SessionCommand::Next));
        assert_eq!(" BACK ".parse::<SessionCommand>(), Ok(SessionCommand::Previous));
        assert_eq!("yes".parse::<SessionCommand>(), Ok(SessionCommand::Answer(true)));
        assert_eq!("speak-end".parse::<SessionCommand>(), Ok(SessionCommand::SpeechFinished));
    }

    #[test]
    fn parses_arguments() {
        assert_eq!(
            "say Scene is safe".parse::<SessionCommand>(),
            Ok(SessionCommand::Voice(VoiceInput::Keyword("Scene is safe".into())))
        );
        assert_eq!(
            "path chest_compressions".parse::<SessionCommand>(),
            Ok(SessionCommand::SelectPath(StepId::from("chest_compressions")))
        );
        assert_eq!(
            "intent call".parse::<SessionCommand>(),
            Ok(SessionCommand::Voice(VoiceInput::Intent(VoiceIntent::CallEmergency)))
        );
    }

    #[test]
    fn rejects_unknown_or_misshapen_input() {
        assert!("dance".parse::<SessionCommand>().is_err());
        assert!("say".parse::<SessionCommand>().is_err());
        assert!("next now".parse::<SessionCommand>().is_err());
        assert!("intent maybe".parse::<SessionCommand>().is_err());
    }
}
