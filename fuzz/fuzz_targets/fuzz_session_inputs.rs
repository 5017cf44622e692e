//! Fuzz target: `SessionController::handle`
//!
//! Decodes the input into a command stream (one byte per command) and
//! drives the bundled CPR protocol with it.  The session must never panic
//! and the current step must always resolve.
//!
//! cargo fuzz run fuzz_session_inputs

#![no_main]

use libfuzzer_sys::fuzz_target;
use lifeline::app::events::SessionEvent;
use lifeline::app::ports::EventSink;
use lifeline::app::{SessionCommand, SessionController};
use lifeline::config::SessionConfig;
use lifeline::protocol::library::ProtocolLibrary;
use lifeline::protocol::StepId;
use lifeline::voice::VoiceInput;

struct Discard;

impl EventSink for Discard {
    fn emit(&mut self, _event: &SessionEvent) {}
}

const PHRASES: &[&str] = &["safe", "yes", "no", "alone", "keep going", "call 911", "cancel"];
const STEPS: &[&str] = &["chest_compressions", "cpr_cycle", "help_check", "missing"];

fn decode(byte: u8) -> SessionCommand {
    let arg = usize::from(byte >> 4);
    match byte & 0x0f {
        0..=5 => SessionCommand::Tick,
        6 | 7 => SessionCommand::Beat,
        8 => SessionCommand::Next,
        9 => SessionCommand::Previous,
        10 => SessionCommand::Answer(arg % 2 == 0),
        11 => SessionCommand::Voice(VoiceInput::Keyword(PHRASES[arg % PHRASES.len()].into())),
        12 => SessionCommand::SelectPath(StepId::from(STEPS[arg % STEPS.len()])),
        13 => SessionCommand::CallEmergency,
        14 => SessionCommand::Repeat,
        _ => SessionCommand::SpeechFinished,
    }
}

fuzz_target!(|data: &[u8]| {
    let Ok(library) = ProtocolLibrary::bundled() else {
        return;
    };
    let Some(protocol) = library.get("cpr") else {
        return;
    };
    let config = SessionConfig {
        switch_warning_secs: 4,
        rescuer_switch_secs: 6,
        ..SessionConfig::default()
    };
    let mut controller = SessionController::new(protocol, config);
    let mut sink = Discard;
    controller.start(&mut sink);

    for (i, &byte) in data.iter().enumerate() {
        controller.handle(decode(byte), i as u64 * 100, &mut sink);
        assert!(controller.snapshot().is_ok());
    }
});
