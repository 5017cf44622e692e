//! Recording event sink and session helpers for integration tests.

use lifeline::adapters::time::ManualClock;
use lifeline::app::events::SessionEvent;
use lifeline::app::ports::{Clock, EventSink};
use lifeline::app::{SessionCommand, SessionController};
use lifeline::config::SessionConfig;
use lifeline::protocol::library::ProtocolLibrary;
use lifeline::voice::VoiceInput;

/// Keeps every emitted event in order.
#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<SessionEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, pred: impl Fn(&SessionEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }

    /// Step ids entered, in order.
    pub fn visited(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::StepChanged { to, .. } => Some(to.as_str().to_owned()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &SessionEvent) {
        self.events.push(event.clone());
    }
}

/// Drives a controller on a bundled protocol with a fake clock.
pub struct Harness {
    pub controller: SessionController,
    pub sink: RecordingSink,
    pub clock: ManualClock,
}

#[allow(dead_code)]
impl Harness {
    pub fn bundled(id: &str) -> Self {
        Self::with_config(id, SessionConfig::default())
    }

    pub fn with_config(id: &str, config: SessionConfig) -> Self {
        let library = ProtocolLibrary::bundled().expect("bundled protocols load");
        let protocol = library.get(id).expect("bundled protocol exists");
        let mut sink = RecordingSink::new();
        let mut controller = SessionController::new(protocol, config);
        controller.start(&mut sink);
        Self {
            controller,
            sink,
            clock: ManualClock::new(0),
        }
    }

    pub fn send(&mut self, cmd: SessionCommand) {
        self.controller
            .handle(cmd, self.clock.now_ms(), &mut self.sink);
    }

    pub fn say(&mut self, text: &str) {
        self.send(SessionCommand::Voice(VoiceInput::Keyword(text.into())));
    }

    /// One tick per second of fake time.
    pub fn wait(&mut self, secs: u32) {
        for _ in 0..secs {
            self.clock.advance(1000);
            self.send(SessionCommand::Tick);
        }
    }

    pub fn step(&self) -> String {
        self.controller
            .snapshot()
            .expect("current step resolves")
            .step
            .id
            .as_str()
            .to_owned()
    }
}
