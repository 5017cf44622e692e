//! Outbound session events.
//!
//! The [`SessionController`](super::service::SessionController) emits these
//! through the [`EventSink`](super::ports::EventSink) port.  Adapters on the
//! other side decide what to do with them: render a step, speak a prompt,
//! play a cue, or just log.

use super::dialog::DialogKind;
use crate::protocol::{OutcomeKind, StepDefinition, StepId, TimerEffect};

/// Structured events emitted by the session core.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The session has started on its protocol.
    Started { protocol_id: String },

    /// The current step changed; carries the full new step for rendering.
    StepChanged {
        from: Option<StepId>,
        to: StepId,
        step: Box<StepDefinition>,
    },

    /// A timer sub-event of a timed step fired.
    TimerEventFired {
        step_id: StepId,
        at_seconds: u32,
        effect: TimerEffect,
    },

    /// A loop hit its cap and the session moved to the loop's exit.
    LoopCapExceeded { step_id: StepId, iterations: u32 },

    /// Voice input matched nothing; `expected` lists what would.
    KeywordUnmatched { heard: String, expected: Vec<String> },

    /// The current prompt should be spoken again.
    PromptRepeated { step_id: StepId, text: String },

    /// Repeatable "prepare to switch" cue from the compression watchdog.
    SwitchWarning { elapsed_secs: u32, remaining_secs: u32 },

    /// A dialog opened on top of the step.
    DialogOpened { dialog: DialogKind, prompt: String },

    /// A dialog closed.  `answer` is `None` when it was dismissed by
    /// navigation instead of answered.
    DialogClosed { dialog: DialogKind, answer: Option<bool> },

    /// A second rescuer took over; compressions continue.
    RescuersSwitched,

    /// The metronome should start or stop.
    MetronomeChanged { running: bool, bpm: Option<u16> },

    /// The user confirmed calling emergency services.
    EmergencyCallRequested,

    /// The session is over; no further events follow.
    SessionEnded(SessionEnd),
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// A terminal step was reached.
    Outcome { step_id: StepId, outcome: OutcomeKind },
    /// The lone rescuer chose to rest.
    Exhausted { message: String },
    /// Stopped on request.
    Stopped,
}

/// Point-in-time view of a session for the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub protocol_id: String,
    pub step: StepDefinition,
    pub elapsed_seconds: u32,
    pub beat_count: u32,
    pub waiting_for_voice: bool,
    pub at_terminal: bool,
    pub open_dialog: Option<DialogKind>,
    pub watchdog_seconds: u32,
    pub metronome_running: bool,
    pub finished: bool,
}
