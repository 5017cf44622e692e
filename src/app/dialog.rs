//! Session dialogs and their yes/no vocabularies.
//!
//! While any dialog is open, voice input is answered by the top dialog and
//! never reaches the step interpreter.  The stack is fixed-capacity: a
//! session never has more than one safety dialog, one emergency-call
//! confirmation and one step popup open at the same time.

use heapless::Vec as HVec;
use log::warn;

use crate::protocol::StepId;
use crate::voice::{VoiceInput, VoiceIntent};

/// Maximum simultaneously open dialogs.
pub const MAX_DIALOGS: usize = 4;

/// Discriminant of [`Dialog`], for events and snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogKind {
    RescuerSwitch,
    ContinueOrRest,
    EmergencyCall,
    StepPopup,
}

/// An open yes/no question.
#[derive(Debug, Clone, PartialEq)]
pub enum Dialog {
    /// "Is someone there to take over compressions?"
    RescuerSwitch,
    /// "Can you keep going, or do you need to rest?"
    ContinueOrRest,
    /// "Call emergency services now?"
    EmergencyCall,
    /// Raised by a timer event on a timed step.
    StepPopup {
        step_id: StepId,
        title: String,
        message: String,
        yes_step_id: Option<StepId>,
        no_step_id: Option<StepId>,
    },
}

const SWITCH_YES: &[&str] = &["help", "switch", "someone", "someone is here", "take over", "here"];
const SWITCH_NO: &[&str] = &["alone", "no one", "nobody", "just me", "only me"];
const CONTINUE_YES: &[&str] = &["continue", "keep going", "go on", "i can"];
const CONTINUE_NO: &[&str] = &["rest", "stop", "tired", "exhausted", "i can't", "i cannot"];
const CALL_YES: &[&str] = &["call", "call now", "call them"];
const CALL_NO: &[&str] = &["cancel", "don't call", "do not call"];

impl Dialog {
    pub fn kind(&self) -> DialogKind {
        match self {
            Self::RescuerSwitch => DialogKind::RescuerSwitch,
            Self::ContinueOrRest => DialogKind::ContinueOrRest,
            Self::EmergencyCall => DialogKind::EmergencyCall,
            Self::StepPopup { .. } => DialogKind::StepPopup,
        }
    }

    /// Text shown and spoken when the dialog opens.
    pub fn prompt(&self) -> String {
        match self {
            Self::RescuerSwitch => {
                "Two minutes of compressions. Is someone there to take over?".into()
            }
            Self::ContinueOrRest => "Can you keep going, or do you need to rest?".into(),
            Self::EmergencyCall => "Call emergency services now?".into(),
            Self::StepPopup { title, message, .. } => format!("{title}: {message}"),
        }
    }

    /// Whether the compression watchdog stays paused while this is open.
    pub fn pauses_watchdog(&self) -> bool {
        matches!(self, Self::RescuerSwitch | Self::ContinueOrRest)
    }

    /// Read a yes/no answer out of voice input.  `None` if it is neither.
    pub fn interpret(&self, input: &VoiceInput) -> Option<bool> {
        if let Some(heard) = input.heard() {
            let (yes, no) = self.vocabulary();
            if yes.contains(&heard.as_str()) {
                return Some(true);
            }
            if no.contains(&heard.as_str()) {
                return Some(false);
            }
        }
        match (self, input.intent()?) {
            (_, VoiceIntent::Yes) => Some(true),
            (_, VoiceIntent::No) => Some(false),
            (Self::ContinueOrRest, VoiceIntent::Next) => Some(true),
            (Self::EmergencyCall, VoiceIntent::CallEmergency) => Some(true),
            _ => None,
        }
    }

    fn vocabulary(&self) -> (&'static [&'static str], &'static [&'static str]) {
        match self {
            Self::RescuerSwitch => (SWITCH_YES, SWITCH_NO),
            Self::ContinueOrRest => (CONTINUE_YES, CONTINUE_NO),
            Self::EmergencyCall => (CALL_YES, CALL_NO),
            Self::StepPopup { .. } => (&[], &[]),
        }
    }
}

/// Fixed-capacity stack of open dialogs; the last pushed answers first.
#[derive(Debug, Clone, Default)]
pub struct DialogStack {
    dialogs: HVec<Dialog, MAX_DIALOGS>,
}

impl DialogStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a dialog on top.  `false` if the stack is full.
    pub fn push(&mut self, dialog: Dialog) -> bool {
        match self.dialogs.push(dialog) {
            Ok(()) => true,
            Err(dropped) => {
                warn!("Dialog stack full, dropping {:?}", dropped.kind());
                false
            }
        }
    }

    pub fn top(&self) -> Option<&Dialog> {
        self.dialogs.last()
    }

    pub fn pop(&mut self) -> Option<Dialog> {
        self.dialogs.pop()
    }

    pub fn is_empty(&self) -> bool {
        self.dialogs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.dialogs.len()
    }

    /// Whether a rescuer-switch or continue/rest dialog is open.
    pub fn has_rescuer_dialog(&self) -> bool {
        self.dialogs.iter().any(Dialog::pauses_watchdog)
    }

    pub fn contains(&self, kind: DialogKind) -> bool {
        self.dialogs.iter().any(|d| d.kind() == kind)
    }

    /// Close every step popup.  Returns how many were open.
    pub fn clear_step_popups(&mut self) -> usize {
        let before = self.dialogs.len();
        self.dialogs.retain(|d| d.kind() != DialogKind::StepPopup);
        before - self.dialogs.len()
    }

    /// Close everything, returning the kinds that were open, top first.
    pub fn clear(&mut self) -> Vec<DialogKind> {
        let mut closed = Vec::with_capacity(self.dialogs.len());
        while let Some(d) = self.dialogs.pop() {
            closed.push(d.kind());
        }
        closed
    }
}
