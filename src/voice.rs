//! Voice input vocabulary and speech-output arbitration.
//!
//! Speech recognition itself happens outside the crate.  What arrives here
//! is either a raw phrase (matched against step keywords and dialog
//! vocabularies) or an intent already classified upstream.

use log::debug;

use crate::protocol::normalize_keyword;

/// The closed set of global voice intents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoiceIntent {
    Yes,
    No,
    Next,
    Previous,
    Repeat,
    CallEmergency,
}

const YES: &[&str] = &["yes", "yeah", "yep", "correct", "affirmative", "okay", "ok"];
const NO: &[&str] = &["no", "nope", "negative", "not"];
const NEXT: &[&str] = &["next", "continue", "done", "go on", "next step"];
const PREVIOUS: &[&str] = &["back", "previous", "go back", "previous step"];
const REPEAT: &[&str] = &["repeat", "again", "say again", "what", "pardon"];
const CALL: &[&str] = &["call", "call 911", "call emergency", "call an ambulance", "emergency"];

/// Map a phrase to a global intent.  Exact match after normalization.
pub fn classify(text: &str) -> Option<VoiceIntent> {
    let heard = normalize_keyword(text);
    let heard = heard.as_str();
    [
        (YES, VoiceIntent::Yes),
        (NO, VoiceIntent::No),
        (NEXT, VoiceIntent::Next),
        (PREVIOUS, VoiceIntent::Previous),
        (REPEAT, VoiceIntent::Repeat),
        (CALL, VoiceIntent::CallEmergency),
    ]
    .into_iter()
    .find(|(vocab, _)| vocab.contains(&heard))
    .map(|(_, intent)| intent)
}

/// One unit of voice input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceInput {
    /// Raw recognized phrase.
    Keyword(String),
    /// Intent classified upstream.
    Intent(VoiceIntent),
}

impl VoiceInput {
    /// The global intent this input carries, if any.
    pub fn intent(&self) -> Option<VoiceIntent> {
        match self {
            Self::Keyword(text) => classify(text),
            Self::Intent(intent) => Some(*intent),
        }
    }

    /// The normalized phrase, for raw keywords.
    pub fn heard(&self) -> Option<String> {
        match self {
            Self::Keyword(text) => Some(normalize_keyword(text)),
            Self::Intent(_) => None,
        }
    }
}

/// Drops voice input while speech output is playing and shortly after, so
/// the engine does not react to its own prompts.
#[derive(Debug, Clone)]
pub struct SpeechGate {
    speaking: bool,
    last_finished_ms: Option<u64>,
    cooldown_ms: u64,
}

impl SpeechGate {
    pub fn new(cooldown_ms: u32) -> Self {
        Self {
            speaking: false,
            last_finished_ms: None,
            cooldown_ms: u64::from(cooldown_ms),
        }
    }

    pub fn speech_started(&mut self) {
        self.speaking = true;
    }

    pub fn speech_finished(&mut self, now_ms: u64) {
        self.speaking = false;
        self.last_finished_ms = Some(now_ms);
    }

    /// Whether voice input arriving at `now_ms` should be processed.
    pub fn accepts(&self, now_ms: u64) -> bool {
        if self.speaking {
            debug!("Voice dropped: speech output in progress");
            return false;
        }
        match self.last_finished_ms {
            Some(done) if now_ms.saturating_sub(done) < self.cooldown_ms => {
                debug!("Voice dropped: within speech cooldown");
                false
            }
            _ => true,
        }
    }
}
