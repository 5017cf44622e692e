//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing one structured line per
//! [`SessionEvent`] through the `log` facade.  A UI or TTS adapter would
//! implement the same trait.

use log::{info, warn};

use crate::app::events::{SessionEnd, SessionEvent};
use crate::app::ports::EventSink;
use crate::protocol::TimerEffect;

/// Adapter that logs every [`SessionEvent`].
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::Started { protocol_id } => {
                info!("START | protocol={protocol_id}");
            }
            SessionEvent::StepChanged { from, to, step } => {
                info!(
                    "STEP  | {} -> {to} ({}) | {:?}",
                    from.as_ref().map_or("-", |f| f.as_str()),
                    step.kind.name(),
                    step.title,
                );
                if !step.voice_prompt.is_empty() {
                    info!("SAY   | {}", step.voice_prompt);
                }
            }
            SessionEvent::TimerEventFired {
                step_id,
                at_seconds,
                effect,
            } => match effect {
                TimerEffect::Notification { message } => {
                    info!("TIMER | {step_id}@{at_seconds}s | {message}");
                }
                TimerEffect::Popup { title, message, .. } => {
                    info!("TIMER | {step_id}@{at_seconds}s | popup {title:?}: {message}");
                }
                TimerEffect::Transition { step_id: target } => {
                    info!("TIMER | {step_id}@{at_seconds}s | -> {target}");
                }
            },
            SessionEvent::LoopCapExceeded {
                step_id,
                iterations,
            } => {
                warn!("LOOP  | {step_id} capped after {iterations} iterations");
            }
            SessionEvent::KeywordUnmatched { heard, expected } => {
                info!("HEARD | {heard:?} | expected one of {expected:?}");
            }
            SessionEvent::PromptRepeated { step_id, text } => {
                info!("SAY   | [{step_id}] {text}");
            }
            SessionEvent::SwitchWarning {
                elapsed_secs,
                remaining_secs,
            } => {
                info!("SWAP  | prepare to switch | {elapsed_secs}s in, {remaining_secs}s left");
            }
            SessionEvent::DialogOpened { dialog, prompt } => {
                info!("ASK   | {dialog:?} | {prompt}");
            }
            SessionEvent::DialogClosed { dialog, answer } => {
                let answer = match answer {
                    Some(true) => "yes",
                    Some(false) => "no",
                    None => "dismissed",
                };
                info!("ASK   | {dialog:?} closed ({answer})");
            }
            SessionEvent::RescuersSwitched => info!("SWAP  | rescuers switched"),
            SessionEvent::MetronomeChanged { running, bpm } => {
                info!(
                    "BEAT  | metronome {} ({} bpm)",
                    if *running { "on" } else { "off" },
                    bpm.map_or_else(|| "-".to_owned(), |b| b.to_string()),
                );
            }
            SessionEvent::EmergencyCallRequested => warn!("CALL  | emergency services requested"),
            SessionEvent::SessionEnded(end) => match end {
                SessionEnd::Outcome { step_id, outcome } => {
                    info!("END   | {outcome:?} at {step_id}");
                }
                SessionEnd::Exhausted { message } => info!("END   | exhausted | {message}"),
                SessionEnd::Stopped => info!("END   | stopped"),
            },
        }
    }
}
