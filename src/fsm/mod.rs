//! Data-driven step graph interpreter.
//!
//! The protocol is the state table: each [`StepDefinition`] is one row, and
//! its [`StepKind`] decides which inputs can move the session forward.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Input                  Step kinds it can advance            │
//! │  ─────────────────────  ──────────────────────────────────   │
//! │  next_step()            Instruction · Timed · Loop           │
//! │  handle_voice_keyword   VoiceTrigger · Popup                 │
//! │  handle_popup_selection Popup                                │
//! │  update_elapsed_time    Timed (timer events, duration)       │
//! │  update_dwell_time      Instruction (duration)               │
//! │                         VoiceTrigger (timeout)               │
//! │  update_beat_count      Timed with count_beats               │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The [`Interpreter`] is immutable; every call takes the session's
//! [`EngineState`] explicitly and leaves [`EngineEvent`]s in its outbox.
//! Operations that may advance return `Ok(true)` when the current step
//! changed.  A keyword that matches nothing is `Ok(false)`, never an error.

pub mod context;
pub mod steps;

use std::sync::Arc;

use log::{info, warn};

use crate::error::{EngineError, Result};
use crate::protocol::{
    OutcomeKind, ProtocolDefinition, StepDefinition, StepId, StepKind, TimerEffect, TimerEvent,
    normalize_keyword,
};
pub use context::EngineState;

// ---------------------------------------------------------------------------
// Engine events
// ---------------------------------------------------------------------------

/// Notifications the interpreter leaves in [`EngineState`] for the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// The current step changed.  `from` is `None` only at session start.
    StepChanged { from: Option<StepId>, to: StepId },
    /// A timer sub-event of a timed step became due.
    TimerEventFired {
        step_id: StepId,
        at_seconds: u32,
        effect: TimerEffect,
    },
    /// A loop step hit its iteration cap and took its exit edge.
    LoopCapExceeded { step_id: StepId, iterations: u32 },
    /// A terminal step was entered.
    TerminalReached { step_id: StepId, outcome: OutcomeKind },
}

// ---------------------------------------------------------------------------
// Interpreter
// ---------------------------------------------------------------------------

/// Executes one validated protocol.
#[derive(Debug, Clone)]
pub struct Interpreter {
    protocol: Arc<ProtocolDefinition>,
    /// Global bound applied to every loop, with or without `max_iterations`.
    max_loop_iterations: u32,
}

impl Interpreter {
    pub fn new(protocol: Arc<ProtocolDefinition>, max_loop_iterations: u32) -> Self {
        Self {
            protocol,
            max_loop_iterations,
        }
    }

    pub fn protocol(&self) -> &ProtocolDefinition {
        &self.protocol
    }

    /// Create the state for a fresh run, positioned on the initial step.
    pub fn start(&self) -> EngineState {
        let initial = self.protocol.initial_step_id().clone();
        info!("Protocol '{}' starting at '{initial}'", self.protocol.id());
        let mut state = EngineState::new(initial.clone());
        state.push_event(EngineEvent::StepChanged {
            from: None,
            to: initial.clone(),
        });
        if let Some(StepKind::Terminal { outcome }) = self.protocol.step(initial.as_str()).map(|s| &s.kind) {
            state.push_event(EngineEvent::TerminalReached {
                step_id: initial,
                outcome: *outcome,
            });
        }
        state
    }

    /// The full definition of the step the session is on.
    pub fn current_step<'a>(&'a self, state: &EngineState) -> Result<&'a StepDefinition> {
        let id = state.current_step_id();
        self.protocol
            .step(id.as_str())
            .ok_or_else(|| EngineError::UnknownStep(id.clone()))
    }

    /// Jump to `id`.
    ///
    /// The step being left is pushed onto history unless it is `id` itself.
    /// Per-step timing is always reset.
    pub fn go_to_step(&self, state: &mut EngineState, id: &str) -> Result<()> {
        let target = self
            .protocol
            .step(id)
            .ok_or_else(|| EngineError::UnknownStep(StepId::from(id)))?;

        let from = state.current_step_id().clone();
        if from != target.id {
            state.push_history(from.clone());
        }

        state.enter(target.id.clone());
        info!("Step transition: {from} -> {}", target.id);
        state.push_event(EngineEvent::StepChanged {
            from: Some(from),
            to: target.id.clone(),
        });
        if let StepKind::Terminal { outcome } = target.kind {
            info!("Terminal step '{}' reached ({outcome:?})", target.id);
            state.push_event(EngineEvent::TerminalReached {
                step_id: target.id.clone(),
                outcome,
            });
        }
        Ok(())
    }

    /// Return to the most recent history entry.  `false` when history is empty.
    pub fn previous_step(&self, state: &mut EngineState) -> bool {
        let Some(prev) = state.pop_history() else {
            return false;
        };
        let from = state.current_step_id().clone();
        info!("Step back: {from} -> {prev}");
        state.enter(prev.clone());
        state.push_event(EngineEvent::StepChanged {
            from: Some(from),
            to: prev,
        });
        true
    }

    /// Like [`previous_step`](Self::previous_step), but discards loop nodes
    /// on top of history so the user lands on a step they actually saw.
    /// `false` and no change when no such step exists.
    pub fn previous_resting_step(&self, state: &mut EngineState) -> bool {
        let Some(keep) = state
            .history()
            .iter()
            .rposition(|id| !self.is_loop_node(id.as_str()))
        else {
            return false;
        };
        while state.history().len() > keep + 1 {
            state.pop_history();
        }
        self.previous_step(state)
    }

    fn is_loop_node(&self, id: &str) -> bool {
        self.protocol
            .step(id)
            .is_some_and(|s| matches!(s.kind, StepKind::Loop { .. }))
    }

    /// Advance along the unconditional edge, or resolve a loop.
    pub fn next_step(&self, state: &mut EngineState) -> Result<bool> {
        let step = self.current_step(state)?;
        match &step.kind {
            StepKind::Loop {
                loop_to_step_id,
                max_iterations,
                next_step_id,
            } => {
                self.handle_loop(state, step, loop_to_step_id, *max_iterations, next_step_id.as_ref())?;
                Ok(true)
            }
            kind => match steps::forward_edge(kind) {
                Some(next) => {
                    self.go_to_step(state, next.as_str())?;
                    Ok(true)
                }
                None => Ok(false),
            },
        }
    }

    /// Route a recognized phrase to the current step.
    pub fn handle_voice_keyword(&self, state: &mut EngineState, text: &str) -> Result<bool> {
        let heard = normalize_keyword(text);
        let step = self.current_step(state)?;
        let target = match &step.kind {
            StepKind::VoiceTrigger {
                expected_keywords,
                next_step_id,
                ..
            } if steps::matches_keyword(expected_keywords, &heard) => next_step_id,
            StepKind::Popup {
                yes_next_step_id,
                yes_keywords,
                ..
            } if steps::matches_keyword(yes_keywords, &heard) => yes_next_step_id,
            StepKind::Popup {
                no_next_step_id,
                no_keywords,
                ..
            } if steps::matches_keyword(no_keywords, &heard) => no_next_step_id,
            _ => return Ok(false),
        };
        info!("Keyword '{heard}' matched on '{}'", step.id);
        self.go_to_step(state, target.as_str())?;
        Ok(true)
    }

    /// Branch a popup step on a direct yes/no answer.
    pub fn handle_popup_selection(&self, state: &mut EngineState, is_yes: bool) -> Result<bool> {
        let step = self.current_step(state)?;
        let StepKind::Popup {
            yes_next_step_id,
            no_next_step_id,
            ..
        } = &step.kind
        else {
            return Ok(false);
        };
        let target = if is_yes { yes_next_step_id } else { no_next_step_id };
        self.go_to_step(state, target.as_str())?;
        Ok(true)
    }

    /// Report seconds spent in a timed step.
    ///
    /// Each due timer event fires once, in trigger order.  A transition
    /// effect jumps at once and skips the rest.  At or past the duration the
    /// step auto-advances.
    pub fn update_elapsed_time(&self, state: &mut EngineState, seconds: u32) -> Result<bool> {
        let step = self.current_step(state)?;
        let StepKind::Timed {
            duration_seconds,
            timer_events,
            next_step_id,
            ..
        } = &step.kind
        else {
            return Ok(false);
        };

        let elapsed = state.advance_elapsed(seconds);
        let mut due: Vec<&TimerEvent> = timer_events
            .iter()
            .filter(|e| e.trigger_at_seconds <= elapsed)
            .collect();
        due.sort_by_key(|e| e.trigger_at_seconds);

        for event in due {
            if !state.mark_fired(&step.id, event.trigger_at_seconds) {
                continue;
            }
            info!("Timer event on '{}' at {}s", step.id, event.trigger_at_seconds);
            state.push_event(EngineEvent::TimerEventFired {
                step_id: step.id.clone(),
                at_seconds: event.trigger_at_seconds,
                effect: event.effect.clone(),
            });
            if let TimerEffect::Transition { step_id } = &event.effect {
                self.go_to_step(state, step_id.as_str())?;
                return Ok(true);
            }
        }

        if elapsed >= *duration_seconds {
            self.go_to_step(state, next_step_id.as_str())?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Report seconds spent in an instruction or voice-trigger step.
    pub fn update_dwell_time(&self, state: &mut EngineState, seconds: u32) -> Result<bool> {
        let step = self.current_step(state)?;
        match &step.kind {
            StepKind::Instruction {
                next_step_id,
                duration_seconds: Some(limit),
                ..
            } => {
                if state.advance_elapsed(seconds) >= *limit {
                    self.go_to_step(state, next_step_id.as_str())?;
                    return Ok(true);
                }
            }
            StepKind::VoiceTrigger {
                timeout_seconds: Some(limit),
                timeout_step_id,
                ..
            } => {
                if state.advance_elapsed(seconds) >= *limit {
                    let fallback = timeout_step_id.as_ref().ok_or_else(|| {
                        EngineError::MissingFallbackEdge {
                            step: step.id.clone(),
                            edge: "timeout_step_id",
                        }
                    })?;
                    warn!("Voice trigger '{}' timed out after {limit}s", step.id);
                    self.go_to_step(state, fallback.as_str())?;
                    return Ok(true);
                }
            }
            _ => {}
        }
        Ok(false)
    }

    /// Report metronome beats counted in a beat-counted timed step.
    pub fn update_beat_count(&self, state: &mut EngineState, beats: u32) -> Result<bool> {
        let step = self.current_step(state)?;
        let StepKind::Timed {
            count_beats: true,
            target_beats: Some(target),
            next_step_id,
            ..
        } = &step.kind
        else {
            return Ok(false);
        };
        state.set_beat_count(beats);
        if beats >= *target {
            info!("Beat target {target} reached on '{}'", step.id);
            self.go_to_step(state, next_step_id.as_str())?;
            return Ok(true);
        }
        Ok(false)
    }

    pub fn is_waiting_for_voice(&self, state: &EngineState) -> bool {
        self.current_step(state)
            .is_ok_and(|s| matches!(s.kind, StepKind::VoiceTrigger { .. }))
    }

    pub fn is_terminal(&self, state: &EngineState) -> bool {
        self.current_step(state)
            .is_ok_and(|s| matches!(s.kind, StepKind::Terminal { .. }))
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn handle_loop(
        &self,
        state: &mut EngineState,
        step: &StepDefinition,
        loop_to: &StepId,
        max_iterations: Option<u32>,
        exit: Option<&StepId>,
    ) -> Result<()> {
        let cap = max_iterations.map_or(self.max_loop_iterations, |m| m.min(self.max_loop_iterations));
        let count = state.loop_iterations(step.id.as_str());

        if count >= cap {
            warn!("Loop '{}' reached its cap of {cap}", step.id);
            state.push_event(EngineEvent::LoopCapExceeded {
                step_id: step.id.clone(),
                iterations: count,
            });
            let exit = exit.ok_or_else(|| EngineError::MissingFallbackEdge {
                step: step.id.clone(),
                edge: "next_step_id",
            })?;
            return self.go_to_step(state, exit.as_str());
        }

        let count = state.bump_loop(&step.id);
        info!("Loop '{}' iteration {count}/{cap}", step.id);
        self.go_to_step(state, loop_to.as_str())
    }
}
