//! Session-scoped interpreter state threaded through every engine call.
//!
//! `EngineState` is the single struct the [`Interpreter`](super::Interpreter)
//! reads from and writes to.  It holds the current position, navigation
//! history, per-step timing, the loop counters that persist for the whole
//! session, and an outbox of [`EngineEvent`]s the controller drains after
//! every call.  The interpreter itself keeps nothing between calls.

use std::collections::{HashMap, HashSet};

use super::EngineEvent;
use crate::protocol::StepId;

/// Mutable state of one protocol run.
#[derive(Debug, Clone)]
pub struct EngineState {
    // -- Position --
    current_step_id: StepId,
    /// Steps to return to with `previous_step`, most recent last.
    history: Vec<StepId>,

    // -- Per-step timing (reset on every step entry) --
    elapsed_seconds: u32,
    beat_count: u32,
    /// `(step, trigger_at_seconds)` pairs already delivered.
    triggered_timer_events: HashSet<(StepId, u32)>,

    // -- Session-wide --
    /// Times each loop step has jumped back.  Never reset.
    loop_iteration_counts: HashMap<StepId, u32>,

    /// Pending notifications for the controller.
    events: Vec<EngineEvent>,
}

impl EngineState {
    pub fn new(initial: StepId) -> Self {
        Self {
            current_step_id: initial,
            history: Vec::new(),
            elapsed_seconds: 0,
            beat_count: 0,
            triggered_timer_events: HashSet::new(),
            loop_iteration_counts: HashMap::new(),
            events: Vec::new(),
        }
    }

    pub fn current_step_id(&self) -> &StepId {
        &self.current_step_id
    }

    pub fn history(&self) -> &[StepId] {
        &self.history
    }

    /// Seconds spent in the current step, as last reported by the clock.
    pub fn elapsed_seconds(&self) -> u32 {
        self.elapsed_seconds
    }

    pub fn beat_count(&self) -> u32 {
        self.beat_count
    }

    /// How many times the loop step `id` has jumped back so far.
    pub fn loop_iterations(&self, id: &str) -> u32 {
        self.loop_iteration_counts.get(id).copied().unwrap_or(0)
    }

    /// Whether the timer event at `at_seconds` of `step` has fired since
    /// the step was entered.
    pub fn has_fired(&self, step: &StepId, at_seconds: u32) -> bool {
        self.triggered_timer_events
            .contains(&(step.clone(), at_seconds))
    }

    /// Remove and return every pending engine event, oldest first.
    pub fn take_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }

    // -----------------------------------------------------------------------
    // Interpreter-only mutation
    // -----------------------------------------------------------------------

    /// Make `step` current and clear all per-step timing.
    pub(crate) fn enter(&mut self, step: StepId) {
        self.current_step_id = step;
        self.elapsed_seconds = 0;
        self.beat_count = 0;
        self.triggered_timer_events.clear();
    }

    pub(crate) fn push_history(&mut self, step: StepId) {
        self.history.push(step);
    }

    pub(crate) fn pop_history(&mut self) -> Option<StepId> {
        self.history.pop()
    }

    pub(crate) fn advance_elapsed(&mut self, seconds: u32) -> u32 {
        self.elapsed_seconds = self.elapsed_seconds.max(seconds);
        self.elapsed_seconds
    }

    pub(crate) fn set_beat_count(&mut self, beats: u32) {
        self.beat_count = beats;
    }

    /// Record a timer event as delivered.  `false` if it already was.
    pub(crate) fn mark_fired(&mut self, step: &StepId, at_seconds: u32) -> bool {
        self.triggered_timer_events
            .insert((step.clone(), at_seconds))
    }

    /// Count one more jump back for loop `step`; returns the new count.
    pub(crate) fn bump_loop(&mut self, step: &StepId) -> u32 {
        let count = self.loop_iteration_counts.entry(step.clone()).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    pub(crate) fn push_event(&mut self, event: EngineEvent) {
        self.events.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enter_resets_per_step_timing_only() {
        let mut state = EngineState::new(StepId::from("a"));
        state.advance_elapsed(12);
        state.set_beat_count(7);
        assert!(state.mark_fired(&StepId::from("a"), 5));
        state.bump_loop(&StepId::from("cycle"));

        state.enter(StepId::from("b"));
        assert_eq!(state.current_step_id().as_str(), "b");
        assert_eq!(state.elapsed_seconds(), 0);
        assert_eq!(state.beat_count(), 0);
        assert!(!state.has_fired(&StepId::from("a"), 5));
        assert_eq!(state.loop_iterations("cycle"), 1);
    }

    #[test]
    fn elapsed_never_moves_backwards() {
        let mut state = EngineState::new(StepId::from("a"));
        assert_eq!(state.advance_elapsed(10), 10);
        assert_eq!(state.advance_elapsed(4), 10);
    }

    #[test]
    fn mark_fired_is_idempotent() {
        let mut state = EngineState::new(StepId::from("a"));
        let step = StepId::from("a");
        assert!(state.mark_fired(&step, 15));
        assert!(!state.mark_fired(&step, 15));
        assert!(state.has_fired(&step, 15));
    }
}
