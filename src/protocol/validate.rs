//! Load-time graph validation.
//!
//! Hard failures ([`ProtocolError`]) mean the session cannot start.  Soft
//! findings ([`ContentWarning`]) are returned for the authoring pipeline to
//! surface; the protocol still runs.
//!
//! Checks, in order:
//!
//! 1. The graph is non-empty and `initial_step_id` resolves.
//! 2. Per step (in id order): every edge is present, non-empty, and resolves;
//!    variant-specific content rules hold.
//! 3. No cycle is made only of edges taken without time passing (loop
//!    edges and timer transitions at 0 s).
//! 4. Reachability from the initial step, for warnings only.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

use log::warn;

use super::{StepDefinition, StepId, StepKind, TimerEffect};
use crate::error::ProtocolError;

/// Non-fatal content-quality findings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentWarning {
    /// A voice trigger with no timeout waits indefinitely for a keyword.
    VoiceTriggerWithoutTimeout(StepId),
    /// A loop without `max_iterations`; only the global cap bounds it.
    LoopWithoutCap(StepId),
    /// No path from the initial step reaches this step.
    UnreachableStep(StepId),
}

impl fmt::Display for ContentWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VoiceTriggerWithoutTimeout(id) => {
                write!(f, "voice trigger '{id}' has no timeout and may wait indefinitely")
            }
            Self::LoopWithoutCap(id) => {
                write!(f, "loop '{id}' has no max_iterations; the global cap applies")
            }
            Self::UnreachableStep(id) => write!(f, "step '{id}' is unreachable"),
        }
    }
}

/// Validate a keyed step map.  Returns the content warnings on success.
pub fn validate_graph(
    initial: &StepId,
    steps: &BTreeMap<StepId, StepDefinition>,
) -> Result<Vec<ContentWarning>, ProtocolError> {
    if steps.is_empty() {
        return Err(ProtocolError::EmptyProtocol);
    }
    if !steps.contains_key(initial) {
        return Err(ProtocolError::UnknownInitialStep(initial.clone()));
    }

    let mut warnings = Vec::new();
    for step in steps.values() {
        check_edges(step, steps)?;
        check_content(step, &mut warnings)?;
    }
    check_instant_cycles(steps)?;

    for id in unreachable_steps(initial, steps) {
        warnings.push(ContentWarning::UnreachableStep(id));
    }
    for w in &warnings {
        warn!("protocol content: {w}");
    }
    Ok(warnings)
}

fn check_edges(
    step: &StepDefinition,
    steps: &BTreeMap<StepId, StepDefinition>,
) -> Result<(), ProtocolError> {
    for (edge, target) in step.kind.edges() {
        if target.is_empty() {
            return Err(ProtocolError::MissingFallbackEdge {
                step: step.id.clone(),
                edge,
            });
        }
        if !steps.contains_key(target) {
            return Err(ProtocolError::DanglingReference {
                step: step.id.clone(),
                edge,
                target: target.clone(),
            });
        }
    }
    Ok(())
}

fn check_content(
    step: &StepDefinition,
    warnings: &mut Vec<ContentWarning>,
) -> Result<(), ProtocolError> {
    let invalid = |reason: &'static str| ProtocolError::InvalidStep {
        step: step.id.clone(),
        reason,
    };

    match &step.kind {
        StepKind::Instruction {
            duration_seconds, ..
        } => {
            if *duration_seconds == Some(0) {
                return Err(invalid("instruction duration must be positive"));
            }
        }
        StepKind::VoiceTrigger {
            expected_keywords,
            timeout_seconds,
            timeout_step_id,
            ..
        } => {
            if expected_keywords.is_empty() {
                return Err(invalid("voice trigger has no expected keywords"));
            }
            match (timeout_seconds, timeout_step_id) {
                (Some(0), _) => return Err(invalid("voice trigger timeout must be positive")),
                (Some(_), None) => {
                    return Err(ProtocolError::MissingFallbackEdge {
                        step: step.id.clone(),
                        edge: "timeout_step_id",
                    });
                }
                (None, _) => {
                    warnings.push(ContentWarning::VoiceTriggerWithoutTimeout(step.id.clone()));
                }
                (Some(_), Some(_)) => {}
            }
        }
        StepKind::Popup {
            yes_keywords,
            no_keywords,
            ..
        } => {
            if yes_keywords.intersection(no_keywords).next().is_some() {
                return Err(invalid("keyword appears in both yes and no sets"));
            }
        }
        StepKind::Timed {
            duration_seconds,
            timer_events,
            count_beats,
            target_beats,
            ..
        } => {
            if *duration_seconds == 0 {
                return Err(invalid("timed step duration must be positive"));
            }
            if *count_beats && !matches!(target_beats, Some(n) if *n > 0) {
                return Err(invalid("beat-counted step needs a positive target_beats"));
            }
            let mut triggers = BTreeSet::new();
            for event in timer_events {
                if event.trigger_at_seconds > *duration_seconds {
                    return Err(invalid("timer event scheduled after step duration"));
                }
                if !triggers.insert(event.trigger_at_seconds) {
                    return Err(invalid("two timer events share a trigger second"));
                }
                if event.trigger_at_seconds == 0
                    && matches!(&event.effect, TimerEffect::Transition { step_id } if *step_id == step.id)
                {
                    return Err(invalid("transition at 0 s re-enters its own step"));
                }
            }
        }
        StepKind::Loop {
            loop_to_step_id,
            max_iterations,
            next_step_id,
        } => {
            if *loop_to_step_id == step.id {
                return Err(invalid("loop cannot target itself"));
            }
            if next_step_id.is_none() {
                return Err(ProtocolError::MissingFallbackEdge {
                    step: step.id.clone(),
                    edge: "next_step_id",
                });
            }
            if max_iterations.is_none() {
                warnings.push(ContentWarning::LoopWithoutCap(step.id.clone()));
            }
        }
        StepKind::Terminal { .. } => {}
    }
    Ok(())
}

/// Edges followed on entry, before any tick.
fn instant_edges(step: &StepDefinition) -> Vec<&StepId> {
    match &step.kind {
        StepKind::Loop {
            loop_to_step_id,
            next_step_id,
            ..
        } => std::iter::once(loop_to_step_id).chain(next_step_id).collect(),
        StepKind::Timed { timer_events, .. } => timer_events
            .iter()
            .filter(|e| e.trigger_at_seconds == 0)
            .filter_map(|e| match &e.effect {
                TimerEffect::Transition { step_id } => Some(step_id),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Reject cycles a session could spin around without a tick in between.
fn check_instant_cycles(steps: &BTreeMap<StepId, StepDefinition>) -> Result<(), ProtocolError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Open,
        Done,
    }

    let mut marks: BTreeMap<&StepId, Mark> = BTreeMap::new();
    for root in steps.keys() {
        if marks.contains_key(root) {
            continue;
        }
        // Iterative DFS: (step, index of the next edge to follow).
        let mut stack = vec![(root, 0usize)];
        marks.insert(root, Mark::Open);
        while let Some((id, next)) = stack.last_mut() {
            let edges = steps.get(*id).map(instant_edges).unwrap_or_default();
            let Some(target) = edges.get(*next).copied() else {
                marks.insert(*id, Mark::Done);
                stack.pop();
                continue;
            };
            *next += 1;
            match marks.get(target) {
                Some(Mark::Open) => {
                    return Err(ProtocolError::InvalidStep {
                        step: target.clone(),
                        reason: "steps form a cycle with no time passing between them",
                    });
                }
                Some(Mark::Done) => {}
                None => {
                    marks.insert(target, Mark::Open);
                    stack.push((target, 0));
                }
            }
        }
    }
    Ok(())
}

fn unreachable_steps(initial: &StepId, steps: &BTreeMap<StepId, StepDefinition>) -> Vec<StepId> {
    let mut seen = BTreeSet::new();
    let mut queue = VecDeque::from([initial]);
    while let Some(id) = queue.pop_front() {
        if !seen.insert(id) {
            continue;
        }
        if let Some(step) = steps.get(id) {
            queue.extend(step.kind.edges().into_iter().map(|(_, t)| t));
        }
    }
    steps
        .keys()
        .filter(|id| !seen.contains(id))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ProtocolDefinition;
    use serde_json::json;

    fn load(steps: serde_json::Value) -> Result<ProtocolDefinition, ProtocolError> {
        ProtocolDefinition::from_json(
            &json!({ "id": "t", "name": "T", "initial_step_id": "a", "steps": steps }).to_string(),
        )
    }

    fn terminal(id: &str) -> serde_json::Value {
        json!({ "id": id, "title": id, "type": "terminal", "outcome": "resolved" })
    }

    #[test]
    fn dangling_next_step_is_rejected() {
        let err = load(json!([
            { "id": "a", "title": "A", "type": "instruction", "next_step_id": "ghost" },
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::DanglingReference { ref target, edge: "next_step_id", .. }
                if target.as_str() == "ghost"
        ));
    }

    #[test]
    fn unknown_initial_step_is_rejected() {
        let err = ProtocolDefinition::from_json(
            &json!({ "id": "t", "name": "T", "initial_step_id": "zzz",
                     "steps": [terminal("a")] })
            .to_string(),
        )
        .unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownInitialStep(_)));
    }

    #[test]
    fn empty_protocol_is_rejected() {
        assert!(matches!(load(json!([])), Err(ProtocolError::EmptyProtocol)));
    }

    #[test]
    fn loop_without_exit_is_a_missing_fallback() {
        let err = load(json!([
            { "id": "a", "title": "A", "type": "instruction", "next_step_id": "b" },
            { "id": "b", "title": "B", "type": "loop", "loop_to_step_id": "a", "max_iterations": 2 },
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::MissingFallbackEdge { edge: "next_step_id", .. }
        ));
    }

    #[test]
    fn blank_edge_is_a_missing_fallback() {
        let err = load(json!([
            { "id": "a", "title": "A", "type": "instruction", "next_step_id": "  " },
        ]))
        .unwrap_err();
        assert!(matches!(err, ProtocolError::MissingFallbackEdge { .. }));
    }

    #[test]
    fn timeout_without_target_is_rejected() {
        let err = load(json!([
            { "id": "a", "title": "A", "type": "voice_trigger",
              "expected_keywords": ["ok"], "next_step_id": "b", "timeout_seconds": 10 },
            terminal("b"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::MissingFallbackEdge { edge: "timeout_step_id", .. }
        ));
    }

    #[test]
    fn overlapping_popup_keywords_are_rejected() {
        let err = load(json!([
            { "id": "a", "title": "A", "type": "popup",
              "yes_next_step_id": "b", "no_next_step_id": "b",
              "yes_keywords": ["yes", "Maybe"], "no_keywords": ["no", "maybe "] },
            terminal("b"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidStep { .. }));
    }

    #[test]
    fn timer_event_past_duration_is_rejected() {
        let err = load(json!([
            { "id": "a", "title": "A", "type": "timed", "duration_seconds": 10,
              "timer_events": [{ "trigger_at_seconds": 11,
                                 "effect": { "type": "notification", "message": "late" } }],
              "next_step_id": "b" },
            terminal("b"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidStep { .. }));
    }

    #[test]
    fn duplicate_trigger_seconds_are_rejected() {
        let err = load(json!([
            { "id": "a", "title": "A", "type": "timed", "duration_seconds": 10,
              "timer_events": [
                  { "trigger_at_seconds": 5, "effect": { "type": "notification", "message": "x" } },
                  { "trigger_at_seconds": 5, "effect": { "type": "notification", "message": "y" } }
              ],
              "next_step_id": "b" },
            terminal("b"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidStep { .. }));
    }

    #[test]
    fn beat_counting_requires_target() {
        let err = load(json!([
            { "id": "a", "title": "A", "type": "timed", "duration_seconds": 10,
              "count_beats": true, "next_step_id": "b" },
            terminal("b"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidStep { .. }));
    }

    #[test]
    fn timer_transition_target_must_exist() {
        let err = load(json!([
            { "id": "a", "title": "A", "type": "timed", "duration_seconds": 10,
              "timer_events": [{ "trigger_at_seconds": 5,
                                 "effect": { "type": "transition", "step_id": "nope" } }],
              "next_step_id": "b" },
            terminal("b"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ProtocolError::DanglingReference { .. }));
    }

    #[test]
    fn zero_second_transition_to_own_step_is_rejected() {
        let err = load(json!([
            { "id": "a", "title": "A", "type": "timed", "duration_seconds": 10,
              "timer_events": [
                  { "trigger_at_seconds": 0, "effect": { "type": "transition", "step_id": "a" } }
              ],
              "next_step_id": "z" },
            terminal("z"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::InvalidStep { ref step, .. } if step.as_str() == "a"
        ));
    }

    #[test]
    fn zero_second_transitions_between_steps_are_rejected() {
        let err = load(json!([
            { "id": "a", "title": "A", "type": "timed", "duration_seconds": 10,
              "timer_events": [
                  { "trigger_at_seconds": 0, "effect": { "type": "transition", "step_id": "b" } }
              ],
              "next_step_id": "z" },
            { "id": "b", "title": "B", "type": "timed", "duration_seconds": 10,
              "timer_events": [
                  { "trigger_at_seconds": 0, "effect": { "type": "transition", "step_id": "a" } }
              ],
              "next_step_id": "z" },
            terminal("z"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidStep { .. }));
    }

    #[test]
    fn loops_chained_into_each_other_are_rejected() {
        let err = load(json!([
            { "id": "a", "title": "A", "type": "loop",
              "loop_to_step_id": "b", "max_iterations": 50, "next_step_id": "z" },
            { "id": "b", "title": "B", "type": "loop",
              "loop_to_step_id": "a", "max_iterations": 50, "next_step_id": "z" },
            terminal("z"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidStep { .. }));
    }

    #[test]
    fn loop_back_to_a_timed_step_with_a_zero_second_transition_is_rejected() {
        let err = load(json!([
            { "id": "a", "title": "A", "type": "timed", "duration_seconds": 10,
              "timer_events": [
                  { "trigger_at_seconds": 0, "effect": { "type": "transition", "step_id": "cycle" } }
              ],
              "next_step_id": "z" },
            { "id": "cycle", "title": "Cycle", "type": "loop",
              "loop_to_step_id": "a", "max_iterations": 3, "next_step_id": "z" },
            terminal("z"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidStep { .. }));
    }

    #[test]
    fn timed_transitions_after_zero_seconds_may_cycle() {
        let protocol = load(json!([
            { "id": "a", "title": "A", "type": "timed", "duration_seconds": 10,
              "timer_events": [
                  { "trigger_at_seconds": 1, "effect": { "type": "transition", "step_id": "cycle" } }
              ],
              "next_step_id": "z" },
            { "id": "cycle", "title": "Cycle", "type": "loop",
              "loop_to_step_id": "a", "max_iterations": 3, "next_step_id": "z" },
            terminal("z"),
        ]));
        assert!(protocol.is_ok());
    }

    #[test]
    fn warnings_cover_timeouts_caps_and_reachability() {
        let protocol = load(json!([
            { "id": "a", "title": "A", "type": "voice_trigger",
              "expected_keywords": ["go"], "next_step_id": "b" },
            { "id": "b", "title": "B", "type": "loop", "loop_to_step_id": "a", "next_step_id": "c" },
            terminal("c"),
            terminal("orphan"),
        ]))
        .unwrap();

        let warnings = protocol.warnings();
        assert!(warnings.contains(&ContentWarning::VoiceTriggerWithoutTimeout(StepId::from("a"))));
        assert!(warnings.contains(&ContentWarning::LoopWithoutCap(StepId::from("b"))));
        assert!(warnings.contains(&ContentWarning::UnreachableStep(StepId::from("orphan"))));
        assert_eq!(warnings.len(), 3);
    }
}
