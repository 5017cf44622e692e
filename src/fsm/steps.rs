//! Per-variant step helpers shared by the interpreter and the controller.

use std::collections::BTreeSet;

use crate::protocol::{StepDefinition, StepId, StepKind};

/// The edge `next_step` follows for steps that advance unconditionally.
pub fn forward_edge(kind: &StepKind) -> Option<&StepId> {
    match kind {
        StepKind::Instruction { next_step_id, .. } | StepKind::Timed { next_step_id, .. } => {
            Some(next_step_id)
        }
        _ => None,
    }
}

/// Exact match of an already-normalized phrase.
pub fn matches_keyword(keywords: &BTreeSet<String>, heard: &str) -> bool {
    keywords.contains(heard)
}

/// Whether entering `step` starts the compression-cycle watchdog.
pub fn is_compression_step(step: &StepDefinition, markers: &[String]) -> bool {
    let id = step.id.as_str().to_lowercase();
    let title = step.title.to_lowercase();
    markers.iter().any(|m| {
        let m = m.to_lowercase();
        !m.is_empty() && (id.contains(&m) || title.contains(&m))
    })
}

/// Whether the step needs a running per-step clock.
pub fn has_step_clock(kind: &StepKind) -> bool {
    match kind {
        StepKind::Timed { .. } => true,
        StepKind::Instruction {
            duration_seconds, ..
        } => duration_seconds.is_some(),
        StepKind::VoiceTrigger {
            timeout_seconds, ..
        } => timeout_seconds.is_some(),
        _ => false,
    }
}

/// Phrases the step would accept, for "say one of ..." hints.
pub fn expected_phrases(kind: &StepKind) -> Vec<String> {
    match kind {
        StepKind::VoiceTrigger {
            expected_keywords, ..
        } => expected_keywords.iter().cloned().collect(),
        StepKind::Popup {
            yes_keywords,
            no_keywords,
            ..
        } => yes_keywords.iter().chain(no_keywords).cloned().collect(),
        _ => Vec::new(),
    }
}
