//! Adult choking protocol, end to end through the session controller.

use lifeline::app::events::{SessionEnd, SessionEvent};
use lifeline::app::SessionCommand;
use lifeline::protocol::{OutcomeKind, StepId};

use super::recording_sink::Harness;

fn ended_with(h: &Harness, step: &str, outcome: OutcomeKind) -> bool {
    h.sink.events.last()
        == Some(&SessionEvent::SessionEnded(SessionEnd::Outcome {
            step_id: StepId::from(step),
            outcome,
        }))
}

#[test]
fn coughing_patient_clears_by_tap_answers() {
    let mut h = Harness::bundled("choking");
    h.send(SessionCommand::Answer(true));
    assert_eq!(h.step(), "encourage_cough");
    h.wait(15);
    assert_eq!(h.step(), "recheck");
    h.send(SessionCommand::Answer(true));
    assert!(ended_with(&h, "cleared", OutcomeKind::Resolved));
}

#[test]
fn back_blows_notify_on_entry_then_thrusts() {
    let mut h = Harness::bundled("choking");
    h.say("silent");
    assert_eq!(h.step(), "back_blows");
    assert_eq!(
        h.sink.count(|e| matches!(
            e,
            SessionEvent::TimerEventFired { at_seconds: 0, .. }
        )),
        1
    );

    h.wait(15);
    assert_eq!(h.step(), "abdominal_thrusts");
    h.wait(15);
    assert_eq!(h.step(), "object_check");
    h.say("out");
    assert!(ended_with(&h, "cleared", OutcomeKind::Resolved));
}

#[test]
fn repeated_failure_escalates_after_loop_cap() {
    let mut h = Harness::bundled("choking");
    h.say("no");
    for _ in 0..6 {
        assert_eq!(h.step(), "back_blows");
        h.wait(30);
        assert_eq!(h.step(), "object_check");
        h.say("still choking");
    }
    assert!(ended_with(&h, "call_for_help", OutcomeKind::Escalated));
    assert_eq!(
        h.sink.count(|e| matches!(
            e,
            SessionEvent::LoopCapExceeded { iterations: 5, .. }
        )),
        1
    );
    // The entry notification fires again on every visit.
    assert_eq!(
        h.sink.count(|e| matches!(e, SessionEvent::TimerEventFired { .. })),
        6
    );
}

#[test]
fn popup_steps_hint_their_keywords() {
    let mut h = Harness::bundled("choking");
    h.say("banana");
    assert_eq!(h.step(), "ask_choking");
    let hint = h.sink.events.iter().find_map(|e| match e {
        SessionEvent::KeywordUnmatched { expected, .. } => Some(expected.clone()),
        _ => None,
    });
    let hint = hint.expect("hint emitted");
    assert!(hint.contains(&"coughing".to_string()));
    assert!(hint.contains(&"silent".to_string()));
}

#[test]
fn no_compression_watchdog_in_choking() {
    let mut h = Harness::bundled("choking");
    h.say("no");
    h.wait(30);
    assert!(!h.controller.watchdog().is_running());
    assert_eq!(
        h.sink.count(|e| matches!(e, SessionEvent::MetronomeChanged { .. })),
        0
    );
}
