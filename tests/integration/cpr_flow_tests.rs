//! Adult CPR protocol, end to end through the session controller.

use lifeline::app::dialog::DialogKind;
use lifeline::app::events::{SessionEnd, SessionEvent};
use lifeline::app::SessionCommand;
use lifeline::config::SessionConfig;
use lifeline::protocol::{OutcomeKind, StepId};

use super::recording_sink::Harness;

fn at_compressions(config: SessionConfig) -> Harness {
    let mut h = Harness::with_config("cpr", config);
    h.send(SessionCommand::SelectPath(StepId::from("chest_compressions")));
    assert_eq!(h.step(), "chest_compressions");
    h
}

fn beats(h: &mut Harness, n: u32) {
    for _ in 0..n {
        h.send(SessionCommand::Beat);
    }
}

#[test]
fn scene_check_through_to_compressions() {
    let mut h = Harness::bundled("cpr");
    assert_eq!(h.step(), "check_safety");
    assert!(h.controller.snapshot().unwrap().waiting_for_voice);

    h.say("Scene is safe");
    assert_eq!(h.step(), "check_response");

    h.say("not responding");
    assert_eq!(h.step(), "call_emergency");

    h.wait(10);
    assert_eq!(h.step(), "check_breathing");
    h.wait(10);
    assert_eq!(h.step(), "breathing_check");
    assert_eq!(
        h.sink.count(|e| matches!(
            e,
            SessionEvent::TimerEventFired { step_id, at_seconds: 5, .. }
                if step_id.as_str() == "check_breathing"
        )),
        1
    );

    h.say("not breathing");
    assert_eq!(h.step(), "chest_compressions");
    assert!(h.controller.is_metronome_running());
    assert!(h.sink.events.contains(&SessionEvent::MetronomeChanged {
        running: true,
        bpm: Some(110),
    }));
    assert!(h.controller.watchdog().is_running());
}

#[test]
fn beat_target_ends_compressions_early() {
    let mut h = at_compressions(SessionConfig::default());
    beats(&mut h, 29);
    assert_eq!(h.step(), "chest_compressions");
    assert_eq!(h.controller.snapshot().unwrap().beat_count, 29);

    beats(&mut h, 1);
    assert_eq!(h.step(), "rescue_breaths");
    assert!(!h.controller.is_metronome_running());
    // Breaths are part of the cycle; the watchdog keeps counting.
    assert!(h.controller.watchdog().is_running());
}

#[test]
fn chest_not_rising_branches_to_open_airway() {
    let mut h = at_compressions(SessionConfig::default());
    beats(&mut h, 30);
    h.wait(6);
    assert_eq!(
        h.controller.open_dialog().map(|d| d.kind()),
        Some(DialogKind::StepPopup)
    );

    h.say("no");
    assert_eq!(h.step(), "open_airway");
    assert!(h.controller.open_dialog().is_none());

    h.wait(5);
    assert_eq!(h.step(), "chest_compressions");
    assert_eq!(h.controller.state().loop_iterations("cpr_cycle"), 1);
}

#[test]
fn unanswered_popup_closes_when_the_step_ends() {
    let mut h = at_compressions(SessionConfig::default());
    beats(&mut h, 30);
    h.wait(10);
    assert_eq!(h.step(), "chest_compressions");
    assert!(h.sink.events.contains(&SessionEvent::DialogClosed {
        dialog: DialogKind::StepPopup,
        answer: None,
    }));
}

#[test]
fn loop_cap_reaches_help_check_and_handover() {
    let config = SessionConfig {
        max_loop_iterations: 2,
        ..SessionConfig::default()
    };
    let mut h = at_compressions(config);
    for _ in 0..3 {
        beats(&mut h, 30);
        h.wait(10);
    }
    assert_eq!(h.step(), "help_check");
    assert_eq!(
        h.sink.count(|e| matches!(
            e,
            SessionEvent::LoopCapExceeded { iterations: 2, .. }
        )),
        1
    );
    // A question breaks the compression cycle.
    assert!(!h.controller.watchdog().is_running());

    h.say("they are here");
    assert!(h.controller.is_finished());
    assert_eq!(
        h.sink.events.last(),
        Some(&SessionEvent::SessionEnded(SessionEnd::Outcome {
            step_id: StepId::from("handover"),
            outcome: OutcomeKind::HandedOver,
        }))
    );
}

#[test]
fn two_minutes_of_compressions_asks_for_a_switch() {
    let mut h = at_compressions(SessionConfig::default());
    h.wait(119);
    assert_eq!(
        h.sink.count(|e| matches!(e, SessionEvent::SwitchWarning { .. })),
        4
    );
    assert!(h.controller.open_dialog().is_none());

    h.wait(1);
    assert_eq!(h.step(), "chest_compressions");
    assert_eq!(
        h.controller.open_dialog().map(|d| d.kind()),
        Some(DialogKind::RescuerSwitch)
    );
    assert!(!h.controller.is_metronome_running());

    // Nothing moves while the decision is pending.
    h.wait(30);
    assert_eq!(h.step(), "chest_compressions");
    assert_eq!(h.controller.snapshot().unwrap().elapsed_seconds, 0);

    h.say("yes");
    assert!(h.sink.events.contains(&SessionEvent::RescuersSwitched));
    assert!(h.controller.is_metronome_running());
    assert_eq!(h.controller.watchdog().elapsed(), 0);

    h.wait(20);
    assert_eq!(h.step(), "rescue_breaths");
}

#[test]
fn lone_exhausted_rescuer_ends_with_guidance() {
    let mut h = at_compressions(SessionConfig::default());
    h.wait(120);
    h.say("no one");
    assert_eq!(
        h.controller.open_dialog().map(|d| d.kind()),
        Some(DialogKind::ContinueOrRest)
    );
    h.say("tired");
    assert!(h.controller.is_finished());
    assert!(!h.controller.is_metronome_running());
    assert!(matches!(
        h.sink.events.last(),
        Some(SessionEvent::SessionEnded(SessionEnd::Exhausted { .. }))
    ));
}

#[test]
fn back_returns_to_the_previous_step() {
    let mut h = Harness::bundled("cpr");
    h.say("safe");
    assert_eq!(h.step(), "check_response");
    h.send(SessionCommand::Previous);
    assert_eq!(h.step(), "check_safety");
    h.send(SessionCommand::Previous);
    assert_eq!(h.step(), "check_safety");
}

#[test]
fn back_from_a_new_cycle_skips_the_loop_node() {
    let mut h = at_compressions(SessionConfig::default());
    beats(&mut h, 30);
    assert_eq!(h.step(), "rescue_breaths");
    h.wait(10);
    assert_eq!(h.step(), "chest_compressions");

    h.send(SessionCommand::Previous);
    assert_eq!(h.step(), "rescue_breaths");
}

#[test]
fn emergency_call_keeps_the_watchdog_running() {
    let mut h = at_compressions(SessionConfig::default());
    h.wait(3);
    h.say("call an ambulance");
    assert_eq!(
        h.controller.open_dialog().map(|d| d.kind()),
        Some(DialogKind::EmergencyCall)
    );
    h.wait(2);
    assert_eq!(h.controller.watchdog().elapsed(), 5);

    h.say("call now");
    assert!(h.sink.events.contains(&SessionEvent::EmergencyCallRequested));
    assert_eq!(h.step(), "chest_compressions");
}

#[test]
fn scene_check_times_out_to_response_check() {
    let mut h = Harness::bundled("cpr");
    h.wait(19);
    assert_eq!(h.step(), "check_safety");
    h.wait(1);
    assert_eq!(h.step(), "check_response");
}
