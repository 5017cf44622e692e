//! Runtime: command pump, tick clock and shutdown.

use std::sync::Arc;
use std::time::{Duration, Instant};

use lifeline::adapters::time::MonotonicClock;
use lifeline::app::events::{SessionEnd, SessionEvent};
use lifeline::app::{SessionCommand, SessionController, SessionPhase};
use lifeline::config::SessionConfig;
use lifeline::protocol::ProtocolDefinition;
use lifeline::protocol::library::ProtocolLibrary;
use lifeline::runtime::{SessionInbox, run_session};

use super::recording_sink::RecordingSink;

fn choking() -> SessionController {
    let library = ProtocolLibrary::bundled().unwrap();
    SessionController::new(library.get("choking").unwrap(), SessionConfig::default())
}

#[test]
fn queued_commands_run_in_order_until_stop() {
    let inbox: SessionInbox<8> = SessionInbox::new();
    assert!(inbox.submit(SessionCommand::Answer(false)));
    assert!(inbox.submit(SessionCommand::Stop));

    let mut sink = RecordingSink::new();
    let controller = run_session(choking(), &inbox, &mut sink, &MonotonicClock::new());

    assert!(controller.is_finished());
    assert_eq!(sink.visited(), vec!["ask_choking", "back_blows"]);
    assert_eq!(
        sink.events.last(),
        Some(&SessionEvent::SessionEnded(SessionEnd::Stopped))
    );
}

#[test]
fn shutdown_returns_a_running_session() {
    let inbox: SessionInbox<8> = SessionInbox::new();
    inbox.request_shutdown();

    let mut sink = RecordingSink::new();
    let controller = run_session(choking(), &inbox, &mut sink, &MonotonicClock::new());

    assert_eq!(controller.phase(), SessionPhase::Running);
    assert!(matches!(sink.events[0], SessionEvent::Started { .. }));
}

#[test]
fn tick_clock_drives_timed_steps_to_the_end() {
    let json = serde_json::json!({
        "id": "short",
        "name": "Short",
        "initial_step_id": "wait",
        "steps": [
            { "id": "wait", "title": "Wait", "type": "instruction",
              "next_step_id": "done", "duration_seconds": 1 },
            { "id": "done", "title": "Done", "type": "terminal", "outcome": "resolved" }
        ]
    });
    let protocol = Arc::new(ProtocolDefinition::from_json(&json.to_string()).unwrap());
    let config = SessionConfig {
        tick_interval_ms: 100,
        ..SessionConfig::default()
    };
    let inbox: SessionInbox<4> = SessionInbox::new();
    let mut sink = RecordingSink::new();

    let started = Instant::now();
    let controller = run_session(
        SessionController::new(protocol, config),
        &inbox,
        &mut sink,
        &MonotonicClock::new(),
    );

    assert!(controller.is_finished());
    assert!(started.elapsed() >= Duration::from_millis(900));
    assert_eq!(sink.visited(), vec!["wait", "done"]);
}

#[test]
fn already_finished_session_returns_immediately() {
    let json = serde_json::json!({
        "id": "over",
        "name": "Over",
        "initial_step_id": "done",
        "steps": [
            { "id": "done", "title": "Done", "type": "terminal", "outcome": "resolved" }
        ]
    });
    let protocol = Arc::new(ProtocolDefinition::from_json(&json.to_string()).unwrap());
    let inbox: SessionInbox<4> = SessionInbox::new();
    let mut sink = RecordingSink::new();

    let controller = run_session(
        SessionController::new(protocol, SessionConfig::default()),
        &inbox,
        &mut sink,
        &MonotonicClock::new(),
    );
    assert!(controller.is_finished());
    assert_eq!(
        sink.count(|e| matches!(e, SessionEvent::SessionEnded(_))),
        1
    );
}
