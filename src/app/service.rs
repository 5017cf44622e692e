//! Session controller, the hexagonal core.
//!
//! [`SessionController`] owns the step interpreter, its [`EngineState`], the
//! compression watchdog, the session timers and the dialog stack.  Every
//! input arrives through [`handle`](SessionController::handle), one at a
//! time, and every output leaves through an [`EventSink`].
//!
//! ```text
//!  SessionCommand ──▶ ┌──────────────────────────────┐ ──▶ EventSink
//!                     │      SessionController       │
//!                     │  Interpreter · Watchdog      │
//!                     │  TickScheduler · Dialogs     │
//!                     └──────────────────────────────┘
//! ```
//!
//! After each command the controller drains the interpreter's event outbox
//! ("settling"), reacting to step changes by arming timers, resolving loop
//! nodes and opening step popups.  It then re-establishes the invariant
//! that the watchdog is paused exactly while a rescuer dialog is open.

use std::sync::Arc;

use heapless::Vec as HVec;
use log::{debug, error, info, warn};

use crate::config::SessionConfig;
use crate::error::Result;
use crate::fsm::steps::{expected_phrases, has_step_clock, is_compression_step};
use crate::fsm::{EngineEvent, EngineState, Interpreter};
use crate::protocol::{ProtocolDefinition, StepId, StepKind, TimerEffect};
use crate::safety::{CompressionWatchdog, WatchdogSignal};
use crate::scheduler::{TickScheduler, TimerState};
use crate::voice::{SpeechGate, VoiceInput, VoiceIntent};

use super::commands::SessionCommand;
use super::dialog::{Dialog, DialogKind, DialogStack};
use super::events::{SessionEnd, SessionEvent, SessionSnapshot};
use super::ports::{EventSink, TimerDelegate, TimerId};

/// Upper bound on outbox drain rounds per command.
const MAX_SETTLE_ROUNDS: usize = 64;

/// Timer fires collected during one scheduler tick.
const MAX_FIRES_PER_TICK: usize = 16;

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Constructed, `start` not yet called.
    Ready,
    Running,
    /// Terminal step, exhaustion or stop.  Input is ignored.
    Ended,
}

// ───────────────────────────────────────────────────────────────
// SessionController
// ───────────────────────────────────────────────────────────────

/// Runs one protocol session.
pub struct SessionController {
    interpreter: Interpreter,
    state: EngineState,
    config: SessionConfig,
    watchdog: CompressionWatchdog,
    timers: TickScheduler,
    dialogs: DialogStack,
    speech: SpeechGate,
    metronome_running: bool,
    phase: SessionPhase,
}

impl SessionController {
    /// Construct a session on `protocol`.
    ///
    /// Does **not** start it; call [`start`](Self::start) next.
    pub fn new(protocol: Arc<ProtocolDefinition>, config: SessionConfig) -> Self {
        let interpreter = Interpreter::new(protocol, config.max_loop_iterations);
        let state = interpreter.start();
        Self {
            interpreter,
            state,
            watchdog: CompressionWatchdog::new(&config),
            timers: TickScheduler::new(1000),
            dialogs: DialogStack::new(),
            speech: SpeechGate::new(config.asr_cooldown_ms),
            metronome_running: false,
            phase: SessionPhase::Ready,
            config,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Enter the initial step.
    pub fn start(&mut self, sink: &mut impl EventSink) {
        if self.phase != SessionPhase::Ready {
            warn!("Session already started");
            return;
        }
        self.phase = SessionPhase::Running;
        let protocol_id = self.interpreter.protocol().id().to_owned();
        info!("Session started on '{protocol_id}'");
        sink.emit(&SessionEvent::Started { protocol_id });
        self.settle(sink);
        self.enforce_invariants(sink);
    }

    // ── Command handling ──────────────────────────────────────

    /// Process one input.  `now_ms` is a monotonic timestamp used for
    /// speech-cooldown arbitration.
    pub fn handle(&mut self, cmd: SessionCommand, now_ms: u64, sink: &mut impl EventSink) {
        if self.phase != SessionPhase::Running {
            debug!("Session not running, ignoring {cmd:?}");
            return;
        }

        match cmd {
            SessionCommand::Next => self.navigate(sink, false, |engine, state| engine.next_step(state)),
            SessionCommand::Previous => {
                self.navigate(sink, true, |engine, state| Ok(engine.previous_resting_step(state)));
            }
            SessionCommand::SelectPath(target) => {
                self.navigate(sink, true, |engine, state| {
                    engine.go_to_step(state, target.as_str()).map(|()| true)
                });
            }
            SessionCommand::Answer(is_yes) => {
                if self.dialogs.is_empty() {
                    self.navigate(sink, false, |engine, state| {
                        engine.handle_popup_selection(state, is_yes)
                    });
                } else {
                    self.answer_dialog(is_yes, sink);
                }
            }
            SessionCommand::Repeat => self.repeat_prompt(sink),
            SessionCommand::Voice(input) => {
                if self.speech.accepts(now_ms) {
                    self.handle_voice(&input, sink);
                }
            }
            SessionCommand::Tick => self.handle_tick(sink),
            SessionCommand::Beat => self.handle_beat(),
            SessionCommand::SpeechStarted => self.speech.speech_started(),
            SessionCommand::SpeechFinished => self.speech.speech_finished(now_ms),
            SessionCommand::CallEmergency => self.request_emergency_call(sink),
            SessionCommand::Stop => self.end(SessionEnd::Stopped, sink),
        }

        self.settle(sink);
        self.enforce_invariants(sink);
    }

    // ── Queries ───────────────────────────────────────────────

    /// Point-in-time view of the session.
    pub fn snapshot(&self) -> Result<SessionSnapshot> {
        let step = self.interpreter.current_step(&self.state)?;
        Ok(SessionSnapshot {
            protocol_id: self.interpreter.protocol().id().to_owned(),
            step: step.clone(),
            elapsed_seconds: self.state.elapsed_seconds(),
            beat_count: self.state.beat_count(),
            waiting_for_voice: self.interpreter.is_waiting_for_voice(&self.state),
            at_terminal: self.interpreter.is_terminal(&self.state),
            open_dialog: self.dialogs.top().map(Dialog::kind),
            watchdog_seconds: self.watchdog.elapsed(),
            metronome_running: self.metronome_running,
            finished: self.is_finished(),
        })
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_finished(&self) -> bool {
        self.phase == SessionPhase::Ended
    }

    /// Interpreter state, read-only.
    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn watchdog(&self) -> &CompressionWatchdog {
        &self.watchdog
    }

    pub fn open_dialog(&self) -> Option<&Dialog> {
        self.dialogs.top()
    }

    pub fn is_metronome_running(&self) -> bool {
        self.metronome_running
    }

    /// Metronome tempo of the running protocol, if it declares one.
    pub fn metronome_bpm(&self) -> Option<u16> {
        self.interpreter.protocol().metronome_bpm()
    }

    // ── Navigation ────────────────────────────────────────────

    /// Run a navigation operation.  Manual navigation that moves the
    /// session closes every open dialog.  If that interrupted a rescuer
    /// decision, the watchdog restarts fresh on a compression step and
    /// stops anywhere else; `off_cycle` moves to a non-compression step stop
    /// it as well.
    fn navigate(
        &mut self,
        sink: &mut impl EventSink,
        off_cycle: bool,
        op: impl FnOnce(&Interpreter, &mut EngineState) -> Result<bool>,
    ) {
        match op(&self.interpreter, &mut self.state) {
            Ok(true) => {}
            Ok(false) => {
                debug!("Navigation had no effect on '{}'", self.state.current_step_id());
                return;
            }
            Err(e) => {
                warn!("Navigation failed, holding position: {e}");
                return;
            }
        }

        let interrupted = self.dialogs.has_rescuer_dialog();
        self.close_all_dialogs(sink);

        let on_compression = self
            .interpreter
            .current_step(&self.state)
            .is_ok_and(|s| is_compression_step(s, &self.config.compression_markers));
        if interrupted {
            if on_compression {
                self.watchdog.restart();
                self.timers.start(TimerId::Watchdog);
            } else {
                self.stop_watchdog();
            }
        } else if off_cycle && !on_compression {
            self.stop_watchdog();
        }
    }

    // ── Voice ─────────────────────────────────────────────────

    fn handle_voice(&mut self, input: &VoiceInput, sink: &mut impl EventSink) {
        // Open dialogs answer first; the step never sees the input.
        if let Some(dialog) = self.dialogs.top() {
            match dialog.interpret(input) {
                Some(answer) => self.answer_dialog(answer, sink),
                None if input.intent() == Some(VoiceIntent::Repeat) => self.repeat_prompt(sink),
                None => sink.emit(&SessionEvent::KeywordUnmatched {
                    heard: describe(input),
                    expected: vec!["yes".into(), "no".into()],
                }),
            }
            return;
        }

        if let Some(heard) = input.heard() {
            match self.interpreter.handle_voice_keyword(&mut self.state, &heard) {
                Ok(true) => return,
                Ok(false) => {}
                Err(e) => {
                    warn!("Keyword handling failed, holding position: {e}");
                    return;
                }
            }
        }

        let on_popup = self
            .interpreter
            .current_step(&self.state)
            .is_ok_and(|s| matches!(s.kind, StepKind::Popup { .. }));

        match input.intent() {
            Some(VoiceIntent::Next) => {
                self.navigate(sink, false, |engine, state| engine.next_step(state));
            }
            Some(VoiceIntent::Previous) => {
                self.navigate(sink, true, |engine, state| Ok(engine.previous_resting_step(state)));
            }
            Some(VoiceIntent::Repeat) => self.repeat_prompt(sink),
            Some(VoiceIntent::CallEmergency) => self.request_emergency_call(sink),
            Some(answer @ (VoiceIntent::Yes | VoiceIntent::No)) if on_popup => {
                let is_yes = answer == VoiceIntent::Yes;
                self.navigate(sink, false, |engine, state| {
                    engine.handle_popup_selection(state, is_yes)
                });
            }
            _ => {
                let expected = self
                    .interpreter
                    .current_step(&self.state)
                    .map(|s| expected_phrases(&s.kind))
                    .unwrap_or_default();
                debug!("Voice input '{}' matched nothing", describe(input));
                sink.emit(&SessionEvent::KeywordUnmatched {
                    heard: describe(input),
                    expected,
                });
            }
        }
    }

    fn repeat_prompt(&mut self, sink: &mut impl EventSink) {
        let step_id = self.state.current_step_id().clone();
        let text = match (self.dialogs.top(), self.interpreter.current_step(&self.state)) {
            (Some(dialog), _) => dialog.prompt(),
            (None, Ok(step)) if !step.voice_prompt.is_empty() => step.voice_prompt.clone(),
            (None, Ok(step)) => step.title.clone(),
            (None, Err(e)) => {
                warn!("Cannot repeat prompt: {e}");
                return;
            }
        };
        sink.emit(&SessionEvent::PromptRepeated { step_id, text });
    }

    // ── Dialogs ───────────────────────────────────────────────

    fn open(&mut self, dialog: Dialog, sink: &mut impl EventSink) {
        let kind = dialog.kind();
        let prompt = dialog.prompt();
        if self.dialogs.push(dialog) {
            info!("Dialog opened: {kind:?}");
            sink.emit(&SessionEvent::DialogOpened {
                dialog: kind,
                prompt,
            });
        }
    }

    fn request_emergency_call(&mut self, sink: &mut impl EventSink) {
        if self.dialogs.contains(DialogKind::EmergencyCall) {
            debug!("Emergency call confirmation already open");
            return;
        }
        self.open(Dialog::EmergencyCall, sink);
    }

    fn answer_dialog(&mut self, is_yes: bool, sink: &mut impl EventSink) {
        let Some(dialog) = self.dialogs.pop() else {
            return;
        };
        info!("Dialog {:?} answered {}", dialog.kind(), if is_yes { "yes" } else { "no" });
        sink.emit(&SessionEvent::DialogClosed {
            dialog: dialog.kind(),
            answer: Some(is_yes),
        });

        match (dialog, is_yes) {
            (Dialog::RescuerSwitch, true) => {
                sink.emit(&SessionEvent::RescuersSwitched);
                self.resume_compressions();
            }
            (Dialog::RescuerSwitch, false) => self.open(Dialog::ContinueOrRest, sink),
            (Dialog::ContinueOrRest, true) => self.resume_compressions(),
            (Dialog::ContinueOrRest, false) => {
                let message = self.config.exhaustion_message.clone();
                self.end(SessionEnd::Exhausted { message }, sink);
            }
            (Dialog::EmergencyCall, true) => {
                warn!("Emergency call requested");
                sink.emit(&SessionEvent::EmergencyCallRequested);
            }
            (Dialog::EmergencyCall, false) => {}
            (
                Dialog::StepPopup {
                    step_id,
                    yes_step_id,
                    no_step_id,
                    ..
                },
                answer,
            ) => {
                let target = if answer { yes_step_id } else { no_step_id };
                if let Some(target) = target {
                    if self.state.current_step_id() == &step_id {
                        if let Err(e) = self.interpreter.go_to_step(&mut self.state, target.as_str()) {
                            warn!("Popup branch failed, holding position: {e}");
                        }
                    }
                }
            }
        }
    }

    fn resume_compressions(&mut self) {
        self.watchdog.restart();
        self.timers.start(TimerId::Watchdog);
    }

    fn close_all_dialogs(&mut self, sink: &mut impl EventSink) {
        for dialog in self.dialogs.clear() {
            sink.emit(&SessionEvent::DialogClosed {
                dialog,
                answer: None,
            });
        }
    }

    fn close_step_popups(&mut self, sink: &mut impl EventSink) {
        for _ in 0..self.dialogs.clear_step_popups() {
            sink.emit(&SessionEvent::DialogClosed {
                dialog: DialogKind::StepPopup,
                answer: None,
            });
        }
    }

    // ── Timers ────────────────────────────────────────────────

    fn handle_tick(&mut self, sink: &mut impl EventSink) {
        let mut fired = FiredTimers::default();
        self.timers.tick(self.config.tick_interval_ms, &mut fired);

        for (timer, count) in fired.0 {
            // A timer stopped or restarted by an earlier fire in this batch
            // must not act on a stale count.
            if self.phase != SessionPhase::Running
                || self.timers.state(timer) != TimerState::Running
                || count > self.timers.count(timer)
            {
                continue;
            }
            match timer {
                TimerId::StepClock => self.advance_step_clock(count),
                TimerId::Watchdog => self.watchdog_second(sink),
            }
            self.settle(sink);
        }
    }

    fn advance_step_clock(&mut self, seconds: u32) {
        let timed = self
            .interpreter
            .current_step(&self.state)
            .is_ok_and(|s| matches!(s.kind, StepKind::Timed { .. }));
        let result = if timed {
            self.interpreter.update_elapsed_time(&mut self.state, seconds)
        } else {
            self.interpreter.update_dwell_time(&mut self.state, seconds)
        };
        if let Err(e) = result {
            warn!("Step clock update failed, holding position: {e}");
        }
    }

    fn watchdog_second(&mut self, sink: &mut impl EventSink) {
        match self.watchdog.tick() {
            WatchdogSignal::Quiet => {}
            WatchdogSignal::PrepareToSwitch { elapsed, remaining } => {
                info!("Watchdog: prepare to switch ({remaining}s left)");
                sink.emit(&SessionEvent::SwitchWarning {
                    elapsed_secs: elapsed,
                    remaining_secs: remaining,
                });
            }
            WatchdogSignal::SwitchDue => {
                self.timers.pause(TimerId::StepClock);
                self.timers.pause(TimerId::Watchdog);
                self.open(Dialog::RescuerSwitch, sink);
            }
        }
    }

    fn handle_beat(&mut self) {
        if self.dialogs.has_rescuer_dialog() {
            debug!("Beat ignored while a rescuer decision is pending");
            return;
        }
        let beats = self.state.beat_count().saturating_add(1);
        if let Err(e) = self.interpreter.update_beat_count(&mut self.state, beats) {
            warn!("Beat update failed, holding position: {e}");
        }
    }

    fn stop_watchdog(&mut self) {
        self.watchdog.stop();
        self.timers.stop(TimerId::Watchdog);
    }

    fn sync_metronome(&mut self, sink: &mut impl EventSink) {
        let bpm = self.interpreter.protocol().metronome_bpm();
        let wanted = bpm.is_some()
            && self.phase == SessionPhase::Running
            && !self.dialogs.has_rescuer_dialog()
            && self.interpreter.current_step(&self.state).is_ok_and(|s| {
                matches!(
                    s.kind,
                    StepKind::Timed {
                        count_beats: true,
                        ..
                    }
                )
            });
        if wanted != self.metronome_running {
            self.metronome_running = wanted;
            sink.emit(&SessionEvent::MetronomeChanged {
                running: wanted,
                bpm,
            });
        }
    }

    // ── Settling ──────────────────────────────────────────────

    /// Drain the interpreter outbox until it stays empty.
    fn settle(&mut self, sink: &mut impl EventSink) {
        for _ in 0..MAX_SETTLE_ROUNDS {
            let events = self.state.take_events();
            if events.is_empty() || self.phase == SessionPhase::Ended {
                return;
            }
            for event in events {
                if self.phase == SessionPhase::Ended {
                    break;
                }
                self.apply_engine_event(event, sink);
            }
        }
        error!(
            "Session did not settle after {MAX_SETTLE_ROUNDS} rounds, holding at '{}'",
            self.state.current_step_id()
        );
        self.state.take_events();
        self.timers.stop(TimerId::StepClock);
    }

    fn apply_engine_event(&mut self, event: EngineEvent, sink: &mut impl EventSink) {
        match event {
            EngineEvent::StepChanged { from, to } => self.on_step_changed(from, to, sink),
            EngineEvent::TimerEventFired {
                step_id,
                at_seconds,
                effect,
            } => {
                sink.emit(&SessionEvent::TimerEventFired {
                    step_id: step_id.clone(),
                    at_seconds,
                    effect: effect.clone(),
                });
                if let TimerEffect::Popup {
                    title,
                    message,
                    yes_step_id,
                    no_step_id,
                } = effect
                {
                    if self.state.current_step_id() == &step_id {
                        self.close_step_popups(sink);
                        self.open(
                            Dialog::StepPopup {
                                step_id,
                                title,
                                message,
                                yes_step_id,
                                no_step_id,
                            },
                            sink,
                        );
                    }
                }
            }
            EngineEvent::LoopCapExceeded {
                step_id,
                iterations,
            } => sink.emit(&SessionEvent::LoopCapExceeded {
                step_id,
                iterations,
            }),
            EngineEvent::TerminalReached { step_id, outcome } => {
                self.end(SessionEnd::Outcome { step_id, outcome }, sink);
            }
        }
    }

    fn on_step_changed(&mut self, from: Option<StepId>, to: StepId, sink: &mut impl EventSink) {
        let Some(step) = self.interpreter.protocol().step(to.as_str()).cloned() else {
            error!("Step change to unknown step '{to}'");
            return;
        };
        sink.emit(&SessionEvent::StepChanged {
            from,
            to: to.clone(),
            step: Box::new(step.clone()),
        });
        self.close_step_popups(sink);

        // A later transition in the same batch will arm its own step.
        if self.state.current_step_id() != &to {
            return;
        }

        if has_step_clock(&step.kind) {
            self.timers.start(TimerId::StepClock);
        } else {
            self.timers.stop(TimerId::StepClock);
        }

        if is_compression_step(&step, &self.config.compression_markers) {
            if !self.watchdog.is_running() && !self.watchdog.is_paused() {
                self.watchdog.start();
                self.timers.start(TimerId::Watchdog);
            }
        } else if matches!(
            step.kind,
            StepKind::Popup { .. } | StepKind::VoiceTrigger { .. } | StepKind::Terminal { .. }
        ) && self.watchdog.is_running()
        {
            self.stop_watchdog();
        }

        match step.kind {
            // Loop nodes are never rested on.
            StepKind::Loop { .. } => {
                if let Err(e) = self.interpreter.next_step(&mut self.state) {
                    error!("Loop '{to}' could not resolve: {e}");
                }
            }
            // Deliver events scheduled at 0 s.
            StepKind::Timed { .. } => {
                if let Err(e) = self.interpreter.update_elapsed_time(&mut self.state, 0) {
                    warn!("Timed step '{to}' entry failed: {e}");
                }
            }
            _ => {}
        }
    }

    // ── Invariants and shutdown ───────────────────────────────

    /// The watchdog and the step clock are paused exactly while a rescuer
    /// decision is pending.
    fn enforce_invariants(&mut self, sink: &mut impl EventSink) {
        if self.phase != SessionPhase::Running {
            return;
        }
        if self.dialogs.has_rescuer_dialog() {
            if self.watchdog.is_running() {
                warn!("Rescuer dialog open with a running watchdog; pausing it");
                self.watchdog.pause();
            }
            self.timers.pause(TimerId::Watchdog);
            self.timers.pause(TimerId::StepClock);
        } else {
            if self.watchdog.is_paused() {
                warn!("Watchdog paused with no decision pending; stopping it");
                self.stop_watchdog();
            }
            self.timers.resume(TimerId::StepClock);
        }
        self.sync_metronome(sink);
    }

    fn end(&mut self, reason: SessionEnd, sink: &mut impl EventSink) {
        if self.phase == SessionPhase::Ended {
            return;
        }
        self.timers.stop_all();
        self.watchdog.stop();
        self.close_all_dialogs(sink);
        self.phase = SessionPhase::Ended;
        self.sync_metronome(sink);
        self.state.take_events();
        info!("Session ended: {reason:?}");
        sink.emit(&SessionEvent::SessionEnded(reason));
    }
}

/// Collects scheduler fires so they can be handled after the tick.
#[derive(Default)]
struct FiredTimers(HVec<(TimerId, u32), MAX_FIRES_PER_TICK>);

impl TimerDelegate for FiredTimers {
    fn on_timer_fired(&mut self, timer: TimerId, count: u32) {
        if self.0.push((timer, count)).is_err() {
            warn!("Too many timer fires in one tick, dropping {timer:?} #{count}");
        }
    }
}

fn describe(input: &VoiceInput) -> String {
    match input {
        VoiceInput::Keyword(_) => input.heard().unwrap_or_default(),
        VoiceInput::Intent(intent) => format!("{intent:?}").to_lowercase(),
    }
}
