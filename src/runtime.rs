//! Session runtime: reactor-driven clock and command pump.
//!
//! Runs one [`SessionController`] to completion on the calling thread using
//! `edge-executor` for cooperative scheduling and `async-io-mini` timers
//! (no busy-spinning).  Three concurrent futures:
//!
//! 1. **Tick**: one `Tick` per `tick_interval_ms`, deadline-based so a
//!    slow handler does not make the clock drift
//! 2. **Beat**: one `Beat` per metronome period while the metronome runs
//! 3. **Pump**: truly async via `SessionInbox::commands.receive().await`
//!    (wakes as soon as another thread submits a command)
//!
//! ```text
//!  ┌────────────────────────────────────────────────────────────┐
//!  │  Session thread                                            │
//!  │  ┌──────────────────────────────────────────────────────┐  │
//!  │  │  futures_lite::future::block_on                      │  │
//!  │  │  ┌──────────────────────────────────────────────────┐│  │
//!  │  │  │  edge_executor::LocalExecutor                    ││  │
//!  │  │  │  ┌─────────┐  ┌──────────┐  ┌────────────────┐  ││  │
//!  │  │  │  │  Tick   │  │   Beat   │  │ Pump (async)   │  ││  │
//!  │  │  │  │ 1s ⏱    │  │ 60/bpm ⏱ │  │ wake-on-submit │  ││  │
//!  │  │  │  └─────────┘  └──────────┘  └────────────────┘  ││  │
//!  │  │  └──────────────────────────────────────────────────┘│  │
//!  │  └──────────────────────────────────────────────────────┘  │
//!  └────────────────────────────────────────────────────────────┘
//! ```
//!
//! The run ends when the session finishes or when
//! [`SessionInbox::request_shutdown`] is called.

use core::cell::RefCell;
use core::time::Duration;
use std::time::Instant;

use embassy_sync::blocking_mutex::raw::{CriticalSectionRawMutex, NoopRawMutex};
use embassy_sync::channel::{Channel, TrySendError};
use embassy_sync::signal::Signal;
// Provides the time driver `async_io_mini::Timer` schedules against.
use embassy_time as _;
use futures_lite::future;
use log::{info, warn};

use crate::app::commands::SessionCommand;
use crate::app::ports::{Clock, EventSink};
use crate::app::service::{SessionController, SessionPhase};

/// Default inbox depth.
pub const INBOX_DEPTH: usize = 16;

// ── Inbox ────────────────────────────────────────────────────

/// Thread-safe entry point into a running session.
///
/// Usually a `static`, so input threads (a stdin reader, a speech
/// recognizer callback) can submit without holding a reference.
pub struct SessionInbox<const N: usize = INBOX_DEPTH> {
    commands: Channel<CriticalSectionRawMutex, SessionCommand, N>,
    shutdown: Signal<CriticalSectionRawMutex, ()>,
}

impl<const N: usize> SessionInbox<N> {
    pub const fn new() -> Self {
        Self {
            commands: Channel::new(),
            shutdown: Signal::new(),
        }
    }

    /// Queue a command.  Returns `false` (and drops it) when the inbox is full.
    pub fn submit(&self, cmd: SessionCommand) -> bool {
        match self.commands.try_send(cmd) {
            Ok(()) => true,
            Err(TrySendError::Full(cmd)) => {
                warn!("Session inbox full, dropping {cmd:?}");
                false
            }
        }
    }

    /// Ask the runtime to return after the command in progress.
    pub fn request_shutdown(&self) {
        self.shutdown.signal(());
    }
}

impl<const N: usize> Default for SessionInbox<N> {
    fn default() -> Self {
        Self::new()
    }
}

// ── Shared session ───────────────────────────────────────────

struct Session<'a, S, C> {
    controller: SessionController,
    sink: &'a mut S,
    clock: &'a C,
}

impl<S: EventSink, C: Clock> Session<'_, S, C> {
    /// Handle one command.  `false` once the session is over.
    fn dispatch(&mut self, cmd: SessionCommand) -> bool {
        let now = self.clock.now_ms();
        self.controller.handle(cmd, now, &mut *self.sink);
        !self.controller.is_finished()
    }
}

type Shared<'s, 'a, S, C> = &'s RefCell<Session<'a, S, C>>;

// ── Tasks ────────────────────────────────────────────────────

/// Tick task.  Deadlines advance by whole periods, so time spent handling
/// a tick is absorbed by the next sleep.
async fn tick_loop<S: EventSink, C: Clock>(
    session: Shared<'_, '_, S, C>,
    period: Duration,
    finished: &Signal<NoopRawMutex, ()>,
) {
    let mut deadline = Instant::now() + period;
    loop {
        sleep_until(deadline).await;
        deadline += period;
        if !session.borrow_mut().dispatch(SessionCommand::Tick) {
            finished.signal(());
            return;
        }
    }
}

/// Beat task.  Keeps its cadence while the metronome is off and only
/// delivers beats while it runs.
async fn beat_loop<S: EventSink, C: Clock>(
    session: Shared<'_, '_, S, C>,
    period: Duration,
    finished: &Signal<NoopRawMutex, ()>,
) {
    let mut deadline = Instant::now() + period;
    loop {
        sleep_until(deadline).await;
        deadline += period;
        let mut guard = session.borrow_mut();
        if !guard.controller.is_metronome_running() {
            continue;
        }
        if !guard.dispatch(SessionCommand::Beat) {
            finished.signal(());
            return;
        }
    }
}

/// Pump task.  Wakes as soon as a command is submitted.
async fn pump_loop<S: EventSink, C: Clock, const N: usize>(
    session: Shared<'_, '_, S, C>,
    inbox: &SessionInbox<N>,
) {
    loop {
        let cmd = inbox.commands.receive().await;
        if !session.borrow_mut().dispatch(cmd) {
            return;
        }
    }
}

async fn sleep_until(deadline: Instant) {
    async_io_mini::Timer::after(deadline.saturating_duration_since(Instant::now())).await;
}

/// Interval between metronome beats at `bpm`.
pub fn beat_period(bpm: u16) -> Option<Duration> {
    (bpm > 0).then(|| Duration::from_micros(60_000_000 / u64::from(bpm)))
}

// ── Entry point ──────────────────────────────────────────────

/// Start `controller` (if needed) and drive it until it finishes or a
/// shutdown is requested.  Returns the controller for inspection.
pub fn run_session<S: EventSink, C: Clock, const N: usize>(
    mut controller: SessionController,
    inbox: &SessionInbox<N>,
    sink: &mut S,
    clock: &C,
) -> SessionController {
    if controller.phase() == SessionPhase::Ready {
        controller.start(sink);
    }
    if controller.is_finished() {
        return controller;
    }

    let tick = Duration::from_millis(u64::from(controller.config().tick_interval_ms));
    let beat = controller.metronome_bpm().and_then(beat_period);
    let session = RefCell::new(Session {
        controller,
        sink,
        clock,
    });
    let finished: Signal<NoopRawMutex, ()> = Signal::new();

    {
        let executor: edge_executor::LocalExecutor<'_, 4> = edge_executor::LocalExecutor::new();
        executor.spawn(tick_loop(&session, tick, &finished)).detach();
        if let Some(beat) = beat {
            executor.spawn(beat_loop(&session, beat, &finished)).detach();
        }

        info!(
            "Session runtime started (tick {}ms, metronome {})",
            tick.as_millis(),
            beat.map_or_else(|| "off".to_owned(), |b| format!("{}ms", b.as_millis()))
        );

        future::block_on(executor.run(future::or(
            pump_loop(&session, inbox),
            future::or(finished.wait(), inbox.shutdown.wait()),
        )));
    }

    let session = session.into_inner();
    info!(
        "Session runtime stopped ({})",
        if session.controller.is_finished() {
            "finished"
        } else {
            "shutdown"
        }
    );
    session.controller
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn beat_period_from_bpm() {
        assert_eq!(beat_period(110), Some(Duration::from_micros(545_454)));
        assert_eq!(beat_period(60), Some(Duration::from_secs(1)));
        assert_eq!(beat_period(0), None);
    }

    #[test]
    fn beat_period_keeps_sub_millisecond_tempo() {
        // 110 beats must span one minute to within a millisecond.
        let minute = beat_period(110).unwrap() * 110;
        assert!(Duration::from_secs(60) - minute < Duration::from_millis(1));
    }

    #[test]
    fn inbox_drops_when_full() {
        let inbox: SessionInbox<2> = SessionInbox::new();
        assert!(inbox.submit(SessionCommand::Next));
        assert!(inbox.submit(SessionCommand::Tick));
        assert!(!inbox.submit(SessionCommand::Stop));
    }
}
