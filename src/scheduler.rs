//! Deterministic tick scheduler.
//!
//! A session runs two logical timers that must be started, paused and
//! stopped independently: the per-step clock and the compression watchdog.
//! The scheduler owns both and is advanced by the session's one-second
//! tick.  When a timer completes a period it notifies a [`TimerDelegate`]
//! rather than acting itself.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                  runtime tick (every tick_interval_ms)       │
//! │                              │                               │
//! │                              ▼                               │
//! │                      TickScheduler::tick                     │
//! │            ┌─────────────────┴────────────────┐              │
//! │            ▼                                  ▼              │
//! │     StepClock slot                     Watchdog slot         │
//! │  Stopped/Running/Paused            Stopped/Running/Paused    │
//! │            │                                  │              │
//! │            └────────────▶ TimerDelegate ◀─────┘              │
//! │                     (SessionController)                      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Cancelling a timer is immediate: a stopped or paused slot never reaches
//! the delegate, even within the same tick.

use log::debug;

use crate::app::ports::{TimerDelegate, TimerId};

/// Run state of one logical timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Stopped,
    Running,
    Paused,
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    state: TimerState,
    /// Milliseconds accumulated towards the next period.
    accumulated_ms: u32,
    /// Periods completed since the last start.
    count: u32,
}

impl Slot {
    const STOPPED: Self = Self {
        state: TimerState::Stopped,
        accumulated_ms: 0,
        count: 0,
    };
}

const TIMER_COUNT: usize = 2;

/// Scheduler for the session's logical timers.
#[derive(Debug, Clone)]
pub struct TickScheduler {
    slots: [Slot; TIMER_COUNT],
    /// Length of one timer period (milliseconds).
    period_ms: u32,
}

impl Default for TickScheduler {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl TickScheduler {
    pub fn new(period_ms: u32) -> Self {
        Self {
            slots: [Slot::STOPPED; TIMER_COUNT],
            period_ms: period_ms.max(1),
        }
    }

    /// Start `timer` from zero, whatever its state.
    pub fn start(&mut self, timer: TimerId) {
        debug!("Scheduler: start {timer:?}");
        self.slots[index(timer)] = Slot {
            state: TimerState::Running,
            accumulated_ms: 0,
            count: 0,
        };
    }

    pub fn stop(&mut self, timer: TimerId) {
        if self.slots[index(timer)].state != TimerState::Stopped {
            debug!("Scheduler: stop {timer:?}");
        }
        self.slots[index(timer)] = Slot::STOPPED;
    }

    /// Freeze a running timer, keeping its count.
    pub fn pause(&mut self, timer: TimerId) {
        let slot = &mut self.slots[index(timer)];
        if slot.state == TimerState::Running {
            debug!("Scheduler: pause {timer:?}");
            slot.state = TimerState::Paused;
        }
    }

    /// Continue a paused timer.
    pub fn resume(&mut self, timer: TimerId) {
        let slot = &mut self.slots[index(timer)];
        if slot.state == TimerState::Paused {
            debug!("Scheduler: resume {timer:?}");
            slot.state = TimerState::Running;
        }
    }

    pub fn state(&self, timer: TimerId) -> TimerState {
        self.slots[index(timer)].state
    }

    /// Periods completed since `timer` was last started.
    pub fn count(&self, timer: TimerId) -> u32 {
        self.slots[index(timer)].count
    }

    /// Stop every timer.
    pub fn stop_all(&mut self) {
        self.slots = [Slot::STOPPED; TIMER_COUNT];
    }

    /// Advance running timers by `elapsed_ms`.
    ///
    /// Each completed period is reported to `delegate`, step clock first.
    pub fn tick(&mut self, elapsed_ms: u32, delegate: &mut dyn TimerDelegate) {
        for timer in [TimerId::StepClock, TimerId::Watchdog] {
            let slot = &mut self.slots[index(timer)];
            if slot.state != TimerState::Running {
                continue;
            }
            slot.accumulated_ms = slot.accumulated_ms.saturating_add(elapsed_ms);
            while slot.accumulated_ms >= self.period_ms {
                slot.accumulated_ms -= self.period_ms;
                slot.count = slot.count.saturating_add(1);
                delegate.on_timer_fired(timer, slot.count);
            }
        }
    }
}

fn index(timer: TimerId) -> usize {
    match timer {
        TimerId::StepClock => 0,
        TimerId::Watchdog => 1,
    }
}
