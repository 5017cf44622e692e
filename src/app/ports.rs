//! Port traits: the boundary between the session core and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ SessionController (domain)
//! ```
//!
//! Driven adapters (event sinks, clocks) implement these traits.  The
//! [`SessionController`](super::service::SessionController) consumes them
//! via generics, so the session core never touches a UI, a speaker or the
//! system clock directly.

use super::events::SessionEvent;

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → presentation / logging)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`SessionEvent`]s through this port.
/// Adapters decide where they go (log lines, a UI state store, a TTS queue).
pub trait EventSink {
    fn emit(&mut self, event: &SessionEvent);
}

impl<S: EventSink + ?Sized> EventSink for &mut S {
    fn emit(&mut self, event: &SessionEvent) {
        (**self).emit(event);
    }
}

// ───────────────────────────────────────────────────────────────
// Clock port
// ───────────────────────────────────────────────────────────────

/// Monotonic milliseconds, used for speech-cooldown arbitration.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

// ───────────────────────────────────────────────────────────────
// Timer delegate (decouples the tick scheduler from the controller)
// ───────────────────────────────────────────────────────────────

/// Callback the [`TickScheduler`](crate::scheduler::TickScheduler) invokes
/// when a running timer completes a period.
pub trait TimerDelegate {
    /// * `timer`: which logical timer fired.
    /// * `count`: periods completed since the timer was last started.
    fn on_timer_fired(&mut self, timer: TimerId, count: u32);
}

/// The independent logical timers of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerId {
    /// Per-step clock: elapsed seconds in the current step.
    StepClock,
    /// Compression-cycle watchdog second.
    Watchdog,
}
