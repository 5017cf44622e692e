//! Compression-cycle watchdog.
//!
//! One rescuer should not do chest compressions for much longer than two
//! minutes.  The watchdog counts seconds of an ongoing compression cycle,
//! independent of the step clock, and tells the session controller when to
//! warn and when to ask for a rescuer switch.
//!
//! ## Lifecycle
//!
//! 1. A compression step is entered: [`start`](CompressionWatchdog::start).
//! 2. Each second the controller calls [`tick`](CompressionWatchdog::tick).
//! 3. From `switch_warning_secs` a warning is returned every
//!    `warning_repeat_secs`.
//! 4. At `rescuer_switch_secs` it returns [`WatchdogSignal::SwitchDue`] and
//!    pauses itself while the decision dialog is open.
//! 5. The dialog outcome either [`restart`](CompressionWatchdog::restart)s it
//!    from zero or [`stop`](CompressionWatchdog::stop)s it.

use log::{info, warn};

use crate::config::SessionConfig;

/// What the controller should do after a watchdog tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogSignal {
    Quiet,
    /// Tell the rescuer to get ready to hand over.
    PrepareToSwitch { elapsed: u32, remaining: u32 },
    /// Open the rescuer-switch dialog now.
    SwitchDue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Stopped,
    Running,
    /// Switch dialog open; the count is frozen.
    AwaitingDecision,
}

/// Compression-cycle watchdog.
#[derive(Debug, Clone)]
pub struct CompressionWatchdog {
    warning_secs: u32,
    switch_secs: u32,
    repeat_secs: u32,
    phase: Phase,
    /// Seconds of the current cycle.
    elapsed: u32,
}

impl CompressionWatchdog {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            warning_secs: config.switch_warning_secs,
            switch_secs: config.rescuer_switch_secs,
            repeat_secs: config.warning_repeat_secs.max(1),
            phase: Phase::Stopped,
            elapsed: 0,
        }
    }

    /// Start counting if not already counting.
    pub fn start(&mut self) {
        if self.phase == Phase::Stopped {
            info!("Watchdog: compression cycle started");
            self.phase = Phase::Running;
            self.elapsed = 0;
        }
    }

    /// Reset to zero and run, whatever the current phase.
    pub fn restart(&mut self) {
        info!("Watchdog: restarted");
        self.phase = Phase::Running;
        self.elapsed = 0;
    }

    pub fn stop(&mut self) {
        if self.phase != Phase::Stopped {
            info!("Watchdog: stopped after {}s", self.elapsed);
        }
        self.phase = Phase::Stopped;
        self.elapsed = 0;
    }

    /// Freeze the count while a decision is pending.
    pub fn pause(&mut self) {
        if self.phase == Phase::Running {
            self.phase = Phase::AwaitingDecision;
        }
    }

    pub fn is_running(&self) -> bool {
        self.phase == Phase::Running
    }

    pub fn is_paused(&self) -> bool {
        self.phase == Phase::AwaitingDecision
    }

    /// Seconds counted in the current cycle (0 when stopped).
    pub fn elapsed(&self) -> u32 {
        self.elapsed
    }

    /// Count one second.
    pub fn tick(&mut self) -> WatchdogSignal {
        if self.phase != Phase::Running {
            return WatchdogSignal::Quiet;
        }
        self.elapsed = self.elapsed.saturating_add(1);

        if self.elapsed >= self.switch_secs {
            warn!("Watchdog: {}s of compressions, switch due", self.elapsed);
            self.phase = Phase::AwaitingDecision;
            return WatchdogSignal::SwitchDue;
        }
        if self.elapsed >= self.warning_secs
            && (self.elapsed - self.warning_secs) % self.repeat_secs == 0
        {
            return WatchdogSignal::PrepareToSwitch {
                elapsed: self.elapsed,
                remaining: self.switch_secs - self.elapsed,
            };
        }
        WatchdogSignal::Quiet
    }
}
