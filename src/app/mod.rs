//! Application core: session orchestration, zero I/O.
//!
//! This module holds the rules that turn taps, speech and clock ticks into
//! protocol progress: command handling, dialogs, the rescuer watchdog and
//! the metronome.  Everything outside the process is reached through the
//! **port traits** in [`ports`], keeping this layer testable without a UI,
//! a speaker or a real clock.

pub mod commands;
pub mod dialog;
pub mod events;
pub mod ports;
pub mod service;

pub use commands::SessionCommand;
pub use events::{SessionEnd, SessionEvent, SessionSnapshot};
pub use service::{SessionController, SessionPhase};
