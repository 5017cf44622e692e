//! Lifeline emergency-guidance engine.
//!
//! Loads first-aid protocols (CPR, choking) as step graphs and walks a
//! rescuer through them, advancing on taps, voice keywords, timers and
//! metronome beats.  Presentation, speech recognition and speech output
//! live outside the crate and talk to it through [`app::ports`].
//!
//! ```text
//!  protocol ──▶ fsm::Interpreter ──▶ app::SessionController ──▶ EventSink
//!                                        ▲            ▲
//!                                   runtime ticks   SessionInbox
//! ```

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod error;
pub mod fsm;
pub mod protocol;
pub mod runtime;
pub mod safety;
pub mod scheduler;
pub mod voice;
