//! Integration test driver for `tests/integration/` submodules.
//!
//! Each `mod` below exercises a bundled protocol or the runtime end to end
//! against a recording sink.  Nothing here needs a UI or real audio.

mod choking_flow_tests;
mod cpr_flow_tests;
mod recording_sink;
mod runtime_tests;
