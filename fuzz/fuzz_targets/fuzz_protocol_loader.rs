//! Fuzz target: `ProtocolDefinition::from_json`
//!
//! Feeds arbitrary bytes to the protocol loader.  Anything it accepts must
//! start cleanly: the initial step resolves and every edge of every step
//! points at a step that exists.
//!
//! cargo fuzz run fuzz_protocol_loader

#![no_main]

use libfuzzer_sys::fuzz_target;
use lifeline::fsm::Interpreter;
use lifeline::protocol::ProtocolDefinition;
use std::sync::Arc;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(protocol) = ProtocolDefinition::from_json(text) else {
        return;
    };

    for step in protocol.steps() {
        for (_, target) in step.kind.edges() {
            assert!(protocol.contains(target.as_str()), "dangling edge survived validation");
        }
    }

    let engine = Interpreter::new(Arc::new(protocol), 60);
    let state = engine.start();
    assert!(engine.current_step(&state).is_ok());
});
