//! Fuzz target for inbound frame parsing.
//!
//! Arbitrary text frames must either resolve to an action or be rejected
//! with an error; parsing never panics.

#![no_main]

use libfuzzer_sys::fuzz_target;
use lobby_realtime::{Action, InboundFrame};

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = Action::parse(text);

        // A frame that deserializes resolves the same way as the raw text.
        if let Ok(frame) = serde_json::from_str::<InboundFrame>(text) {
            let from_frame = Action::from_frame(frame).ok();
            assert_eq!(from_frame, Action::parse(text).ok());
        }
    }
});
