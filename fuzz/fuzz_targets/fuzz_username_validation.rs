//! Fuzz target for username validation.
//!
//! Joins with arbitrary names must never panic, and an accepted name is
//! stored trimmed and within the length limit.

#![no_main]

use libfuzzer_sys::fuzz_target;
use lobby_realtime::{Action, Lobby, LobbyConfig, DEFAULT_MAX_USERNAME_LEN};

fuzz_target!(|data: &[u8]| {
    let username = String::from_utf8_lossy(data).into_owned();

    let lobby = Lobby::new(LobbyConfig::default());
    let Ok((connection, _outbound)) = lobby.accept() else {
        return;
    };

    let accepted = lobby
        .on_inbound_frame(&connection.id, Action::Join { username: username.clone() })
        .is_ok();

    let presence = lobby.presence();
    if accepted {
        assert_eq!(presence.len(), 1);
        let stored = &presence[0].username;
        assert_eq!(stored.as_str(), username.trim());
        assert!(!stored.is_empty());
        assert!(stored.chars().count() <= DEFAULT_MAX_USERNAME_LEN);
    } else {
        assert!(presence.is_empty());
    }
});
