//! Behavioural tests for presence, heartbeat and fan-out across the whole lobby.

use lobby_realtime::{
    Action, ChatEvent, EventKind, Lobby, LobbyConfig, Outbound, OutboundReceiver,
};
use proptest::prelude::*;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

fn events(rx: &mut OutboundReceiver) -> Vec<ChatEvent> {
    rx.drain()
        .into_iter()
        .filter_map(|item| match item {
            Outbound::Event { event, .. } => Some(event),
            _ => None,
        })
        .collect()
}

fn count(events: &[ChatEvent], kind: EventKind) -> usize {
    events.iter().filter(|e| e.kind == kind).count()
}

fn join(name: &str) -> Action {
    Action::Join {
        username: name.to_string(),
    }
}

fn chat(content: &str) -> Action {
    Action::Chat {
        content: content.to_string(),
    }
}

// ==================== Scenario ====================

#[tokio::test(start_paused = true)]
async fn test_silent_death_scenario() {
    let lobby = Lobby::default();
    let (c1, _rx1) = lobby.accept().unwrap();
    let (c2, mut rx2) = lobby.accept().unwrap();

    lobby.on_inbound_frame(&c1.id, join("alice")).unwrap();
    lobby.on_inbound_frame(&c1.id, chat("hi")).unwrap();

    let shutdown = CancellationToken::new();
    let heartbeat = lobby.spawn_heartbeat(shutdown.clone());

    // c1 goes silent; c2 keeps answering probes.
    for _ in 0..8 {
        tokio::time::sleep(Duration::from_secs(5)).await;
        lobby.on_heartbeat_reply(&c2.id);
    }

    // A late transport notification changes nothing.
    assert!(lobby.on_connection_closed(&c1.id).is_none());

    assert_eq!(
        events(&mut rx2),
        vec![
            ChatEvent::join("alice"),
            ChatEvent::chat(Some("alice".to_string()), "hi"),
            ChatEvent::leave("alice"),
        ]
    );
    assert_eq!(lobby.connection_count(), 1);

    shutdown.cancel();
    heartbeat.await.unwrap();
}

// ==================== Ordering ====================

#[tokio::test]
async fn test_publisher_order_preserved_for_every_recipient() {
    let lobby = Lobby::default();
    let (sender, _rx) = lobby.accept().unwrap();
    let mut receivers: Vec<OutboundReceiver> =
        (0..4).map(|_| lobby.accept().unwrap().1).collect();

    lobby.on_inbound_frame(&sender.id, join("alice")).unwrap();
    for i in 0..20 {
        lobby
            .on_inbound_frame(&sender.id, chat(&format!("m{i}")))
            .unwrap();
    }

    let expected: Vec<String> = (0..20).map(|i| format!("m{i}")).collect();
    for rx in receivers.iter_mut() {
        let contents: Vec<String> = events(rx)
            .into_iter()
            .filter_map(|e| e.content)
            .collect();
        assert_eq!(contents, expected);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_connections_see_one_sequence() {
    let lobby = std::sync::Arc::new(Lobby::default());
    let (_observer, mut observer_rx) = lobby.accept().unwrap();
    let (_second, mut second_rx) = lobby.accept().unwrap();

    let mut tasks = Vec::new();
    for n in 0..4 {
        let lobby = lobby.clone();
        tasks.push(tokio::spawn(async move {
            let (conn, _rx) = lobby.accept().unwrap();
            lobby
                .on_inbound_frame(&conn.id, join(&format!("user{n}")))
                .unwrap();
            for i in 0..25 {
                lobby
                    .on_inbound_frame(&conn.id, chat(&format!("{i}")))
                    .unwrap();
            }
            lobby.on_connection_closed(&conn.id);
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let first: Vec<Outbound> = observer_rx.drain();
    let second: Vec<Outbound> = second_rx.drain();
    assert_eq!(first, second);

    let sequences: Vec<u64> = first
        .iter()
        .filter_map(|item| match item {
            Outbound::Event { sequence, .. } => Some(*sequence),
            _ => None,
        })
        .collect();
    let mut sorted = sequences.clone();
    sorted.sort_unstable();
    assert_eq!(sequences, sorted);

    // Every user's join precedes their chats, which precede their leave.
    for n in 0..4 {
        let name = format!("user{n}");
        let own: Vec<EventKind> = first
            .iter()
            .filter_map(|item| match item {
                Outbound::Event { event, .. } if event.sender() == Some(name.as_str()) => {
                    Some(event.kind)
                }
                _ => None,
            })
            .collect();
        assert_eq!(own.len(), 27);
        assert_eq!(own.first(), Some(&EventKind::Join));
        assert_eq!(own.last(), Some(&EventKind::Leave));
    }
}

// ==================== Isolation ====================

#[tokio::test]
async fn test_stalled_recipient_does_not_block_others() {
    let lobby = Lobby::new(LobbyConfig {
        outbound_capacity: 4,
        ..LobbyConfig::default()
    });
    let (sender, _sender_rx) = lobby.accept().unwrap();
    let (_stalled, _stalled_rx) = lobby.accept().unwrap();
    let (_healthy, mut healthy_rx) = lobby.accept().unwrap();

    let mut received = 0;
    for i in 0..50 {
        let published = lobby
            .on_inbound_frame(&sender.id, chat(&format!("{i}")))
            .unwrap();
        assert!(published.is_some());
        received += events(&mut healthy_rx).len();
    }

    assert_eq!(received, 50);
    assert!(lobby.stats().dropped_deliveries >= 46);
    // A full queue drops events but is not death until the next heartbeat
    // sweep, whose probe will not fit either.
    assert_eq!(lobby.connection_count(), 3);

    let report = lobby.monitor().sweep(Instant::now());
    assert_eq!(report.probed, 1);
    assert_eq!(report.probe_failed.len(), 2);
    assert_eq!(lobby.connection_count(), 1);
}

#[tokio::test]
async fn test_full_queue_at_sweep_leaves_once() {
    let lobby = Lobby::new(LobbyConfig {
        outbound_capacity: 2,
        ..LobbyConfig::default()
    });
    let (c1, _rx1) = lobby.accept().unwrap();
    let (_c2, mut rx2) = lobby.accept().unwrap();

    lobby.on_inbound_frame(&c1.id, join("alice")).unwrap();
    lobby.on_inbound_frame(&c1.id, chat("hi")).unwrap();
    // rx2 keeps draining so only c1 is full when the sweep runs.
    assert_eq!(events(&mut rx2).len(), 2);

    let report = lobby.monitor().sweep(Instant::now());
    assert_eq!(report.probe_failed, vec![c1.id.clone()]);
    assert!(lobby.presence().is_empty());
    assert!(lobby.on_connection_closed(&c1.id).is_none());

    let received = events(&mut rx2);
    assert_eq!(received, vec![ChatEvent::leave("alice")]);
}

// ==================== Rebind ====================

#[tokio::test]
async fn test_rebind_is_not_leave() {
    let lobby = Lobby::default();
    let (c1, _rx1) = lobby.accept().unwrap();
    let (_c2, mut rx2) = lobby.accept().unwrap();

    lobby.on_inbound_frame(&c1.id, join("alice")).unwrap();
    lobby.on_inbound_frame(&c1.id, join("bob")).unwrap();

    let received = events(&mut rx2);
    assert_eq!(count(&received, EventKind::Join), 2);
    assert_eq!(count(&received, EventKind::Leave), 0);
    assert_eq!(lobby.presence().len(), 1);
    assert_eq!(lobby.presence()[0].username, "bob");
}

// ==================== Heartbeat ====================

#[tokio::test]
async fn test_responsive_connection_survives_many_sweeps() {
    let lobby = Lobby::default();
    let (c1, _rx1) = lobby.accept().unwrap();
    lobby.on_inbound_frame(&c1.id, join("alice")).unwrap();

    let start = Instant::now();
    for tick in 0..30u64 {
        let now = start + Duration::from_secs(tick * 10);
        let report = lobby.monitor().sweep(now);
        assert!(report.expired.is_empty());
        c1.touch(now + Duration::from_secs(5));
    }
    assert_eq!(lobby.connection_count(), 1);
}

// ==================== At most one leave ====================

#[derive(Debug, Clone, Copy)]
enum Ending {
    ExplicitLeave,
    TransportClose,
    HeartbeatTimeout,
}

fn ending_strategy() -> impl Strategy<Value = Ending> {
    prop_oneof![
        Just(Ending::ExplicitLeave),
        Just(Ending::TransportClose),
        Just(Ending::HeartbeatTimeout),
    ]
}

proptest! {
    /// Property: after a join, any interleaving of explicit leave, transport
    /// close and heartbeat death yields exactly one leave.
    #[test]
    fn prop_at_most_one_leave(endings in prop::collection::vec(ending_strategy(), 1..8)) {
        let lobby = Lobby::default();
        let (c1, _rx1) = lobby.accept().unwrap();
        let (c2, mut rx2) = lobby.accept().unwrap();
        lobby.on_inbound_frame(&c1.id, join("alice")).unwrap();

        let mut clock = Instant::now();
        for ending in endings {
            match ending {
                Ending::ExplicitLeave => {
                    let _ = lobby.on_inbound_frame(&c1.id, Action::Leave);
                }
                Ending::TransportClose => {
                    lobby.on_connection_closed(&c1.id);
                }
                Ending::HeartbeatTimeout => {
                    lobby.monitor().sweep(clock);
                    clock += Duration::from_secs(1);
                    c2.touch(clock);
                    clock += Duration::from_secs(10);
                    lobby.monitor().sweep(clock);
                    c2.touch(clock);
                }
            }
        }

        let received = events(&mut rx2);
        prop_assert_eq!(count(&received, EventKind::Leave), 1);
        prop_assert_eq!(received.last(), Some(&ChatEvent::leave("alice")));
    }

    /// Property: joins and chats alone never produce a leave.
    #[test]
    fn prop_joins_and_chats_never_leave(
        names in prop::collection::vec("[a-z]{1,10}", 1..10),
        chats in 0usize..5,
    ) {
        let lobby = Lobby::default();
        let (c1, _rx1) = lobby.accept().unwrap();
        let (_c2, mut rx2) = lobby.accept().unwrap();

        for name in &names {
            lobby.on_inbound_frame(&c1.id, join(name)).unwrap();
            for i in 0..chats {
                lobby.on_inbound_frame(&c1.id, chat(&i.to_string())).unwrap();
            }
        }

        let received = events(&mut rx2);
        prop_assert_eq!(count(&received, EventKind::Join), names.len());
        prop_assert_eq!(count(&received, EventKind::Chat), names.len() * chats);
        prop_assert_eq!(count(&received, EventKind::Leave), 0);
    }
}
