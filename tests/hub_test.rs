//! Hub integration tests driven through in-memory transports.

mod common;

use std::collections::HashSet;

use room_hub::transport::memory;
use room_hub::{BackpressurePolicy, Hub, HubConfig, HubError, Message};
use serde_json::json;

use common::{assert_silent, connect, eventually, next_frame, quiet_hub, StalledSink, SETTLE};

fn names<T: ToString>(items: &[T]) -> Vec<String> {
    items.iter().map(ToString::to_string).collect()
}

async fn room_users(hub: &Hub, room: &str) -> Vec<String> {
    hub.get_room_users(room)
        .await
        .map(|users| names(&users))
        .unwrap_or_default()
}

#[tokio::test]
async fn scenario_a_message_reaches_other_member_once() {
    let hub = quiet_hub();
    let (_alice, _alice_peer) = connect(&hub, "alice").await;
    hub.create_room("alice", "lobby").await.unwrap();
    let (_bob, mut bob_peer) = connect(&hub, "bob").await;
    hub.join_room("bob", "lobby").await.unwrap();

    hub.send_message(Message::chat("alice", "hi")).await.unwrap();

    let frame = next_frame(&mut bob_peer).await;
    assert_eq!(
        frame,
        json!({"type": "message", "username": "alice", "content": "hi"})
    );
    assert_silent(&mut bob_peer).await;
}

#[tokio::test]
async fn scenario_b_leave_without_room() {
    let hub = quiet_hub();
    let (_alice, _peer) = connect(&hub, "alice").await;

    assert_eq!(
        hub.leave_room("alice").await,
        Err(HubError::NotInRoom("alice".to_string()))
    );
    assert!(hub.is_online("alice").await);
    assert_eq!(hub.current_room("alice").await, Ok(None));
    assert!(hub.list_rooms().await.is_empty());
}

#[tokio::test]
async fn scenario_c_join_unknown_room() {
    let hub = quiet_hub();
    let (_bob, _peer) = connect(&hub, "bob").await;

    assert_eq!(
        hub.join_room("bob", "nope").await,
        Err(HubError::UnknownRoom("nope".to_string()))
    );
    assert_eq!(hub.current_room("bob").await, Ok(None));
}

#[tokio::test]
async fn join_room_unknown_user() {
    let hub = quiet_hub();
    let (_alice, _peer) = connect(&hub, "alice").await;
    hub.create_room("alice", "lobby").await.unwrap();

    assert!(matches!(
        hub.join_room("ghost", "lobby").await,
        Err(HubError::UnknownUser(_))
    ));
}

#[tokio::test]
async fn concurrent_registration_admits_one() {
    let hub = quiet_hub();
    let mut tasks = Vec::new();
    for _ in 0..8 {
        let hub = hub.clone();
        tasks.push(tokio::spawn(async move {
            let (source, sink, peer) = memory::channel();
            (hub.register_user("alice", source, sink).await, peer)
        }));
    }

    let mut admitted = Vec::new();
    let mut rejected = 0;
    for task in tasks {
        let (result, mut peer) = task.await.unwrap();
        match result {
            Ok(client) => admitted.push((client, peer)),
            Err(HubError::DuplicateUser(name)) => {
                assert_eq!(name, "alice");
                let frame = next_frame(&mut peer).await;
                assert_eq!(frame["type"], "error");
                assert_eq!(frame["code"], "duplicate_user");
                assert_eq!(peer.recv().await, None);
                rejected += 1;
            }
            Err(other) => panic!("unexpected error: {}", other),
        }
    }

    assert_eq!(admitted.len(), 1);
    assert_eq!(rejected, 7);
    assert_eq!(hub.client_count().await, 1);
}

#[tokio::test]
async fn joined_member_shows_up_in_room_users() {
    let hub = quiet_hub();
    let (_alice, _a) = connect(&hub, "alice").await;
    let (_bob, _b) = connect(&hub, "bob").await;
    hub.create_room("alice", "lobby").await.unwrap();
    hub.join_room("bob", "lobby").await.unwrap();

    eventually(&hub, "bob listed in lobby", |hub| async move {
        room_users(&hub, "lobby").await == ["alice", "bob"]
    })
    .await;
    assert!(matches!(
        hub.get_room_users("attic").await,
        Err(HubError::UnknownRoom(_))
    ));
}

#[tokio::test]
async fn switching_rooms_leaves_the_old_one_first() {
    let hub = quiet_hub();
    let (_alice, _a) = connect(&hub, "alice").await;
    let (_bob, _b) = connect(&hub, "bob").await;
    let (_carol, _c) = connect(&hub, "carol").await;
    hub.create_room("alice", "lobby").await.unwrap();
    hub.create_room("carol", "attic").await.unwrap();
    hub.join_room("bob", "lobby").await.unwrap();

    hub.join_room("bob", "attic").await.unwrap();

    // The old room acknowledged the removal before the join returned.
    assert_eq!(room_users(&hub, "lobby").await, ["alice"]);
    assert_eq!(
        hub.current_room("bob").await.unwrap().map(|r| r.to_string()),
        Some("attic".to_string())
    );
    eventually(&hub, "bob listed in attic", |hub| async move {
        room_users(&hub, "attic").await == ["bob", "carol"]
    })
    .await;
}

#[tokio::test]
async fn create_room_is_idempotent() {
    let hub = quiet_hub();
    let (_alice, _a) = connect(&hub, "alice").await;
    let (_bob, _b) = connect(&hub, "bob").await;

    let first = hub.create_room("alice", "lobby").await.unwrap();
    let second = hub.create_room("alice", "lobby").await.unwrap();
    let third = hub.create_room("bob", "lobby").await.unwrap();

    assert_eq!(first.id(), second.id());
    assert_eq!(first.id(), third.id());
    assert_eq!(hub.room_count().await, 1);
    // An existing room is handed back unchanged; bob was not moved into it.
    assert_eq!(hub.current_room("bob").await, Ok(None));
}

#[tokio::test]
async fn concurrent_create_spawns_one_room() {
    let hub = quiet_hub();
    let mut clients = Vec::new();
    for i in 0..6 {
        clients.push(connect(&hub, &format!("user{}", i)).await);
    }

    let mut tasks = Vec::new();
    for i in 0..6 {
        let hub = hub.clone();
        tasks.push(tokio::spawn(async move {
            hub.create_room(&format!("user{}", i), "lobby")
                .await
                .unwrap()
                .id()
        }));
    }
    let mut ids = HashSet::new();
    for task in tasks {
        ids.insert(task.await.unwrap());
    }

    assert_eq!(ids.len(), 1);
    assert_eq!(hub.room_count().await, 1);
}

#[tokio::test]
async fn empty_room_is_torn_down_and_recreated_fresh() {
    let hub = quiet_hub();
    let (_alice, _a) = connect(&hub, "alice").await;
    let original = hub.create_room("alice", "lobby").await.unwrap();

    let left = hub.leave_room("alice").await.unwrap();
    assert_eq!(left.as_str(), "lobby");
    assert_eq!(hub.current_room("alice").await, Ok(None));

    eventually(&hub, "lobby removed", |hub| async move {
        hub.list_rooms().await.is_empty()
    })
    .await;
    tokio::time::timeout(SETTLE, original.closed())
        .await
        .expect("room actor did not exit");

    let fresh = hub.create_room("alice", "lobby").await.unwrap();
    assert_ne!(fresh.id(), original.id());
    eventually(&hub, "alice back in new lobby", |hub| async move {
        room_users(&hub, "lobby").await == ["alice"]
    })
    .await;
}

#[tokio::test]
async fn unregister_cascades_to_room() {
    let hub = Hub::default();
    let (_alice, mut alice_peer) = connect(&hub, "alice").await;
    let (bob, _b) = connect(&hub, "bob").await;
    hub.create_room("alice", "lobby").await.unwrap();
    hub.join_room("bob", "lobby").await.unwrap();

    let joined = next_frame(&mut alice_peer).await;
    assert_eq!(joined["type"], "system");
    assert_eq!(joined["content"], "bob joined lobby");

    hub.unregister_user("bob").await.unwrap();

    assert!(bob.is_retired());
    assert_eq!(room_users(&hub, "lobby").await, ["alice"]);
    let left = next_frame(&mut alice_peer).await;
    assert_eq!(left["content"], "bob left lobby");
    assert!(matches!(
        hub.unregister_user("bob").await,
        Err(HubError::UnknownUser(_))
    ));
    tokio::time::timeout(SETTLE, bob.closed())
        .await
        .expect("pumps did not stop");
}

#[tokio::test]
async fn disconnect_cascades_to_room() {
    let hub = quiet_hub();
    let (_alice, _a) = connect(&hub, "alice").await;
    let (bob, mut bob_peer) = connect(&hub, "bob").await;
    hub.create_room("alice", "lobby").await.unwrap();
    hub.join_room("bob", "lobby").await.unwrap();

    bob_peer.disconnect();
    tokio::time::timeout(SETTLE, bob.closed())
        .await
        .expect("pumps did not stop");

    assert!(!hub.is_online("bob").await);
    assert_eq!(room_users(&hub, "lobby").await, ["alice"]);

    // The name is free again.
    let (_bob_again, _b) = connect(&hub, "bob").await;
}

#[tokio::test]
async fn last_disconnect_closes_room() {
    let hub = quiet_hub();
    let (alice, mut alice_peer) = connect(&hub, "alice").await;
    hub.create_room("alice", "lobby").await.unwrap();

    alice_peer.disconnect();
    tokio::time::timeout(SETTLE, alice.closed())
        .await
        .expect("pumps did not stop");

    eventually(&hub, "lobby removed", |hub| async move {
        hub.room_count().await == 0
    })
    .await;
}

#[tokio::test]
async fn stalled_member_is_evicted() {
    let capacity = 2;
    let hub = Hub::new(HubConfig {
        mailbox_capacity: capacity,
        backpressure: BackpressurePolicy::Evict,
        announce_membership: false,
        ..HubConfig::default()
    });
    let (_alice, _a) = connect(&hub, "alice").await;
    let (source, _sink, _stuck_peer) = memory::channel();
    let stuck = hub.register_user("stuck", source, StalledSink).await.unwrap();
    hub.create_room("alice", "lobby").await.unwrap();
    hub.join_room("stuck", "lobby").await.unwrap();

    // One frame may be parked in the stalled write; the rest must overflow.
    for i in 0..capacity + 2 {
        hub.send_message(Message::chat("alice", format!("m{}", i)))
            .await
            .unwrap();
    }

    eventually(&hub, "stuck evicted", |hub| async move {
        room_users(&hub, "lobby").await == ["alice"]
    })
    .await;
    assert!(stuck.is_retired());
    eventually(&hub, "stuck unregistered", |hub| async move {
        !hub.is_online("stuck").await
    })
    .await;
}

#[tokio::test]
async fn stalled_member_drops_under_drop_policy() {
    let capacity = 2;
    let hub = Hub::new(HubConfig {
        mailbox_capacity: capacity,
        backpressure: BackpressurePolicy::Drop,
        announce_membership: false,
        ..HubConfig::default()
    });
    let (_alice, _a) = connect(&hub, "alice").await;
    let (source, _sink, _stuck_peer) = memory::channel();
    let stuck = hub.register_user("stuck", source, StalledSink).await.unwrap();
    hub.create_room("alice", "lobby").await.unwrap();
    hub.join_room("stuck", "lobby").await.unwrap();

    let sent = capacity as u64 + 3;
    for i in 0..sent {
        hub.send_message(Message::chat("alice", format!("m{}", i)))
            .await
            .unwrap();
    }

    // At most one frame left the mailbox for the stalled write.
    let overflow = sent - capacity as u64;
    let stuck = &stuck;
    eventually(&hub, "drops recorded", move |_| async move {
        let dropped = stuck.dropped_messages();
        dropped == overflow || dropped == overflow - 1
    })
    .await;
    assert!(!stuck.is_retired());
    assert_eq!(room_users(&hub, "lobby").await, ["alice", "stuck"]);
    assert!(hub.is_online("stuck").await);
}

#[tokio::test]
async fn echo_to_sender_when_configured() {
    let hub = Hub::new(HubConfig {
        echo_to_sender: true,
        announce_membership: false,
        ..HubConfig::default()
    });
    let (_alice, mut alice_peer) = connect(&hub, "alice").await;
    hub.create_room("alice", "lobby").await.unwrap();

    hub.send_message(Message::chat("alice", "hello me"))
        .await
        .unwrap();

    assert_eq!(next_frame(&mut alice_peer).await["content"], "hello me");
}

#[tokio::test]
async fn churn_leaves_nothing_behind() {
    let hub = quiet_hub();
    let mut tasks = Vec::new();
    for i in 0..16 {
        let hub = hub.clone();
        tasks.push(tokio::spawn(async move {
            let name = format!("user{}", i);
            let (client, mut peer) = connect(&hub, &name).await;
            let room = format!("room{}", i % 3);
            hub.create_room(&name, &room).await.unwrap();
            // The room may close between the two calls.
            let _ = hub.join_room(&name, &room).await;
            let _ = hub.send_message(Message::chat(name.as_str(), "hey")).await;
            let _ = hub.join_room(&name, "room0").await;
            let _ = hub.leave_room(&name).await;
            peer.disconnect();
            client.closed().await;
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(hub.client_count().await, 0);
    eventually(&hub, "all rooms torn down", |hub| async move {
        hub.room_count().await == 0
    })
    .await;
}

#[tokio::test]
async fn room_emptied_by_eviction_is_torn_down() {
    let hub = Hub::new(HubConfig {
        mailbox_capacity: 1,
        backpressure: BackpressurePolicy::Evict,
        echo_to_sender: true,
        announce_membership: false,
        ..HubConfig::default()
    });
    let (source, _sink, _peer) = memory::channel();
    let solo = hub.register_user("solo", source, StalledSink).await.unwrap();
    let room = hub.create_room("solo", "lobby").await.unwrap();

    // Echoes to the only member overflow its stalled mailbox. Sends after the
    // eviction find no room and fail, which is fine.
    for i in 0..4 {
        let _ = hub
            .send_message(Message::chat("solo", format!("m{}", i)))
            .await;
    }

    tokio::time::timeout(SETTLE, room.closed())
        .await
        .expect("room actor did not exit");
    assert!(solo.is_retired());
    eventually(&hub, "lobby removed", |hub| async move {
        hub.list_rooms().await.is_empty()
    })
    .await;
}
