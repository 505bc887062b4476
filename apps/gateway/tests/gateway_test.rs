mod common;

use std::time::Duration;

use serde_json::json;
use tokio_tungstenite::tungstenite;

use common::TestSocket;
use parlay_common::{EntityType, NotificationKind};

fn chat_message(id: &str, chat: &str, sender: &str, content: &str) -> serde_json::Value {
    json!({
        "_id": id,
        "chat": chat,
        "sender": { "_id": sender, "username": sender },
        "content": content,
        "attachments": [],
        "readBy": [sender],
    })
}

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

#[tokio::test]
async fn handshake_without_token_is_rejected() {
    let (state, _store) = common::test_state();
    let addr = common::start_server(state).await;

    let err = tokio_tungstenite::connect_async(format!("ws://{addr}/socket"))
        .await
        .expect_err("upgrade should be refused");
    match err {
        tungstenite::Error::Http(response) => assert_eq!(response.status(), 401),
        other => panic!("expected HTTP rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn handshake_with_bad_token_is_rejected() {
    let (state, _store) = common::test_state();
    let addr = common::start_server(state).await;

    let forged = parlay_gateway::auth::tokens::issue(
        "some-other-secret",
        "u1",
        "ana",
        chrono::Duration::hours(1),
    )
    .unwrap();
    let err = tokio_tungstenite::connect_async(common::socket_url(addr, &forged))
        .await
        .expect_err("upgrade should be refused");
    match err {
        tungstenite::Error::Http(response) => assert_eq!(response.status(), 401),
        other => panic!("expected HTTP rejection, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Presence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn presence_changes_are_broadcast() {
    let (state, _store) = common::test_state();
    let addr = common::start_server(state.clone()).await;

    let mut ana = TestSocket::connect(addr, "u1", "ana").await;
    let ben = TestSocket::connect(addr, "u2", "ben").await;

    let online = ana.recv_event("user_status_change").await;
    assert_eq!(online, json!({ "userId": "u2", "username": "ben", "isOnline": true }));
    assert!(state.directory.is_online("u2"));

    ben.close().await;
    let offline = ana.recv_event("user_status_change").await;
    assert_eq!(offline["userId"], "u2");
    assert_eq!(offline["isOnline"], false);
}

#[tokio::test]
async fn stale_socket_does_not_mark_reconnected_user_offline() {
    let (state, _store) = common::test_state();
    let addr = common::start_server(state.clone()).await;

    let mut watcher = TestSocket::connect(addr, "u9", "watcher").await;
    let old = TestSocket::connect(addr, "u1", "ana").await;
    let _new = TestSocket::connect(addr, "u1", "ana").await;

    old.close().await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    // Only the two online announcements for ana; no offline.
    watcher.recv_event("user_status_change").await;
    watcher.recv_event("user_status_change").await;
    watcher.assert_no("user_status_change").await;
    assert!(state.directory.is_online("u1"));
}

#[tokio::test]
async fn closing_second_device_keeps_pushes_flowing() {
    let (state, store) = common::test_state();
    store.insert_chat("c1", &["u1", "u2"]);
    let addr = common::start_server(state.clone()).await;

    let mut phone = TestSocket::connect(addr, "u1", "ana").await;
    phone.send("subscribe_notifications", json!(null)).await;
    phone.recv_event("notifications_init").await;

    let mut laptop = TestSocket::connect(addr, "u1", "ana").await;
    laptop.send("subscribe_notifications", json!(null)).await;
    laptop.recv_event("notifications_init").await;
    laptop.close().await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(state.directory.is_online("u1"));
    let seen = phone.sync().await;
    assert!(
        seen.iter()
            .all(|e| !(e.event == "user_status_change" && e.data["isOnline"] == false)),
        "phone saw its own user go offline: {seen:?}"
    );

    let mut ben = TestSocket::connect(addr, "u2", "ben").await;
    ben.send("join_chat", json!("c1")).await;
    ben.send("new_message", chat_message("m1", "c1", "u2", "still there?"))
        .await;
    ben.sync().await;

    let pushed = phone.recv_event("new_notification").await;
    assert_eq!(pushed["entityId"], "c1");
    assert_eq!(pushed["content"], "ben: still there?");
    assert_eq!(store.notifications_for("u1").len(), 1);
}

// ---------------------------------------------------------------------------
// Chat rooms
// ---------------------------------------------------------------------------

#[tokio::test]
async fn message_reaches_room_and_absent_member_gets_notification() {
    let (state, store) = common::test_state();
    store.insert_chat("c1", &["u1", "u2", "u3"]);
    let addr = common::start_server(state).await;

    // u2 watches the chat; u1 is offline; u3 sends.
    let mut ben = TestSocket::connect(addr, "u2", "ben").await;
    ben.send("join_chat", json!("c1")).await;
    ben.sync().await;

    let mut cy = TestSocket::connect(addr, "u3", "cy").await;
    cy.send("join_chat", json!({ "chatId": "c1" })).await;
    cy.send("new_message", chat_message("m1", "c1", "u3", "hello there"))
        .await;
    cy.sync().await;

    let received = ben.recv_event("message_received").await;
    assert_eq!(received["_id"], "m1");
    assert_eq!(received["content"], "hello there");

    // The sender does not get its own message back.
    cy.assert_no("message_received").await;

    let for_ana = store.notifications_for("u1");
    assert_eq!(for_ana.len(), 1);
    assert_eq!(for_ana[0].kind, NotificationKind::Message);
    assert_eq!(for_ana[0].entity_type, EntityType::Chat);
    assert_eq!(for_ana[0].entity_id, "c1");
    assert_eq!(for_ana[0].content, "cy: hello there");
    assert_eq!(for_ana[0].metadata["messageId"], "m1");

    // Present and sending users get nothing persisted.
    assert!(store.notifications_for("u2").is_empty());
    assert!(store.notifications_for("u3").is_empty());
}

#[tokio::test]
async fn online_member_outside_room_gets_live_notification() {
    let (state, store) = common::test_state();
    store.insert_chat("c1", &["u1", "u2"]);
    let addr = common::start_server(state).await;

    let mut ana = TestSocket::connect(addr, "u1", "ana").await;
    ana.send("subscribe_notifications", json!(null)).await;
    let init = ana.recv_event("notifications_init").await;
    assert_eq!(init, json!([]));

    let mut ben = TestSocket::connect(addr, "u2", "ben").await;
    ben.send("join_chat", json!("c1")).await;
    ben.send("new_message", chat_message("m1", "c1", "u2", "you up?"))
        .await;
    ben.sync().await;

    let pushed = ana.recv_event("new_notification").await;
    assert_eq!(pushed["type"], "message");
    assert_eq!(pushed["entityId"], "c1");
    assert_eq!(pushed["sender"]["username"], "ben");
    assert_eq!(pushed["read"], false);
}

#[tokio::test]
async fn non_participant_cannot_join_or_post() {
    let (state, store) = common::test_state();
    store.insert_chat("c1", &["u1", "u2"]);
    let addr = common::start_server(state.clone()).await;

    let mut eve = TestSocket::connect(addr, "u666", "eve").await;
    eve.send("join_chat", json!("c1")).await;
    let err = eve.recv_event("error").await;
    assert!(err["message"].as_str().unwrap().contains("participant"));
    assert_eq!(state.rooms.member_count("chat:c1"), 0);

    eve.send("new_message", chat_message("m1", "c1", "u666", "spam"))
        .await;
    eve.recv_event("error").await;
    assert!(store.notifications_for("u1").is_empty());
}

#[tokio::test]
async fn typing_is_relayed_to_others_in_room() {
    let (state, store) = common::test_state();
    store.insert_chat("c1", &["u1", "u2"]);
    let addr = common::start_server(state).await;

    let mut ana = TestSocket::connect(addr, "u1", "ana").await;
    ana.send("join_chat", json!("c1")).await;
    ana.sync().await;

    let mut ben = TestSocket::connect(addr, "u2", "ben").await;
    ben.send("join_chat", json!("c1")).await;
    ben.send("typing", json!({ "chatId": "c1", "isTyping": true }))
        .await;
    ben.sync().await;

    let typing = ana.recv_event("user_typing").await;
    assert_eq!(
        typing,
        json!({ "chatId": "c1", "isTyping": true, "username": "ben" })
    );
    ben.assert_no("user_typing").await;
}

#[tokio::test]
async fn reading_a_chat_is_monotonic_and_relayed() {
    let (state, store) = common::test_state();
    store.insert_chat("c1", &["u1", "u2"]);
    store.insert_message(
        serde_json::from_value(chat_message("m1", "c1", "u1", "first")).unwrap(),
    );
    let addr = common::start_server(state).await;

    let mut ana = TestSocket::connect(addr, "u1", "ana").await;
    ana.send("join_chat", json!("c1")).await;
    ana.sync().await;

    let mut ben = TestSocket::connect(addr, "u2", "ben").await;
    ben.send("read_messages", json!("c1")).await;
    ben.send("read_messages", json!("c1")).await;
    ben.sync().await;

    let read = ana.recv_event("messages_read").await;
    assert_eq!(read, json!({ "chatId": "c1", "userId": "u2" }));

    let read_by = store.read_by("m1");
    assert_eq!(read_by.iter().filter(|u| *u == "u2").count(), 1);
    assert!(read_by.contains(&"u1".to_string()));
}

#[tokio::test]
async fn outsider_cannot_mark_chat_read() {
    let (state, store) = common::test_state();
    store.insert_chat("c1", &["u1", "u2"]);
    store.insert_message(
        serde_json::from_value(chat_message("m1", "c1", "u2", "hi")).unwrap(),
    );
    let addr = common::start_server(state).await;

    let mut ana = TestSocket::connect(addr, "u1", "ana").await;
    ana.send("join_chat", json!("c1")).await;
    ana.sync().await;

    let mut eve = TestSocket::connect(addr, "u666", "eve").await;
    eve.send("read_messages", json!("c1")).await;
    let err = eve.recv_event("error").await;
    assert!(err["message"].as_str().unwrap().contains("participant"));

    ana.assert_no("messages_read").await;
    assert!(!store.read_by("m1").contains(&"u666".to_string()));
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[tokio::test]
async fn read_notification_pushes_new_count_to_every_device() {
    let (state, store) = common::test_state();
    store.insert_chat("c1", &["u1", "u2"]);
    let addr = common::start_server(state).await;

    let mut ben = TestSocket::connect(addr, "u2", "ben").await;
    ben.send("new_message", chat_message("m1", "c1", "u2", "one")).await;
    ben.send("new_message", chat_message("m2", "c1", "u2", "two")).await;
    ben.sync().await;

    let mut phone = TestSocket::connect(addr, "u1", "ana").await;
    let mut laptop = TestSocket::connect(addr, "u1", "ana").await;
    phone.send("subscribe_notifications", json!(null)).await;
    laptop.send("subscribe_notifications", json!(null)).await;

    let init = phone.recv_event("notifications_init").await;
    let list = init.as_array().unwrap();
    assert_eq!(list.len(), 2);
    // Newest first.
    assert_eq!(list[0]["metadata"]["messageId"], "m2");
    laptop.recv_event("notifications_init").await;

    let first = list[1]["_id"].as_str().unwrap().to_string();
    phone
        .send("read_notification", json!({ "notificationId": first }))
        .await;

    let count = laptop.recv_event("notification_count_updated").await;
    assert_eq!(count, json!({ "unreadCount": 1 }));
    let count = phone.recv_event("notification_count_updated").await;
    assert_eq!(count["unreadCount"], 1);
}

#[tokio::test]
async fn reading_unknown_notification_reports_error() {
    let (state, _store) = common::test_state();
    let addr = common::start_server(state).await;

    let mut ana = TestSocket::connect(addr, "u1", "ana").await;
    ana.send("read_notification", json!({ "notificationId": "ntf_missing" }))
        .await;
    let err = ana.recv_event("error").await;
    assert_eq!(err["message"], "notification not found");
}

#[tokio::test]
async fn unsubscribed_device_stops_receiving_notifications() {
    let (state, store) = common::test_state();
    store.insert_chat("c1", &["u1", "u2"]);
    let addr = common::start_server(state).await;

    let mut ana = TestSocket::connect(addr, "u1", "ana").await;
    ana.send("subscribe_notifications", json!(null)).await;
    ana.send("unsubscribe_notifications", json!(null)).await;
    ana.sync().await;

    let mut ben = TestSocket::connect(addr, "u2", "ben").await;
    ben.send("new_message", chat_message("m1", "c1", "u2", "hey")).await;
    ben.sync().await;

    ana.assert_no("new_notification").await;
    // Still persisted for later.
    assert_eq!(store.notifications_for("u1").len(), 1);
}

// ---------------------------------------------------------------------------
// Bets
// ---------------------------------------------------------------------------

#[tokio::test]
async fn bet_interaction_updates_topic_and_notifies_owner() {
    let (state, store) = common::test_state();
    let addr = common::start_server(state).await;

    let mut owner = TestSocket::connect(addr, "u1", "ana").await;
    owner.send("subscribe_notifications", json!(null)).await;
    owner.send("subscribe_bet", json!({ "betId": "bet42" })).await;
    owner.sync().await;

    let mut fan = TestSocket::connect(addr, "u2", "ben").await;
    fan.send(
        "bet_interaction",
        json!({ "betId": "bet42", "type": "like", "data": { "betOwnerId": "u1" } }),
    )
    .await;
    fan.sync().await;

    let update = owner.recv_event("bet_update").await;
    assert_eq!(update["betId"], "bet42");
    assert_eq!(update["type"], "like");
    assert_eq!(update["userId"], "u2");

    let pushed = owner.recv_event("new_notification").await;
    assert_eq!(pushed["type"], "bet_interaction");
    assert_eq!(pushed["entityType"], "bet");
    assert_eq!(pushed["content"], "ben liked your bet");

    let stored = store.notifications_for("u1");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].entity_id, "bet42");
}

#[tokio::test]
async fn own_bet_interaction_creates_no_notification() {
    let (state, store) = common::test_state();
    let addr = common::start_server(state).await;

    let mut owner = TestSocket::connect(addr, "u1", "ana").await;
    owner
        .send(
            "bet_interaction",
            json!({ "betId": "bet42", "type": "comment", "data": { "betOwnerId": "u1" } }),
        )
        .await;
    owner.sync().await;
    assert!(store.notifications_for("u1").is_empty());
}

// ---------------------------------------------------------------------------
// Protocol
// ---------------------------------------------------------------------------

#[tokio::test]
async fn heartbeat_is_answered_and_unknown_events_error() {
    let (state, _store) = common::test_state();
    let addr = common::start_server(state).await;

    let mut ana = TestSocket::connect(addr, "u1", "ana").await;
    ana.send("heartbeat", json!(null)).await;
    let beat = ana.recv_event("heartbeat").await;
    assert!(beat["ts"].as_i64().unwrap() > 0);

    ana.send("teleport", json!({})).await;
    let err = ana.recv_event("error").await;
    assert_eq!(err["message"], "unknown event teleport");
}

#[tokio::test]
async fn silent_socket_is_closed() {
    let mut config = common::test_config();
    config.heartbeat_timeout = Duration::from_millis(400);
    let (state, _store) = parlay_gateway::AppState::in_memory(config);
    let addr = common::start_server(state.clone()).await;

    let mut ana = TestSocket::connect(addr, "u1", "ana").await;
    let quiet_since = std::time::Instant::now();
    let code = ana.closed_with(Duration::from_secs(3)).await;
    assert_eq!(code, Some(4009));

    // Closed once a full timeout passes, not a whole extra window later.
    let silent = quiet_since.elapsed();
    assert!(silent >= Duration::from_millis(300), "closed early after {silent:?}");
    assert!(silent < Duration::from_millis(600), "closed late after {silent:?}");

    // Give the server a moment to run its disconnect path.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!state.directory.is_online("u1"));
}
