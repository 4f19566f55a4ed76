//! E2E relationship scenarios: friend request lifecycle, conflict on
//! repeated handling, deletion notifying both sides, offline notifications.

mod common;

use common::{TestServer, WsClient};

#[tokio::test]
async fn friend_request_accept_flow_with_conflict_on_repeat() {
    let server = TestServer::new().await;
    let (user_a, token_a) = server.register_and_login("alice").await;
    let (user_b, token_b) = server.register_and_login("bob").await;

    let mut ws_a = WsClient::connect_authed(&server, &token_a).await;
    let mut ws_b = WsClient::connect_authed(&server, &token_b).await;

    // A -> B request; B is online and gets the notification.
    let response = server
        .post(
            "/api/relations/requests",
            &token_a,
            &serde_json::json!({ "to_user_id": user_b, "message": "hi" }),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    let request_id = body["request_id"].as_i64().unwrap();

    let notification = ws_b.expect_type("notification").await;
    assert_eq!(notification["kind"], "friend_request");
    assert_eq!(notification["payload"]["from_user_id"], user_a);
    assert_eq!(notification["payload"]["request_id"], request_id);
    assert_eq!(notification["payload"]["message"], "hi");

    // B accepts; the original sender hears about it.
    let response = server
        .post(
            &format!("/api/relations/requests/{request_id}"),
            &token_b,
            &serde_json::json!({ "accept": true }),
        )
        .await;
    assert_eq!(response.status(), 200);

    let notification = ws_a.expect_type("notification").await;
    assert_eq!(notification["kind"], "friend_request_accepted");
    assert_eq!(notification["payload"]["request_id"], request_id);

    // Both friend lists contain the counterpart.
    let friends_a = server.get_json("/api/relations/friends", &token_a).await;
    assert_eq!(friends_a[0]["friend_id"], user_b);
    let friends_b = server.get_json("/api/relations/friends", &token_b).await;
    assert_eq!(friends_b[0]["friend_id"], user_a);

    // The state machine is one-shot.
    let response = server
        .post(
            &format!("/api/relations/requests/{request_id}"),
            &token_b,
            &serde_json::json!({ "accept": false }),
        )
        .await;
    assert_eq!(response.status(), 409);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["code"], 3003);
}

#[tokio::test]
async fn duplicate_pending_request_is_409() {
    let server = TestServer::new().await;
    let (_user_a, token_a) = server.register_and_login("alice").await;
    let (user_b, _token_b) = server.register_and_login("bob").await;

    let response = server
        .post(
            "/api/relations/requests",
            &token_a,
            &serde_json::json!({ "to_user_id": user_b, "message": "hi" }),
        )
        .await;
    assert_eq!(response.status(), 200);

    let response = server
        .post(
            "/api/relations/requests",
            &token_a,
            &serde_json::json!({ "to_user_id": user_b, "message": "hi again" }),
        )
        .await;
    assert_eq!(response.status(), 409);
}

#[tokio::test]
async fn rejected_request_creates_no_friendship() {
    let server = TestServer::new().await;
    let (_user_a, token_a) = server.register_and_login("alice").await;
    let (user_b, token_b) = server.register_and_login("bob").await;

    let response = server
        .post(
            "/api/relations/requests",
            &token_a,
            &serde_json::json!({ "to_user_id": user_b, "message": "hi" }),
        )
        .await;
    let body: serde_json::Value = response.json().await.unwrap();
    let request_id = body["request_id"].as_i64().unwrap();

    let response = server
        .post(
            &format!("/api/relations/requests/{request_id}"),
            &token_b,
            &serde_json::json!({ "accept": false }),
        )
        .await;
    assert_eq!(response.status(), 200);

    let friends = server.get_json("/api/relations/friends", &token_a).await;
    assert!(friends.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn pending_requests_list_incoming_only() {
    let server = TestServer::new().await;
    let (user_a, token_a) = server.register_and_login("alice").await;
    let (user_b, token_b) = server.register_and_login("bob").await;

    server
        .post(
            "/api/relations/requests",
            &token_a,
            &serde_json::json!({ "to_user_id": user_b, "message": "hi" }),
        )
        .await;

    let pending_b = server.get_json("/api/relations/requests", &token_b).await;
    assert_eq!(pending_b.as_array().unwrap().len(), 1);
    assert_eq!(pending_b[0]["from_user_id"], user_a);

    let pending_a = server.get_json("/api/relations/requests", &token_a).await;
    assert!(pending_a.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn friend_deletion_notifies_both_sides() {
    let server = TestServer::new().await;
    let (user_a, token_a) = server.register_and_login("alice").await;
    let (user_b, token_b) = server.register_and_login("bob").await;

    server.make_friends(&token_a, &token_b, user_b).await;

    let mut ws_a = WsClient::connect_authed(&server, &token_a).await;
    let mut ws_b = WsClient::connect_authed(&server, &token_b).await;

    let response = server
        .client
        .delete(server.url(&format!("/api/relations/friends/{user_b}")))
        .bearer_auth(&token_a)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let notification = ws_a.expect_type("notification").await;
    assert_eq!(notification["kind"], "friend_deleted");
    assert_eq!(notification["payload"]["friend_id"], user_b);

    let notification = ws_b.expect_type("notification").await;
    assert_eq!(notification["kind"], "friend_deleted");
    assert_eq!(notification["payload"]["friend_id"], user_a);

    let friends = server.get_json("/api/relations/friends", &token_a).await;
    assert!(friends.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn offline_recipient_finds_the_notification_queued() {
    let server = TestServer::new().await;
    let (user_a, token_a) = server.register_and_login("alice").await;
    let (user_b, token_b) = server.register_and_login("bob").await;

    // B has no session while the request is sent.
    let response = server
        .post(
            "/api/relations/requests",
            &token_a,
            &serde_json::json!({ "to_user_id": user_b, "message": "hi" }),
        )
        .await;
    assert_eq!(response.status(), 200);

    // Give the fanout consumer a moment to store the envelope.
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;

    let notifications = server.get_json("/api/notifications", &token_b).await;
    let list = notifications.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["kind"], "friend_request");
    assert_eq!(list[0]["payload"]["from_user_id"], user_a);

    // The durable view holds the same notification.
    let unread = server.get_json("/api/notifications/unread", &token_b).await;
    assert_eq!(unread.as_array().unwrap().len(), 1);
    assert_eq!(unread[0]["kind"], "friend_request");

    // Peek is non-destructive; drain removes.
    let again = server.get_json("/api/notifications", &token_b).await;
    assert_eq!(again.as_array().unwrap().len(), 1);
    let response = server
        .post("/api/notifications/drain", &token_b, &serde_json::json!({}))
        .await;
    assert_eq!(response.status(), 200);
    let empty = server.get_json("/api/notifications", &token_b).await;
    assert!(empty.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn admin_broadcast_reaches_every_authorized_session() {
    let server = TestServer::new().await;
    let (_user_a, token_a) = server.register_and_login("alice").await;
    let (_user_b, token_b) = server.register_and_login("bob").await;
    let admin_token = server.admin_token().await;

    let mut ws_a = WsClient::connect_authed(&server, &token_a).await;
    let mut ws_b = WsClient::connect_authed(&server, &token_b).await;

    let response = server
        .post(
            "/admin/broadcast",
            &admin_token,
            &serde_json::json!({ "content": "maintenance at midnight" }),
        )
        .await;
    assert_eq!(response.status(), 200);

    for ws in [&mut ws_a, &mut ws_b] {
        let frame = ws.expect_type("system_broadcast").await;
        assert_eq!(frame["content"], "maintenance at midnight");
    }
}
