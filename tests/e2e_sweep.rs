//! E2E sweep scenario: a session that goes silent is probed past the zombie
//! threshold and evicted past the expiry threshold by the background
//! sweeper, flipping the user's presence for its friends.

mod common;

use std::time::Duration;

use common::{TestServer, WsClient};

#[tokio::test]
async fn idle_session_is_swept_and_presence_flips() {
    // Sweep every second; probe after 2 s idle, evict after 4 s.
    let server = TestServer::with_session_config(1, 2, 4).await;
    let (user_a, token_a) = server.register_and_login("alice").await;
    let (user_b, token_b) = server.register_and_login("bob").await;
    server.make_friends(&token_a, &token_b, user_b).await;

    let mut ws_b = WsClient::connect_authed(&server, &token_b).await;
    let mut ws_a = WsClient::connect_authed(&server, &token_a).await;

    let frame = ws_b.expect_type("user_status").await;
    assert_eq!(frame["user_id"], user_a);
    assert_eq!(frame["status"], "online");

    // A goes completely silent. B keeps pinging so only A ages out; the
    // sweeper probes A past the zombie threshold, then evicts it past the
    // expiry threshold, which must read to B as A going offline.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(15);
    let mut offline = None;
    while tokio::time::Instant::now() < deadline {
        ws_b.send(&serde_json::json!({ "type": "ping" })).await;
        if let Some(frame) = ws_b.recv().await {
            if frame["type"] == "user_status" && frame["status"] == "offline" {
                offline = Some(frame);
                break;
            }
        }
    }
    let frame = offline.expect("offline user_status after sweep eviction");
    assert_eq!(frame["user_id"], user_a);

    // A's connection was torn down by the eviction: the liveness probe may
    // arrive first, then the stream ends without A ever sending a frame.
    while ws_a.recv().await.is_some() {}

    // Only B's session survives; A is fully offline with last-seen set.
    assert_eq!(server.state.registry.session_count(), 1);
    assert!(!server.state.presence.is_online(user_a, false).await);
    assert!(server.state.presence.last_seen(user_a).await.is_some());
}
