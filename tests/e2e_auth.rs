//! E2E tests for registration, login and token enforcement

mod common;

use common::{TEST_SECRET, TestServer, WsClient};
use ferrochat::auth::{AuthClaims, create_token};

#[tokio::test]
async fn register_login_and_fetch_profile() {
    let server = TestServer::new().await;
    let (user_id, token) = server.register_and_login("alice").await;

    let info = server
        .get_json(&format!("/api/users/{user_id}"), &token)
        .await;
    assert_eq!(info["username"], "alice");
    assert_eq!(info["status"], "active");
}

#[tokio::test]
async fn missing_token_is_401() {
    let server = TestServer::new().await;

    let response = server
        .client
        .get(server.url("/api/relations/friends"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn garbage_token_is_401() {
    let server = TestServer::new().await;

    let response = server
        .client
        .get(server.url("/api/relations/friends"))
        .bearer_auth("not.a.token")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["code"], 2004);
}

#[tokio::test]
async fn expired_token_is_rejected_even_with_live_session() {
    let server = TestServer::new().await;
    let (user_id, token) = server.register_and_login("alice").await;

    // Keep a live session open for the user.
    let _ws = WsClient::connect_authed(&server, &token).await;

    let expired = create_token(&AuthClaims::new(user_id, "user", -10), TEST_SECRET).unwrap();
    let response = server
        .client
        .get(server.url("/api/relations/friends"))
        .bearer_auth(&expired)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn duplicate_registration_is_409() {
    let server = TestServer::new().await;
    server.register_and_login("alice").await;

    let response = server
        .client
        .post(server.url("/api/users/register"))
        .json(&serde_json::json!({
            "username": "alice",
            "email": "fresh@example.com",
            "password": "correct horse battery",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 409);
}

#[tokio::test]
async fn wrong_password_is_401() {
    let server = TestServer::new().await;
    server.register_and_login("alice").await;

    let response = server
        .client
        .post(server.url("/api/users/login"))
        .json(&serde_json::json!({
            "username": "alice",
            "password": "wrong horse",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn ws_auth_with_bad_token_fails_and_closes() {
    let server = TestServer::new().await;

    let mut ws = WsClient::connect(&server).await;
    let response = ws.authenticate("bogus-token").await;
    assert_eq!(response["success"], false);
    // The server closes the session after the typed failure frame.
    assert!(ws.recv().await.is_none());
}

#[tokio::test]
async fn ws_rejects_frames_before_auth() {
    let server = TestServer::new().await;
    let (user_id, _token) = server.register_and_login("alice").await;

    let mut ws = WsClient::connect(&server).await;
    ws.send(&serde_json::json!({
        "type": "chat_message",
        "to_user_id": user_id,
        "content": "sneaky",
    }))
    .await;
    let error = ws.expect_type("error").await;
    assert_eq!(error["code"], 2004);

    // Ping is allowed pre-auth.
    ws.send(&serde_json::json!({ "type": "ping" })).await;
    ws.expect_type("pong").await;
    ws.close().await;
}

#[tokio::test]
async fn verification_code_flow_is_rate_limited() {
    let server = TestServer::new().await;

    let response = server
        .client
        .post(server.url("/api/users/verification-code"))
        .json(&serde_json::json!({ "email": "new@example.com" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["code"].as_str().unwrap().len(), 6);

    let response = server
        .client
        .post(server.url("/api/users/verification-code"))
        .json(&serde_json::json!({ "email": "new@example.com" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 429);
}
