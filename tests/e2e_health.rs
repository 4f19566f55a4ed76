//! E2E tests for health, metrics and basic server behavior

mod common;

use common::TestServer;

#[tokio::test]
async fn health_check_responds() {
    let server = TestServer::new().await;

    let response = server
        .client
        .get(server.url("/health"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn unknown_routes_are_404() {
    let server = TestServer::new().await;

    let response = server
        .client
        .get(server.url("/unknown/route"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn metrics_endpoint_exposes_prometheus_text() {
    let server = TestServer::new().await;

    let response = server
        .client
        .get(server.url("/metrics"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body = response.text().await.unwrap();
    // The registry may be empty until instruments fire, but the endpoint
    // must serve the text exposition format.
    assert!(body.is_empty() || body.contains("ferrochat_"));
}

#[tokio::test]
async fn admin_status_reports_uptime_and_fanout() {
    let server = TestServer::new().await;
    let token = server.admin_token().await;

    let status = server.get_json("/admin/status", &token).await;
    assert!(status["uptime_seconds"].as_i64().unwrap() >= 0);
    assert_eq!(status["fanout_running"], true);
    assert_eq!(status["sessions"], 0);
}

#[tokio::test]
async fn admin_routes_reject_non_admins() {
    let server = TestServer::new().await;
    let (_user_id, token) = server.register_and_login("alice").await;

    let response = server
        .client
        .get(server.url("/admin/status"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
}

#[tokio::test]
async fn admin_restart_recreates_the_fanout_consumer() {
    let server = TestServer::new().await;
    let token = server.admin_token().await;

    let response = server
        .post(
            "/admin/restart",
            &token,
            &serde_json::json!({ "service": "fanout" }),
        )
        .await;
    assert_eq!(response.status(), 200);

    let status = server.get_json("/admin/status", &token).await;
    assert_eq!(status["fanout_running"], true);

    let response = server
        .post(
            "/admin/restart",
            &token,
            &serde_json::json!({ "service": "warp-drive" }),
        )
        .await;
    assert_eq!(response.status(), 400);
}
