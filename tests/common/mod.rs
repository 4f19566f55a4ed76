//! Common test utilities for E2E tests

use std::time::Duration;

use ferrochat::{AppState, config};
use futures::{SinkExt, StreamExt};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

pub const TEST_SECRET: &str = "test-secret-key-32-bytes-long!!!";
pub const ADMIN_USERNAME: &str = "sysadmin";
pub const ADMIN_PASSWORD: &str = "admin-password";
pub const MAX_PAYLOAD_BYTES: usize = 1024;

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub host_port: String,
    pub state: AppState,
    pub _temp_dir: TempDir,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Create a new test server on a random port with temp storage. The
    /// sweeper is effectively idle at this interval.
    pub async fn new() -> Self {
        Self::with_session_config(3600, 120, 300).await
    }

    /// Test server with explicit sweeper/zombie/expiry thresholds, for
    /// exercising sweep-driven eviction through live connections.
    pub async fn with_session_config(
        sweep_interval_seconds: u64,
        zombie_seconds: i64,
        expiry_seconds: i64,
    ) -> Self {
        let temp_dir = TempDir::new().unwrap();

        let config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                shutdown_grace_seconds: 1,
            },
            database: config::DatabaseConfig {
                path: temp_dir.path().join("test.db"),
                kv_path: ":memory:".to_string(),
            },
            auth: config::AuthConfig {
                token_secret: TEST_SECRET.to_string(),
                token_ttl_seconds: 3600,
                require_verification: false,
                auto_approve: true,
                admin_username: Some(ADMIN_USERNAME.to_string()),
                admin_password: Some(ADMIN_PASSWORD.to_string()),
            },
            session: config::SessionConfig {
                sweep_interval_seconds,
                expiry_seconds,
                zombie_seconds,
                auth_timeout_seconds: 5,
                outbound_buffer: 64,
            },
            delivery: config::DeliveryConfig {
                max_payload_bytes: MAX_PAYLOAD_BYTES,
                history_cache_len: 100,
                history_cache_ttl_seconds: 86400,
                offline_message_ttl_seconds: 30 * 86400,
                offline_notification_ttl_seconds: 7 * 86400,
                offline_queue_cap: 1000,
            },
            presence: config::PresenceConfig {
                marker_ttl_seconds: 3600,
                debounce_seconds: 0,
            },
            events: config::EventsConfig {
                topic_retention: 4096,
            },
            logging: config::LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        };

        let state = AppState::new(config).await.unwrap();
        state.start_background_tasks();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let host_port = addr.to_string();
        let addr_str = format!("http://{}", addr);

        let app = ferrochat::build_router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait a bit for the server to start.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap();

        Self {
            addr: addr_str,
            host_port,
            state,
            _temp_dir: temp_dir,
            client,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.host_port)
    }

    /// Register a user and log in; returns (user_id, token).
    pub async fn register_and_login(&self, username: &str) -> (i64, String) {
        let response = self
            .client
            .post(self.url("/api/users/register"))
            .json(&serde_json::json!({
                "username": username,
                "email": format!("{username}@example.com"),
                "password": "correct horse battery",
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200, "registration failed for {username}");
        let body: serde_json::Value = response.json().await.unwrap();
        let user_id = body["user_id"].as_i64().unwrap();

        let token = self.login(username, "correct horse battery").await;
        (user_id, token)
    }

    pub async fn login(&self, username: &str, password: &str) -> String {
        let response = self
            .client
            .post(self.url("/api/users/login"))
            .json(&serde_json::json!({
                "username": username,
                "password": password,
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200, "login failed for {username}");
        let body: serde_json::Value = response.json().await.unwrap();
        body["token"].as_str().unwrap().to_string()
    }

    pub async fn admin_token(&self) -> String {
        self.login(ADMIN_USERNAME, ADMIN_PASSWORD).await
    }

    /// Authenticated GET returning parsed JSON (asserts 200).
    pub async fn get_json(&self, path: &str, token: &str) -> serde_json::Value {
        let response = self
            .client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200, "GET {path} failed");
        response.json().await.unwrap()
    }

    /// Authenticated POST returning the response for status inspection.
    pub async fn post(
        &self,
        path: &str,
        token: &str,
        body: &serde_json::Value,
    ) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .unwrap()
    }

    /// Make two users friends via the request/accept flow.
    pub async fn make_friends(&self, token_a: &str, token_b: &str, user_b: i64) {
        let response = self
            .post(
                "/api/relations/requests",
                token_a,
                &serde_json::json!({ "to_user_id": user_b, "message": "hi" }),
            )
            .await;
        assert_eq!(response.status(), 200);
        let body: serde_json::Value = response.json().await.unwrap();
        let request_id = body["request_id"].as_i64().unwrap();

        let response = self
            .post(
                &format!("/api/relations/requests/{request_id}"),
                token_b,
                &serde_json::json!({ "accept": true }),
            )
            .await;
        assert_eq!(response.status(), 200);
    }
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// WebSocket test client speaking the JSON frame envelope
pub struct WsClient {
    stream: WsStream,
}

impl WsClient {
    /// Connect and consume the welcome frame.
    pub async fn connect(server: &TestServer) -> Self {
        let (stream, _) = tokio_tungstenite::connect_async(server.ws_url())
            .await
            .unwrap();
        let mut client = Self { stream };
        let welcome = client.recv().await.expect("welcome frame");
        assert_eq!(welcome["type"], "welcome");
        client
    }

    /// Connect and authenticate; asserts success.
    pub async fn connect_authed(server: &TestServer, token: &str) -> Self {
        let mut client = Self::connect(server).await;
        let response = client.authenticate(token).await;
        assert_eq!(response["success"], true, "ws auth failed: {response}");
        client
    }

    pub async fn authenticate(&mut self, token: &str) -> serde_json::Value {
        self.send(&serde_json::json!({ "type": "auth", "token": token }))
            .await;
        self.expect_type("auth_response").await
    }

    pub async fn send(&mut self, frame: &serde_json::Value) {
        self.stream
            .send(Message::Text(frame.to_string()))
            .await
            .unwrap();
    }

    /// Next JSON frame, or None after a 2 s quiet period / closed stream.
    pub async fn recv(&mut self) -> Option<serde_json::Value> {
        loop {
            let next = tokio::time::timeout(Duration::from_secs(2), self.stream.next()).await;
            match next {
                Err(_) => return None,
                Ok(None) => return None,
                Ok(Some(Ok(Message::Text(text)))) => {
                    return Some(serde_json::from_str(&text).unwrap());
                }
                Ok(Some(Ok(Message::Close(_)))) => return None,
                Ok(Some(Ok(_))) => continue,
                Ok(Some(Err(_))) => return None,
            }
        }
    }

    /// Skip frames until one of the given type arrives; panics after 5 s.
    pub async fn expect_type(&mut self, frame_type: &str) -> serde_json::Value {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            if tokio::time::Instant::now() > deadline {
                panic!("timed out waiting for frame type {frame_type}");
            }
            if let Some(frame) = self.recv().await {
                if frame["type"] == frame_type {
                    return frame;
                }
            }
        }
    }

    /// Assert that no frame of the given type arrives before a 2 s quiet
    /// period.
    pub async fn expect_silence(&mut self, frame_type: &str) {
        while let Some(frame) = self.recv().await {
            assert_ne!(
                frame["type"], frame_type,
                "unexpected frame received: {frame}"
            );
        }
    }

    pub async fn close(mut self) {
        let _ = self.stream.close(None).await;
    }
}
