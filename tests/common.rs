#![allow(dead_code)]

use futures::{SinkExt, StreamExt};
use parley_server::AppBuilder;
use parley_server::adapters::memory::MemoryStore;
use parley_server::api::{MgmtState, app_router, mgmt_router};
use parley_server::config::{Config, ServerConfig, StoreConfig, WsConfig};
use parley_server::domain::user::{NewUser, User};
use parley_server::services::presence::PresenceRegistry;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_util::task::TaskTracker;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::protocol::Message};
use uuid::Uuid;

pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

pub fn get_test_config() -> Config {
    Config {
        server: ServerConfig { host: "127.0.0.1".to_string(), port: 0, mgmt_port: 0, shutdown_timeout_secs: 1 },
        websocket: WsConfig { outbound_buffer_size: 32, ping_interval_secs: 30, ping_timeout_secs: 30 },
        store: StoreConfig { timeout_ms: 1000, read_retries: 2, min_backoff_ms: 1, max_backoff_ms: 10 },
        ..Config::default()
    }
}

pub struct TestApp {
    pub ws_url: String,
    pub mgmt_url: String,
    pub client: reqwest::Client,
    pub config: Config,
    pub store: Arc<MemoryStore>,
    pub presence: PresenceRegistry,
    pub sessions: TaskTracker,
    pub shutdown_tx: watch::Sender<bool>,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with_config(get_test_config()).await
    }

    pub async fn spawn_with_config(config: Config) -> Self {
        parley_server::telemetry::init_test_telemetry();

        let store = Arc::new(MemoryStore::new());
        let app = AppBuilder::new(config.clone()).with_store(store.clone()).build();
        let presence = app.services.presence.clone();
        let sessions = app.services.gateway_service.sessions();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let api = app_router(app.services, shutdown_rx.clone());
        let mgmt = mgmt_router(MgmtState { health_service: app.health_service });

        let api_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let api_addr = api_listener.local_addr().unwrap();
        let mgmt_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mgmt_addr = mgmt_listener.local_addr().unwrap();

        let mut api_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            axum::serve(api_listener, api)
                .with_graceful_shutdown(async move {
                    let _ = api_rx.wait_for(|&s| s).await;
                })
                .await
                .unwrap();
        });

        let mut mgmt_rx = shutdown_rx;
        tokio::spawn(async move {
            axum::serve(mgmt_listener, mgmt)
                .with_graceful_shutdown(async move {
                    let _ = mgmt_rx.wait_for(|&s| s).await;
                })
                .await
                .unwrap();
        });

        Self {
            ws_url: format!("ws://{api_addr}/v1/gateway"),
            mgmt_url: format!("http://{mgmt_addr}"),
            client: reqwest::Client::new(),
            config,
            store,
            presence,
            sessions,
            shutdown_tx,
        }
    }

    pub async fn create_user(&self, first_name: &str) -> User {
        self.store
            .insert_user(NewUser {
                first_name: first_name.to_string(),
                last_name: "Tester".to_string(),
                email: format!("{first_name}-{}@example.com", Uuid::new_v4()),
            })
            .await
    }

    /// Connects as `user_id` and waits until the connection owns the user's presence.
    pub async fn connect(&self, user_id: Uuid) -> TestClient {
        let before = self.presence.lookup(user_id).map(|h| h.connection_id());
        let (ws, _) = connect_async(format!("{}?user_id={user_id}", self.ws_url)).await.unwrap();

        let start = std::time::Instant::now();
        loop {
            let current = self.presence.lookup(user_id).map(|h| h.connection_id());
            if current.is_some() && current != before {
                break;
            }
            assert!(start.elapsed() < EVENT_TIMEOUT, "connection for {user_id} was never registered");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        TestClient::from_stream(ws)
    }

    pub async fn connect_anonymous(&self) -> TestClient {
        let (ws, _) = connect_async(self.ws_url.as_str()).await.unwrap();
        TestClient::from_stream(ws)
    }

    pub async fn wait_until_offline(&self, user_id: Uuid) {
        let start = std::time::Instant::now();
        while self.presence.is_online(user_id) {
            assert!(start.elapsed() < EVENT_TIMEOUT, "{user_id} never went offline");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

pub struct TestClient {
    pub ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    next_ack: u64,
}

impl TestClient {
    pub const fn from_stream(ws: WebSocketStream<MaybeTlsStream<TcpStream>>) -> Self {
        Self { ws, next_ack: 1 }
    }

    /// Sends a fire-and-forget event.
    pub async fn emit(&mut self, event: &str, data: Value) {
        let frame = json!({ "event": event, "data": data });
        self.ws.send(Message::Text(frame.to_string().into())).await.unwrap();
    }

    /// Sends a callback event and waits for the matching ack frame.
    pub async fn call(&mut self, event: &str, data: Value) -> Value {
        let ack = self.next_ack;
        self.next_ack += 1;

        let frame = json!({ "event": event, "data": data, "ack": ack });
        self.ws.send(Message::Text(frame.to_string().into())).await.unwrap();

        let start = std::time::Instant::now();
        loop {
            let remaining = EVENT_TIMEOUT.saturating_sub(start.elapsed());
            let value = self.receive_json_timeout(remaining).await.unwrap_or_else(|| panic!("no ack for {event}"));
            if value["ack"] == ack {
                return value;
            }
        }
    }

    pub async fn receive_raw_timeout(
        &mut self,
        timeout: Duration,
    ) -> Option<Result<Message, tokio_tungstenite::tungstenite::Error>> {
        tokio::time::timeout(timeout, self.ws.next()).await.ok().flatten()
    }

    /// Next JSON text frame, skipping control frames. `None` on timeout or close.
    pub async fn receive_json_timeout(&mut self, timeout: Duration) -> Option<Value> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            match self.receive_raw_timeout(remaining).await? {
                Ok(Message::Text(text)) => return Some(serde_json::from_str(text.as_str()).unwrap()),
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
                Ok(Message::Binary(_)) => panic!("unexpected binary frame"),
                Ok(Message::Close(_)) | Err(_) => return None,
            }
        }
    }

    /// Waits for an event by name and returns its `data`, skipping other events.
    pub async fn receive_event(&mut self, name: &str) -> Value {
        let start = std::time::Instant::now();
        loop {
            let remaining = EVENT_TIMEOUT.saturating_sub(start.elapsed());
            let value =
                self.receive_json_timeout(remaining).await.unwrap_or_else(|| panic!("timed out waiting for {name}"));
            if value["event"] == name {
                return value["data"].clone();
            }
        }
    }

    /// Asserts that no event named `name` arrives within `window`.
    pub async fn expect_no_event(&mut self, name: &str, window: Duration) {
        let deadline = tokio::time::Instant::now() + window;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            match self.receive_json_timeout(remaining).await {
                Some(value) => assert_ne!(value["event"], name, "unexpected {name}: {value}"),
                None => return,
            }
        }
    }
}
