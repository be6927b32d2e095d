//! Common test utilities for integration tests.
//!
//! Starts a full server (store, ChatServer actor, realtime listener and
//! HTTP API) on ephemeral ports, plus a small WebSocket test client.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use room_chat_server::{api, handler, AppState, ChatServer, ChatStore, SqliteStore};

/// Default timeout for test operations.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Initialize test logging with appropriate filters.
///
/// Safe to call multiple times (subsequent calls are no-ops).
#[allow(dead_code)]
pub fn init_test_logging() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("room_chat_server=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// A running server with its endpoints
#[allow(dead_code)]
pub struct TestServer {
    pub ws_url: String,
    pub http_url: String,
    pub store: Arc<dyn ChatStore>,
}

#[allow(dead_code)]
impl TestServer {
    pub async fn start() -> Self {
        init_test_logging();

        let store: Arc<dyn ChatStore> = Arc::new(SqliteStore::in_memory().await.unwrap());

        let (cmd_tx, cmd_rx) = mpsc::channel(256);
        tokio::spawn(ChatServer::new(cmd_rx).with_typing_timeout(None).run());

        let ws_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let ws_addr = ws_listener.local_addr().unwrap();
        tokio::spawn(handler::serve(ws_listener, cmd_tx, store.clone()));

        let http_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let http_addr = http_listener.local_addr().unwrap();
        let app = api::router(AppState::new(store.clone()));
        tokio::spawn(async move {
            axum::serve(http_listener, app).await.unwrap();
        });

        Self {
            ws_url: format!("ws://{}", ws_addr),
            http_url: format!("http://{}", http_addr),
            store,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.http_url, path)
    }

    pub async fn client(&self) -> TestClient {
        TestClient::connect(&self.ws_url).await
    }
}

/// WebSocket client speaking the event protocol
#[allow(dead_code)]
pub struct TestClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[allow(dead_code)]
impl TestClient {
    pub async fn connect(url: &str) -> Self {
        let (ws, _) = connect_async(url).await.expect("WebSocket connect failed");
        Self { ws }
    }

    pub async fn emit(&mut self, event: &str, data: Value) {
        let frame = json!({ "event": event, "data": data }).to_string();
        self.ws.send(Message::Text(frame.into())).await.unwrap();
    }

    pub async fn emit_bare(&mut self, event: &str) {
        let frame = json!({ "event": event }).to_string();
        self.ws.send(Message::Text(frame.into())).await.unwrap();
    }

    /// Join and consume the history and first member list
    pub async fn join(&mut self, username: &str, room: &str) -> Value {
        self.emit("join", json!({ "username": username, "room": room })).await;
        let history = self.expect("history").await;
        self.expect("user-list-update").await;
        history
    }

    /// Next event frame as (event, data)
    pub async fn recv(&mut self) -> (String, Value) {
        loop {
            let frame = tokio::time::timeout(TEST_TIMEOUT, self.ws.next())
                .await
                .expect("Test operation timed out")
                .expect("connection closed")
                .expect("WebSocket error");

            if let Message::Text(text) = frame {
                let mut value: Value = serde_json::from_str(&text).unwrap();
                let event = value["event"].as_str().unwrap().to_string();
                return (event, value["data"].take());
            }
        }
    }

    /// Skip events until `event` arrives and return its data
    pub async fn expect(&mut self, event: &str) -> Value {
        loop {
            let (name, data) = self.recv().await;
            if name == event {
                return data;
            }
        }
    }

    /// Assert nothing arrives for a short while
    pub async fn expect_silence(&mut self) {
        let result = tokio::time::timeout(Duration::from_millis(200), self.ws.next()).await;
        assert!(result.is_err(), "unexpected frame: {:?}", result);
    }

    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}
