#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::time;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use parlay_common::Envelope;
use parlay_gateway::auth::tokens;
use parlay_gateway::config::Config;
use parlay_gateway::store::memory::MemoryStore;
use parlay_gateway::AppState;

pub const TEST_SECRET: &str = "parlay-test-secret";

/// How long a test waits for an expected frame.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

pub fn test_config() -> Config {
    Config::new(TEST_SECRET)
}

pub fn test_state() -> (AppState, Arc<MemoryStore>) {
    AppState::in_memory(test_config())
}

pub fn mint_token(user_id: &str, username: &str) -> String {
    tokens::issue(TEST_SECRET, user_id, username, chrono::Duration::hours(1))
        .expect("issue test token")
}

/// Start the full app on an ephemeral port. The server runs in the background.
pub async fn start_server(state: AppState) -> SocketAddr {
    let app = parlay_gateway::app(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    addr
}

pub fn socket_url(addr: SocketAddr, token: &str) -> String {
    format!("ws://{addr}/socket?token={token}")
}

/// A raw test client speaking the envelope protocol.
pub struct TestSocket {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl TestSocket {
    pub async fn connect(addr: SocketAddr, user_id: &str, username: &str) -> Self {
        let token = mint_token(user_id, username);
        let (ws, _) = tokio_tungstenite::connect_async(socket_url(addr, &token))
            .await
            .expect("ws connect");
        let mut socket = Self { ws };
        // The server handles frames in order, so a pong means the connection
        // is registered and announced.
        socket.sync().await;
        socket
    }

    pub async fn send(&mut self, event: &str, data: Value) {
        self.ws
            .send(tungstenite::Message::Text(
                Envelope::new(event, data).to_text().into(),
            ))
            .await
            .expect("ws send");
    }

    /// Next envelope, skipping control frames.
    pub async fn recv(&mut self) -> Envelope {
        loop {
            let msg = time::timeout(RECV_TIMEOUT, self.ws.next())
                .await
                .expect("timeout waiting for frame")
                .expect("stream ended")
                .expect("ws read error");
            match msg {
                tungstenite::Message::Text(text) => {
                    return Envelope::parse(&text).expect("parse envelope")
                }
                tungstenite::Message::Close(frame) => panic!("socket closed: {frame:?}"),
                _ => continue,
            }
        }
    }

    /// Skip frames until `event` arrives and return its data.
    pub async fn recv_event(&mut self, event: &str) -> Value {
        loop {
            let envelope = self.recv().await;
            if envelope.event == event {
                return envelope.data;
            }
        }
    }

    /// Round-trip a ping. Everything the server produced for earlier frames
    /// from this socket is queued before the pong; returns those frames.
    pub async fn sync(&mut self) -> Vec<Envelope> {
        self.send("ping", Value::Null).await;
        let mut seen = Vec::new();
        loop {
            let envelope = self.recv().await;
            if envelope.event == "pong" {
                return seen;
            }
            seen.push(envelope);
        }
    }

    /// Assert no `event` frame arrives before a sync round trip completes.
    pub async fn assert_no(&mut self, event: &str) {
        let seen = self.sync().await;
        assert!(
            seen.iter().all(|e| e.event != event),
            "unexpected {event}: {seen:?}"
        );
    }

    /// Wait for the server to close the socket; returns the close code.
    pub async fn closed_with(&mut self, within: Duration) -> Option<u16> {
        let deadline = time::Instant::now() + within;
        loop {
            let next = time::timeout_at(deadline, self.ws.next())
                .await
                .expect("socket was not closed in time");
            match next {
                Some(Ok(tungstenite::Message::Close(frame))) => {
                    return frame.map(|f| u16::from(f.code))
                }
                Some(Ok(_)) => continue,
                Some(Err(_)) | None => return None,
            }
        }
    }

    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}
