//! WebSocket upgrade handler and per-connection event loop.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::{HeaderMap, Uri};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tokio::time::{self, Instant};

use parlay_common::events::{ErrorPayload, UserStatusChange};
use parlay_common::id::{prefix, prefixed_ulid};
use parlay_common::{Envelope, EventName};

use super::fanout::{BroadcastPayload, Target};
use super::handler::handle_event;
use super::session::GatewaySession;
use crate::auth::middleware::handshake_token;
use crate::auth::tokens;
use crate::error::ApiError;
use crate::AppState;

/// Close codes (4000-range for application-level).
const CLOSE_INVALID_FRAME: u16 = 4000;
const CLOSE_SESSION_TIMEOUT: u16 = 4009;

type WsSink = SplitSink<WebSocket, Message>;

pub fn router() -> Router<AppState> {
    Router::new().route("/socket", get(ws_upgrade))
}

/// Authenticate before upgrading: a missing or bad token never gets a socket.
async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let token = handshake_token(&uri, &headers)
        .ok_or_else(|| ApiError::unauthorized("Authentication error"))?;
    let claims = tokens::verify(&state.config.jwt_secret, &token)?;

    let session = GatewaySession::new(
        prefixed_ulid(prefix::CONNECTION),
        claims.sub,
        claims.username,
    );
    Ok(ws.on_upgrade(move |socket| handle_connection(socket, state, session)))
}

async fn handle_connection(socket: WebSocket, state: AppState, session: GatewaySession) {
    let session = Arc::new(session);
    // Subscribe before announcing so this socket sees its own presence event.
    let broadcast_rx = state.broadcast.subscribe();

    // Directory first, so delivery decisions made elsewhere see this user.
    if let Some(replaced) = state.directory.register(&session.user_id, &session.conn_id) {
        tracing::debug!(user_id = %session.user_id, %replaced, "superseded older connection");
    }
    publish_presence(&state, &session, true);

    tracing::info!(
        conn_id = %session.conn_id,
        user_id = %session.user_id,
        "socket connected"
    );

    run_session(&state, session.clone(), socket, broadcast_rx).await;

    let went_offline = state.directory.unregister(&session.user_id, &session.conn_id);
    for room in session.take_rooms() {
        state.rooms.leave(&room, &session.conn_id);
    }
    if went_offline {
        publish_presence(&state, &session, false);
    }

    tracing::info!(
        conn_id = %session.conn_id,
        user_id = %session.user_id,
        went_offline,
        "socket disconnected"
    );
}

fn publish_presence(state: &AppState, session: &GatewaySession, is_online: bool) {
    state.broadcast.publish_payload(
        Target::All,
        EventName::USER_STATUS_CHANGE,
        &UserStatusChange {
            user_id: session.user_id.clone(),
            username: session.username.clone(),
            is_online,
        },
    );
}

/// Main session event loop: read client events, forward broadcasts, enforce liveness.
async fn run_session(
    state: &AppState,
    session: Arc<GatewaySession>,
    socket: WebSocket,
    mut broadcast_rx: broadcast::Receiver<Arc<BroadcastPayload>>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Any inbound frame counts as activity. Checked a few times per timeout
    // so a silent socket is closed within a quarter window of going quiet.
    let heartbeat_timeout = state.config.heartbeat_timeout;
    let mut liveness = time::interval(liveness_check_interval(heartbeat_timeout));
    liveness.tick().await; // First tick fires immediately; skip it.
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        last_seen = Instant::now();
                        let replies = match Envelope::parse(&text) {
                            Ok(envelope) => handle_event(state, &session, envelope).await,
                            Err(e) => {
                                tracing::debug!(conn_id = %session.conn_id, error = %e, "unparseable frame");
                                vec![Envelope::with_payload(
                                    EventName::ERROR,
                                    &ErrorPayload { message: "invalid event frame".to_string() },
                                )]
                            }
                        };
                        if send_all(&mut ws_tx, &replies).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        let _ = send_close(&mut ws_tx, CLOSE_INVALID_FRAME, "Binary frames are not supported").await;
                        break;
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => last_seen = Instant::now(),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(?e, conn_id = %session.conn_id, "ws read error");
                        break;
                    }
                }
            }

            result = broadcast_rx.recv() => {
                match result {
                    Ok(payload) => {
                        if !payload.target.includes(&session) {
                            continue;
                        }
                        if ws_tx.send(Message::Text(payload.event.to_text().into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(
                            conn_id = %session.conn_id,
                            skipped = n,
                            "socket lagged behind broadcast"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            _ = liveness.tick() => {
                if last_seen.elapsed() >= heartbeat_timeout {
                    tracing::debug!(
                        conn_id = %session.conn_id,
                        silent_ms = last_seen.elapsed().as_millis() as u64,
                        "heartbeat timeout, closing socket"
                    );
                    let _ = send_close(&mut ws_tx, CLOSE_SESSION_TIMEOUT, "Heartbeat timeout").await;
                    break;
                }
            }
        }
    }
}

fn liveness_check_interval(heartbeat_timeout: Duration) -> Duration {
    (heartbeat_timeout / 4).max(Duration::from_millis(1))
}

async fn send_all(ws_tx: &mut WsSink, replies: &[Envelope]) -> Result<(), axum::Error> {
    for reply in replies {
        ws_tx.send(Message::Text(reply.to_text().into())).await?;
    }
    Ok(())
}

/// Send a WebSocket close frame with a code and reason.
async fn send_close(ws_tx: &mut WsSink, code: u16, reason: &str) -> Result<(), axum::Error> {
    let close_msg = Message::Close(Some(axum::extract::ws::CloseFrame {
        code,
        reason: reason.to_string().into(),
    }));
    ws_tx.send(close_msg).await
}
