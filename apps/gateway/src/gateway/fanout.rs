//! Broadcast hub for dispatching events to connected sessions.
//!
//! Uses a single `tokio::sync::broadcast` channel. Each connected session
//! subscribes and filters events locally by [`Target`].

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

use parlay_common::Envelope;

use super::rooms::user_room;
use super::session::GatewaySession;

/// Capacity of the broadcast channel. Slow receivers that fall behind will
/// skip messages (RecvError::Lagged).
const BROADCAST_CAPACITY: usize = 4096;

/// Who an event is for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Every connected session.
    All,
    /// Sessions in `room`, optionally skipping the originating connection.
    Room {
        room: String,
        except: Option<String>,
    },
}

impl Target {
    pub fn room(room: impl Into<String>) -> Self {
        Target::Room {
            room: room.into(),
            except: None,
        }
    }

    pub fn room_except(room: impl Into<String>, conn_id: &str) -> Self {
        Target::Room {
            room: room.into(),
            except: Some(conn_id.to_string()),
        }
    }

    /// Every device of one user that subscribed to notifications.
    pub fn user(user_id: &str) -> Self {
        Target::room(user_room(user_id))
    }

    pub fn includes(&self, session: &GatewaySession) -> bool {
        match self {
            Target::All => true,
            Target::Room { room, except } => {
                except.as_deref() != Some(session.conn_id.as_str()) && session.in_room(room)
            }
        }
    }
}

/// A payload broadcast to all connected gateway sessions.
#[derive(Debug, Clone)]
pub struct BroadcastPayload {
    pub target: Target,
    pub event: Envelope,
}

/// The global broadcast hub, shared through AppState.
#[derive(Clone)]
pub struct GatewayBroadcast {
    sender: broadcast::Sender<Arc<BroadcastPayload>>,
}

impl Default for GatewayBroadcast {
    fn default() -> Self {
        Self::new()
    }
}

impl GatewayBroadcast {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self { sender }
    }

    /// Subscribe to the broadcast channel. Each gateway session should call
    /// this once to get its own receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<BroadcastPayload>> {
        self.sender.subscribe()
    }

    pub fn publish(&self, target: Target, event: &str, data: Value) {
        // send() returns Err if there are no receivers; that's fine.
        let _ = self.sender.send(Arc::new(BroadcastPayload {
            target,
            event: Envelope::new(event, data),
        }));
    }

    pub fn publish_payload<T: Serialize>(&self, target: Target, event: &str, payload: &T) {
        match serde_json::to_value(payload) {
            Ok(data) => self.publish(target, event, data),
            Err(e) => tracing::error!(?e, event, "failed to encode broadcast payload"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_target_skips_sender_and_outsiders() {
        let sender = GatewaySession::new("cn_a".into(), "u1".into(), "ana".into());
        let member = GatewaySession::new("cn_b".into(), "u2".into(), "ben".into());
        let outsider = GatewaySession::new("cn_c".into(), "u3".into(), "cy".into());
        sender.join("chat:c1");
        member.join("chat:c1");

        let target = Target::room_except("chat:c1", "cn_a");
        assert!(!target.includes(&sender));
        assert!(target.includes(&member));
        assert!(!target.includes(&outsider));
        assert!(Target::All.includes(&outsider));
    }

    #[test]
    fn user_target_reaches_subscribed_devices() {
        let phone = GatewaySession::new("cn_p".into(), "u1".into(), "ana".into());
        let laptop = GatewaySession::new("cn_l".into(), "u1".into(), "ana".into());
        phone.join(&user_room("u1"));

        let target = Target::user("u1");
        assert!(target.includes(&phone));
        assert!(!target.includes(&laptop));
    }
}
