//! Process-wide connection lifecycle events for the UI layer.
//!
//! Two channels: a broadcast of discrete lifecycle transitions and a watch
//! of the latest [`ConnectionSnapshot`] for status indicators.

use tokio::sync::{broadcast, watch};

use crate::state::ConnectionSnapshot;

const LIFECYCLE_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// `socket_connected`: first successful connection of this session.
    Connected,
    /// `socket_disconnected`: an established link went away.
    Disconnected { reason: String },
    /// `socket_reconnected`: a link was re-established after a drop.
    Reconnected,
    /// `socket_connection_failed`: automatic recovery stopped.
    ConnectionFailed { attempts: u32, reason: String },
}

impl LifecycleEvent {
    /// The event name the UI layer listens for.
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::Connected => "socket_connected",
            LifecycleEvent::Disconnected { .. } => "socket_disconnected",
            LifecycleEvent::Reconnected => "socket_reconnected",
            LifecycleEvent::ConnectionFailed { .. } => "socket_connection_failed",
        }
    }
}

pub(crate) struct Observer {
    lifecycle: broadcast::Sender<LifecycleEvent>,
    snapshot: watch::Sender<ConnectionSnapshot>,
}

impl Observer {
    pub(crate) fn new() -> Self {
        let (lifecycle, _) = broadcast::channel(LIFECYCLE_CAPACITY);
        let (snapshot, _) = watch::channel(ConnectionSnapshot::initial());
        Self { lifecycle, snapshot }
    }

    pub(crate) fn emit(&self, event: LifecycleEvent) {
        tracing::debug!(event = event.name(), "lifecycle event");
        // No receivers is fine.
        let _ = self.lifecycle.send(event);
    }

    pub(crate) fn publish(&self, snapshot: ConnectionSnapshot) {
        self.snapshot.send_replace(snapshot);
    }

    pub(crate) fn lifecycle(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.lifecycle.subscribe()
    }

    pub(crate) fn status(&self) -> watch::Receiver<ConnectionSnapshot> {
        self.snapshot.subscribe()
    }
}
