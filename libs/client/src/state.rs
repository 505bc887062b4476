//! Connection status and the snapshot published to status observers.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
    Failed,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Error => "error",
            ConnectionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of the connection for status indicators.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSnapshot {
    pub status: ConnectionStatus,
    pub reconnect_attempts: u32,
    pub last_error: Option<String>,
    /// When `status` last changed.
    pub since: Instant,
}

impl ConnectionSnapshot {
    pub fn initial() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            reconnect_attempts: 0,
            last_error: None,
            since: Instant::now(),
        }
    }

    /// Text for the persistent connection banner, if one should be shown.
    ///
    /// `connecting` only shows once it has lasted longer than `grace`.
    pub fn banner(&self, grace: Duration) -> Option<String> {
        match self.status {
            ConnectionStatus::Failed => Some(format!(
                "Connection lost after {} attempts. Reconnect to try again.",
                self.reconnect_attempts
            )),
            ConnectionStatus::Error => Some(match &self.last_error {
                Some(err) => format!(
                    "Connection problem ({err}). Retrying, attempt {}.",
                    self.reconnect_attempts
                ),
                None => format!("Connection problem. Retrying, attempt {}.", self.reconnect_attempts),
            }),
            ConnectionStatus::Connecting if self.since.elapsed() > grace => Some(format!(
                "Connecting, attempt {}...",
                self.reconnect_attempts.max(1)
            )),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(status: ConnectionStatus) -> ConnectionSnapshot {
        ConnectionSnapshot {
            status,
            reconnect_attempts: 3,
            last_error: Some("transport error: refused".into()),
            since: Instant::now(),
        }
    }

    #[test]
    fn no_banner_when_healthy() {
        assert!(snapshot(ConnectionStatus::Connected).banner(Duration::ZERO).is_none());
        assert!(snapshot(ConnectionStatus::Disconnected).banner(Duration::ZERO).is_none());
    }

    #[test]
    fn error_and_failed_show_attempts() {
        let error = snapshot(ConnectionStatus::Error).banner(Duration::ZERO).unwrap();
        assert!(error.contains("attempt 3"));
        let failed = snapshot(ConnectionStatus::Failed).banner(Duration::ZERO).unwrap();
        assert!(failed.contains("3 attempts"));
    }

    #[test]
    fn connecting_respects_grace_period() {
        let s = snapshot(ConnectionStatus::Connecting);
        assert!(s.banner(Duration::from_secs(60)).is_none());
        let stale = ConnectionSnapshot {
            since: Instant::now() - Duration::from_secs(10),
            ..s
        };
        assert!(stale.banner(Duration::from_secs(3)).is_some());
    }
}
