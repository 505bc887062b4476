use std::fmt;

/// Errors surfaced by the client socket service.
///
/// Cloneable so every caller coalesced onto one connection attempt observes
/// the same outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// No credential is available; nothing was attempted.
    MissingToken,
    /// The gateway rejected the handshake credential.
    Auth(String),
    /// Network-level failure while connecting or on an established link.
    Transport(String),
    /// The connection attempt did not complete in time.
    Timeout,
    /// No heartbeat acknowledgment arrived within the timeout window.
    Stale,
    /// Automatic reconnection gave up; only a manual reconnect resumes.
    ConnectionFailed { attempts: u32 },
    /// The manager was torn down while the operation was pending.
    Closed,
    /// The peer sent something that does not fit the wire contract.
    Protocol(String),
}

impl ClientError {
    /// Whether the backoff/retry machinery should handle this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ClientError::Transport(_) | ClientError::Timeout | ClientError::Stale
        )
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::MissingToken => write!(f, "no auth token available"),
            ClientError::Auth(reason) => write!(f, "authentication rejected: {reason}"),
            ClientError::Transport(reason) => write!(f, "transport error: {reason}"),
            ClientError::Timeout => write!(f, "connection attempt timed out"),
            ClientError::Stale => write!(f, "heartbeat timeout, connection is stale"),
            ClientError::ConnectionFailed { attempts } => {
                write!(f, "connection failed after {attempts} reconnect attempts")
            }
            ClientError::Closed => write!(f, "connection manager closed"),
            ClientError::Protocol(reason) => write!(f, "protocol error: {reason}"),
        }
    }
}

impl std::error::Error for ClientError {}

pub type Result<T> = std::result::Result<T, ClientError>;
