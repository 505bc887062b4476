//! Physical transport seam.
//!
//! The connection manager only sees a [`Link`]: an outbound envelope sender
//! and an inbound event receiver. [`WsConnector`] provides one over a
//! WebSocket; tests plug in their own [`Connector`].

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, protocol::Message};

use parlay_common::Envelope;

use crate::error::{ClientError, Result};

/// Something that happened on an open link.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    Frame(Envelope),
    Closed {
        reason: String,
        server_initiated: bool,
    },
}

/// One open physical connection.
///
/// Dropping `outbound` closes the connection.
pub struct Link {
    pub outbound: mpsc::UnboundedSender<Envelope>,
    pub inbound: mpsc::UnboundedReceiver<LinkEvent>,
}

#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a new link, presenting `token` in the handshake.
    async fn open(&self, token: &str) -> Result<Link>;
}

/// WebSocket connector. The token travels as the `token` query parameter.
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    fn handshake_url(&self, token: &str) -> String {
        let sep = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{}token={}", self.url, sep, token)
    }
}

fn map_handshake_error(err: tungstenite::Error) -> ClientError {
    match err {
        tungstenite::Error::Http(response) => {
            let status = response.status();
            if matches!(status.as_u16(), 401 | 403) {
                ClientError::Auth(format!("handshake rejected with {status}"))
            } else {
                ClientError::Transport(format!("handshake failed with {status}"))
            }
        }
        other => ClientError::Transport(other.to_string()),
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, token: &str) -> Result<Link> {
        let url = self.handshake_url(token);
        let (ws, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(map_handshake_error)?;

        let (mut sink, mut stream) = ws.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Envelope>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<LinkEvent>();

        tokio::spawn(async move {
            while let Some(envelope) = out_rx.recv().await {
                if sink.send(Message::Text(envelope.to_text().into())).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(Message::Text(text)) => match Envelope::parse(&text) {
                        Ok(envelope) => {
                            if in_tx.send(LinkEvent::Frame(envelope)).is_err() {
                                return;
                            }
                        }
                        Err(e) => tracing::debug!(?e, "dropping malformed frame"),
                    },
                    Ok(Message::Close(frame)) => {
                        let reason = frame
                            .map(|f| f.reason.to_string())
                            .filter(|r| !r.is_empty())
                            .unwrap_or_else(|| "server closed connection".to_string());
                        let _ = in_tx.send(LinkEvent::Closed {
                            reason,
                            server_initiated: true,
                        });
                        return;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        let _ = in_tx.send(LinkEvent::Closed {
                            reason: e.to_string(),
                            server_initiated: false,
                        });
                        return;
                    }
                }
            }
            let _ = in_tx.send(LinkEvent::Closed {
                reason: "stream ended".to_string(),
                server_initiated: false,
            });
        });

        Ok(Link {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}
