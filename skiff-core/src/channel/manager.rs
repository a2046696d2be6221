//! Realtime channel lifecycle
//!
//! A [`ChannelManager`] owns exactly one WebSocket connection to the backend
//! chat endpoint. The connection lives in a spawned task; the handle talks to
//! it through channels only:
//!
//! - status transitions are published on a `watch` channel
//!   (`Connecting → Connected | Failed`, `Connected → Disconnected`)
//! - outbound frames go through an `mpsc` queue and are only accepted while
//!   the channel is `Connected`
//! - inbound frames arrive on an `mpsc` queue in transport order, with no
//!   reordering or deduplication; reconciliation belongs to the dispatcher
//!
//! Dropping the handle requests closure of the socket, so a channel never
//! outlives its owner. One handle exists per conversation endpoint at a
//! time: opening a new one for the same endpoint replaces (and thereby
//! closes) the previous handle.

use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

use crate::error::{Error, Result};
use crate::types::ChannelStatus;

use super::frames::{parse_frame, ClientFrame};
use super::ServerFrame;

/// Commands the handle sends to the channel task.
enum Outbound {
    Frame(ClientFrame),
    Close,
}

/// Handle to one live realtime channel instance.
pub struct ChannelManager {
    endpoint: String,
    status_rx: watch::Receiver<ChannelStatus>,
    outbound_tx: mpsc::UnboundedSender<Outbound>,
    inbound_rx: mpsc::UnboundedReceiver<ServerFrame>,
}

impl ChannelManager {
    /// Open the channel for one session: `<ws-base>/chat/ws/<session_id>`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(ws_base: &str, session_id: &str) -> Self {
        let endpoint = format!(
            "{}/chat/ws/{}",
            ws_base.trim_end_matches('/'),
            urlencoding::encode(session_id)
        );
        Self::connect(endpoint)
    }

    /// Connect to an explicit WebSocket endpoint.
    pub fn connect(endpoint: String) -> Self {
        let (status_tx, status_rx) = watch::channel(ChannelStatus::Connecting);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        tokio::spawn(run_channel(
            endpoint.clone(),
            status_tx,
            outbound_rx,
            inbound_tx,
        ));

        Self {
            endpoint,
            status_rx,
            outbound_tx,
            inbound_rx,
        }
    }

    /// The endpoint this channel is bound to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Current channel status.
    pub fn status(&self) -> ChannelStatus {
        *self.status_rx.borrow()
    }

    /// Subscribe to status transitions.
    pub fn status_watch(&self) -> watch::Receiver<ChannelStatus> {
        self.status_rx.clone()
    }

    /// Wait until the channel leaves `Connecting` and return the outcome.
    pub async fn wait_ready(&self) -> ChannelStatus {
        let mut rx = self.status_rx.clone();
        loop {
            let status = *rx.borrow();
            if status != ChannelStatus::Connecting {
                return status;
            }
            if rx.changed().await.is_err() {
                return *rx.borrow();
            }
        }
    }

    /// Queue a frame for delivery.
    ///
    /// Refused with [`Error::TransportUnavailable`] unless the channel is
    /// `Connected`; callers take the fallback channel instead.
    pub fn send(&self, frame: ClientFrame) -> Result<()> {
        if self.status() != ChannelStatus::Connected {
            return Err(Error::TransportUnavailable);
        }
        self.outbound_tx
            .send(Outbound::Frame(frame))
            .map_err(|_| Error::TransportUnavailable)
    }

    /// Next inbound frame, if one is queued.
    pub fn try_recv(&mut self) -> Option<ServerFrame> {
        self.inbound_rx.try_recv().ok()
    }

    /// Wait for the next inbound frame; `None` once the channel is gone.
    pub async fn recv(&mut self) -> Option<ServerFrame> {
        self.inbound_rx.recv().await
    }

    /// Request closure of the underlying socket.
    pub fn close(&self) {
        let _ = self.outbound_tx.send(Outbound::Close);
    }
}

impl Drop for ChannelManager {
    fn drop(&mut self) {
        self.close();
    }
}

/// The channel task: connect, then relay until either side closes.
async fn run_channel(
    endpoint: String,
    status_tx: watch::Sender<ChannelStatus>,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    inbound_tx: mpsc::UnboundedSender<ServerFrame>,
) {
    let ws = match connect_async(&endpoint).await {
        Ok((ws, _)) => ws,
        Err(e) => {
            tracing::warn!(endpoint = %endpoint, error = %e, "Realtime channel connect failed");
            status_tx.send_replace(ChannelStatus::Failed);
            return;
        }
    };

    tracing::info!(endpoint = %endpoint, "Realtime channel connected");
    status_tx.send_replace(ChannelStatus::Connected);

    let (mut ws_tx, mut ws_rx) = ws.split();

    loop {
        tokio::select! {
            out = outbound_rx.recv() => match out {
                Some(Outbound::Frame(frame)) => {
                    let json = match serde_json::to_string(&frame) {
                        Ok(json) => json,
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to serialize outbound frame");
                            continue;
                        }
                    };
                    if let Err(e) = ws_tx.send(WsMessage::Text(json.into())).await {
                        tracing::warn!(endpoint = %endpoint, error = %e, "Send on realtime channel failed");
                        status_tx.send_replace(ChannelStatus::Disconnected);
                        break;
                    }
                }
                // Handle dropped or explicit close: request socket closure.
                Some(Outbound::Close) | None => {
                    let _ = ws_tx.send(WsMessage::Close(None)).await;
                    status_tx.send_replace(ChannelStatus::Disconnected);
                    tracing::info!(endpoint = %endpoint, "Realtime channel closed by owner");
                    break;
                }
            },
            msg = ws_rx.next() => match msg {
                Some(Ok(WsMessage::Text(text))) => match parse_frame(text.as_str()) {
                    Ok(frame) => {
                        if inbound_tx.send(frame).is_err() {
                            break;
                        }
                    }
                    // Malformed payloads are logged and dropped, never surfaced.
                    Err(e) => tracing::warn!(endpoint = %endpoint, error = %e, "Dropping malformed frame"),
                },
                Some(Ok(WsMessage::Close(_))) | None => {
                    tracing::info!(endpoint = %endpoint, "Realtime channel closed by peer");
                    status_tx.send_replace(ChannelStatus::Disconnected);
                    break;
                }
                Some(Ok(_)) => {
                    // Ping/pong handled by the protocol layer; binary ignored.
                }
                Some(Err(e)) => {
                    tracing::warn!(endpoint = %endpoint, error = %e, "Realtime channel transport error");
                    status_tx.send_replace(ChannelStatus::Disconnected);
                    break;
                }
            },
        }
    }
}
