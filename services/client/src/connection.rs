//! The websocket connection to the robot backend.
//!
//! The socket is owned by a dedicated task. The session talks to it through
//! [`ChannelTransport`], which only queues frames, and learns about the
//! socket through [`ChannelEvent`]s.

use futures_util::{SinkExt, StreamExt};
use robot_teaching_core::protocol::InboundFrame;
use robot_teaching_core::{Transport, TransportError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message as WsMessage};
use tracing::{debug, error, info, instrument, warn};

/// What the connection task reports back.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Open,
    Frame(InboundFrame),
    Error(String),
    Closed,
}

#[derive(Debug)]
enum Outbound {
    Text(String),
    Close,
}

/// Queues outbound frames for the connection task.
#[derive(Debug)]
pub struct ChannelTransport {
    tx: Option<mpsc::UnboundedSender<Outbound>>,
}

impl Transport for ChannelTransport {
    fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::Closed)?;
        tx.send(Outbound::Text(text))
            .map_err(|_| TransportError::Closed)
    }

    fn close(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Outbound::Close);
        }
    }
}

/// Spawns the connection task for `url`. Events arrive on `events`; the
/// returned transport feeds the socket.
pub fn connect(
    url: String,
    events: mpsc::UnboundedSender<ChannelEvent>,
) -> (ChannelTransport, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(run_connection(url, rx, events));
    (ChannelTransport { tx: Some(tx) }, handle)
}

#[instrument(name = "channel", skip_all, fields(url = %url))]
async fn run_connection(
    url: String,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::UnboundedSender<ChannelEvent>,
) {
    let ws_stream = match connect_async(url.as_str()).await {
        Ok((ws_stream, _)) => ws_stream,
        Err(e) => {
            error!(error = %e, "Failed to connect to robot backend.");
            let _ = events.send(ChannelEvent::Error(e.to_string()));
            let _ = events.send(ChannelEvent::Closed);
            return;
        }
    };
    info!("Connected to robot backend.");
    let _ = events.send(ChannelEvent::Open);
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    loop {
        tokio::select! {
            msg = outbound.recv() => match msg {
                Some(Outbound::Text(text)) => {
                    debug!(len = text.len(), "Sending text frame");
                    if let Err(e) = ws_tx.send(WsMessage::Text(text.into())).await {
                        error!(error = %e, "Failed to send frame.");
                        let _ = events.send(ChannelEvent::Error(e.to_string()));
                        break;
                    }
                }
                Some(Outbound::Close) | None => {
                    info!("Closing channel.");
                    let _ = ws_tx.send(WsMessage::Close(None)).await;
                    break;
                }
            },
            incoming = ws_rx.next() => match incoming {
                Some(Ok(WsMessage::Text(text))) => {
                    let frame = InboundFrame::Text(text.as_str().to_string());
                    let _ = events.send(ChannelEvent::Frame(frame));
                }
                Some(Ok(WsMessage::Binary(data))) => {
                    let _ = events.send(ChannelEvent::Frame(InboundFrame::Binary(data)));
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    info!(?frame, "Robot backend closed the channel.");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "Channel error.");
                    let _ = events.send(ChannelEvent::Error(e.to_string()));
                    break;
                }
                None => break,
            },
        }
    }

    let _ = events.send(ChannelEvent::Closed);
}
