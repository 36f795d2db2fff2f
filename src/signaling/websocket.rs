//! WebSocket implementation of the signaling transport

use futures::{SinkExt, StreamExt};

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::signaling::bridge::SignalingTransport;
use crate::signaling::protocol::SignalEnvelope;
use crate::{Error, Result};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Signaling relay client over a WebSocket connection
///
/// Envelopes are exchanged as JSON text frames. A sender task drains the
/// outgoing channel into the socket; a receiver task parses inbound frames
/// into the subscription channel. The relay server is expected to broadcast
/// each message to every subscriber of its room, the sender included —
/// self-filtering is the bridge's job.
pub struct WebSocketSignaling {
    tx: mpsc::UnboundedSender<Message>,
    subscription: Mutex<Option<mpsc::UnboundedReceiver<SignalEnvelope>>>,
}

impl WebSocketSignaling {
    /// Connect to the signaling server and start the socket pump tasks
    pub async fn connect(url: &str) -> Result<Self> {
        info!(url, "connecting to signaling server");

        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| Error::WebSocketError(format!("Failed to connect: {}", e)))?;

        info!("connected to signaling server");

        let (write, read) = ws_stream.split();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();

        tokio::spawn(Self::sender_task(write, out_rx));
        tokio::spawn(Self::receiver_task(read, in_tx));

        Ok(Self {
            tx: out_tx,
            subscription: Mutex::new(Some(in_rx)),
        })
    }

    async fn sender_task(
        mut write: futures::stream::SplitSink<WsStream, Message>,
        mut rx: mpsc::UnboundedReceiver<Message>,
    ) {
        while let Some(msg) = rx.recv().await {
            if let Err(e) = write.send(msg).await {
                error!(error = %e, "failed to send signaling frame");
                break;
            }
        }
        debug!("signaling sender task terminated");
    }

    async fn receiver_task(
        mut read: futures::stream::SplitStream<WsStream>,
        tx: mpsc::UnboundedSender<SignalEnvelope>,
    ) {
        while let Some(msg_result) = read.next().await {
            match msg_result {
                Ok(Message::Text(text)) => match SignalEnvelope::from_json(&text) {
                    Ok(envelope) => {
                        if tx.send(envelope).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "discarding unparseable signaling frame"),
                },
                Ok(Message::Close(_)) => {
                    info!("signaling connection closed by server");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "signaling socket error");
                    break;
                }
                _ => {}
            }
        }
        debug!("signaling receiver task terminated");
    }
}

#[async_trait]
impl SignalingTransport for WebSocketSignaling {
    async fn send(&self, room_id: &str, message: &SignalEnvelope) -> Result<()> {
        let json = message.to_json()?;
        debug!(room = room_id, kind = message.signal.kind_name(), "sending signaling frame");

        self.tx
            .send(Message::Text(json))
            .map_err(|e| Error::SignalingError(format!("Failed to queue message: {}", e)))?;
        Ok(())
    }

    async fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<SignalEnvelope>> {
        self.subscription
            .lock()
            .await
            .take()
            .ok_or_else(|| Error::SignalingError("Signaling already subscribed".to_string()))
    }
}
