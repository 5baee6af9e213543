//! Transports that carry STOMP frames as text.
//!
//! A [`Connector`] opens one transport session and exposes it as a pair of
//! channels of raw frame text. The connection task only ever sees these
//! channels, so the WebSocket pumps stay out of its select loop.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};

use jobchat_shared::ConnectionError;

/// Frame buffer depth in each direction.
const FRAME_BUFFER: usize = 64;

/// One open transport session.
pub struct FrameChannel {
    /// Frames to the server.
    pub outgoing: mpsc::Sender<String>,
    /// Frames from the server; ends when the transport closes.
    pub incoming: mpsc::Receiver<String>,
}

#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn open(&self) -> Result<FrameChannel, ConnectionError>;

    /// Endpoint description for logs.
    fn endpoint(&self) -> String;
}

/// WebSocket transport (`ws://` or `wss://`).
pub struct WsConnector {
    url: String,
    connect_timeout: Duration,
}

impl WsConnector {
    pub fn new(url: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            connect_timeout,
        }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self) -> Result<FrameChannel, ConnectionError> {
        let (ws, _response) = tokio::time::timeout(self.connect_timeout, connect_async(self.url.as_str()))
            .await
            .map_err(|_| ConnectionError::Timeout(self.connect_timeout.as_millis() as u64))?
            .map_err(|e| ConnectionError::Transport(e.to_string()))?;

        let (mut sink, mut stream) = ws.split();
        let (out_tx, mut out_rx) = mpsc::channel::<String>(FRAME_BUFFER);
        let (in_tx, in_rx) = mpsc::channel::<String>(FRAME_BUFFER);
        let url = self.url.clone();

        tokio::spawn(async move {
            while let Some(text) = out_rx.recv().await {
                if let Err(e) = sink.send(Message::Text(text)).await {
                    warn!(error = %e, "WebSocket write failed");
                    break;
                }
            }
            let _ = sink.close().await;
            debug!("WebSocket writer stopped");
        });

        tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                let text = match item {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Binary(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
                    Ok(Message::Close(frame)) => {
                        debug!(url = %url, frame = ?frame, "WebSocket closed by server");
                        break;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        warn!(url = %url, error = %e, "WebSocket read failed");
                        break;
                    }
                };
                if in_tx.send(text).await.is_err() {
                    break;
                }
            }
            debug!("WebSocket reader stopped");
        });

        Ok(FrameChannel {
            outgoing: out_tx,
            incoming: in_rx,
        })
    }

    fn endpoint(&self) -> String {
        self.url.clone()
    }
}
