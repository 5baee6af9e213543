//! In-process connector for tests: each `open` hands the server half of a
//! channel pair to a [`MemoryServer`], which plays the STOMP broker.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;

use jobchat_shared::ConnectionError;

use crate::connector::{Connector, FrameChannel};
use crate::stomp::{Frame, StompCommand};

const BUFFER: usize = 64;

pub struct MemoryConnector {
    accept_tx: mpsc::UnboundedSender<MemoryPeer>,
    refusals: AtomicU32,
}

pub struct MemoryServer {
    accept_rx: mpsc::UnboundedReceiver<MemoryPeer>,
}

/// Server side of one transport session.
pub struct MemoryPeer {
    from_client: mpsc::Receiver<String>,
    to_client: mpsc::Sender<String>,
}

pub fn memory_pair() -> (MemoryConnector, MemoryServer) {
    let (accept_tx, accept_rx) = mpsc::unbounded_channel();
    (
        MemoryConnector {
            accept_tx,
            refusals: AtomicU32::new(0),
        },
        MemoryServer { accept_rx },
    )
}

impl MemoryConnector {
    /// Make the next `n` open attempts fail.
    pub fn refuse_next(&self, n: u32) {
        self.refusals.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn open(&self) -> Result<FrameChannel, ConnectionError> {
        let refused = self
            .refusals
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(ConnectionError::Transport("connection refused".into()));
        }

        let (out_tx, out_rx) = mpsc::channel(BUFFER);
        let (in_tx, in_rx) = mpsc::channel(BUFFER);
        self.accept_tx
            .send(MemoryPeer {
                from_client: out_rx,
                to_client: in_tx,
            })
            .map_err(|_| ConnectionError::Transport("server gone".into()))?;

        Ok(FrameChannel {
            outgoing: out_tx,
            incoming: in_rx,
        })
    }

    fn endpoint(&self) -> String {
        "memory".to_string()
    }
}

impl MemoryServer {
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.accept_rx.recv().await
    }
}

impl MemoryPeer {
    /// Next frame from the client, skipping heart-beats.
    pub async fn next_frame(&mut self) -> Option<Frame> {
        loop {
            let text = self.from_client.recv().await?;
            if let Ok(Some(frame)) = Frame::decode(&text) {
                return Some(frame);
            }
        }
    }

    /// Answer CONNECT with CONNECTED and wait for the SUBSCRIBE. Returns the
    /// subscribed destination.
    pub async fn accept_handshake(&mut self) -> Option<String> {
        let connect = self.next_frame().await?;
        if connect.command != StompCommand::Connect {
            return None;
        }
        self.send_raw(
            Frame::new(StompCommand::Connected)
                .header("version", "1.2")
                .encode(),
        )
        .await;

        let subscribe = self.next_frame().await?;
        if subscribe.command != StompCommand::Subscribe {
            return None;
        }
        subscribe.get("destination").map(str::to_string)
    }

    pub async fn push_message(&self, destination: &str, body: &str) {
        let frame = Frame::new(StompCommand::Message)
            .header("destination", destination)
            .header("subscription", "sub-0")
            .header("content-type", "application/json")
            .with_body(body);
        self.send_raw(frame.encode()).await;
    }

    pub async fn send_raw(&self, text: String) {
        let _ = self.to_client.send(text).await;
    }
}
