//! Connection manager with tokio mpsc command/notification pattern.
//!
//! One background task owns the transport for a logged-in user. External
//! code talks to it through a [`ConnectionHandle`] (commands in) and the
//! notification receiver returned by [`connect`] (events out). The receiver
//! is the single inbound consumer.
//!
//! When the transport drops, outbound messages are queued in a bounded
//! outbox and the task reconnects with exponential backoff, flushing the
//! outbox in order once the session is back.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use jobchat_shared::constants::{
    user_queue, DEFAULT_OUTBOX_CAPACITY, RECONNECT_INITIAL_MS, RECONNECT_MAX_MS, SEND_DESTINATION,
};
use jobchat_shared::{ChatMessage, ConnectionError, ConnectionMode, UserId};

use crate::backoff::Backoff;
use crate::connector::{Connector, FrameChannel};
use crate::stomp::{Frame, StompCommand};

// ---------------------------------------------------------------------------
// Command / notification types
// ---------------------------------------------------------------------------

/// Commands sent *into* the connection task.
#[derive(Debug)]
enum ConnectionCommand {
    /// Publish one chat message.
    Send(ChatMessage),
    /// Retry now if the channel is down.
    Reconnect,
    /// Tear the session down.
    Shutdown,
}

/// Notifications sent *from* the connection task to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionNotification {
    /// A session (first or re-established) is up.
    Connected,
    /// The session dropped or was shut down.
    Disconnected { reason: String },
    /// A MESSAGE frame arrived on the user's queue.
    MessageReceived { destination: String, body: String },
}

/// Configuration for a connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Value of the STOMP `host` header.
    pub host: String,
    /// Destination outbound messages are published to.
    pub send_destination: String,
    /// How long to wait for `CONNECTED`.
    pub handshake_timeout: Duration,
    pub reconnect_initial: Duration,
    pub reconnect_max: Duration,
    /// Messages kept while disconnected; the oldest is dropped beyond this.
    pub outbox_capacity: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            send_destination: SEND_DESTINATION.to_string(),
            handshake_timeout: Duration::from_secs(10),
            reconnect_initial: Duration::from_millis(RECONNECT_INITIAL_MS),
            reconnect_max: Duration::from_millis(RECONNECT_MAX_MS),
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
        }
    }
}

/// Cheap, cloneable handle to a running connection task.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    user_id: UserId,
    cmd_tx: mpsc::Sender<ConnectionCommand>,
    mode_rx: watch::Receiver<ConnectionMode>,
}

impl ConnectionHandle {
    /// Hand one message to the connection task. Never waits for delivery; if
    /// the task is gone this is a no-op.
    pub fn send(&self, message: &ChatMessage) {
        match self.cmd_tx.try_send(ConnectionCommand::Send(message.clone())) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(receiver = %message.receiver_id, "Connection command queue full, message not sent");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(receiver = %message.receiver_id, "Connection closed, message kept local only");
            }
        }
    }

    /// Ask for an immediate reconnect attempt if the channel is down.
    pub fn reconnect(&self) {
        let _ = self.cmd_tx.try_send(ConnectionCommand::Reconnect);
    }

    /// Close the session and stop the task.
    pub async fn disconnect(self) {
        let _ = self.cmd_tx.send(ConnectionCommand::Shutdown).await;
    }

    pub fn mode(&self) -> ConnectionMode {
        *self.mode_rx.borrow()
    }

    pub fn watch_mode(&self) -> watch::Receiver<ConnectionMode> {
        self.mode_rx.clone()
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }
}

/// Open the channel for `user_id` and spawn the connection task.
///
/// The first session is established before returning, so a failure here is
/// reported to the caller instead of being retried in the background.
///
/// # Returns
///
/// `(handle, notification_rx)`
pub async fn connect(
    connector: Arc<dyn Connector>,
    user_id: &UserId,
    config: ConnectionConfig,
) -> Result<(ConnectionHandle, mpsc::Receiver<ConnectionNotification>), ConnectionError> {
    if user_id.is_empty() {
        return Err(ConnectionError::Rejected("empty user id".into()));
    }

    let session_id = Uuid::new_v4();
    let channel = establish(connector.as_ref(), user_id, &config, &session_id).await?;

    info!(
        session = %session_id,
        user = %user_id,
        endpoint = %connector.endpoint(),
        "Connected to chat channel"
    );

    let (cmd_tx, cmd_rx) = mpsc::channel::<ConnectionCommand>(256);
    let (notif_tx, notif_rx) = mpsc::channel::<ConnectionNotification>(256);
    let (mode_tx, mode_rx) = watch::channel(ConnectionMode::Connected);

    let _ = notif_tx.send(ConnectionNotification::Connected).await;

    let task = ConnectionTask {
        backoff: Backoff::new(config.reconnect_initial, config.reconnect_max),
        outbox: VecDeque::new(),
        live: Some(channel),
        retry_at: None,
        user_id: user_id.clone(),
        connector,
        config,
        session_id,
        notif_tx,
        mode_tx,
    };
    tokio::spawn(task.run(cmd_rx));

    Ok((
        ConnectionHandle {
            user_id: user_id.clone(),
            cmd_tx,
            mode_rx,
        },
        notif_rx,
    ))
}

/// Open the transport, run the STOMP handshake and subscribe to the user's
/// queue.
async fn establish(
    connector: &dyn Connector,
    user_id: &UserId,
    config: &ConnectionConfig,
    session_id: &Uuid,
) -> Result<FrameChannel, ConnectionError> {
    let mut channel = connector.open().await?;

    channel
        .outgoing
        .send(Frame::connect(&config.host).encode())
        .await
        .map_err(|_| ConnectionError::Closed)?;

    let timeout_ms = config.handshake_timeout.as_millis() as u64;
    let reply = tokio::time::timeout(config.handshake_timeout, async {
        loop {
            let Some(text) = channel.incoming.recv().await else {
                return Err(ConnectionError::Closed);
            };
            match Frame::decode(&text) {
                Ok(Some(frame)) => return Ok(frame),
                Ok(None) => continue,
                Err(e) => return Err(ConnectionError::Handshake(e.to_string())),
            }
        }
    })
    .await
    .map_err(|_| ConnectionError::Timeout(timeout_ms))??;

    match reply.command {
        StompCommand::Connected => {}
        StompCommand::Error => {
            let reason = reply.get("message").unwrap_or(reply.body.as_str());
            return Err(ConnectionError::Rejected(reason.to_string()));
        }
        other => {
            return Err(ConnectionError::Handshake(format!("expected CONNECTED, got {other}")));
        }
    }

    let destination = user_queue(user_id.as_str());
    debug!(session = %session_id, destination = %destination, "Subscribing to user queue");
    channel
        .outgoing
        .send(Frame::subscribe(&format!("sub-{session_id}"), &destination).encode())
        .await
        .map_err(|_| ConnectionError::Closed)?;

    Ok(channel)
}

// ---------------------------------------------------------------------------
// Connection task
// ---------------------------------------------------------------------------

struct ConnectionTask {
    connector: Arc<dyn Connector>,
    user_id: UserId,
    config: ConnectionConfig,
    session_id: Uuid,
    live: Option<FrameChannel>,
    outbox: VecDeque<ChatMessage>,
    backoff: Backoff,
    retry_at: Option<Instant>,
    notif_tx: mpsc::Sender<ConnectionNotification>,
    mode_tx: watch::Sender<ConnectionMode>,
}

impl ConnectionTask {
    async fn run(mut self, mut cmd_rx: mpsc::Receiver<ConnectionCommand>) {
        loop {
            tokio::select! {
                // --- Commands ---
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(ConnectionCommand::Send(message)) => self.publish(message).await,
                        Some(ConnectionCommand::Reconnect) => {
                            if self.live.is_none() {
                                debug!(session = %self.session_id, "Immediate reconnect requested");
                                self.backoff.reset();
                                self.retry_at = Some(Instant::now());
                            }
                        }
                        Some(ConnectionCommand::Shutdown) => {
                            info!(session = %self.session_id, "Chat channel shutdown requested");
                            break;
                        }
                        None => {
                            info!(session = %self.session_id, "All handles dropped, closing chat channel");
                            break;
                        }
                    }
                }

                // --- Inbound frames ---
                frame = next_frame(&mut self.live) => {
                    match frame {
                        Some(text) => self.handle_frame(&text).await,
                        None => self.on_lost("transport closed").await,
                    }
                }

                // --- Reconnect timer ---
                _ = wait_until(self.retry_at), if self.live.is_none() => {
                    self.try_reconnect().await;
                }
            }
        }

        self.close().await;
        info!(session = %self.session_id, "Connection task terminated");
    }

    async fn publish(&mut self, message: ChatMessage) {
        let body = match message.to_envelope().to_json() {
            Ok(body) => body,
            Err(e) => {
                error!(error = %e, "Failed to serialize outbound message");
                return;
            }
        };
        let frame = Frame::send(&self.config.send_destination, &body).encode();

        let delivered = match &self.live {
            Some(channel) => channel.outgoing.send(frame).await.is_ok(),
            None => false,
        };

        if !delivered {
            let was_live = self.live.is_some();
            self.enqueue(message);
            if was_live {
                self.on_lost("write failed").await;
            }
        }
    }

    fn enqueue(&mut self, message: ChatMessage) {
        if self.outbox.len() >= self.config.outbox_capacity.max(1) {
            if let Some(dropped) = self.outbox.pop_front() {
                warn!(receiver = %dropped.receiver_id, "Outbox full, dropping oldest queued message");
            }
        }
        self.outbox.push_back(message);
        debug!(queued = self.outbox.len(), "Message queued until reconnect");
    }

    async fn handle_frame(&mut self, text: &str) {
        let frame = match Frame::decode(text) {
            Ok(Some(frame)) => frame,
            Ok(None) => return,
            Err(e) => {
                warn!(session = %self.session_id, error = %e, "Dropping undecodable frame");
                return;
            }
        };

        match frame.command {
            StompCommand::Message => {
                let destination = frame.get("destination").unwrap_or_default().to_string();
                debug!(destination = %destination, len = frame.body.len(), "Chat frame received");
                self.notify(ConnectionNotification::MessageReceived {
                    destination,
                    body: frame.body,
                })
                .await;
            }
            StompCommand::Error => {
                warn!(
                    session = %self.session_id,
                    message = frame.get("message").unwrap_or_default(),
                    body = %frame.body,
                    "Server sent ERROR frame"
                );
            }
            other => debug!(command = %other, "Ignoring frame"),
        }
    }

    async fn on_lost(&mut self, reason: &str) {
        self.live = None;
        let delay = self.backoff.next_delay();
        self.retry_at = Some(Instant::now() + delay);
        let _ = self.mode_tx.send(ConnectionMode::Reconnecting);
        warn!(
            session = %self.session_id,
            reason,
            retry_in_ms = delay.as_millis() as u64,
            "Chat channel lost"
        );
        self.notify(ConnectionNotification::Disconnected {
            reason: reason.to_string(),
        })
        .await;
    }

    async fn try_reconnect(&mut self) {
        match establish(self.connector.as_ref(), &self.user_id, &self.config, &self.session_id).await {
            Ok(channel) => {
                self.live = Some(channel);
                self.retry_at = None;
                self.backoff.reset();
                let _ = self.mode_tx.send(ConnectionMode::Connected);
                info!(
                    session = %self.session_id,
                    user = %self.user_id,
                    queued = self.outbox.len(),
                    "Reconnected to chat channel"
                );
                self.notify(ConnectionNotification::Connected).await;

                let pending: Vec<ChatMessage> = self.outbox.drain(..).collect();
                for message in pending {
                    self.publish(message).await;
                }
            }
            Err(e) => {
                let delay = self.backoff.next_delay();
                self.retry_at = Some(Instant::now() + delay);
                warn!(
                    session = %self.session_id,
                    attempt = self.backoff.attempts(),
                    retry_in_ms = delay.as_millis() as u64,
                    error = %e,
                    "Reconnect failed"
                );
            }
        }
    }

    async fn close(&mut self) {
        if let Some(channel) = self.live.take() {
            let _ = channel.outgoing.send(Frame::disconnect().encode()).await;
        }
        if !self.outbox.is_empty() {
            warn!(dropped = self.outbox.len(), "Closing with undelivered messages");
        }
        let _ = self.mode_tx.send(ConnectionMode::Disconnected);
        let _ = self
            .notif_tx
            .try_send(ConnectionNotification::Disconnected {
                reason: "shutdown".into(),
            });
    }

    async fn notify(&self, notification: ConnectionNotification) {
        let _ = self.notif_tx.send(notification).await;
    }
}

async fn next_frame(live: &mut Option<FrameChannel>) -> Option<String> {
    match live {
        Some(channel) => channel.incoming.recv().await,
        None => std::future::pending().await,
    }
}

async fn wait_until(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
