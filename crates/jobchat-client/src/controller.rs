//! The chat widget controller: user intents in, state transitions and
//! backend calls out.
//!
//! Nothing here returns an error to the caller except [`ChatController::start`]
//! when the user is not signed in. Every other failure is logged and leaves
//! the widget usable.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use jobchat_net::{ConnectionHandle, Connector};
use jobchat_shared::{ChatError, ChatMessage, ConnectionMode, UserId};

use crate::api::ChatApi;
use crate::bridge::spawn_bridge;
use crate::config::ClientConfig;
use crate::events::ChatEvent;
use crate::notify::{Notifier, Visibility};
use crate::router::MessageRouter;
use crate::search::SearchDebouncer;
use crate::state::{lock_state, ChatContext, SearchState};
use crate::widget::WidgetSnapshot;

/// How long `shutdown` waits for the bridge to drain.
const BRIDGE_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

pub struct ChatController {
    ctx: ChatContext,
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    connection: Option<ConnectionHandle>,
    bridge: Option<JoinHandle<()>>,
    search: SearchDebouncer,
}

impl ChatController {
    pub fn new(
        config: ClientConfig,
        api: Arc<dyn ChatApi>,
        connector: Arc<dyn Connector>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            ctx: ChatContext::new(api, notifier),
            search: SearchDebouncer::new(config.search_debounce),
            config,
            connector,
            connection: None,
            bridge: None,
        }
    }

    pub fn context(&self) -> &ChatContext {
        &self.ctx
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.ctx.events.subscribe()
    }

    pub fn visibility(&self) -> Visibility {
        self.ctx.visibility.clone()
    }

    pub fn self_id(&self) -> Option<UserId> {
        self.ctx.self_id()
    }

    pub fn snapshot(&self) -> WidgetSnapshot {
        lock_state(&self.ctx.state).snapshot()
    }

    // -----------------------------------------------------------------------
    // Session
    // -----------------------------------------------------------------------

    /// Resolve the signed-in user, open the real-time channel and load the
    /// conversation list.
    ///
    /// Fails with [`ChatError::Permission`] when there is no signed-in user;
    /// nothing is connected in that case. A channel that cannot be opened is
    /// not an error: the widget runs offline and retries on `open`.
    pub async fn start(&mut self) -> Result<UserId, ChatError> {
        let me = match self.ctx.api.current_user().await {
            Ok(user) if !user.user_id.is_empty() => user.user_id,
            Ok(_) => return Err(ChatError::Permission("session has no user id".into())),
            Err(e) if e.is_unauthorized() => return Err(ChatError::Permission(e.to_string())),
            Err(e) => return Err(e.into()),
        };
        info!(user = %me, "Chat user resolved");
        lock_state(&self.ctx.state).self_id = Some(me.clone());

        self.connect_channel().await;
        self.ctx.refresh_recent().await;
        self.ctx.refresh_unread_counts().await;
        Ok(me)
    }

    async fn connect_channel(&mut self) -> bool {
        let Some(me) = self.ctx.self_id() else {
            debug!("No chat user yet, not connecting");
            return false;
        };

        match jobchat_net::connect(self.connector.clone(), &me, self.config.connection()).await {
            Ok((handle, notif_rx)) => {
                if let Some(previous) = self.bridge.take() {
                    previous.abort();
                }
                self.bridge = Some(spawn_bridge(
                    self.ctx.clone(),
                    MessageRouter::new(me),
                    handle.watch_mode(),
                    notif_rx,
                ));
                self.connection = Some(handle);
                true
            }
            Err(e) => {
                warn!(
                    endpoint = %self.connector.endpoint(),
                    error = %e,
                    "Chat channel unavailable, continuing offline"
                );
                lock_state(&self.ctx.state).connection_mode = ConnectionMode::Disconnected;
                self.ctx.events.emit(ChatEvent::ConnectionModeChanged {
                    mode: ConnectionMode::Disconnected,
                });
                false
            }
        }
    }

    async fn ensure_connected(&mut self) {
        if let Some(handle) = &self.connection {
            match handle.mode() {
                ConnectionMode::Connected => return,
                ConnectionMode::Reconnecting => {
                    info!("Chat channel down, retrying now");
                    handle.reconnect();
                    return;
                }
                ConnectionMode::Disconnected => {}
            }
        }
        self.connection = None;
        self.connect_channel().await;
    }

    /// Close the channel and stop the bridge.
    pub async fn shutdown(&mut self) {
        self.search.cancel();
        if let Some(handle) = self.connection.take() {
            handle.disconnect().await;
        }
        if let Some(bridge) = self.bridge.take() {
            let abort = bridge.abort_handle();
            if tokio::time::timeout(BRIDGE_DRAIN_TIMEOUT, bridge).await.is_err() {
                warn!("Notification bridge did not stop in time");
                abort.abort();
            }
        }
        info!("Chat client shut down");
    }

    // -----------------------------------------------------------------------
    // Navigation
    // -----------------------------------------------------------------------

    /// Expand the widget. Also retries the channel if it is down.
    pub async fn open(&mut self) {
        let opened = lock_state(&self.ctx.state).widget.open();
        if opened {
            self.emit_view();
        }
        if self.ctx.self_id().is_some() {
            self.ensure_connected().await;
        }
    }

    pub fn close(&self) {
        self.search.cancel();
        {
            let mut state = lock_state(&self.ctx.state);
            let state = &mut *state;
            state.widget.close(&mut state.store);
            state.search = SearchState::default();
        }
        self.emit_view();
    }

    /// Open the conversation with `participant`, creating it if needed.
    pub async fn select(&self, participant: &UserId, name: &str) {
        if participant.is_empty() {
            warn!("Ignoring selection without a participant");
            return;
        }
        if self.ctx.self_id().as_ref() == Some(participant) {
            warn!("Ignoring selection of own user");
            return;
        }

        self.search.cancel();
        {
            let mut state = lock_state(&self.ctx.state);
            let state = &mut *state;
            state.widget.select(&mut state.store, participant, name);
            state.search = SearchState::default();
        }
        self.entered(participant).await;
    }

    /// Open the `index`-th result of the last search.
    pub async fn select_search_hit(&self, index: usize) -> bool {
        let hit = lock_state(&self.ctx.state).search.hits.get(index).cloned();
        match hit {
            Some(hit) => {
                self.select(&hit.user_id, &hit.display_name()).await;
                true
            }
            None => {
                debug!(index, "No such search result");
                false
            }
        }
    }

    /// Restore a minimized bar.
    pub async fn click_minimized(&self, participant: &UserId) -> bool {
        let restored = {
            let mut state = lock_state(&self.ctx.state);
            let state = &mut *state;
            state.widget.click_bar(&mut state.store, participant)
        };
        if restored {
            self.entered(participant).await;
        }
        restored
    }

    pub fn back(&self) {
        let moved = {
            let mut state = lock_state(&self.ctx.state);
            let state = &mut *state;
            state.widget.back(&mut state.store)
        };
        if moved {
            self.emit_view();
        }
    }

    pub fn minimize(&self) {
        let minimized = {
            let mut state = lock_state(&self.ctx.state);
            let state = &mut *state;
            state.widget.minimize(&mut state.store)
        };
        if let Some(participant) = minimized {
            debug!(participant = %participant, "Conversation minimized");
            self.emit_view();
            self.ctx.events.emit(ChatEvent::ConversationsChanged);
        }
    }

    /// A conversation just became the open one: sync it with the server.
    async fn entered(&self, participant: &UserId) {
        self.emit_view();
        self.ctx.events.emit(ChatEvent::UnreadChanged {
            participant: participant.clone(),
            count: 0,
        });

        let Some(me) = self.ctx.self_id() else {
            return;
        };
        self.ctx.load_history(participant).await;
        self.ctx.mark_read(participant, &me).await;
        self.ctx.refresh_unread_counts().await;
    }

    fn emit_view(&self) {
        let view = lock_state(&self.ctx.state).widget.view().clone();
        self.ctx.events.emit(ChatEvent::ViewChanged { view });
    }

    // -----------------------------------------------------------------------
    // Search and send
    // -----------------------------------------------------------------------

    pub fn search_input(&self, text: &str) {
        self.search.input(&self.ctx, text);
    }

    /// Send `text` to the open conversation. The message is shown right away;
    /// while the channel is down it waits in the connection's outbox.
    pub fn send(&self, text: &str) -> Option<ChatMessage> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        let message = {
            let mut state = lock_state(&self.ctx.state);
            let Some(me) = state.self_id.clone() else {
                warn!("Cannot send before the chat user is known");
                return None;
            };
            let Some(participant) = state.widget.open_participant().cloned() else {
                debug!("No open conversation to send to");
                return None;
            };

            let message = ChatMessage::outgoing(&me, &participant, text);
            if let Err(e) = state.store.append_message(&participant, message.clone()) {
                warn!(error = %e, "Could not record outgoing message");
                return None;
            }
            message
        };

        self.ctx.events.emit(ChatEvent::MessageAppended {
            participant: message.receiver_id.clone(),
            from_self: true,
        });

        match &self.connection {
            Some(handle) => handle.send(&message),
            None => debug!(receiver = %message.receiver_id, "Offline, message kept locally"),
        }
        Some(message)
    }

    // -----------------------------------------------------------------------
    // Backend refresh
    // -----------------------------------------------------------------------

    pub async fn refresh_recent(&self) -> bool {
        self.ctx.refresh_recent().await
    }

    pub async fn refresh_unread_counts(&self) -> bool {
        self.ctx.refresh_unread_counts().await
    }
}
