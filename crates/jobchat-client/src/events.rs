use serde::Serialize;
use tokio::sync::broadcast;

use jobchat_shared::{ConnectionMode, UserId};

use crate::widget::WidgetView;

pub const EVENT_MESSAGE_APPENDED: &str = "message-appended";
pub const EVENT_UNREAD_CHANGED: &str = "unread-changed";
pub const EVENT_CONVERSATIONS_CHANGED: &str = "conversations-changed";
pub const EVENT_VIEW_CHANGED: &str = "view-changed";
pub const EVENT_SEARCH_RESULTS: &str = "search-results";
pub const EVENT_CONNECTION_MODE_CHANGED: &str = "connection-mode-changed";
pub const EVENT_NOTIFICATION_SOUND: &str = "notification-sound";

/// Something the presentation layer should re-render for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ChatEvent {
    MessageAppended { participant: UserId, from_self: bool },
    UnreadChanged { participant: UserId, count: u32 },
    /// Recent list, names or minimized bars changed.
    ConversationsChanged,
    ViewChanged { view: WidgetView },
    SearchResults { query: String, hits: usize },
    ConnectionModeChanged { mode: ConnectionMode },
    NotificationSound,
}

impl ChatEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ChatEvent::MessageAppended { .. } => EVENT_MESSAGE_APPENDED,
            ChatEvent::UnreadChanged { .. } => EVENT_UNREAD_CHANGED,
            ChatEvent::ConversationsChanged => EVENT_CONVERSATIONS_CHANGED,
            ChatEvent::ViewChanged { .. } => EVENT_VIEW_CHANGED,
            ChatEvent::SearchResults { .. } => EVENT_SEARCH_RESULTS,
            ChatEvent::ConnectionModeChanged { .. } => EVENT_CONNECTION_MODE_CHANGED,
            ChatEvent::NotificationSound => EVENT_NOTIFICATION_SOUND,
        }
    }
}

/// Fan-out of [`ChatEvent`]s. Slow subscribers lose the oldest events.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    tx: broadcast::Sender<ChatEvent>,
}

impl EventEmitter {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: ChatEvent) {
        let name = event.name();
        if self.tx.send(event).is_err() {
            tracing::trace!(event = name, "No event subscribers");
        }
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_shape() {
        let event = ChatEvent::UnreadChanged {
            participant: UserId::new("u7"),
            count: 2,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "unreadChanged");
        assert_eq!(json["participant"], "u7");
        assert_eq!(json["count"], 2);
        assert_eq!(event.name(), EVENT_UNREAD_CHANGED);
    }

    #[tokio::test]
    async fn subscribers_receive_in_order() {
        let emitter = EventEmitter::new(8);
        let mut rx = emitter.subscribe();
        emitter.emit(ChatEvent::ConversationsChanged);
        emitter.emit(ChatEvent::NotificationSound);
        assert_eq!(rx.recv().await.unwrap(), ChatEvent::ConversationsChanged);
        assert_eq!(rx.recv().await.unwrap(), ChatEvent::NotificationSound);
    }

    #[test]
    fn emit_without_subscribers_is_fine() {
        EventEmitter::default().emit(ChatEvent::ConversationsChanged);
    }
}
