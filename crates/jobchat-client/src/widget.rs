//! The widget's navigation state machine.
//!
//! ```text
//! Collapsed --open--> ConversationList --select--> ConversationView
//! ConversationView --back--> ConversationList
//! ConversationView --minimize--> ConversationList | Collapsed   (bar added)
//! any --bar click--> ConversationView
//! any --close--> Collapsed
//! ```
//!
//! Every transition keeps the store's single active conversation equal to
//! the participant of the `ConversationView`, if any.

use serde::Serialize;
use tracing::debug;

use jobchat_shared::{ConnectionMode, UiState, UserId};
use jobchat_store::{ConversationStore, ConversationSummary};

use crate::api::SearchHit;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "view", rename_all = "camelCase")]
pub enum WidgetView {
    #[default]
    Collapsed,
    ConversationList,
    ConversationView { participant: UserId },
}

/// Current view plus the view a minimize returns to.
#[derive(Debug, Clone, Default)]
pub struct WidgetState {
    view: WidgetView,
    return_to: WidgetView,
}

impl WidgetState {
    pub fn view(&self) -> &WidgetView {
        &self.view
    }

    pub fn open_participant(&self) -> Option<&UserId> {
        match &self.view {
            WidgetView::ConversationView { participant } => Some(participant),
            _ => None,
        }
    }

    /// Expand to the conversation list. Returns `false` when already open.
    pub fn open(&mut self) -> bool {
        if self.view != WidgetView::Collapsed {
            return false;
        }
        self.view = WidgetView::ConversationList;
        true
    }

    /// Collapse the widget. An open conversation becomes `Closed`; bars stay.
    pub fn close(&mut self, store: &mut ConversationStore) {
        if let Some(participant) = self.open_participant().cloned() {
            store.set_ui_state(&participant, UiState::Closed);
        }
        self.view = WidgetView::Collapsed;
        self.return_to = WidgetView::Collapsed;
    }

    /// Open a conversation from the list or from search. Creates it when
    /// unknown and makes it the active one.
    pub fn select(&mut self, store: &mut ConversationStore, participant: &UserId, name: &str) {
        store.upsert_conversation(participant, name);
        self.enter(store, participant, WidgetView::ConversationList);
    }

    /// Restore a minimized bar. Returns `false` when `participant` has no bar.
    pub fn click_bar(&mut self, store: &mut ConversationStore, participant: &UserId) -> bool {
        let has_bar = store
            .list_minimized()
            .iter()
            .any(|c| &c.participant_id == participant);
        if !has_bar {
            debug!(participant = %participant, "No minimized bar to restore");
            return false;
        }

        let return_to = match self.view {
            WidgetView::Collapsed => WidgetView::Collapsed,
            _ => WidgetView::ConversationList,
        };
        self.enter(store, participant, return_to);
        true
    }

    /// Back to the list; the conversation becomes `Closed`.
    pub fn back(&mut self, store: &mut ConversationStore) -> bool {
        let Some(participant) = self.open_participant().cloned() else {
            return false;
        };
        store.set_ui_state(&participant, UiState::Closed);
        self.view = WidgetView::ConversationList;
        true
    }

    /// Minimize the open conversation into a bar and return to wherever it
    /// was entered from. Returns the minimized participant.
    pub fn minimize(&mut self, store: &mut ConversationStore) -> Option<UserId> {
        let participant = self.open_participant().cloned()?;
        store.minimize(&participant);
        self.view = std::mem::take(&mut self.return_to);
        Some(participant)
    }

    fn enter(&mut self, store: &mut ConversationStore, participant: &UserId, return_to: WidgetView) {
        store.set_ui_state(participant, UiState::Active);
        self.view = WidgetView::ConversationView {
            participant: participant.clone(),
        };
        self.return_to = return_to;
    }
}

// ---------------------------------------------------------------------------
// Render snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedMessage {
    pub from_self: bool,
    pub content: String,
    /// `HH:MM` in the display zone.
    pub time: String,
    pub is_read: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenConversation {
    pub participant_id: UserId,
    pub participant_name: String,
    /// Oldest first.
    pub messages: Vec<RenderedMessage>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MinimizedBar {
    pub participant_id: UserId,
    pub participant_name: String,
    pub unread_count: u32,
}

/// Everything needed to draw the widget, taken under the state lock.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetSnapshot {
    pub view: WidgetView,
    pub connection: ConnectionMode,
    pub recent: Vec<ConversationSummary>,
    pub minimized: Vec<MinimizedBar>,
    pub open: Option<OpenConversation>,
    pub search_query: String,
    pub search_hits: Vec<SearchHit>,
    pub total_unread: u32,
}

impl WidgetSnapshot {
    pub fn capture(
        widget: &WidgetState,
        store: &ConversationStore,
        connection: ConnectionMode,
        search_query: &str,
        search_hits: &[SearchHit],
    ) -> Self {
        let open = widget
            .open_participant()
            .and_then(|id| store.get(id))
            .map(|conv| OpenConversation {
                participant_id: conv.participant_id.clone(),
                participant_name: conv.participant_name.clone(),
                messages: conv
                    .sorted_messages()
                    .into_iter()
                    .map(|m| RenderedMessage {
                        from_self: m.is_sent_by_current_user,
                        content: m.content.clone(),
                        time: m.sent_time.format_clock(),
                        is_read: m.is_read,
                    })
                    .collect(),
            });

        Self {
            view: widget.view().clone(),
            connection,
            recent: store.list_recent(),
            minimized: store
                .list_minimized()
                .into_iter()
                .map(|c| MinimizedBar {
                    participant_id: c.participant_id.clone(),
                    participant_name: c.participant_name.clone(),
                    unread_count: c.unread_count,
                })
                .collect(),
            open,
            search_query: search_query.to_string(),
            search_hits: search_hits.to_vec(),
            total_unread: store.total_unread(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobchat_shared::ChatMessage;

    fn id(s: &str) -> UserId {
        UserId::new(s)
    }

    fn view_of(p: &str) -> WidgetView {
        WidgetView::ConversationView { participant: id(p) }
    }

    #[test]
    fn open_select_back() {
        let mut store = ConversationStore::new();
        let mut widget = WidgetState::default();

        assert!(widget.open());
        assert!(!widget.open());
        widget.select(&mut store, &id("p1"), "Alice");
        assert_eq!(widget.view(), &view_of("p1"));
        assert!(store.is_active(&id("p1")));

        assert!(widget.back(&mut store));
        assert_eq!(widget.view(), &WidgetView::ConversationList);
        assert_eq!(store.active_id(), None);
        assert_eq!(store.get(&id("p1")).unwrap().ui_state, UiState::Closed);
    }

    #[test]
    fn minimize_from_list_returns_to_list() {
        let mut store = ConversationStore::new();
        let mut widget = WidgetState::default();
        widget.open();
        widget.select(&mut store, &id("p1"), "Alice");

        assert_eq!(widget.minimize(&mut store), Some(id("p1")));
        assert_eq!(widget.view(), &WidgetView::ConversationList);
        assert_eq!(store.list_minimized().len(), 1);
        assert_eq!(store.active_id(), None);
    }

    #[test]
    fn bar_click_from_collapsed_minimizes_back_to_collapsed() {
        let mut store = ConversationStore::new();
        let mut widget = WidgetState::default();
        widget.open();
        widget.select(&mut store, &id("p1"), "Alice");
        widget.minimize(&mut store);
        widget.close(&mut store);
        assert_eq!(widget.view(), &WidgetView::Collapsed);
        assert_eq!(store.list_minimized().len(), 1);

        assert!(widget.click_bar(&mut store, &id("p1")));
        assert_eq!(widget.view(), &view_of("p1"));
        assert!(store.list_minimized().is_empty());
        assert!(store.is_active(&id("p1")));

        widget.minimize(&mut store);
        assert_eq!(widget.view(), &WidgetView::Collapsed);
        assert_eq!(store.list_minimized().len(), 1);
    }

    #[test]
    fn bar_click_without_bar_is_ignored() {
        let mut store = ConversationStore::new();
        store.upsert_conversation(&id("p1"), "Alice");
        let mut widget = WidgetState::default();
        assert!(!widget.click_bar(&mut store, &id("p1")));
        assert_eq!(widget.view(), &WidgetView::Collapsed);
    }

    #[test]
    fn close_keeps_bars_and_closes_open_conversation() {
        let mut store = ConversationStore::new();
        let mut widget = WidgetState::default();
        widget.open();
        widget.select(&mut store, &id("p1"), "Alice");
        widget.minimize(&mut store);
        widget.select(&mut store, &id("p2"), "Bob");

        widget.close(&mut store);
        assert_eq!(widget.view(), &WidgetView::Collapsed);
        assert_eq!(store.active_id(), None);
        assert_eq!(store.get(&id("p2")).unwrap().ui_state, UiState::Closed);
        assert_eq!(store.get(&id("p1")).unwrap().ui_state, UiState::Minimized);
    }

    #[test]
    fn switching_conversations_keeps_one_active() {
        let mut store = ConversationStore::new();
        let mut widget = WidgetState::default();
        widget.open();
        widget.select(&mut store, &id("p1"), "Alice");
        widget.select(&mut store, &id("p2"), "Bob");
        assert!(store.is_active(&id("p2")));
        assert_eq!(store.get(&id("p1")).unwrap().ui_state, UiState::Closed);
    }

    #[test]
    fn snapshot_renders_open_conversation_sorted() {
        let me = id("me");
        let mut store = ConversationStore::new();
        let mut widget = WidgetState::default();
        widget.open();
        widget.select(&mut store, &id("p1"), "Alice");

        let late = ChatMessage::outgoing(&me, &id("p1"), "second");
        let mut early = ChatMessage::outgoing(&me, &id("p1"), "first");
        early.sent_time = jobchat_shared::SentTime::decode(&[2024, 1, 1, 8, 0, 0, 0]).unwrap();
        store.append_message(&id("p1"), late).unwrap();
        store.append_message(&id("p1"), early).unwrap();

        let snapshot = WidgetSnapshot::capture(&widget, &store, ConnectionMode::Connected, "", &[]);
        let open = snapshot.open.unwrap();
        let contents: Vec<&str> = open.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["first", "second"]);
        assert_eq!(open.messages[0].time, "08:00");
        assert_eq!(snapshot.recent.len(), 1);
    }
}
