//! Domain model structs held by the conversation store.
//!
//! Every struct derives `Serialize` so it can be handed directly to a
//! presentation layer.

use serde::Serialize;

use jobchat_shared::{ChatMessage, UiState, UserId};

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// The thread with one other participant, keyed by that participant's id.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Conversation {
    /// The other participant (a user, or a company's associated user).
    pub participant_id: UserId,
    /// Display name; the participant id until a real name is known.
    pub participant_name: String,
    /// Append-only log, in arrival order.
    pub messages: Vec<ChatMessage>,
    /// Messages from the participant not yet marked read.
    pub unread_count: u32,
    /// How the conversation is presented.
    pub ui_state: UiState,
}

impl Conversation {
    pub fn new(participant_id: UserId, participant_name: &str) -> Self {
        let participant_name = if participant_name.trim().is_empty() {
            participant_id.to_string()
        } else {
            participant_name.trim().to_string()
        };
        Self {
            participant_id,
            participant_name,
            messages: Vec::new(),
            unread_count: 0,
            ui_state: UiState::Closed,
        }
    }

    pub fn last_message(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    /// Log sorted by sent time for display. The stored order is untouched and
    /// messages with equal timestamps keep their arrival order.
    pub fn sorted_messages(&self) -> Vec<&ChatMessage> {
        let mut sorted: Vec<&ChatMessage> = self.messages.iter().collect();
        sorted.sort_by_key(|m| m.sent_time);
        sorted
    }

    /// Whether the name is still the id placeholder.
    pub fn has_placeholder_name(&self) -> bool {
        self.participant_name == self.participant_id.as_str()
    }
}

// ---------------------------------------------------------------------------
// Recent chat summary
// ---------------------------------------------------------------------------

/// One row of the "recent chats" list.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub participant_id: UserId,
    pub participant_name: String,
    pub unread_count: u32,
    pub ui_state: UiState,
    pub last_message: Option<String>,
}

impl From<&Conversation> for ConversationSummary {
    fn from(c: &Conversation) -> Self {
        Self {
            participant_id: c.participant_id.clone(),
            participant_name: c.participant_name.clone(),
            unread_count: c.unread_count,
            ui_state: c.ui_state,
            last_message: c.last_message().map(|m| m.content.clone()),
        }
    }
}
