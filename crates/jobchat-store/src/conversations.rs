//! Conversation bookkeeping: creation on first reference, message logs,
//! unread counters and the one-active rule.

use std::collections::HashMap;

use tracing::debug;

use jobchat_shared::{ChatMessage, UiState, UserId};

use crate::error::{Result, StoreError};
use crate::models::{Conversation, ConversationSummary};

#[derive(Debug, Default)]
pub struct ConversationStore {
    conversations: HashMap<UserId, Conversation>,
    /// Most recently touched first.
    recent: Vec<UserId>,
    /// Minimized bars, in the order they were minimized. No duplicates.
    minimized: Vec<UserId>,
    active: Option<UserId>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    pub fn get(&self, participant: &UserId) -> Option<&Conversation> {
        self.conversations.get(participant)
    }

    pub fn contains(&self, participant: &UserId) -> bool {
        self.conversations.contains_key(participant)
    }

    /// Create the conversation if unseen, otherwise refresh its name. An empty
    /// name never replaces a known one. Returns `true` when created.
    pub fn upsert_conversation(&mut self, participant: &UserId, name: &str) -> bool {
        let created = self.ensure(participant, name);
        if !created && !name.trim().is_empty() {
            if let Some(conv) = self.conversations.get_mut(participant) {
                conv.participant_name = name.trim().to_string();
            }
        }
        self.touch(participant);
        created
    }

    /// Append to the participant's log, creating the conversation if needed.
    pub fn append_message(&mut self, participant: &UserId, message: ChatMessage) -> Result<()> {
        if &message.sender_id != participant && &message.receiver_id != participant {
            return Err(StoreError::WrongConversation {
                participant: participant.clone(),
                sender: message.sender_id,
                receiver: message.receiver_id,
            });
        }

        self.ensure(participant, "");
        if let Some(conv) = self.conversations.get_mut(participant) {
            conv.messages.push(message);
        }
        self.touch(participant);
        Ok(())
    }

    /// Change how a conversation is presented.
    ///
    /// Activating a conversation closes the previously active one and clears
    /// its own unread count. Unknown participants are left alone and `false`
    /// is returned.
    pub fn set_ui_state(&mut self, participant: &UserId, state: UiState) -> bool {
        if !self.contains(participant) {
            debug!(participant = %participant, ?state, "Ignoring state change for unknown conversation");
            return false;
        }

        match state {
            UiState::Active => {
                if let Some(previous) = self.active.take() {
                    if &previous != participant {
                        self.set_state(&previous, UiState::Closed);
                    }
                }
                self.minimized.retain(|id| id != participant);
                self.active = Some(participant.clone());
                if let Some(conv) = self.conversations.get_mut(participant) {
                    conv.unread_count = 0;
                }
            }
            UiState::Minimized => {
                self.release_active(participant);
                if !self.minimized.contains(participant) {
                    self.minimized.push(participant.clone());
                }
            }
            UiState::Closed => {
                self.release_active(participant);
                self.minimized.retain(|id| id != participant);
            }
        }

        self.set_state(participant, state);
        true
    }

    /// Minimize a known conversation. Returns `true` only when a new bar was
    /// added; a participant never gets two bars.
    pub fn minimize(&mut self, participant: &UserId) -> bool {
        if !self.contains(participant) {
            return false;
        }
        let had_bar = self.minimized.contains(participant);
        self.set_ui_state(participant, UiState::Minimized);
        !had_bar
    }

    /// Count one more unread message, creating the conversation if needed.
    pub fn increment_unread(&mut self, participant: &UserId) -> u32 {
        self.ensure(participant, "");
        match self.conversations.get_mut(participant) {
            Some(conv) => {
                conv.unread_count = conv.unread_count.saturating_add(1);
                conv.unread_count
            }
            None => 0,
        }
    }

    pub fn reset_unread(&mut self, participant: &UserId) -> Result<()> {
        let conv = self
            .conversations
            .get_mut(participant)
            .ok_or_else(|| StoreError::UnknownConversation(participant.clone()))?;
        conv.unread_count = 0;
        Ok(())
    }

    /// Apply a server-side unread snapshot. Counts only ever describe messages
    /// the server already knows about, so the active conversation stays at 0.
    pub fn apply_unread_counts(&mut self, counts: &HashMap<UserId, u32>) {
        for (participant, count) in counts {
            if self.ensure(participant, "") {
                self.touch(participant);
            }
            let is_active = self.active.as_ref() == Some(participant);
            if let Some(conv) = self.conversations.get_mut(participant) {
                conv.unread_count = if is_active { 0 } else { *count };
            }
        }
    }

    /// Replace a log with server history.
    ///
    /// A local message survives only when no server copy confirms it and it
    /// is either a pending send or newer than everything the server returned
    /// (it arrived on the channel after the history was read). Survivors go
    /// after the server's list. Returns how many local messages were kept.
    pub fn load_history(&mut self, participant: &UserId, history: Vec<ChatMessage>) -> Result<usize> {
        if let Some(stray) = history
            .iter()
            .find(|m| &m.sender_id != participant && &m.receiver_id != participant)
        {
            return Err(StoreError::WrongConversation {
                participant: participant.clone(),
                sender: stray.sender_id.clone(),
                receiver: stray.receiver_id.clone(),
            });
        }

        let conv = self
            .conversations
            .get_mut(participant)
            .ok_or_else(|| StoreError::UnknownConversation(participant.clone()))?;

        let newest = history.iter().map(|m| m.sent_time).max();
        let local = std::mem::replace(&mut conv.messages, history);
        // Each server copy confirms at most one local message.
        let mut claimed = vec![false; conv.messages.len()];
        let mut survivors = Vec::new();
        for message in local
            .into_iter()
            .filter(|m| m.pending || newest.map_or(true, |t| m.sent_time > t))
        {
            let matched = conv
                .messages
                .iter()
                .enumerate()
                .position(|(i, m)| !claimed[i] && m.confirms(&message));
            match matched {
                Some(i) => claimed[i] = true,
                None => survivors.push(message),
            }
        }

        let kept = survivors.len();
        conv.messages.extend(survivors);
        Ok(kept)
    }

    pub fn list_recent(&self) -> Vec<ConversationSummary> {
        self.recent
            .iter()
            .filter_map(|id| self.conversations.get(id))
            .map(ConversationSummary::from)
            .collect()
    }

    pub fn list_minimized(&self) -> Vec<&Conversation> {
        self.minimized
            .iter()
            .filter_map(|id| self.conversations.get(id))
            .collect()
    }

    pub fn get_active(&self) -> Option<&Conversation> {
        self.active.as_ref().and_then(|id| self.conversations.get(id))
    }

    pub fn active_id(&self) -> Option<&UserId> {
        self.active.as_ref()
    }

    pub fn is_active(&self, participant: &UserId) -> bool {
        self.active.as_ref() == Some(participant)
    }

    pub fn total_unread(&self) -> u32 {
        self.conversations
            .values()
            .fold(0u32, |acc, c| acc.saturating_add(c.unread_count))
    }

    fn ensure(&mut self, participant: &UserId, name: &str) -> bool {
        if self.conversations.contains_key(participant) {
            return false;
        }
        debug!(participant = %participant, "Creating conversation");
        self.conversations
            .insert(participant.clone(), Conversation::new(participant.clone(), name));
        true
    }

    fn touch(&mut self, participant: &UserId) {
        self.recent.retain(|id| id != participant);
        self.recent.insert(0, participant.clone());
    }

    fn release_active(&mut self, participant: &UserId) {
        if self.active.as_ref() == Some(participant) {
            self.active = None;
        }
    }

    fn set_state(&mut self, participant: &UserId, state: UiState) {
        if let Some(conv) = self.conversations.get_mut(participant) {
            conv.ui_state = state;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobchat_shared::SentTime;

    fn me() -> UserId {
        UserId::new("me")
    }

    fn uid(s: &str) -> UserId {
        UserId::new(s)
    }

    fn inbound(from: &str, text: &str, second: i64) -> ChatMessage {
        ChatMessage {
            sender_id: uid(from),
            receiver_id: me(),
            content: text.into(),
            sent_time: SentTime::decode(&[2024, 6, 1, 10, 0, second, 0]).unwrap(),
            is_sent_by_current_user: false,
            is_read: false,
            pending: false,
        }
    }

    fn active_count(store: &ConversationStore) -> usize {
        store
            .conversations
            .values()
            .filter(|c| c.ui_state == UiState::Active)
            .count()
    }

    #[test]
    fn at_most_one_active_under_arbitrary_transitions() {
        let mut store = ConversationStore::new();
        let ids: Vec<UserId> = (0..5).map(|i| uid(&format!("p{i}"))).collect();
        for id in &ids {
            store.upsert_conversation(id, "");
        }

        let states = [UiState::Active, UiState::Minimized, UiState::Closed];
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        for _ in 0..500 {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            let id = &ids[(seed % ids.len() as u64) as usize];
            let state = states[((seed >> 8) % 3) as usize];
            store.set_ui_state(id, state);

            assert!(active_count(&store) <= 1);
            match store.active_id() {
                Some(active) => assert_eq!(store.get(active).unwrap().ui_state, UiState::Active),
                None => assert_eq!(active_count(&store), 0),
            }
        }
    }

    #[test]
    fn activating_closes_previous_rather_than_minimizing() {
        let mut store = ConversationStore::new();
        store.upsert_conversation(&uid("a"), "Alice");
        store.upsert_conversation(&uid("b"), "Bob");

        store.set_ui_state(&uid("a"), UiState::Active);
        store.set_ui_state(&uid("b"), UiState::Active);

        assert_eq!(store.get(&uid("a")).unwrap().ui_state, UiState::Closed);
        assert_eq!(store.get_active().unwrap().participant_name, "Bob");
        assert!(store.list_minimized().is_empty());
    }

    #[test]
    fn unread_resets_on_activation() {
        let mut store = ConversationStore::new();
        for _ in 0..3 {
            store.increment_unread(&uid("a"));
        }
        assert_eq!(store.get(&uid("a")).unwrap().unread_count, 3);

        store.set_ui_state(&uid("a"), UiState::Active);
        assert_eq!(store.get(&uid("a")).unwrap().unread_count, 0);
    }

    #[test]
    fn append_auto_creates_and_bumps_recent() {
        let mut store = ConversationStore::new();
        store.upsert_conversation(&uid("a"), "Alice");
        store.append_message(&uid("b"), inbound("b", "hi", 0)).unwrap();

        let recent = store.list_recent();
        assert_eq!(recent[0].participant_id, uid("b"));
        assert_eq!(recent[0].participant_name, "b");
        assert_eq!(recent[0].last_message.as_deref(), Some("hi"));
        assert_eq!(recent[1].participant_id, uid("a"));
    }

    #[test]
    fn append_rejects_foreign_message() {
        let mut store = ConversationStore::new();
        let err = store.append_message(&uid("a"), inbound("b", "hi", 0)).unwrap_err();
        assert!(matches!(err, StoreError::WrongConversation { .. }));
        assert!(store.is_empty());
    }

    #[test]
    fn upsert_keeps_known_name_over_empty() {
        let mut store = ConversationStore::new();
        assert!(store.upsert_conversation(&uid("a"), ""));
        assert!(store.get(&uid("a")).unwrap().has_placeholder_name());

        assert!(!store.upsert_conversation(&uid("a"), "Alice"));
        assert!(!store.upsert_conversation(&uid("a"), " "));
        assert_eq!(store.get(&uid("a")).unwrap().participant_name, "Alice");
    }

    #[test]
    fn minimize_never_duplicates_bars() {
        let mut store = ConversationStore::new();
        store.upsert_conversation(&uid("a"), "Alice");

        assert!(store.minimize(&uid("a")));
        assert!(!store.minimize(&uid("a")));
        store.set_ui_state(&uid("a"), UiState::Minimized);
        assert_eq!(store.list_minimized().len(), 1);

        assert!(!store.minimize(&uid("ghost")));
    }

    #[test]
    fn activating_removes_bar() {
        let mut store = ConversationStore::new();
        store.upsert_conversation(&uid("a"), "Alice");
        store.minimize(&uid("a"));
        store.set_ui_state(&uid("a"), UiState::Active);
        assert!(store.list_minimized().is_empty());
    }

    #[test]
    fn unknown_participant_state_change_is_noop() {
        let mut store = ConversationStore::new();
        assert!(!store.set_ui_state(&uid("ghost"), UiState::Active));
        assert!(store.get_active().is_none());
        assert!(store.reset_unread(&uid("ghost")).is_err());
    }

    #[test]
    fn history_merge_keeps_unsynced_local_messages() {
        let mut store = ConversationStore::new();
        let a = uid("a");
        store.upsert_conversation(&a, "Alice");

        let server_copy = inbound("a", "first", 1);
        let mut local_only = ChatMessage::outgoing(&me(), &a, "pending");
        local_only.sent_time = SentTime::decode(&[2024, 6, 1, 10, 0, 5, 0]).unwrap();
        store.append_message(&a, server_copy.clone()).unwrap();
        store.append_message(&a, local_only.clone()).unwrap();

        let history = vec![inbound("a", "zeroth", 0), server_copy];
        let kept = store.load_history(&a, history).unwrap();

        assert_eq!(kept, 1);
        let contents: Vec<_> = store
            .get(&a)
            .unwrap()
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(contents, ["zeroth", "first", "pending"]);
    }

    #[test]
    fn reopening_does_not_duplicate_sends_stored_at_lower_precision() {
        let mut store = ConversationStore::new();
        let a = uid("a");
        store.upsert_conversation(&a, "Alice");

        let mut sent = ChatMessage::outgoing(&me(), &a, "hello");
        sent.sent_time = SentTime::decode(&[2024, 6, 1, 10, 0, 5, 123_456]).unwrap();
        store.append_message(&a, sent).unwrap();

        let stored = ChatMessage {
            sender_id: me(),
            receiver_id: a.clone(),
            content: "hello".into(),
            sent_time: SentTime::decode(&[2024, 6, 1, 10, 0, 5, 0]).unwrap(),
            is_sent_by_current_user: true,
            is_read: false,
            pending: false,
        };
        for _ in 0..2 {
            assert_eq!(store.load_history(&a, vec![stored.clone()]).unwrap(), 0);
            let conv = store.get(&a).unwrap();
            assert_eq!(conv.messages.len(), 1);
            assert!(!conv.messages[0].pending);
        }
    }

    #[test]
    fn fallback_timestamps_do_not_pile_up_across_reloads() {
        let mut store = ConversationStore::new();
        let a = uid("a");
        store.upsert_conversation(&a, "Alice");

        for _ in 0..3 {
            // a history entry whose sentTime could not be read gets a fresh stamp each time
            let mut entry = inbound("a", "undated", 0);
            entry.sent_time = SentTime::now();
            store.load_history(&a, vec![entry]).unwrap();
        }
        assert_eq!(store.get(&a).unwrap().messages.len(), 1);
    }

    #[test]
    fn message_received_after_history_snapshot_survives() {
        let mut store = ConversationStore::new();
        let a = uid("a");
        store.upsert_conversation(&a, "Alice");
        store.append_message(&a, inbound("a", "old", 1)).unwrap();
        store.append_message(&a, inbound("a", "live", 30)).unwrap();

        let kept = store.load_history(&a, vec![inbound("a", "old", 1)]).unwrap();

        assert_eq!(kept, 1);
        let contents: Vec<_> = store.get(&a).unwrap().messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["old", "live"]);
    }

    #[test]
    fn repeated_text_keeps_unconfirmed_copy() {
        let mut store = ConversationStore::new();
        let a = uid("a");
        store.upsert_conversation(&a, "Alice");
        store.append_message(&a, ChatMessage::outgoing(&me(), &a, "ok")).unwrap();
        store.append_message(&a, ChatMessage::outgoing(&me(), &a, "ok")).unwrap();

        let mut stored = ChatMessage::outgoing(&me(), &a, "ok");
        stored.pending = false;
        let kept = store.load_history(&a, vec![stored]).unwrap();

        assert_eq!(kept, 1);
        let pending: Vec<bool> = store.get(&a).unwrap().messages.iter().map(|m| m.pending).collect();
        assert_eq!(pending, [false, true]);
    }

    #[test]
    fn display_sort_is_stable_and_leaves_log_alone() {
        let mut store = ConversationStore::new();
        let a = uid("a");
        store.append_message(&a, inbound("a", "late", 9)).unwrap();
        store.append_message(&a, inbound("a", "early", 1)).unwrap();
        store.append_message(&a, inbound("a", "early-too", 1)).unwrap();

        let conv = store.get(&a).unwrap();
        let sorted: Vec<&str> = conv
            .sorted_messages()
            .into_iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(sorted, ["early", "early-too", "late"]);
        assert_eq!(conv.messages[0].content, "late");
    }

    #[test]
    fn server_counts_never_raise_active() {
        let mut store = ConversationStore::new();
        store.upsert_conversation(&uid("a"), "Alice");
        store.set_ui_state(&uid("a"), UiState::Active);

        let counts = HashMap::from([(uid("a"), 4), (uid("b"), 2)]);
        store.apply_unread_counts(&counts);

        assert_eq!(store.get(&uid("a")).unwrap().unread_count, 0);
        assert_eq!(store.get(&uid("b")).unwrap().unread_count, 2);
        assert_eq!(store.total_unread(), 2);
    }

    #[test]
    fn server_counts_for_unseen_participant_show_in_recent() {
        let mut store = ConversationStore::new();
        store.upsert_conversation(&uid("a"), "Alice");

        store.apply_unread_counts(&HashMap::from([(uid("z"), 3)]));

        let recent = store.list_recent();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].participant_id, uid("z"));
        assert_eq!(recent[0].unread_count, 3);
        assert_eq!(recent[1].participant_id, uid("a"));
        let listed: u32 = recent.iter().map(|r| r.unread_count).sum();
        assert_eq!(listed, store.total_unread());
    }
}
