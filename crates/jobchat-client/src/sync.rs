//! Keeping the local store in step with the REST backend.
//!
//! Each call is independent: a failure is logged, leaves the state as it
//! was, and is reported only as `false`.

use tracing::{debug, warn};

use jobchat_shared::{ChatMessage, UserId};

use crate::events::ChatEvent;
use crate::state::{lock_state, ChatContext};

impl ChatContext {
    /// Pull the recent-chats list and merge names into the store. The
    /// server's order (most recent first) ends up at the top of the list.
    pub async fn refresh_recent(&self) -> bool {
        let Some(me) = self.self_id() else {
            return false;
        };

        let chats = match self.api.recent_chats(&me).await {
            Ok(chats) => chats,
            Err(e) => {
                warn!(error = %e, "Failed to load recent chats");
                return false;
            }
        };

        {
            let mut state = lock_state(&self.state);
            for chat in chats.iter().rev() {
                if chat.user_id.is_empty() || chat.user_id == me {
                    continue;
                }
                state.store.upsert_conversation(&chat.user_id, &chat.display_name());
            }
        }
        debug!(count = chats.len(), "Recent chats refreshed");
        self.events.emit(ChatEvent::ConversationsChanged);
        true
    }

    pub async fn refresh_unread_counts(&self) -> bool {
        let Some(me) = self.self_id() else {
            return false;
        };

        let mut counts = match self.api.unread_counts(&me).await {
            Ok(counts) => counts,
            Err(e) => {
                warn!(error = %e, "Failed to load unread counts");
                return false;
            }
        };
        counts.remove(&me);

        let changed: Vec<(UserId, u32)> = {
            let mut state = lock_state(&self.state);
            state.store.apply_unread_counts(&counts);
            counts
                .keys()
                .filter_map(|id| state.store.get(id).map(|c| (id.clone(), c.unread_count)))
                .collect()
        };
        for (participant, count) in changed {
            self.events.emit(ChatEvent::UnreadChanged { participant, count });
        }
        true
    }

    /// Fetch the stored history with `participant` and merge it into the log.
    pub async fn load_history(&self, participant: &UserId) -> bool {
        let Some(me) = self.self_id() else {
            return false;
        };

        let envelopes = match self.api.messages(&me, participant).await {
            Ok(envelopes) => envelopes,
            Err(e) => {
                warn!(participant = %participant, error = %e, "Failed to load history");
                return false;
            }
        };

        let history: Vec<ChatMessage> = envelopes
            .into_iter()
            .map(|envelope| {
                let (message, time_error) = ChatMessage::from_envelope(envelope, &me);
                if let Some(e) = time_error {
                    debug!(participant = %participant, error = %e, "History entry without usable sentTime");
                }
                message
            })
            .collect();
        let total = history.len();

        let merged = lock_state(&self.state).store.load_history(participant, history);
        match merged {
            Ok(kept) => {
                debug!(participant = %participant, total, kept_local = kept, "History merged");
                self.events.emit(ChatEvent::MessageAppended {
                    participant: participant.clone(),
                    from_self: false,
                });
                true
            }
            Err(e) => {
                warn!(participant = %participant, error = %e, "Discarding history");
                false
            }
        }
    }

    /// Tell the server everything `sender` sent to `receiver` has been read.
    pub async fn mark_read(&self, sender: &UserId, receiver: &UserId) -> bool {
        match self.api.mark_as_read(sender, receiver).await {
            Ok(()) => {
                debug!(sender = %sender, "Marked conversation read");
                true
            }
            Err(e) => {
                warn!(sender = %sender, error = %e, "Failed to mark messages as read");
                false
            }
        }
    }
}
