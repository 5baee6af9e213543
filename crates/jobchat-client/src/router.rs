//! Dispatch of inbound chat messages into the conversation store.
//!
//! Routing is synchronous and runs under the state lock. Anything that needs
//! I/O (the read receipt, the notification sound) is handed back as a
//! [`RouteEffects`] for the caller to run once the lock is released.

use thiserror::Error;
use tracing::{debug, warn};

use jobchat_shared::{ChatMessage, DecodeError, UiState, UserId, WireEnvelope};
use jobchat_store::{ConversationStore, StoreError};

#[derive(Error, Debug)]
pub enum RouteError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Read receipt to send: everything `sender` sent to `receiver` is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkRead {
    pub sender: UserId,
    pub receiver: UserId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteEffects {
    pub mark_read: Option<MarkRead>,
    pub play_sound: bool,
}

/// Where an inbound message ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    /// Our own message echoed back by the server; already shown.
    SelfEcho,
    /// Neither sender nor receiver is the local user.
    Misaddressed,
    /// Appended to the conversation currently open.
    Active { participant: UserId },
    /// Appended to a background conversation.
    Background {
        participant: UserId,
        unread: u32,
        /// The conversation did not exist before this message.
        created: bool,
        /// A minimized bar was added for it.
        minimized: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteOutcome {
    pub routed: Routed,
    pub effects: RouteEffects,
}

pub struct MessageRouter {
    self_id: UserId,
}

impl MessageRouter {
    pub fn new(self_id: UserId) -> Self {
        Self { self_id }
    }

    pub fn self_id(&self) -> &UserId {
        &self.self_id
    }

    /// Decode one message body and apply it to `store`.
    ///
    /// `foreground` is whether the host app is currently visible; when it is
    /// not, a notification sound is requested.
    pub fn route(&self, store: &mut ConversationStore, body: &str, foreground: bool) -> Result<RouteOutcome, RouteError> {
        let envelope = WireEnvelope::from_json(body)?;
        if envelope.sender_id.is_empty() {
            return Err(DecodeError::MissingField("senderId").into());
        }

        let (message, time_error) = ChatMessage::from_envelope(envelope, &self.self_id);
        if let Some(e) = time_error {
            warn!(sender = %message.sender_id, error = %e, "Unreadable sentTime, using arrival time");
        }

        if message.is_sent_by_current_user {
            debug!(receiver = %message.receiver_id, "Skipping echo of own message");
            return Ok(RouteOutcome {
                routed: Routed::SelfEcho,
                effects: RouteEffects::default(),
            });
        }

        if message.receiver_id != self.self_id {
            warn!(
                sender = %message.sender_id,
                receiver = %message.receiver_id,
                "Dropping message not addressed to this user"
            );
            return Ok(RouteOutcome {
                routed: Routed::Misaddressed,
                effects: RouteEffects::default(),
            });
        }

        let participant = message.sender_id.clone();
        let effects = RouteEffects {
            mark_read: None,
            play_sound: !foreground,
        };

        if store.is_active(&participant) {
            store.append_message(&participant, message)?;
            return Ok(RouteOutcome {
                routed: Routed::Active {
                    participant: participant.clone(),
                },
                effects: RouteEffects {
                    mark_read: Some(MarkRead {
                        sender: participant,
                        receiver: self.self_id.clone(),
                    }),
                    ..effects
                },
            });
        }

        let created = !store.contains(&participant);
        store.append_message(&participant, message)?;
        let unread = store.increment_unread(&participant);

        let was_closed = store
            .get(&participant)
            .is_some_and(|c| c.ui_state == UiState::Closed);
        let minimized = was_closed && store.minimize(&participant);

        debug!(participant = %participant, unread, created, minimized, "Background message");
        Ok(RouteOutcome {
            routed: Routed::Background {
                participant,
                unread,
                created,
                minimized,
            },
            effects,
        })
    }
}
