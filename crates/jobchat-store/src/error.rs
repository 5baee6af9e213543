use thiserror::Error;

use jobchat_shared::UserId;

/// Errors produced by the store layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The participant has no conversation.
    #[error("Unknown conversation: {0}")]
    UnknownConversation(UserId),

    /// A message was filed under a conversation it does not belong to.
    #[error("Message between {sender} and {receiver} does not involve {participant}")]
    WrongConversation {
        participant: UserId,
        sender: UserId,
        receiver: UserId,
    },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
