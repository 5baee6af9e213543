//! # jobchat-store
//!
//! In-memory conversation state for the chat widget.
//!
//! The [`ConversationStore`] is the single source of truth for conversations,
//! their message logs, unread counters and presentation state. It is a plain
//! owned value with synchronous mutators; callers that share it across tasks
//! wrap it in a mutex and never hold the lock across an `.await`.

pub mod conversations;
pub mod models;

mod error;

pub use conversations::ConversationStore;
pub use error::StoreError;
pub use models::*;
