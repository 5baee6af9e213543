// Identifiers, wire envelope and timestamp codec shared by every jobchat crate.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod time;
pub mod types;

pub use error::{ChatError, ConnectionError, DecodeError, FetchError};
pub use protocol::{ChatMessage, WireEnvelope};
pub use time::SentTime;
pub use types::{ConnectionMode, UiState, UserId};
