// Real-time chat channel: STOMP over WebSocket with reconnect and outbox.

pub mod backoff;
pub mod connection;
pub mod connector;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod stomp;

pub use backoff::Backoff;
pub use connection::{connect, ConnectionConfig, ConnectionHandle, ConnectionNotification};
pub use connector::{Connector, FrameChannel, WsConnector};
pub use stomp::{Frame, StompCommand};
