/// Application name
pub const APP_NAME: &str = "jobchat";

/// IANA name of the civil zone every timestamp is rendered in
pub const DISPLAY_TIME_ZONE: &str = "Asia/Ho_Chi_Minh";

/// Number of elements in the wire timestamp array
pub const WIRE_TIME_LEN: usize = 7;

/// STOMP protocol version negotiated on CONNECT
pub const STOMP_VERSION: &str = "1.2";

/// Destination every outbound chat message is published to
pub const SEND_DESTINATION: &str = "/app/chat";

/// Per-user inbound queue; `{user}` is replaced by the local user id
pub const USER_QUEUE_TEMPLATE: &str = "/user/{user}/queue/messages";

/// Maximum chat message body in bytes (64 KiB)
pub const MAX_MESSAGE_SIZE: usize = 65_536;

/// Default per-attempt timeout for REST collaborator calls
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

/// Default number of retries after the first failed REST attempt
pub const DEFAULT_HTTP_RETRIES: u32 = 2;

/// Search debounce window bounds in milliseconds
pub const SEARCH_DEBOUNCE_MIN_MS: u64 = 150;
pub const SEARCH_DEBOUNCE_MAX_MS: u64 = 300;
pub const SEARCH_DEBOUNCE_DEFAULT_MS: u64 = 250;

/// Reconnect backoff for the real-time channel
pub const RECONNECT_INITIAL_MS: u64 = 500;
pub const RECONNECT_MAX_MS: u64 = 30_000;

/// Messages kept while the channel is down
pub const DEFAULT_OUTBOX_CAPACITY: usize = 256;

/// How far the server's stored `sentTime` may drift from the local stamp of a
/// pending send and still be taken as the same message
pub const PENDING_MATCH_WINDOW_SECS: i64 = 60;

/// Build the inbound queue destination for `user_id`.
pub fn user_queue(user_id: &str) -> String {
    USER_QUEUE_TEMPLATE.replace("{user}", user_id)
}
