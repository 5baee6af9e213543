//! Client configuration loaded from environment variables.
//!
//! Every setting has a default so the widget can run against a local
//! backend with zero configuration.

use std::time::Duration;

use jobchat_shared::constants::{
    DEFAULT_HTTP_RETRIES, DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_OUTBOX_CAPACITY, RECONNECT_INITIAL_MS,
    RECONNECT_MAX_MS, SEARCH_DEBOUNCE_DEFAULT_MS, SEARCH_DEBOUNCE_MAX_MS, SEARCH_DEBOUNCE_MIN_MS,
};
use jobchat_net::ConnectionConfig;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the REST backend.
    /// Env: `JOBCHAT_API_URL`
    /// Default: `http://localhost:8080`
    pub api_url: String,

    /// Prefix under which the chat endpoints live.
    /// Env: `JOBCHAT_API_PREFIX`
    /// Default: `/api/chat`
    pub api_prefix: String,

    /// WebSocket endpoint of the STOMP broker.
    /// Env: `JOBCHAT_WS_URL`
    /// Default: `ws://localhost:8080/ws`
    pub ws_url: String,

    /// Bearer token sent with every REST call.
    /// Env: `JOBCHAT_AUTH_TOKEN`
    /// Default: none (cookie or anonymous session).
    pub auth_token: Option<String>,

    /// Per-attempt timeout for REST calls and the WebSocket handshake.
    /// Env: `JOBCHAT_HTTP_TIMEOUT_SECS`
    pub http_timeout: Duration,

    /// Extra attempts after a retryable REST failure.
    /// Env: `JOBCHAT_HTTP_RETRIES`
    pub http_retries: u32,

    /// Search debounce, clamped to 150..=300 ms.
    /// Env: `JOBCHAT_SEARCH_DEBOUNCE_MS`
    pub search_debounce: Duration,

    /// Env: `JOBCHAT_RECONNECT_INITIAL_MS`
    pub reconnect_initial: Duration,

    /// Env: `JOBCHAT_RECONNECT_MAX_MS`
    pub reconnect_max: Duration,

    /// Messages held while the channel is down.
    /// Env: `JOBCHAT_OUTBOX_CAPACITY`
    pub outbox_capacity: usize,

    /// Ring the terminal bell for background messages.
    /// Env: `JOBCHAT_NOTIFY_SOUND` (true/false)
    /// Default: `true`
    pub notify_sound: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8080".to_string(),
            api_prefix: "/api/chat".to_string(),
            ws_url: "ws://localhost:8080/ws".to_string(),
            auth_token: None,
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            http_retries: DEFAULT_HTTP_RETRIES,
            search_debounce: Duration::from_millis(SEARCH_DEBOUNCE_DEFAULT_MS),
            reconnect_initial: Duration::from_millis(RECONNECT_INITIAL_MS),
            reconnect_max: Duration::from_millis(RECONNECT_MAX_MS),
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
            notify_sound: true,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("JOBCHAT_API_URL") {
            config.api_url = url.trim_end_matches('/').to_string();
        }

        if let Some(prefix) = lookup("JOBCHAT_API_PREFIX") {
            let prefix = prefix.trim_end_matches('/');
            config.api_prefix = if prefix.starts_with('/') || prefix.is_empty() {
                prefix.to_string()
            } else {
                format!("/{prefix}")
            };
        }

        if let Some(url) = lookup("JOBCHAT_WS_URL") {
            if url.starts_with("ws://") || url.starts_with("wss://") {
                config.ws_url = url;
            } else {
                tracing::warn!(value = %url, "Invalid JOBCHAT_WS_URL, using default");
            }
        }

        if let Some(token) = lookup("JOBCHAT_AUTH_TOKEN") {
            if !token.trim().is_empty() {
                config.auth_token = Some(token.trim().to_string());
            }
        }

        if let Some(secs) = parse_var::<u64>(&lookup, "JOBCHAT_HTTP_TIMEOUT_SECS") {
            if secs > 0 {
                config.http_timeout = Duration::from_secs(secs);
            } else {
                tracing::warn!("JOBCHAT_HTTP_TIMEOUT_SECS must be positive, using default");
            }
        }

        if let Some(retries) = parse_var::<u32>(&lookup, "JOBCHAT_HTTP_RETRIES") {
            config.http_retries = retries;
        }

        if let Some(ms) = parse_var::<u64>(&lookup, "JOBCHAT_SEARCH_DEBOUNCE_MS") {
            let clamped = ms.clamp(SEARCH_DEBOUNCE_MIN_MS, SEARCH_DEBOUNCE_MAX_MS);
            if clamped != ms {
                tracing::warn!(value = ms, clamped, "JOBCHAT_SEARCH_DEBOUNCE_MS out of range");
            }
            config.search_debounce = Duration::from_millis(clamped);
        }

        if let Some(ms) = parse_var::<u64>(&lookup, "JOBCHAT_RECONNECT_INITIAL_MS") {
            config.reconnect_initial = Duration::from_millis(ms.max(1));
        }

        if let Some(ms) = parse_var::<u64>(&lookup, "JOBCHAT_RECONNECT_MAX_MS") {
            config.reconnect_max = Duration::from_millis(ms);
        }
        if config.reconnect_max < config.reconnect_initial {
            tracing::warn!("JOBCHAT_RECONNECT_MAX_MS below initial delay, raising it");
            config.reconnect_max = config.reconnect_initial;
        }

        if let Some(capacity) = parse_var::<usize>(&lookup, "JOBCHAT_OUTBOX_CAPACITY") {
            config.outbox_capacity = capacity;
        }

        if let Some(flag) = lookup("JOBCHAT_NOTIFY_SOUND") {
            match flag.to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => config.notify_sound = true,
                "false" | "0" | "no" | "off" => config.notify_sound = false,
                _ => tracing::warn!(value = %flag, "Invalid JOBCHAT_NOTIFY_SOUND, using default"),
            }
        }

        config
    }

    /// Full URL of a chat endpoint, e.g. `endpoint("search")`.
    pub fn endpoint(&self, name: &str) -> String {
        format!("{}{}/{}", self.api_url, self.api_prefix, name)
    }

    pub fn connection(&self) -> ConnectionConfig {
        ConnectionConfig {
            host: ws_host(&self.ws_url),
            handshake_timeout: self.http_timeout,
            reconnect_initial: self.reconnect_initial,
            reconnect_max: self.reconnect_max,
            outbox_capacity: self.outbox_capacity,
            ..ConnectionConfig::default()
        }
    }
}

/// Host part of a `ws://host:port/path` URL, used as the STOMP `host` header.
fn ws_host(url: &str) -> String {
    url.split_once("://")
        .and_then(|(_, rest)| rest.split(['/', ':']).next())
        .filter(|host| !host.is_empty())
        .unwrap_or("localhost")
        .to_string()
}

fn parse_var<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Invalid value, using default");
            None
        }
    }
}
