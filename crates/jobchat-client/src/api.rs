//! REST collaborators of the widget: identity, recent chats, unread counts,
//! history, read receipts and user search.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use jobchat_shared::{FetchError, UserId, WireEnvelope};

use crate::config::ClientConfig;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    pub user_id: UserId,
}

/// One entry of the recent-chats list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentChat {
    pub user_id: UserId,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

impl RecentChat {
    pub fn display_name(&self) -> String {
        join_name(&self.first_name, &self.last_name)
    }
}

/// A user search result: either a company or a person.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub user_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

impl SearchHit {
    pub fn is_company(&self) -> bool {
        self.company_name
            .as_deref()
            .is_some_and(|name| !name.trim().is_empty())
    }

    /// Company name for companies, "first last" for people. Empty when the
    /// backend sent neither.
    pub fn display_name(&self) -> String {
        if self.is_company() {
            return self.company_name.as_deref().unwrap_or_default().trim().to_string();
        }
        join_name(
            self.first_name.as_deref().unwrap_or_default(),
            self.last_name.as_deref().unwrap_or_default(),
        )
    }
}

/// A search row as the backend sends it. Company rows may come without a
/// `userId`; those cannot be opened and are skipped.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchRow {
    #[serde(default)]
    user_id: Option<UserId>,
    #[serde(default)]
    company_name: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
}

fn hits_from_rows(rows: Vec<SearchRow>) -> Vec<SearchHit> {
    let total = rows.len();
    let hits: Vec<SearchHit> = rows
        .into_iter()
        .filter_map(|row| {
            let user_id = row.user_id.filter(|id| !id.is_empty())?;
            Some(SearchHit {
                user_id,
                company_name: row.company_name,
                first_name: row.first_name,
                last_name: row.last_name,
            })
        })
        .collect();
    if hits.len() < total {
        debug!(skipped = total - hits.len(), "Search rows without a user id");
    }
    hits
}

fn join_name(first: &str, last: &str) -> String {
    format!("{} {}", first.trim(), last.trim()).trim().to_string()
}

/// Chat backend as seen by the widget. Every call is independent and may
/// fail on its own.
#[async_trait]
pub trait ChatApi: Send + Sync + 'static {
    async fn current_user(&self) -> Result<CurrentUser, FetchError>;

    async fn recent_chats(&self, user: &UserId) -> Result<Vec<RecentChat>, FetchError>;

    async fn unread_counts(&self, user: &UserId) -> Result<HashMap<UserId, u32>, FetchError>;

    /// Stored messages exchanged between `sender` and `receiver`.
    async fn messages(&self, sender: &UserId, receiver: &UserId) -> Result<Vec<WireEnvelope>, FetchError>;

    /// Mark everything `sender` sent to `receiver` as read.
    async fn mark_as_read(&self, sender: &UserId, receiver: &UserId) -> Result<(), FetchError>;

    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, FetchError>;
}

// ---------------------------------------------------------------------------
// Retry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Timeout of a single attempt.
    pub timeout: Duration,
    /// Attempts after the first one.
    pub retries: u32,
    /// Pause before the first retry, doubled for each further one.
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            timeout: config.http_timeout,
            retries: config.http_retries,
            base_delay: Duration::from_millis(200),
        }
    }
}

/// Run `attempt` until it succeeds, fails with a final error, or the retry
/// budget is spent. Each attempt runs under `policy.timeout`.
pub async fn with_retry<T, F, Fut>(endpoint: &str, policy: &RetryPolicy, mut attempt: F) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut delay = policy.base_delay;
    let mut tries = 0u32;
    loop {
        let result = match tokio::time::timeout(policy.timeout, attempt()).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout {
                endpoint: endpoint.to_string(),
            }),
        };

        match result {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && tries < policy.retries => {
                tries += 1;
                warn!(endpoint, attempt = tries, error = %e, "Request failed, retrying");
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
            }
            Err(e) => return Err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

pub struct HttpChatApi {
    client: Client,
    config: ClientConfig,
    retry: RetryPolicy,
}

impl HttpChatApi {
    pub fn new(config: &ClientConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .connect_timeout(config.http_timeout)
            .build()
            .map_err(|e| FetchError::Request {
                endpoint: config.api_url.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            config: config.clone(),
            retry: RetryPolicy::from_config(config),
        })
    }

    fn request(&self, method: Method, url: &str, query: &[(&str, &str)]) -> RequestBuilder {
        let builder = self.client.request(method, url).query(query);
        match &self.config.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send_once(&self, method: Method, name: &str, query: &[(&str, &str)]) -> Result<reqwest::Response, FetchError> {
        let url = self.config.endpoint(name);
        let resp = self
            .request(method, &url, query)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout {
                        endpoint: name.to_string(),
                    }
                } else {
                    FetchError::Request {
                        endpoint: name.to_string(),
                        reason: e.to_string(),
                    }
                }
            })?;

        if !resp.status().is_success() {
            return Err(FetchError::Status {
                endpoint: name.to_string(),
                status: resp.status().as_u16(),
            });
        }
        Ok(resp)
    }

    async fn get_json<T: DeserializeOwned>(&self, name: &str, query: &[(&str, &str)]) -> Result<T, FetchError> {
        with_retry(name, &self.retry, move || async move {
            let resp = self.send_once(Method::GET, name, query).await?;
            resp.json::<T>().await.map_err(|e| FetchError::Body {
                endpoint: name.to_string(),
                reason: e.to_string(),
            })
        })
        .await
    }

    async fn put(&self, name: &str, query: &[(&str, &str)]) -> Result<(), FetchError> {
        with_retry(name, &self.retry, move || async move {
            self.send_once(Method::PUT, name, query).await.map(|_| ())
        })
        .await
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn current_user(&self) -> Result<CurrentUser, FetchError> {
        self.get_json("current-user", &[]).await
    }

    async fn recent_chats(&self, user: &UserId) -> Result<Vec<RecentChat>, FetchError> {
        self.get_json("recent-chats", &[("userId", user.as_str())]).await
    }

    async fn unread_counts(&self, user: &UserId) -> Result<HashMap<UserId, u32>, FetchError> {
        self.get_json("unread-counts", &[("userId", user.as_str())]).await
    }

    async fn messages(&self, sender: &UserId, receiver: &UserId) -> Result<Vec<WireEnvelope>, FetchError> {
        let envelopes: Vec<WireEnvelope> = self
            .get_json(
                "messages",
                &[("senderId", sender.as_str()), ("receiverId", receiver.as_str())],
            )
            .await?;
        debug!(sender = %sender, receiver = %receiver, count = envelopes.len(), "Fetched history");
        Ok(envelopes)
    }

    async fn mark_as_read(&self, sender: &UserId, receiver: &UserId) -> Result<(), FetchError> {
        self.put(
            "mark-as-read",
            &[("senderId", sender.as_str()), ("receiverId", receiver.as_str())],
        )
        .await
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, FetchError> {
        let rows: Vec<SearchRow> = self.get_json("search", &[("query", query)]).await?;
        Ok(hits_from_rows(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(retries: u32) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_millis(200),
            retries,
            base_delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn search_hit_names() {
        let company: SearchHit =
            serde_json::from_str(r#"{"userId": 9, "companyName": " Acme Corp "}"#).unwrap();
        assert!(company.is_company());
        assert_eq!(company.display_name(), "Acme Corp");
        assert_eq!(company.user_id, UserId::new("9"));

        let person: SearchHit =
            serde_json::from_str(r#"{"userId": "p1", "firstName": "Alice", "lastName": "Nguyen", "companyName": ""}"#)
                .unwrap();
        assert!(!person.is_company());
        assert_eq!(person.display_name(), "Alice Nguyen");
    }

    #[test]
    fn search_rows_without_user_id_are_skipped() {
        let rows: Vec<SearchRow> = serde_json::from_str(
            r#"[
                {"companyName": "Ghost Ltd"},
                {"userId": null, "companyName": "Null Co"},
                {"userId": "", "firstName": "Nobody"},
                {"userId": 7, "companyName": "Acme"},
                {"userId": "u3", "firstName": "Lan"}
            ]"#,
        )
        .unwrap();

        let hits = hits_from_rows(rows);
        let ids: Vec<&str> = hits.iter().map(|h| h.user_id.as_str()).collect();
        assert_eq!(ids, ["7", "u3"]);
        assert_eq!(hits[0].display_name(), "Acme");
    }

    #[test]
    fn recent_chat_tolerates_missing_last_name() {
        let chat: RecentChat = serde_json::from_str(r#"{"userId": "u2", "firstName": "Bob"}"#).unwrap();
        assert_eq!(chat.display_name(), "Bob");
    }

    #[test]
    fn unread_counts_keyed_by_user() {
        let counts: HashMap<UserId, u32> = serde_json::from_str(r#"{"u1": 3, "42": 0}"#).unwrap();
        assert_eq!(counts.get(&UserId::new("u1")), Some(&3));
        assert_eq!(counts.get(&UserId::new("42")), Some(&0));
    }

    #[tokio::test]
    async fn retries_transient_failures() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = with_retry("messages", &fast_policy(2), move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(FetchError::Status {
                    endpoint: "messages".into(),
                    status: 503,
                })
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn final_errors_are_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = with_retry("current-user", &fast_policy(3), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(FetchError::Status {
                endpoint: "current-user".into(),
                status: 401,
            })
        })
        .await;
        assert!(result.unwrap_err().is_unauthorized());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_attempt_times_out() {
        let result: Result<(), _> = with_retry("search", &fast_policy(1), || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert_eq!(
            result,
            Err(FetchError::Timeout {
                endpoint: "search".into()
            })
        );
    }
}
