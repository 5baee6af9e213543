use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{MAX_MESSAGE_SIZE, PENDING_MATCH_WINDOW_SECS};
use crate::error::DecodeError;
use crate::time::SentTime;
use crate::types::UserId;

/// Message envelope exchanged with the backend, both over the real-time
/// channel and in history responses.
///
/// `sent_time` is kept as raw JSON so that a malformed timestamp does not
/// make the whole envelope undecodable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireEnvelope {
    pub sender_id: UserId,
    pub receiver_id: UserId,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub sent_time: Value,
    #[serde(default)]
    pub is_sent_by_current_user: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_read: Option<bool>,
}

impl WireEnvelope {
    pub fn from_json(body: &str) -> Result<Self, DecodeError> {
        if body.len() > MAX_MESSAGE_SIZE {
            return Err(DecodeError::Frame(format!(
                "body of {} bytes exceeds {MAX_MESSAGE_SIZE}",
                body.len()
            )));
        }
        Ok(serde_json::from_str(body)?)
    }

    pub fn to_json(&self) -> Result<String, DecodeError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A chat message as held by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: String,
    pub sent_time: SentTime,
    /// Derived from `sender_id` against the local user; never read off the wire.
    pub is_sent_by_current_user: bool,
    /// Only meaningful for messages the local user sent.
    pub is_read: bool,
    /// Sent from this client and not yet seen in server history.
    #[serde(default)]
    pub pending: bool,
}

impl ChatMessage {
    /// A message typed by the local user, stamped now.
    pub fn outgoing(self_id: &UserId, receiver_id: &UserId, content: impl Into<String>) -> Self {
        Self {
            sender_id: self_id.clone(),
            receiver_id: receiver_id.clone(),
            content: content.into(),
            sent_time: SentTime::now(),
            is_sent_by_current_user: true,
            is_read: false,
            pending: true,
        }
    }

    /// Build a message from a wire envelope. A bad timestamp falls back to
    /// now; the decode error is handed back so the caller can log it.
    pub fn from_envelope(envelope: WireEnvelope, self_id: &UserId) -> (Self, Option<DecodeError>) {
        let (sent_time, time_error) = match SentTime::from_json(&envelope.sent_time) {
            Ok(t) => (t, None),
            Err(e) => (SentTime::now(), Some(e)),
        };

        let is_sent_by_current_user = &envelope.sender_id == self_id;
        let message = Self {
            is_sent_by_current_user,
            is_read: envelope.is_read.unwrap_or(false),
            sender_id: envelope.sender_id,
            receiver_id: envelope.receiver_id,
            content: envelope.content,
            sent_time,
            pending: false,
        };
        (message, time_error)
    }

    pub fn to_envelope(&self) -> WireEnvelope {
        WireEnvelope {
            sender_id: self.sender_id.clone(),
            receiver_id: self.receiver_id.clone(),
            content: self.content.clone(),
            sent_time: self.sent_time.to_json(),
            is_sent_by_current_user: self.is_sent_by_current_user,
            is_read: None,
        }
    }

    /// The other party of this message from the local user's point of view.
    pub fn counterpart(&self) -> &UserId {
        if self.is_sent_by_current_user {
            &self.receiver_id
        } else {
            &self.sender_id
        }
    }

    /// Whether this server copy stands for a message already held locally.
    ///
    /// Backends store `sentTime` at their own precision (often whole seconds),
    /// so timestamps only have to agree within a window.
    pub fn confirms(&self, local: &ChatMessage) -> bool {
        let drift = (self.sent_time.as_utc() - local.sent_time.as_utc()).num_seconds().abs();
        self.sender_id == local.sender_id
            && self.receiver_id == local.receiver_id
            && self.content == local.content
            && drift <= PENDING_MATCH_WINDOW_SECS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn me() -> UserId {
        UserId::new("1")
    }

    #[test]
    fn envelope_uses_backend_field_names() {
        let msg = ChatMessage {
            sender_id: me(),
            receiver_id: UserId::new("2"),
            content: "hello".into(),
            sent_time: SentTime::decode(&[2024, 2, 29, 8, 0, 0, 0]).unwrap(),
            is_sent_by_current_user: true,
            is_read: false,
            pending: false,
        };
        let json: Value = serde_json::from_str(&msg.to_envelope().to_json().unwrap()).unwrap();
        assert_eq!(json["senderId"], "1");
        assert_eq!(json["receiverId"], "2");
        assert_eq!(json["sentTime"], serde_json::json!([2024, 2, 29, 8, 0, 0, 0]));
        assert_eq!(json["isSentByCurrentUser"], true);
        assert!(json.get("isRead").is_none());
    }

    #[test]
    fn sent_flag_is_derived_not_trusted() {
        let body = r#"{"senderId":2,"receiverId":1,"content":"hi",
            "sentTime":[2024,1,1,10,0,0,0],"isSentByCurrentUser":true}"#;
        let envelope = WireEnvelope::from_json(body).unwrap();
        let (msg, err) = ChatMessage::from_envelope(envelope, &me());
        assert!(err.is_none());
        assert!(!msg.is_sent_by_current_user);
        assert_eq!(msg.counterpart(), &UserId::new("2"));
    }

    #[test]
    fn bad_timestamp_falls_back_to_now() {
        let body = r#"{"senderId":"2","receiverId":"1","content":"hi","sentTime":[2024,"x"]}"#;
        let envelope = WireEnvelope::from_json(body).unwrap();
        let before = SentTime::now();
        let (msg, err) = ChatMessage::from_envelope(envelope, &me());
        assert!(matches!(err, Some(DecodeError::Timestamp(_))));
        assert!(msg.sent_time >= before);
    }

    #[test]
    fn missing_timestamp_is_reported() {
        let body = r#"{"senderId":"2","receiverId":"1","content":"hi"}"#;
        let envelope = WireEnvelope::from_json(body).unwrap();
        let (_, err) = ChatMessage::from_envelope(envelope, &me());
        assert!(matches!(err, Some(DecodeError::MissingField("sentTime"))));
    }

    #[test]
    fn server_copy_at_second_precision_confirms_pending_send() {
        let mut local = ChatMessage::outgoing(&me(), &UserId::new("2"), "hello");
        local.sent_time = SentTime::decode(&[2024, 6, 1, 10, 0, 5, 123_456]).unwrap();
        assert!(local.pending);

        let body = r#"{"senderId":"1","receiverId":"2","content":"hello","sentTime":[2024,6,1,10,0,5,0]}"#;
        let (stored, _) = ChatMessage::from_envelope(WireEnvelope::from_json(body).unwrap(), &me());
        assert!(!stored.pending);
        assert!(stored.confirms(&local));

        let (other, _) = ChatMessage::from_envelope(
            WireEnvelope::from_json(&body.replace("hello", "bye")).unwrap(),
            &me(),
        );
        assert!(!other.confirms(&local));
    }

    #[test]
    fn envelope_without_sender_is_rejected() {
        assert!(WireEnvelope::from_json(r#"{"receiverId":"1"}"#).is_err());
        assert!(WireEnvelope::from_json("not json").is_err());
    }
}
