//! Minimal STOMP 1.2 framing.
//!
//! Only the frames a chat client exchanges are modelled. One WebSocket text
//! message carries at most one frame; a message made only of end-of-line
//! characters is a heart-beat.

use std::fmt;

use jobchat_shared::constants::STOMP_VERSION;
use jobchat_shared::DecodeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StompCommand {
    Connect,
    Connected,
    Subscribe,
    Unsubscribe,
    Send,
    Message,
    Receipt,
    Error,
    Disconnect,
}

impl StompCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            StompCommand::Connect => "CONNECT",
            StompCommand::Connected => "CONNECTED",
            StompCommand::Subscribe => "SUBSCRIBE",
            StompCommand::Unsubscribe => "UNSUBSCRIBE",
            StompCommand::Send => "SEND",
            StompCommand::Message => "MESSAGE",
            StompCommand::Receipt => "RECEIPT",
            StompCommand::Error => "ERROR",
            StompCommand::Disconnect => "DISCONNECT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CONNECT" | "STOMP" => Some(StompCommand::Connect),
            "CONNECTED" => Some(StompCommand::Connected),
            "SUBSCRIBE" => Some(StompCommand::Subscribe),
            "UNSUBSCRIBE" => Some(StompCommand::Unsubscribe),
            "SEND" => Some(StompCommand::Send),
            "MESSAGE" => Some(StompCommand::Message),
            "RECEIPT" => Some(StompCommand::Receipt),
            "ERROR" => Some(StompCommand::Error),
            "DISCONNECT" => Some(StompCommand::Disconnect),
            _ => None,
        }
    }

    // CONNECT and CONNECTED headers are sent verbatim.
    fn escapes_headers(&self) -> bool {
        !matches!(self, StompCommand::Connect | StompCommand::Connected)
    }
}

impl fmt::Display for StompCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: StompCommand,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: StompCommand) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of a header; repeated headers after the first are ignored.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn connect(host: &str) -> Self {
        Frame::new(StompCommand::Connect)
            .header("accept-version", STOMP_VERSION)
            .header("host", host)
            .header("heart-beat", "0,0")
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        Frame::new(StompCommand::Subscribe)
            .header("id", id)
            .header("destination", destination)
            .header("ack", "auto")
    }

    pub fn send(destination: &str, json_body: &str) -> Self {
        Frame::new(StompCommand::Send)
            .header("destination", destination)
            .header("content-type", "application/json")
            .header("content-length", json_body.len().to_string())
            .with_body(json_body)
    }

    pub fn disconnect() -> Self {
        Frame::new(StompCommand::Disconnect)
    }

    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(self.body.len() + 64);
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            if escape {
                out.push_str(&escape_header(name));
                out.push(':');
                out.push_str(&escape_header(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Decode one frame. Returns `Ok(None)` for a heart-beat.
    pub fn decode(text: &str) -> Result<Option<Frame>, DecodeError> {
        let text = text.trim_start_matches(['\r', '\n']);
        if text.is_empty() {
            return Ok(None);
        }

        let (head, rest) = split_head(text)
            .ok_or_else(|| DecodeError::Frame("missing blank line after headers".into()))?;

        let mut lines = head.lines();
        let command_line = lines.next().unwrap_or_default().trim_end_matches('\r');
        let command = StompCommand::parse(command_line)
            .ok_or_else(|| DecodeError::Frame(format!("unknown command {command_line:?}")))?;
        let unescape = command.escapes_headers();

        let mut headers = Vec::new();
        for line in lines {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| DecodeError::Frame(format!("malformed header {line:?}")))?;
            if unescape {
                headers.push((unescape_header(name)?, unescape_header(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        let mut frame = Frame {
            command,
            headers,
            body: String::new(),
        };

        let body = match frame.get("content-length") {
            Some(len) => {
                let len: usize = len
                    .trim()
                    .parse()
                    .map_err(|_| DecodeError::Frame(format!("bad content-length {len:?}")))?;
                rest.get(..len)
                    .ok_or_else(|| DecodeError::Frame("body shorter than content-length".into()))?
            }
            None => rest
                .find('\0')
                .map(|end| &rest[..end])
                .ok_or_else(|| DecodeError::Frame("missing NUL terminator".into()))?,
        };
        frame.body = body.to_string();
        Ok(Some(frame))
    }
}

fn split_head(text: &str) -> Option<(&str, &str)> {
    if let Some(idx) = text.find("\n\n") {
        return Some((&text[..idx], &text[idx + 2..]));
    }
    text.find("\r\n\r\n")
        .map(|idx| (&text[..idx], &text[idx + 4..]))
}

fn escape_header(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_header(raw: &str) -> Result<String, DecodeError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('c') => out.push(':'),
            other => {
                return Err(DecodeError::Frame(format!(
                    "undefined escape \\{}",
                    other.map(String::from).unwrap_or_default()
                )))
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_frame_layout() {
        let frame = Frame::send("/app/chat", "{\"a\":1}");
        assert_eq!(
            frame.encode(),
            "SEND\ndestination:/app/chat\ncontent-type:application/json\ncontent-length:7\n\n{\"a\":1}\0"
        );
    }

    #[test]
    fn decodes_server_message() {
        let raw = "MESSAGE\ndestination:/user/7/queue/messages\nsubscription:sub-0\nmessage-id:1\n\n{\"x\":true}\0\n";
        let frame = Frame::decode(raw).unwrap().unwrap();
        assert_eq!(frame.command, StompCommand::Message);
        assert_eq!(frame.get("destination"), Some("/user/7/queue/messages"));
        assert_eq!(frame.body, "{\"x\":true}");
    }

    #[test]
    fn heartbeat_is_not_a_frame() {
        assert_eq!(Frame::decode("\n").unwrap(), None);
        assert_eq!(Frame::decode("\r\n\r\n").unwrap(), None);
    }

    #[test]
    fn content_length_allows_embedded_nul() {
        let raw = "MESSAGE\ncontent-length:3\n\na\0b\0";
        let frame = Frame::decode(raw).unwrap().unwrap();
        assert_eq!(frame.body, "a\0b");
    }

    #[test]
    fn header_escaping_survives_encode_decode() {
        let frame = Frame::new(StompCommand::Message).header("note", "a:b\\c\nd");
        let decoded = Frame::decode(&frame.encode()).unwrap().unwrap();
        assert_eq!(decoded.get("note"), Some("a:b\\c\nd"));
    }

    #[test]
    fn connected_headers_are_verbatim() {
        let raw = "CONNECTED\nversion:1.2\nserver:x\\y\n\n\0";
        let frame = Frame::decode(raw).unwrap().unwrap();
        assert_eq!(frame.get("server"), Some("x\\y"));
    }

    #[test]
    fn first_header_wins() {
        let raw = "MESSAGE\nfoo:1\nfoo:2\n\n\0";
        let frame = Frame::decode(raw).unwrap().unwrap();
        assert_eq!(frame.get("foo"), Some("1"));
    }

    #[test]
    fn rejects_garbage() {
        assert!(Frame::decode("HELLO\n\n\0").is_err());
        assert!(Frame::decode("MESSAGE\nno-blank-line").is_err());
        assert!(Frame::decode("MESSAGE\nbad\\xescape:1\n\n\0").is_err());
    }
}
