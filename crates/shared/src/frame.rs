//! STOMP 1.2 frame codec.
//!
//! One frame travels in one WebSocket text message:
//!
//! ```text
//! COMMAND\n
//! header:value\n
//! ...
//! \n
//! BODY\0
//! ```
//!
//! Header names and values are escaped (`\\`, `\n`, `\r`, `\c`) on every
//! command except CONNECT and CONNECTED, as the STOMP 1.2 grammar requires.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::FrameError;

pub const HEADER_DESTINATION: &str = "destination";
pub const HEADER_SUBSCRIPTION: &str = "subscription";
pub const HEADER_CONTENT_LENGTH: &str = "content-length";
pub const HEADER_CONTENT_TYPE: &str = "content-type";
pub const HEADER_RECEIPT: &str = "receipt";
pub const HEADER_RECEIPT_ID: &str = "receipt-id";
pub const HEADER_MESSAGE: &str = "message";

const JSON_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Connect,
    Stomp,
    Connected,
    Subscribe,
    Unsubscribe,
    Send,
    Message,
    Receipt,
    Error,
    Disconnect,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Stomp => "STOMP",
            Command::Connected => "CONNECTED",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Send => "SEND",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
            Command::Disconnect => "DISCONNECT",
        }
    }

    fn parse(s: &str) -> Result<Self, FrameError> {
        Ok(match s {
            "CONNECT" => Command::Connect,
            "STOMP" => Command::Stomp,
            "CONNECTED" => Command::Connected,
            "SUBSCRIBE" => Command::Subscribe,
            "UNSUBSCRIBE" => Command::Unsubscribe,
            "SEND" => Command::Send,
            "MESSAGE" => Command::Message,
            "RECEIPT" => Command::Receipt,
            "ERROR" => Command::Error,
            "DISCONNECT" => Command::Disconnect,
            other => return Err(FrameError::UnknownCommand(other.to_string())),
        })
    }

    /// CONNECT/CONNECTED headers are sent verbatim for 1.0 compatibility.
    fn escapes_headers(&self) -> bool {
        !matches!(self, Command::Connect | Command::Stomp | Command::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    /// Append a header (builder style).
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of a header, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn destination(&self) -> Option<&str> {
        self.get(HEADER_DESTINATION)
    }

    pub fn connect(host: &str, bearer_token: Option<&str>) -> Self {
        let mut frame = Frame::new(Command::Connect)
            .header("accept-version", "1.2")
            .header("host", host)
            .header("heart-beat", "0,0");
        if let Some(token) = bearer_token {
            frame = frame.header("Authorization", format!("Bearer {token}"));
        }
        frame
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        Frame::new(Command::Subscribe)
            .header("id", id)
            .header(HEADER_DESTINATION, destination)
            .header("ack", "auto")
    }

    pub fn unsubscribe(id: &str) -> Self {
        Frame::new(Command::Unsubscribe).header("id", id)
    }

    pub fn disconnect(receipt: &str) -> Self {
        Frame::new(Command::Disconnect).header(HEADER_RECEIPT, receipt)
    }

    /// A SEND frame carrying `payload` as JSON.
    pub fn send_json<T: Serialize>(destination: &str, payload: &T) -> Result<Self, FrameError> {
        let body = serde_json::to_string(payload).map_err(|e| FrameError::Json(e.to_string()))?;
        Ok(Frame::new(Command::Send)
            .header(HEADER_DESTINATION, destination)
            .header(HEADER_CONTENT_TYPE, JSON_CONTENT_TYPE)
            .with_body(body))
    }

    /// A MESSAGE frame as a broker would deliver it.
    pub fn message(destination: &str, subscription: &str, message_id: &str, body: &str) -> Self {
        Frame::new(Command::Message)
            .header(HEADER_DESTINATION, destination)
            .header(HEADER_SUBSCRIPTION, subscription)
            .header("message-id", message_id)
            .header(HEADER_CONTENT_TYPE, JSON_CONTENT_TYPE)
            .with_body(body)
    }

    /// Decode the body as JSON.
    pub fn json_body<T: DeserializeOwned>(&self) -> Result<T, FrameError> {
        if self.body.is_empty() {
            return Err(FrameError::MissingBody);
        }
        serde_json::from_str(&self.body).map_err(|e| FrameError::Json(e.to_string()))
    }

    /// Serialize to wire text, terminated by NUL.
    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            if escape {
                push_escaped(&mut out, name);
                out.push(':');
                push_escaped(&mut out, value);
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        if !self.body.is_empty() && self.get(HEADER_CONTENT_LENGTH).is_none() {
            out.push_str(HEADER_CONTENT_LENGTH);
            out.push(':');
            out.push_str(&self.body.len().to_string());
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Parse one frame from wire text.
    ///
    /// Returns `Ok(None)` for a heart-beat (text made only of EOLs).
    pub fn decode(text: &str) -> Result<Option<Frame>, FrameError> {
        let mut rest = text.trim_start_matches(['\r', '\n']);
        if rest.is_empty() {
            return Ok(None);
        }

        let (command_line, after) = split_line(rest).ok_or(FrameError::Unterminated)?;
        if command_line.is_empty() {
            return Err(FrameError::Empty);
        }
        let command = Command::parse(command_line)?;
        rest = after;

        let escaped = command.escapes_headers();
        let mut headers: Vec<(String, String)> = Vec::new();
        loop {
            let (line, after) = split_line(rest).ok_or(FrameError::Unterminated)?;
            rest = after;
            if line.is_empty() {
                break;
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| FrameError::MalformedHeader(line.to_string()))?;
            let (name, value) = if escaped {
                (unescape(name)?, unescape(value)?)
            } else {
                (name.to_string(), value.to_string())
            };
            // Repeated headers: only the first occurrence counts.
            if !headers.iter().any(|(k, _)| *k == name) {
                headers.push((name, value));
            }
        }

        let declared = headers
            .iter()
            .find(|(k, _)| k == HEADER_CONTENT_LENGTH)
            .map(|(_, v)| v.trim().parse::<usize>())
            .transpose()
            .map_err(|_| FrameError::MalformedHeader(HEADER_CONTENT_LENGTH.to_string()))?;

        let body = match declared {
            Some(len) => {
                if rest.len() < len || !rest.is_char_boundary(len) {
                    return Err(FrameError::ContentLength {
                        declared: len,
                        actual: rest.len(),
                    });
                }
                if !rest[len..].starts_with('\0') {
                    return Err(FrameError::Unterminated);
                }
                &rest[..len]
            }
            None => {
                let end = rest.find('\0').ok_or(FrameError::Unterminated)?;
                &rest[..end]
            }
        };

        Ok(Some(Frame {
            command,
            headers,
            body: body.to_string(),
        }))
    }
}

fn split_line(s: &str) -> Option<(&str, &str)> {
    let idx = s.find('\n')?;
    let line = &s[..idx];
    Some((line.strip_suffix('\r').unwrap_or(line), &s[idx + 1..]))
}

fn push_escaped(out: &mut String, s: &str) {
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            c => out.push(c),
        }
    }
}

fn unescape(s: &str) -> Result<String, FrameError> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            _ => return Err(FrameError::InvalidEscape),
        }
    }
    Ok(out)
}
