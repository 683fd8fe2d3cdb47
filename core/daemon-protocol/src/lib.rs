//! IPC protocol types and validation for historian-daemon.
//!
//! This crate is shared by the daemon and its local clients to prevent schema
//! drift. Both directions carry one JSON object per line. Clients send
//! `{"cmd": ...}` requests; the daemon answers each request with exactly one
//! `response` message and pushes unsolicited `event` messages whenever its
//! status changes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

pub const MAX_REQUEST_BYTES: usize = 1024 * 1024; // 1MB

pub const CMD_STATUS: &str = "status";
pub const CMD_SET: &str = "set";

/// Field of the `set` command carrying the new player identity.
pub const FIELD_CURRENT_PLAYER: &str = "current_player";

/// A decoded request line. `params` holds every field except `cmd`.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub cmd: String,
    pub params: Map<String, Value>,
}

impl Request {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            params: Map::new(),
        }
    }

    pub fn with_param(mut self, key: &str, value: Value) -> Self {
        self.params.insert(key.to_string(), value);
        self
    }

    /// Builds the wire object for this request (client side).
    pub fn to_value(&self) -> Value {
        let mut object = self.params.clone();
        object.insert("cmd".to_string(), Value::String(self.cmd.clone()));
        Value::Object(object)
    }

    /// Encodes the request as a newline-terminated line.
    pub fn encode_line(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut line = serde_json::to_vec(&self.to_value())?;
        line.push(b'\n');
        Ok(line)
    }
}

#[derive(Debug)]
pub enum RequestError {
    Decode(serde_json::Error),
    NotAnObject,
    TooLarge(usize),
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::Decode(err) => write!(f, "Could not decode command: {}", err),
            RequestError::NotAnObject => {
                write!(f, "Invalid data type provided, expected object.")
            }
            RequestError::TooLarge(len) => write!(
                f,
                "Could not decode command: request of {} bytes exceeds the {} byte limit",
                len, MAX_REQUEST_BYTES
            ),
        }
    }
}

impl std::error::Error for RequestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RequestError::Decode(err) => Some(err),
            _ => None,
        }
    }
}

/// Decodes one request line. Trailing newline and surrounding whitespace are
/// accepted. A missing `cmd` decodes as the empty command name and a
/// non-string `cmd` as its JSON text, so both end up as unknown commands.
pub fn parse_request(line: &[u8]) -> Result<Request, RequestError> {
    if line.len() > MAX_REQUEST_BYTES {
        return Err(RequestError::TooLarge(line.len()));
    }

    let value: Value = serde_json::from_slice(line).map_err(RequestError::Decode)?;
    let Value::Object(mut params) = value else {
        return Err(RequestError::NotAnObject);
    };

    let cmd = match params.remove("cmd") {
        Some(Value::String(cmd)) => cmd,
        Some(other) => other.to_string(),
        None => String::new(),
    };

    Ok(Request { cmd, params })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub connected_to_beatsaber: bool,
    pub current_player: Option<String>,
    pub in_game: bool,
}

/// Snapshot of the daemon's live state. Score snapshots are opaque JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusPayload {
    pub connection: ConnectionStatus,
    pub current_game: Option<Value>,
    pub last_game: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseData {
    Status(StatusPayload),
    Message(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "msgtype", rename_all = "snake_case")]
pub enum ServerMessage {
    Response { success: bool, data: ResponseData },
    Event { status: StatusPayload },
}

impl ServerMessage {
    pub fn status(status: StatusPayload) -> Self {
        ServerMessage::Response {
            success: true,
            data: ResponseData::Status(status),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        ServerMessage::Response {
            success: false,
            data: ResponseData::Message(message.into()),
        }
    }

    pub fn unknown_command(cmd: &str) -> Self {
        Self::failure(format!("No such command: \"{}\"", cmd))
    }

    pub fn request_error(err: &RequestError) -> Self {
        Self::failure(err.to_string())
    }

    pub fn event(status: StatusPayload) -> Self {
        ServerMessage::Event { status }
    }

    pub fn is_response(&self) -> bool {
        matches!(self, ServerMessage::Response { .. })
    }

    /// Encodes the message as a newline-terminated line.
    pub fn encode_line(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }
}
