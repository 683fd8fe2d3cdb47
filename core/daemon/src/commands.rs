//! Local IPC command handlers.
//!
//! Commands are looked up by name in a [`CommandTable`]. Every request gets
//! exactly one [`ServerMessage`] back, including malformed and unknown ones.

use historian_protocol::{
    parse_request, Request, ServerMessage, CMD_SET, CMD_STATUS, FIELD_CURRENT_PLAYER,
};
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

use crate::error::{HistorianError, Result};
use crate::historian::SharedState;

pub type CommandHandler = fn(&SharedState, &Request) -> ServerMessage;

pub struct CommandTable {
    handlers: HashMap<&'static str, CommandHandler>,
}

impl CommandTable {
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// The commands served by the daemon: `status` and `set`.
    pub fn standard() -> Result<Self> {
        let mut table = Self::empty();
        table.register(CMD_STATUS, handle_status)?;
        table.register(CMD_SET, handle_set)?;
        Ok(table)
    }

    pub fn register(&mut self, name: &'static str, handler: CommandHandler) -> Result<()> {
        if self.handlers.contains_key(name) {
            return Err(HistorianError::DuplicateCommand(name.to_string()));
        }
        self.handlers.insert(name, handler);
        Ok(())
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.handlers.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn dispatch(&self, state: &SharedState, request: &Request) -> ServerMessage {
        match self.handlers.get(request.cmd.as_str()) {
            Some(handler) => handler(state, request),
            None => ServerMessage::unknown_command(&request.cmd),
        }
    }

    /// Decodes one request line and dispatches it.
    pub fn handle_line(&self, state: &SharedState, line: &[u8]) -> ServerMessage {
        match parse_request(line) {
            Ok(request) => {
                debug!(cmd = %request.cmd, "IPC request received");
                self.dispatch(state, &request)
            }
            Err(err) => {
                debug!(error = %err, "Rejected IPC request");
                ServerMessage::request_error(&err)
            }
        }
    }
}

fn handle_status(state: &SharedState, _request: &Request) -> ServerMessage {
    ServerMessage::status(state.status())
}

fn handle_set(state: &SharedState, request: &Request) -> ServerMessage {
    if let Some(value) = request.params.get(FIELD_CURRENT_PLAYER) {
        match parse_player(value) {
            Ok(player) => state.set_player(player),
            Err(err) => return ServerMessage::failure(err.to_string()),
        }
    }
    handle_status(state, request)
}

/// Accepts a string or null; anything else is rejected.
pub fn parse_player(value: &Value) -> Result<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(player) => Ok(Some(player.clone())),
        other => Err(HistorianError::InvalidPlayer(format!(
            "{} must be a string or null, got {}",
            FIELD_CURRENT_PLAYER,
            json_type_name(other)
        ))),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
