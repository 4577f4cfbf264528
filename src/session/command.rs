// src/session/command.rs - Command text and its wire framing
use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix the firmware expects in front of every control-port command.
pub const COMMAND_PREFIX: char = '~';
const LINE_END: &str = "\r\n";

/// Requests exclusive control of the printer.
pub const LOGIN_FRAME: &str = "~M601 S1\r\n";
/// Gives control back.
pub const LOGOUT_FRAME: &str = "~M602\r\n";

/// A single instruction (usually one G-code line) without its wire framing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Command(String);

impl Command {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Bytes put on the wire: `~<command>\r\n`. Already-prefixed text is sent as is.
    pub fn frame(&self) -> String {
        if self.0.starts_with(COMMAND_PREFIX) {
            format!("{}{}", self.0, LINE_END)
        } else {
            format!("{}{}{}", COMMAND_PREFIX, self.0, LINE_END)
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Command {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for Command {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}
