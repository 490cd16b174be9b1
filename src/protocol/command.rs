//! Command definitions
//!
//! Represents requests from key-value clients.

use crate::kv::Pipeline;

/// Command types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandType {
    Exec = 0x01,
    Ping = 0x04,
}

/// A parsed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Execute a pipeline atomically
    Exec { pipeline: Pipeline },

    /// Ping (health check)
    Ping,
}

impl Command {
    /// Get the command type
    pub fn command_type(&self) -> CommandType {
        match self {
            Command::Exec { .. } => CommandType::Exec,
            Command::Ping => CommandType::Ping,
        }
    }
}
