//! Pending VMX program
//!
//! Commands are collected as rendered tokens and sent as one comma-joined
//! payload. The controller ignores everything after the first `R`, and a
//! second `N` in the same payload is rejected, so both are refused here.

use super::command::{Command, CommandFamily, Operation};
use std::fmt;
use stgctl_core::{ControllerError, Result};

/// Ordered list of tokens waiting to be sent
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandBuffer {
    tokens: Vec<String>,
    has_run: bool,
    has_origin: bool,
}

impl CommandBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a command, enforcing the program ordering rules
    pub fn append(&mut self, command: &Command) -> Result<()> {
        match command {
            Command::IndexRelative { steps: 0, axis } => {
                return Err(ControllerError::InvalidSequence {
                    reason: format!("relative index of 0 steps on {} reads as a limit move", axis),
                }
                .into());
            }
            Command::Operation(Operation::Run) if self.has_run => {
                return Err(ControllerError::InvalidSequence {
                    reason: "program already contains R; everything after it would be ignored"
                        .to_string(),
                }
                .into());
            }
            Command::Operation(Operation::Origin) if self.has_origin => {
                return Err(ControllerError::InvalidSequence {
                    reason: "program already contains N".to_string(),
                }
                .into());
            }
            Command::Operation(Operation::Run) => self.has_run = true,
            Command::Operation(Operation::Origin) => self.has_origin = true,
            _ => {}
        }
        self.tokens.push(command.render());
        Ok(())
    }

    /// Validate a raw token against a family and append it
    ///
    /// The buffer is left untouched when the token is rejected.
    pub fn append_token(&mut self, family: CommandFamily, token: &str) -> Result<Command> {
        let command = Command::parse(family, token)?;
        self.append(&command)?;
        Ok(command)
    }

    /// Comma-joined wire payload
    pub fn payload(&self) -> String {
        self.tokens.join(",")
    }

    /// Drain the buffer, returning its payload
    pub fn take_payload(&mut self) -> String {
        let payload = self.payload();
        self.clear();
        payload
    }

    /// Discard all pending tokens
    pub fn clear(&mut self) {
        self.tokens.clear();
        self.has_run = false;
        self.has_origin = false;
    }

    /// Pending tokens in order
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Number of pending tokens
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether nothing is pending
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Whether the pending program already contains `R`
    pub fn has_run(&self) -> bool {
        self.has_run
    }
}

impl fmt::Display for CommandBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.payload())
    }
}
