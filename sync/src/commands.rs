//! String-keyed command dispatch.
//!
//! Remote callbacks execute through an explicit dispatch table built at
//! registration time: command name to handler closure. Unknown command
//! names are an explicit error.

use std::collections::HashMap;

use crate::error::{Result, SyncError};
use crate::message::Payload;

/// Handler for one named command.
pub type CommandFn = Box<dyn Fn(Payload) -> Result<Payload> + Send + Sync>;

/// Dispatch table mapping command names to handlers.
#[derive(Default)]
pub struct CommandRegistry {
    commands: HashMap<String, CommandFn>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under a command name. A later registration
    /// with the same name replaces the earlier one.
    pub fn register<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(Payload) -> Result<Payload> + Send + Sync + 'static,
    {
        self.commands.insert(name.into(), Box::new(handler));
    }

    /// Execute the handler registered under `name`.
    pub fn dispatch(&self, name: &str, payload: Payload) -> Result<Payload> {
        match self.commands.get(name) {
            Some(handler) => handler(payload),
            None => Err(SyncError::UnknownCommand(name.to_string())),
        }
    }

    /// Whether a handler is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }
}
