//! Command bus collaborator port and in-memory implementation.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, SagaError};

/// A command dispatched by a saga to another subsystem.
///
/// Mirrors the event envelope shape: a `"type"` discriminator plus opaque
/// payload fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    #[serde(rename = "type")]
    command_type: String,
    #[serde(flatten)]
    payload: Map<String, Value>,
}

impl Command {
    /// Creates a command with the given type discriminator.
    pub fn new(command_type: impl Into<String>) -> Self {
        Self {
            command_type: command_type.into(),
            payload: Map::new(),
        }
    }

    /// Adds a payload field (builder style).
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }

    /// Returns the type discriminator.
    pub fn command_type(&self) -> &str {
        &self.command_type
    }

    /// Returns the payload fields.
    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    /// Returns a single payload field, if present.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }
}

/// Trait for dispatching commands to other subsystems.
///
/// Sagas obtain a bus reference through their constructor closure or via
/// [`Saga::set_command_bus`](crate::Saga::set_command_bus); the engine does
/// not construct or constrain the implementation.
#[async_trait]
pub trait CommandBus: Send + Sync {
    /// Dispatches a command.
    async fn dispatch(&self, command: Command) -> Result<()>;
}

#[derive(Debug, Default)]
struct RecordingState {
    dispatched: Vec<Command>,
    fail_on_dispatch: bool,
}

/// In-memory command bus for testing.
///
/// Records every dispatched command in order; the failure toggle makes
/// `dispatch` return [`SagaError::CommandDispatch`] until cleared.
#[derive(Debug, Clone, Default)]
pub struct RecordingCommandBus {
    state: Arc<RwLock<RecordingState>>,
}

impl RecordingCommandBus {
    /// Creates a new recording command bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the bus to fail on dispatch.
    pub fn set_fail_on_dispatch(&self, fail: bool) {
        self.state.write().unwrap().fail_on_dispatch = fail;
    }

    /// Returns all dispatched commands in dispatch order.
    pub fn dispatched(&self) -> Vec<Command> {
        self.state.read().unwrap().dispatched.clone()
    }

    /// Returns the dispatched command types in dispatch order.
    pub fn dispatched_types(&self) -> Vec<String> {
        self.state
            .read()
            .unwrap()
            .dispatched
            .iter()
            .map(|c| c.command_type().to_string())
            .collect()
    }

    /// Returns the number of dispatched commands.
    pub fn command_count(&self) -> usize {
        self.state.read().unwrap().dispatched.len()
    }
}

#[async_trait]
impl CommandBus for RecordingCommandBus {
    async fn dispatch(&self, command: Command) -> Result<()> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_dispatch {
            return Err(SagaError::CommandDispatch(format!(
                "bus unavailable for '{}'",
                command.command_type()
            )));
        }
        state.dispatched.push(command);
        Ok(())
    }
}
