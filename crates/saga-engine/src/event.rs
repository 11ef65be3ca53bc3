//! Event envelope dispatched to saga instances.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, SagaError};

/// An event delivered to a saga.
///
/// Events carry a `"type"` discriminator plus arbitrary variant-defined
/// fields. The engine only inspects the discriminator; everything else is
/// opaque and flows through to the variant unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(flatten)]
    data: Map<String, Value>,
}

impl SagaEvent {
    /// Creates an event with the given type discriminator and no fields.
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            data: Map::new(),
        }
    }

    /// Adds a field to the event (builder style).
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Parses an event from a raw JSON value.
    ///
    /// Fails with [`SagaError::InvalidEvent`] if the value is not an object
    /// or its `"type"` field is missing or not a string.
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| SagaError::InvalidEvent(format!("missing or invalid \"type\" field: {e}")))
    }

    /// Returns the type discriminator.
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Returns the opaque event fields.
    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    /// Returns a single event field, if present.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }
}

impl std::fmt::Display for SagaEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.event_type)
    }
}
