//! Persisted saga state snapshot.

use common::SagaId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An immutable snapshot of a saga instance.
///
/// A snapshot carries the saga's identity, its current status string, and an
/// opaque `data` bag whose shape is entirely variant-defined. Snapshots are
/// owned values: taking one and later mutating the live saga cannot
/// retroactively change a previously persisted or returned snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaState {
    saga_id: SagaId,
    status: String,
    data: Map<String, Value>,
}

impl SagaState {
    /// Creates a snapshot from its parts.
    pub fn new(saga_id: SagaId, status: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            saga_id,
            status: status.into(),
            data,
        }
    }

    /// Returns the saga ID.
    pub fn saga_id(&self) -> &SagaId {
        &self.saga_id
    }

    /// Returns the status string.
    pub fn status(&self) -> &str {
        &self.status
    }

    /// Returns the opaque data bag.
    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    /// Consumes the snapshot, returning its parts.
    pub fn into_parts(self) -> (SagaId, String, Map<String, Value>) {
        (self.saga_id, self.status, self.data)
    }
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]", self.saga_id, self.status)
    }
}
