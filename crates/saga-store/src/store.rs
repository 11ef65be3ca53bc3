use async_trait::async_trait;

use common::SagaId;

use crate::{Result, SagaState};

/// Core trait for saga state store implementations.
///
/// A saga store keeps exactly one snapshot per saga ID. All implementations
/// must be thread-safe (Send + Sync); calls for the same saga ID are
/// serialized by the manager, but calls for distinct IDs may arrive
/// concurrently.
#[async_trait]
pub trait SagaStore: Send + Sync {
    /// Loads the current snapshot for a saga.
    ///
    /// Returns `Ok(None)` if no snapshot exists. Never returns a partial
    /// snapshot.
    async fn load_state(&self, saga_id: &SagaId) -> Result<Option<SagaState>>;

    /// Saves a snapshot, replacing any prior snapshot for the same saga ID.
    async fn save_state(&self, state: SagaState) -> Result<()>;

    /// Deletes the snapshot for a saga.
    ///
    /// Deleting a saga ID with no snapshot is not an error.
    async fn delete_state(&self, saga_id: &SagaId) -> Result<()>;
}
