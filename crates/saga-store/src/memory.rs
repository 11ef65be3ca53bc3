use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use common::SagaId;

use crate::{Result, SagaState, StoreError, store::SagaStore};

#[derive(Debug, Default)]
struct FailureToggles {
    fail_on_load: bool,
    fail_on_save: bool,
    fail_on_delete: bool,
}

/// In-memory saga store implementation.
///
/// The reference implementation of the [`SagaStore`] port: a keyed map
/// guarded by an async `RwLock`. No TTL, no secondary indices. Also serves
/// as the test double; the `set_fail_on_*` switches make the corresponding
/// operation return [`StoreError::Backend`] until cleared.
#[derive(Clone, Default)]
pub struct InMemorySagaStore {
    states: Arc<RwLock<HashMap<SagaId, SagaState>>>,
    toggles: Arc<std::sync::RwLock<FailureToggles>>,
}

impl InMemorySagaStore {
    /// Creates a new empty in-memory saga store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of persisted snapshots.
    pub async fn state_count(&self) -> usize {
        self.states.read().await.len()
    }

    /// Clears all persisted snapshots.
    pub async fn clear(&self) {
        self.states.write().await.clear();
    }

    /// Configures `load_state` to fail with a backend error.
    pub fn set_fail_on_load(&self, fail: bool) {
        self.toggles.write().unwrap().fail_on_load = fail;
    }

    /// Configures `save_state` to fail with a backend error.
    pub fn set_fail_on_save(&self, fail: bool) {
        self.toggles.write().unwrap().fail_on_save = fail;
    }

    /// Configures `delete_state` to fail with a backend error.
    pub fn set_fail_on_delete(&self, fail: bool) {
        self.toggles.write().unwrap().fail_on_delete = fail;
    }
}

#[async_trait]
impl SagaStore for InMemorySagaStore {
    async fn load_state(&self, saga_id: &SagaId) -> Result<Option<SagaState>> {
        if self.toggles.read().unwrap().fail_on_load {
            return Err(StoreError::Backend("load unavailable".to_string()));
        }
        let states = self.states.read().await;
        Ok(states.get(saga_id).cloned())
    }

    async fn save_state(&self, state: SagaState) -> Result<()> {
        if self.toggles.read().unwrap().fail_on_save {
            return Err(StoreError::Backend("save unavailable".to_string()));
        }
        let mut states = self.states.write().await;
        states.insert(state.saga_id().clone(), state);
        Ok(())
    }

    async fn delete_state(&self, saga_id: &SagaId) -> Result<()> {
        if self.toggles.read().unwrap().fail_on_delete {
            return Err(StoreError::Backend("delete unavailable".to_string()));
        }
        let mut states = self.states.write().await;
        states.remove(saga_id);
        Ok(())
    }
}
