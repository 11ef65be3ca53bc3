//! Saga manager: the dispatch orchestrator.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use common::SagaId;
use saga_store::SagaStore;
use tokio::sync::Mutex as AsyncMutex;

use crate::error::Result;
use crate::event::SagaEvent;
use crate::registry::SagaTypeRegistry;
use crate::saga::Saga;

/// Snapshot entry returned by [`SagaManager::list_active_sagas`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSagaInfo {
    /// The type tag the saga was dispatched under.
    pub saga_type: String,
    /// The status observed after the most recent dispatch.
    pub status: String,
}

struct ActiveSaga {
    saga_type: String,
    status: String,
    instance: Arc<AsyncMutex<Box<dyn Saga>>>,
}

/// Orchestrates event dispatch to saga instances.
///
/// The manager owns one [`SagaTypeRegistry`] and one [`SagaStore`], both
/// injected at construction. It serializes all processing for a given saga
/// ID (load, invoke, save/delete happen under one per-saga lock), rehydrates
/// or creates instances on demand, contains handler failures, and enforces
/// the completion/persistence invariant:
///
/// - completed after handling ⇒ the persisted snapshot is deleted;
/// - not completed ⇒ the store holds exactly the post-handler snapshot.
///
/// Events for distinct saga IDs need no coordination and proceed in
/// parallel. The active-sagas table and the per-saga lock set are the only
/// process-wide mutable state.
pub struct SagaManager {
    registry: RwLock<SagaTypeRegistry>,
    store: Arc<dyn SagaStore>,
    locks: Mutex<HashMap<SagaId, Arc<AsyncMutex<()>>>>,
    active: RwLock<HashMap<SagaId, ActiveSaga>>,
}

impl SagaManager {
    /// Creates a manager over the given store with an empty registry.
    pub fn new(store: Arc<dyn SagaStore>) -> Self {
        Self {
            registry: RwLock::new(SagaTypeRegistry::new()),
            store,
            locks: Mutex::new(HashMap::new()),
            active: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a saga constructor under a type tag.
    ///
    /// Must be called before any `handle_event` referencing that tag.
    pub fn register_saga<F>(&self, type_tag: impl Into<String>, constructor: F)
    where
        F: Fn(SagaId) -> Box<dyn Saga> + Send + Sync + 'static,
    {
        self.registry.write().unwrap().register(type_tag, constructor);
    }

    /// Dispatches an event to a saga instance.
    ///
    /// The sole dispatch entry point. Resolves the type tag, acquires the
    /// per-saga lock, hydrates a fresh instance from the persisted snapshot
    /// (or constructs a new one for an unseen saga ID), invokes the
    /// variant's handler, and then persists or deletes based on
    /// `is_completed()`.
    ///
    /// Errors returned by the variant's handler are contained: they are
    /// logged and counted, never propagated, so the persistence step always
    /// runs (a variant may legitimately compensate and then fail in the same
    /// call). Registry and store errors are propagated, since without a
    /// successful store operation the manager cannot guarantee which
    /// invariant holds.
    #[tracing::instrument(skip(self, event), fields(%saga_id, saga_type, event_type = event.event_type()))]
    pub async fn handle_event(
        &self,
        saga_id: &SagaId,
        saga_type: &str,
        event: SagaEvent,
    ) -> Result<()> {
        metrics::counter!("saga_events_total").increment(1);
        let dispatch_start = std::time::Instant::now();

        // 1. Resolve the constructor before taking any lock.
        let constructor = self.registry.read().unwrap().resolve(saga_type)?;

        // 2. Serialize all processing for this saga ID. The guard spans the
        // whole load -> invoke -> save/delete sequence and is released on
        // every exit path, including store errors and cancellation.
        let saga_lock = self.saga_lock(saga_id);
        let _guard = saga_lock.lock().await;

        // 3. Hydrate from the persisted snapshot, or create a fresh instance.
        let mut saga = constructor(saga_id.clone());
        if let Some(state) = self.store.load_state(saga_id).await? {
            saga.set_state(state)?;
        }

        // 4. Expose the live instance so callers can fetch it (e.g. to
        // inject a command bus) before or during processing.
        let status = saga.state().status().to_string();
        let instance = Arc::new(AsyncMutex::new(saga));
        self.active.write().unwrap().insert(
            saga_id.clone(),
            ActiveSaga {
                saga_type: saga_type.to_string(),
                status,
                instance: Arc::clone(&instance),
            },
        );

        // 5. Invoke the variant. Handler errors are contained so that the
        // post-handler persistence step still runs.
        let mut saga = instance.lock().await;
        if let Err(err) = saga.handle_event(&event).await {
            metrics::counter!("saga_handler_failures").increment(1);
            tracing::warn!(error = %err, "saga handler failed; error contained");
        }

        // 6. Completion is modeled as deletion; otherwise persist exactly
        // the post-handler snapshot.
        let completed = saga.is_completed();
        let state = saga.state();
        drop(saga);

        if completed {
            self.store.delete_state(saga_id).await?;
            self.active.write().unwrap().remove(saga_id);
            metrics::counter!("saga_completed").increment(1);
            tracing::info!(status = state.status(), "saga completed");
        } else {
            let status = state.status().to_string();
            self.store.save_state(state).await?;
            if let Some(entry) = self.active.write().unwrap().get_mut(saga_id) {
                entry.status = status;
            }
        }

        metrics::histogram!("saga_dispatch_duration_seconds")
            .record(dispatch_start.elapsed().as_secs_f64());
        Ok(())
    }

    /// Returns a snapshot of this manager's active sagas.
    ///
    /// Reflects only what this process has handled and not yet completed; it
    /// is not a store scan.
    pub fn list_active_sagas(&self) -> HashMap<SagaId, ActiveSagaInfo> {
        self.active
            .read()
            .unwrap()
            .iter()
            .map(|(saga_id, entry)| {
                (
                    saga_id.clone(),
                    ActiveSagaInfo {
                        saga_type: entry.saga_type.clone(),
                        status: entry.status.clone(),
                    },
                )
            })
            .collect()
    }

    /// Returns the live instance for an active saga, if any.
    ///
    /// Callers may lock the instance to inject a collaborator such as a
    /// command bus. Locking blocks while a dispatch for the same saga is in
    /// flight.
    pub fn active_saga(&self, saga_id: &SagaId) -> Option<Arc<AsyncMutex<Box<dyn Saga>>>> {
        self.active
            .read()
            .unwrap()
            .get(saga_id)
            .map(|entry| Arc::clone(&entry.instance))
    }

    // Lock entries are created on demand and kept for the life of the
    // manager; each is a small Arc<Mutex<()>> per saga ID seen.
    fn saga_lock(&self, saga_id: &SagaId) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        Arc::clone(
            locks
                .entry(saga_id.clone())
                .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
        )
    }
}

impl std::fmt::Debug for SagaManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SagaManager")
            .field("registry", &*self.registry.read().unwrap())
            .field("active_sagas", &self.active.read().unwrap().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use saga_store::{InMemorySagaStore, SagaState, StoreError};
    use serde::{Deserialize, Serialize};
    use serde_json::{Map, Value};

    use crate::error::SagaError;

    const STATUS_COUNTING: &str = "counting";
    const STATUS_COMPLETED: &str = "completed";

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct CounterPayload {
        count: u64,
        exploded: bool,
    }

    /// Minimal variant for exercising the manager: counts `Increment`
    /// events, completes on `Finish`, and on `Explode` mutates its payload
    /// before returning an error.
    struct CounterSaga {
        saga_id: SagaId,
        status: String,
        payload: CounterPayload,
    }

    impl CounterSaga {
        fn boxed(saga_id: SagaId) -> Box<dyn Saga> {
            Box::new(Self {
                saga_id,
                status: STATUS_COUNTING.to_string(),
                payload: CounterPayload::default(),
            })
        }
    }

    #[async_trait]
    impl Saga for CounterSaga {
        async fn handle_event(&mut self, event: &SagaEvent) -> Result<()> {
            match event.event_type() {
                "Increment" => {
                    self.payload.count += 1;
                    Ok(())
                }
                "Finish" => {
                    self.status = STATUS_COMPLETED.to_string();
                    Ok(())
                }
                "Explode" => {
                    // Mutation applied before the failure must survive.
                    self.payload.exploded = true;
                    Err(SagaError::StepFailed {
                        step: "explode".to_string(),
                        reason: "boom".to_string(),
                    })
                }
                other => Err(SagaError::UnexpectedEvent {
                    event_type: other.to_string(),
                    status: self.status.clone(),
                }),
            }
        }

        fn is_completed(&self) -> bool {
            self.status == STATUS_COMPLETED
        }

        fn state(&self) -> SagaState {
            let mut data = Map::new();
            data.insert("count".to_string(), Value::from(self.payload.count));
            data.insert("exploded".to_string(), Value::from(self.payload.exploded));
            SagaState::new(self.saga_id.clone(), self.status.clone(), data)
        }

        fn set_state(&mut self, state: SagaState) -> Result<()> {
            let (saga_id, status, data) = state.into_parts();
            self.saga_id = saga_id;
            self.status = status;
            self.payload = serde_json::from_value(Value::Object(data))?;
            Ok(())
        }
    }

    fn setup() -> (SagaManager, InMemorySagaStore) {
        let store = InMemorySagaStore::new();
        let manager = SagaManager::new(Arc::new(store.clone()));
        manager.register_saga("counter", CounterSaga::boxed);
        (manager, store)
    }

    #[tokio::test]
    async fn first_event_creates_fresh_instance() {
        let (manager, store) = setup();
        let saga_id = SagaId::new("saga-1");

        manager
            .handle_event(&saga_id, "counter", SagaEvent::new("Increment"))
            .await
            .unwrap();

        let state = store.load_state(&saga_id).await.unwrap().unwrap();
        assert_eq!(state.status(), STATUS_COUNTING);
        assert_eq!(state.data().get("count"), Some(&Value::from(1u64)));
    }

    #[tokio::test]
    async fn state_accumulates_across_dispatches() {
        let (manager, store) = setup();
        let saga_id = SagaId::new("saga-1");

        for _ in 0..3 {
            manager
                .handle_event(&saga_id, "counter", SagaEvent::new("Increment"))
                .await
                .unwrap();
        }

        let state = store.load_state(&saga_id).await.unwrap().unwrap();
        assert_eq!(state.data().get("count"), Some(&Value::from(3u64)));
    }

    #[tokio::test]
    async fn completion_deletes_persisted_state() {
        let (manager, store) = setup();
        let saga_id = SagaId::new("saga-1");

        manager
            .handle_event(&saga_id, "counter", SagaEvent::new("Increment"))
            .await
            .unwrap();
        manager
            .handle_event(&saga_id, "counter", SagaEvent::new("Finish"))
            .await
            .unwrap();

        assert!(store.load_state(&saga_id).await.unwrap().is_none());
        assert!(manager.list_active_sagas().is_empty());
    }

    #[tokio::test]
    async fn handler_error_is_contained_and_mutations_persist() {
        let (manager, store) = setup();
        let saga_id = SagaId::new("saga-1");

        // The caller never observes the handler's business error.
        manager
            .handle_event(&saga_id, "counter", SagaEvent::new("Explode"))
            .await
            .unwrap();

        // The pre-failure mutation is durable.
        let state = store.load_state(&saga_id).await.unwrap().unwrap();
        assert_eq!(state.data().get("exploded"), Some(&Value::from(true)));
    }

    #[tokio::test]
    async fn unregistered_type_is_surfaced() {
        let (manager, _store) = setup();
        let saga_id = SagaId::new("saga-1");

        let result = manager
            .handle_event(&saga_id, "unknown", SagaEvent::new("Increment"))
            .await;
        assert!(matches!(result, Err(SagaError::TypeNotRegistered(_))));
    }

    #[tokio::test]
    async fn load_error_propagates() {
        let (manager, store) = setup();
        let saga_id = SagaId::new("saga-1");

        store.set_fail_on_load(true);
        let result = manager
            .handle_event(&saga_id, "counter", SagaEvent::new("Increment"))
            .await;
        assert!(matches!(
            result,
            Err(SagaError::Store(StoreError::Backend(_)))
        ));
    }

    #[tokio::test]
    async fn save_error_propagates() {
        let (manager, store) = setup();
        let saga_id = SagaId::new("saga-1");

        store.set_fail_on_save(true);
        let result = manager
            .handle_event(&saga_id, "counter", SagaEvent::new("Increment"))
            .await;
        assert!(matches!(
            result,
            Err(SagaError::Store(StoreError::Backend(_)))
        ));

        // The per-saga lock was released on the error path.
        store.set_fail_on_save(false);
        manager
            .handle_event(&saga_id, "counter", SagaEvent::new("Increment"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn delete_error_propagates() {
        let (manager, store) = setup();
        let saga_id = SagaId::new("saga-1");

        manager
            .handle_event(&saga_id, "counter", SagaEvent::new("Increment"))
            .await
            .unwrap();

        store.set_fail_on_delete(true);
        let result = manager
            .handle_event(&saga_id, "counter", SagaEvent::new("Finish"))
            .await;
        assert!(matches!(
            result,
            Err(SagaError::Store(StoreError::Backend(_)))
        ));
    }

    #[tokio::test]
    async fn list_active_sagas_reflects_in_flight_work() {
        let (manager, _store) = setup();

        manager
            .handle_event(&SagaId::new("saga-1"), "counter", SagaEvent::new("Increment"))
            .await
            .unwrap();
        manager
            .handle_event(&SagaId::new("saga-2"), "counter", SagaEvent::new("Increment"))
            .await
            .unwrap();

        let active = manager.list_active_sagas();
        assert_eq!(active.len(), 2);
        let info = &active[&SagaId::new("saga-1")];
        assert_eq!(info.saga_type, "counter");
        assert_eq!(info.status, STATUS_COUNTING);

        manager
            .handle_event(&SagaId::new("saga-1"), "counter", SagaEvent::new("Finish"))
            .await
            .unwrap();
        let active = manager.list_active_sagas();
        assert_eq!(active.len(), 1);
        assert!(!active.contains_key(&SagaId::new("saga-1")));
    }

    #[tokio::test]
    async fn active_saga_exposes_live_instance() {
        let (manager, _store) = setup();
        let saga_id = SagaId::new("saga-1");

        manager
            .handle_event(&saga_id, "counter", SagaEvent::new("Increment"))
            .await
            .unwrap();

        let instance = manager.active_saga(&saga_id).unwrap();
        let saga = instance.lock().await;
        assert_eq!(saga.state().status(), STATUS_COUNTING);

        assert!(manager.active_saga(&SagaId::new("unknown")).is_none());
    }
}
