//! Integration tests for the saga manager's dispatch invariants.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use saga_engine::{
    InMemorySagaStore, Result, Saga, SagaError, SagaEvent, SagaId, SagaManager, SagaState,
    SagaStore,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .try_init();
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct JournalPayload {
    entries: Vec<u64>,
}

/// Appends each event's sequence number to a journal, yielding between the
/// read and the write so that unserialized dispatch would lose updates.
struct JournalSaga {
    saga_id: SagaId,
    status: String,
    payload: JournalPayload,
}

impl JournalSaga {
    fn boxed(saga_id: SagaId) -> Box<dyn Saga> {
        Box::new(Self {
            saga_id,
            status: "recording".to_string(),
            payload: JournalPayload::default(),
        })
    }
}

#[async_trait]
impl Saga for JournalSaga {
    async fn handle_event(&mut self, event: &SagaEvent) -> Result<()> {
        match event.event_type() {
            "Record" => {
                let seq = event
                    .get("seq")
                    .and_then(Value::as_u64)
                    .ok_or_else(|| SagaError::InvalidEvent("Record requires seq".to_string()))?;
                let mut entries = self.payload.entries.clone();
                // Suspension point in the middle of the read-modify-write.
                tokio::time::sleep(Duration::from_millis(1)).await;
                entries.push(seq);
                self.payload.entries = entries;
                Ok(())
            }
            "Close" => {
                self.status = "completed".to_string();
                Ok(())
            }
            other => Err(SagaError::UnexpectedEvent {
                event_type: other.to_string(),
                status: self.status.clone(),
            }),
        }
    }

    fn is_completed(&self) -> bool {
        self.status == "completed"
    }

    fn state(&self) -> SagaState {
        let mut data = Map::new();
        data.insert(
            "entries".to_string(),
            Value::Array(self.payload.entries.iter().map(|&e| Value::from(e)).collect()),
        );
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

fn setup() -> (Arc<SagaManager>, InMemorySagaStore) {
    init_tracing();
    let store = InMemorySagaStore::new();
    let manager = Arc::new(SagaManager::new(Arc::new(store.clone())));
    manager.register_saga("journal", JournalSaga::boxed);
    (manager, store)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_events_for_one_saga_are_serialized() {
    let (manager, store) = setup();
    let saga_id = SagaId::new("journal-1");

    let mut handles = Vec::new();
    for seq in 0..10u64 {
        let manager = Arc::clone(&manager);
        let saga_id = saga_id.clone();
        handles.push(tokio::spawn(async move {
            manager
                .handle_event(
                    &saga_id,
                    "journal",
                    SagaEvent::new("Record").with("seq", Value::from(seq)),
                )
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    // Per-saga serialization means no event's read-modify-write interleaves
    // with another's: all ten entries survive.
    let state = store.load_state(&saga_id).await.unwrap().unwrap();
    let entries = state.data().get("entries").unwrap().as_array().unwrap();
    assert_eq!(entries.len(), 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn distinct_sagas_proceed_independently() {
    let (manager, store) = setup();

    let mut handles = Vec::new();
    for i in 0..5 {
        let manager = Arc::clone(&manager);
        handles.push(tokio::spawn(async move {
            let saga_id = SagaId::new(format!("journal-{i}"));
            manager
                .handle_event(
                    &saga_id,
                    "journal",
                    SagaEvent::new("Record").with("seq", Value::from(0u64)),
                )
                .await
                .unwrap();
            saga_id
        }));
    }
    for handle in handles {
        let saga_id = handle.await.unwrap();
        assert!(store.load_state(&saga_id).await.unwrap().is_some());
    }
    assert_eq!(manager.list_active_sagas().len(), 5);
}

#[tokio::test]
async fn persisted_snapshot_matches_live_state_exactly() {
    let (manager, store) = setup();
    let saga_id = SagaId::new("journal-1");

    manager
        .handle_event(
            &saga_id,
            "journal",
            SagaEvent::new("Record").with("seq", Value::from(7u64)),
        )
        .await
        .unwrap();

    let instance = manager.active_saga(&saga_id).unwrap();
    let live_state = instance.lock().await.state();
    let persisted = store.load_state(&saga_id).await.unwrap().unwrap();
    assert_eq!(persisted, live_state);
}

#[tokio::test]
async fn hydration_round_trips_through_the_store() {
    let (manager, store) = setup();
    let saga_id = SagaId::new("journal-1");

    for seq in [1u64, 2, 3] {
        manager
            .handle_event(
                &saga_id,
                "journal",
                SagaEvent::new("Record").with("seq", Value::from(seq)),
            )
            .await
            .unwrap();
    }

    // A second manager over the same store sees the same snapshot: state
    // lives in the store, not in the manager.
    let other = SagaManager::new(Arc::new(store.clone()));
    other.register_saga("journal", JournalSaga::boxed);
    other
        .handle_event(
            &saga_id,
            "journal",
            SagaEvent::new("Record").with("seq", Value::from(4u64)),
        )
        .await
        .unwrap();

    let state = store.load_state(&saga_id).await.unwrap().unwrap();
    let entries = state.data().get("entries").unwrap().as_array().unwrap();
    assert_eq!(entries.len(), 4);
}

#[tokio::test]
async fn completion_during_contained_failure_still_deletes() {
    init_tracing();

    /// Completes and then fails in the same call; the completion must win.
    struct FlakyFinisher {
        saga_id: SagaId,
        status: String,
    }

    #[async_trait]
    impl Saga for FlakyFinisher {
        async fn handle_event(&mut self, _event: &SagaEvent) -> Result<()> {
            self.status = "completed".to_string();
            Err(SagaError::StepFailed {
                step: "finish".to_string(),
                reason: "downstream ack lost".to_string(),
            })
        }

        fn is_completed(&self) -> bool {
            self.status == "completed"
        }

        fn state(&self) -> SagaState {
            SagaState::new(self.saga_id.clone(), self.status.clone(), Map::new())
        }

        fn set_state(&mut self, state: SagaState) -> Result<()> {
            let (saga_id, status, _) = state.into_parts();
            self.saga_id = saga_id;
            self.status = status;
            Ok(())
        }
    }

    let store = InMemorySagaStore::new();
    let manager = SagaManager::new(Arc::new(store.clone()));
    manager.register_saga("flaky", |saga_id| {
        Box::new(FlakyFinisher {
            saga_id,
            status: "pending".to_string(),
        }) as Box<dyn Saga>
    });

    let saga_id = SagaId::new("flaky-1");
    manager
        .handle_event(&saga_id, "flaky", SagaEvent::new("Finish"))
        .await
        .unwrap();

    // Completion implies absence, even though the handler raised.
    assert!(store.load_state(&saga_id).await.unwrap().is_none());
    assert!(manager.list_active_sagas().is_empty());
}
