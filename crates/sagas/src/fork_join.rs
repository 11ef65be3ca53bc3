//! Fork/join saga.
//!
//! Two independent steps run in parallel elsewhere; the saga joins once both
//! report completion and finishes on an explicit `Finalize` event.

use async_trait::async_trait;
use common::SagaId;
use saga_engine::{Result, Saga, SagaError, SagaEvent, SagaState};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The saga type identifier for fork/join.
pub const SAGA_TYPE: &str = "fork_join";

/// At least one branch is still outstanding.
pub const STATUS_WAITING: &str = "waiting";
/// Both branches completed; awaiting finalization.
pub const STATUS_JOINED: &str = "joined";
/// Terminal.
pub const STATUS_COMPLETED: &str = "completed";

#[derive(Debug, Default, Serialize, Deserialize)]
struct ForkJoinPayload {
    step_a_done: bool,
    step_b_done: bool,
}

/// Saga that joins two independent parallel steps.
pub struct ForkJoinSaga {
    saga_id: SagaId,
    status: String,
    payload: ForkJoinPayload,
}

impl ForkJoinSaga {
    /// Creates a fresh instance with both branches outstanding.
    pub fn new(saga_id: SagaId) -> Self {
        Self {
            saga_id,
            status: STATUS_WAITING.to_string(),
            payload: ForkJoinPayload::default(),
        }
    }

    /// Boxing constructor for registry registration.
    pub fn boxed(saga_id: SagaId) -> Box<dyn Saga> {
        Box::new(Self::new(saga_id))
    }

    fn join_if_ready(&mut self) {
        if self.payload.step_a_done && self.payload.step_b_done {
            self.status = STATUS_JOINED.to_string();
            tracing::info!(saga_id = %self.saga_id, "both branches complete, joined");
        }
    }
}

#[async_trait]
impl Saga for ForkJoinSaga {
    async fn handle_event(&mut self, event: &SagaEvent) -> Result<()> {
        match event.event_type() {
            "StepACompleted" => {
                self.payload.step_a_done = true;
                self.join_if_ready();
                Ok(())
            }
            "StepBCompleted" => {
                self.payload.step_b_done = true;
                self.join_if_ready();
                Ok(())
            }
            "Finalize" => {
                if self.status != STATUS_JOINED {
                    return Err(SagaError::UnexpectedEvent {
                        event_type: "Finalize".to_string(),
                        status: self.status.clone(),
                    });
                }
                self.status = STATUS_COMPLETED.to_string();
                Ok(())
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
        let mut data = serde_json::Map::new();
        data.insert(
            "step_a_done".to_string(),
            Value::from(self.payload.step_a_done),
        );
        data.insert(
            "step_b_done".to_string(),
            Value::from(self.payload.step_b_done),
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
