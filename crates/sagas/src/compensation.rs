//! Compensation-chain saga.
//!
//! Records completed steps as they are reported and, when a later step
//! fails, unwinds the completed steps in reverse order inside the same
//! dispatch. The failure path ends in the terminal `compensated` status.

use async_trait::async_trait;
use common::SagaId;
use saga_engine::{Result, Saga, SagaError, SagaEvent, SagaState};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The saga type identifier for the compensation chain.
pub const SAGA_TYPE: &str = "compensation_chain";

/// Step names.
pub const STEP_ONE: &str = "step1";
pub const STEP_TWO: &str = "step2";

/// Waiting on the next step report.
pub const STATUS_WAITING: &str = "waiting";
/// A step failed; prior steps are being unwound.
pub const STATUS_COMPENSATING: &str = "compensating";
/// Terminal: prior steps unwound.
pub const STATUS_COMPENSATED: &str = "compensated";
/// Terminal: all steps succeeded.
pub const STATUS_COMPLETED: &str = "completed";

#[derive(Debug, Default, Serialize, Deserialize)]
struct ChainPayload {
    completed_steps: Vec<String>,
    compensated_steps: Vec<String>,
    failure_reason: Option<String>,
}

/// Saga that unwinds completed steps in reverse on failure.
pub struct CompensationChainSaga {
    saga_id: SagaId,
    status: String,
    payload: ChainPayload,
}

impl CompensationChainSaga {
    /// Creates a fresh instance with no completed steps.
    pub fn new(saga_id: SagaId) -> Self {
        Self {
            saga_id,
            status: STATUS_WAITING.to_string(),
            payload: ChainPayload::default(),
        }
    }

    /// Boxing constructor for registry registration.
    pub fn boxed(saga_id: SagaId) -> Box<dyn Saga> {
        Box::new(Self::new(saga_id))
    }

    /// Returns the steps compensated so far, in compensation order.
    pub fn compensated_steps(&self) -> &[String] {
        &self.payload.compensated_steps
    }
}

#[async_trait]
impl Saga for CompensationChainSaga {
    async fn handle_event(&mut self, event: &SagaEvent) -> Result<()> {
        match event.event_type() {
            "Step1Completed" => {
                self.payload.completed_steps.push(STEP_ONE.to_string());
                Ok(())
            }
            "Step2Completed" => {
                self.payload.completed_steps.push(STEP_TWO.to_string());
                self.status = STATUS_COMPLETED.to_string();
                Ok(())
            }
            "Step2Failed" => {
                let reason = event
                    .get("reason")
                    .and_then(Value::as_str)
                    .unwrap_or("step2 failed")
                    .to_string();
                self.payload.failure_reason = Some(reason.clone());
                self.status = STATUS_COMPENSATING.to_string();
                // Unwind synchronously inside the same dispatch.
                self.compensate().await?;
                self.status = STATUS_COMPENSATED.to_string();
                tracing::warn!(saga_id = %self.saga_id, %reason, "step failed, chain compensated");
                Ok(())
            }
            other => Err(SagaError::UnexpectedEvent {
                event_type: other.to_string(),
                status: self.status.clone(),
            }),
        }
    }

    /// Moves completed steps to the compensated list, most recent first.
    ///
    /// Safe to call again once applied: an empty completed list is a no-op.
    async fn compensate(&mut self) -> Result<()> {
        while let Some(step) = self.payload.completed_steps.pop() {
            tracing::info!(saga_id = %self.saga_id, step, "compensating step");
            self.payload.compensated_steps.push(step);
        }
        Ok(())
    }

    fn is_completed(&self) -> bool {
        matches!(self.status.as_str(), STATUS_COMPLETED | STATUS_COMPENSATED)
    }

    fn state(&self) -> SagaState {
        let mut data = serde_json::Map::new();
        data.insert(
            "completed_steps".to_string(),
            Value::from(self.payload.completed_steps.clone()),
        );
        data.insert(
            "compensated_steps".to_string(),
            Value::from(self.payload.compensated_steps.clone()),
        );
        data.insert(
            "failure_reason".to_string(),
            self.payload
                .failure_reason
                .clone()
                .map_or(Value::Null, Value::from),
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
