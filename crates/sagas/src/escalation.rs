//! Escalation saga.
//!
//! Retries a failing step against an attempt budget; once the budget is
//! exhausted the process is routed to a human approval path and waits for
//! an explicit `EscalationApproved` event.

use async_trait::async_trait;
use common::SagaId;
use saga_engine::{Result, Saga, SagaError, SagaEvent, SagaState};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The saga type identifier for escalation.
pub const SAGA_TYPE: &str = "escalation";

/// Waiting on the step (attempts remain).
pub const STATUS_WAITING: &str = "waiting";
/// Attempt budget exhausted; waiting on approval.
pub const STATUS_ESCALATED: &str = "escalated";
/// Terminal: approved through the escalation path.
pub const STATUS_APPROVED: &str = "approved";
/// Terminal: the step eventually succeeded on its own.
pub const STATUS_COMPLETED: &str = "completed";

/// Default attempt budget.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;

#[derive(Debug, Serialize, Deserialize)]
struct EscalationPayload {
    attempts: u32,
    max_attempts: u32,
}

/// Saga that escalates a persistently failing process to approval.
pub struct EscalationSaga {
    saga_id: SagaId,
    status: String,
    payload: EscalationPayload,
}

impl EscalationSaga {
    /// Creates a fresh instance with the default attempt budget.
    pub fn new(saga_id: SagaId) -> Self {
        Self::with_max_attempts(saga_id, DEFAULT_MAX_ATTEMPTS)
    }

    /// Creates a fresh instance with an explicit attempt budget.
    pub fn with_max_attempts(saga_id: SagaId, max_attempts: u32) -> Self {
        Self {
            saga_id,
            status: STATUS_WAITING.to_string(),
            payload: EscalationPayload {
                attempts: 0,
                max_attempts,
            },
        }
    }

    /// Boxing constructor for registry registration.
    pub fn boxed(saga_id: SagaId) -> Box<dyn Saga> {
        Box::new(Self::new(saga_id))
    }

    /// Returns the number of failed attempts absorbed so far.
    pub fn attempts(&self) -> u32 {
        self.payload.attempts
    }
}

#[async_trait]
impl Saga for EscalationSaga {
    async fn handle_event(&mut self, event: &SagaEvent) -> Result<()> {
        match event.event_type() {
            "StepFailed" => {
                self.payload.attempts += 1;
                if self.payload.attempts > self.payload.max_attempts {
                    self.status = STATUS_ESCALATED.to_string();
                    tracing::warn!(
                        saga_id = %self.saga_id,
                        attempts = self.payload.attempts,
                        "attempt budget exhausted, escalating to approval"
                    );
                }
                Ok(())
            }
            "StepCompleted" => {
                self.status = STATUS_COMPLETED.to_string();
                Ok(())
            }
            "EscalationApproved" => {
                if self.status != STATUS_ESCALATED {
                    return Err(SagaError::UnexpectedEvent {
                        event_type: "EscalationApproved".to_string(),
                        status: self.status.clone(),
                    });
                }
                self.status = STATUS_APPROVED.to_string();
                Ok(())
            }
            other => Err(SagaError::UnexpectedEvent {
                event_type: other.to_string(),
                status: self.status.clone(),
            }),
        }
    }

    fn is_completed(&self) -> bool {
        matches!(self.status.as_str(), STATUS_APPROVED | STATUS_COMPLETED)
    }

    fn state(&self) -> SagaState {
        let mut data = serde_json::Map::new();
        data.insert("attempts".to_string(), Value::from(self.payload.attempts));
        data.insert(
            "max_attempts".to_string(),
            Value::from(self.payload.max_attempts),
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
