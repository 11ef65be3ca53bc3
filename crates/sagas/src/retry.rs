//! Timeout/retry saga.
//!
//! Waits on a step that is retried by an external scheduler. Each `Timeout`
//! event consumes one retry from the budget; once the budget is exhausted
//! the saga parks in `failed` and only an explicit `StepCompleted` event can
//! finish it.

use async_trait::async_trait;
use common::SagaId;
use saga_engine::{Result, Saga, SagaError, SagaEvent, SagaState};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The saga type identifier for timeout/retry.
pub const SAGA_TYPE: &str = "timeout_retry";

/// Step is waiting, retries remain.
pub const STATUS_WAITING: &str = "waiting";
/// Retry budget exhausted; an explicit completion is still expected.
pub const STATUS_FAILED: &str = "failed";
/// Terminal.
pub const STATUS_COMPLETED: &str = "completed";

/// Default retry budget.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

#[derive(Debug, Serialize, Deserialize)]
struct RetryPayload {
    retries: u32,
    max_retries: u32,
}

/// Saga that retries a timed-out step against a budget.
///
/// Transitions: `waiting → waiting → … → failed` across repeated `Timeout`
/// events, `completed` on `StepCompleted` from any non-terminal status.
pub struct TimeoutRetrySaga {
    saga_id: SagaId,
    status: String,
    payload: RetryPayload,
}

impl TimeoutRetrySaga {
    /// Creates a fresh instance with the default retry budget.
    pub fn new(saga_id: SagaId) -> Self {
        Self::with_max_retries(saga_id, DEFAULT_MAX_RETRIES)
    }

    /// Creates a fresh instance with an explicit retry budget.
    pub fn with_max_retries(saga_id: SagaId, max_retries: u32) -> Self {
        Self {
            saga_id,
            status: STATUS_WAITING.to_string(),
            payload: RetryPayload {
                retries: 0,
                max_retries,
            },
        }
    }

    /// Boxing constructor for registry registration.
    pub fn boxed(saga_id: SagaId) -> Box<dyn Saga> {
        Box::new(Self::new(saga_id))
    }

    /// Returns the number of timeouts absorbed so far.
    pub fn retries(&self) -> u32 {
        self.payload.retries
    }
}

#[async_trait]
impl Saga for TimeoutRetrySaga {
    async fn handle_event(&mut self, event: &SagaEvent) -> Result<()> {
        match event.event_type() {
            "Timeout" => {
                self.payload.retries += 1;
                if self.payload.retries > self.payload.max_retries {
                    self.status = STATUS_FAILED.to_string();
                    tracing::warn!(
                        saga_id = %self.saga_id,
                        retries = self.payload.retries,
                        "retry budget exhausted"
                    );
                } else {
                    tracing::info!(
                        saga_id = %self.saga_id,
                        retries = self.payload.retries,
                        max_retries = self.payload.max_retries,
                        "step timed out, retrying"
                    );
                }
                Ok(())
            }
            "StepCompleted" => {
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
        data.insert("retries".to_string(), Value::from(self.payload.retries));
        data.insert(
            "max_retries".to_string(),
            Value::from(self.payload.max_retries),
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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn timeouts_consume_budget_then_fail() {
        let mut saga = TimeoutRetrySaga::new(SagaId::new("retry-1"));
        assert_eq!(saga.state().status(), STATUS_WAITING);

        saga.handle_event(&SagaEvent::new("Timeout")).await.unwrap();
        assert_eq!(saga.state().status(), STATUS_WAITING);
        assert_eq!(saga.retries(), 1);

        saga.handle_event(&SagaEvent::new("Timeout")).await.unwrap();
        assert_eq!(saga.state().status(), STATUS_WAITING);
        assert_eq!(saga.retries(), 2);

        saga.handle_event(&SagaEvent::new("Timeout")).await.unwrap();
        assert_eq!(saga.state().status(), STATUS_FAILED);
        assert!(!saga.is_completed());
    }

    #[tokio::test]
    async fn completion_requires_explicit_event() {
        let mut saga = TimeoutRetrySaga::with_max_retries(SagaId::new("retry-1"), 0);
        saga.handle_event(&SagaEvent::new("Timeout")).await.unwrap();
        assert_eq!(saga.state().status(), STATUS_FAILED);

        saga.handle_event(&SagaEvent::new("StepCompleted"))
            .await
            .unwrap();
        assert_eq!(saga.state().status(), STATUS_COMPLETED);
        assert!(saga.is_completed());
    }

    #[tokio::test]
    async fn unknown_event_is_rejected() {
        let mut saga = TimeoutRetrySaga::new(SagaId::new("retry-1"));
        let result = saga.handle_event(&SagaEvent::new("Bogus")).await;
        assert!(matches!(result, Err(SagaError::UnexpectedEvent { .. })));
    }

    #[tokio::test]
    async fn state_round_trip() {
        let mut saga = TimeoutRetrySaga::new(SagaId::new("retry-1"));
        saga.handle_event(&SagaEvent::new("Timeout")).await.unwrap();

        let snapshot = saga.state();
        let mut hydrated = TimeoutRetrySaga::new(SagaId::new("retry-1"));
        hydrated.set_state(snapshot.clone()).unwrap();

        assert_eq!(hydrated.state(), snapshot);
        assert_eq!(hydrated.retries(), 1);
    }
}
