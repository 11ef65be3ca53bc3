//! The saga contract.

use std::sync::Arc;

use async_trait::async_trait;
use saga_store::SagaState;

use crate::command_bus::CommandBus;
use crate::error::Result;
use crate::event::SagaEvent;

/// A long-running, multi-step business process driven by discrete events.
///
/// Each variant owns its status vocabulary and transition rules. A live
/// instance is either constructed fresh (first event for an unseen saga ID)
/// or hydrated by replaying a persisted snapshot onto a fresh instance via
/// [`set_state`](Saga::set_state).
///
/// Contract notes:
/// - `handle_event` may mutate status and data, may call
///   [`compensate`](Saga::compensate) itself, and may return an error after
///   having already applied mutations. Those mutations survive: the manager
///   persists the post-handler snapshot even when the call failed.
/// - The engine never calls `compensate` on its own; compensation policy is
///   entirely variant-owned, and idempotence is a variant responsibility.
/// - `is_completed` is a pure predicate over the current status. A variant
///   may have several terminal statuses (e.g. both "completed" and
///   "compensated").
#[async_trait]
pub trait Saga: Send + Sync {
    /// Reacts to an event, advancing the variant's state machine.
    async fn handle_event(&mut self, event: &SagaEvent) -> Result<()>;

    /// Semantically rolls back previously applied steps.
    ///
    /// The default is a no-op. Once called, the variant must treat its prior
    /// effects as already unwound.
    async fn compensate(&mut self) -> Result<()> {
        Ok(())
    }

    /// Returns true if the saga has reached one of its terminal statuses.
    fn is_completed(&self) -> bool;

    /// Snapshots the current saga ID, status, and data.
    fn state(&self) -> SagaState;

    /// Restores the saga from a snapshot.
    ///
    /// Used only during hydration, never mid-dispatch. Fails if the opaque
    /// data bag cannot be decoded into the variant's payload.
    fn set_state(&mut self, state: SagaState) -> Result<()>;

    /// Hands the saga a command bus to dispatch commands through.
    ///
    /// The default ignores the bus; variants that dispatch commands
    /// override this. The engine neither constructs nor constrains the bus.
    fn set_command_bus(&mut self, _bus: Arc<dyn CommandBus>) {}
}
