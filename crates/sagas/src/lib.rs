//! Example saga workloads.
//!
//! Each module implements one business-process variant of the
//! [`saga_engine::Saga`] contract, demonstrating a distinct orchestration
//! pattern:
//! - [`retry`] — retry a timed-out step against a budget, then give up.
//! - [`fork_join`] — wait for independent parallel steps to all complete.
//! - [`compensation`] — unwind completed steps in reverse on failure.
//! - [`escalation`] — route a persistently failing process to approval.
//! - [`order_fulfillment`] — a command-dispatching fulfillment pipeline
//!   with compensating commands.
//!
//! Variants keep a typed payload struct internally and serialize it through
//! the store's opaque `data` channel in `state()`/`set_state()`.

pub mod compensation;
pub mod escalation;
pub mod fork_join;
pub mod order_fulfillment;
pub mod retry;

pub use compensation::CompensationChainSaga;
pub use escalation::EscalationSaga;
pub use fork_join::ForkJoinSaga;
pub use order_fulfillment::OrderFulfillmentSaga;
pub use retry::TimeoutRetrySaga;
