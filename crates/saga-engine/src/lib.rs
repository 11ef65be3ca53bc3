//! Saga orchestration engine.
//!
//! This crate coordinates long-running, multi-step business processes
//! ("sagas") that react to external events, may dispatch commands to other
//! subsystems, and compensate prior steps when a later step fails.
//!
//! The engine consists of:
//! - the [`Saga`] contract every business-process variant implements,
//! - the [`SagaTypeRegistry`] mapping string type tags to constructors,
//! - the [`SagaManager`] that serializes per-saga dispatch, hydrates or
//!   creates instances, contains handler failures, and enforces the
//!   completion/persistence invariant against a [`saga_store::SagaStore`].
//!
//! Completion is modeled as deletion: a saga that reports itself complete
//! has no persisted state afterward. A saga that is not complete after
//! handling an event has exactly its current snapshot persisted.

pub mod command_bus;
pub mod error;
pub mod event;
pub mod manager;
pub mod registry;
pub mod saga;

pub use command_bus::{Command, CommandBus, RecordingCommandBus};
pub use common::SagaId;
pub use error::{Result, SagaError};
pub use event::SagaEvent;
pub use manager::{ActiveSagaInfo, SagaManager};
pub use registry::{SagaConstructor, SagaTypeRegistry};
pub use saga::Saga;
pub use saga_store::{InMemorySagaStore, SagaState, SagaStore, StoreError};
