//! Saga state persistence.
//!
//! This crate defines the [`SagaState`] snapshot value, the [`SagaStore`]
//! port through which the engine loads, saves, and deletes snapshots, and an
//! in-memory reference implementation.
//!
//! The persisted layout is a single keyed record per saga ID containing
//! `{saga_id, status, data}`. No secondary indices and no schema versioning
//! are mandated; `data` is an opaque, variant-defined bag.

pub mod error;
pub mod memory;
pub mod state;
pub mod store;

pub use common::SagaId;
pub use error::{Result, StoreError};
pub use memory::InMemorySagaStore;
pub use state::SagaState;
pub use store::SagaStore;
