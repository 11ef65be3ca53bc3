//! Saga engine error types.

use saga_store::StoreError;
use thiserror::Error;

/// Errors that can occur during saga operations.
///
/// The manager contains business-level handler errors (`StepFailed`,
/// `CompensationFailed`, `UnexpectedEvent`, and anything else a variant
/// returns from `handle_event`) so that post-handler persistence always
/// runs. Configuration errors (`TypeNotRegistered`) and anything touching
/// the persistence boundary (`Store`) are always surfaced to the caller.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The saga type tag has no registered constructor.
    #[error("Saga type not registered: {0}")]
    TypeNotRegistered(String),

    /// The event is malformed (e.g. missing the "type" discriminator).
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// A saga step failed.
    #[error("Saga step '{step}' failed: {reason}")]
    StepFailed { step: String, reason: String },

    /// A compensation step failed.
    #[error("Compensation step '{step}' failed: {reason}")]
    CompensationFailed { step: String, reason: String },

    /// The variant received an event it cannot handle in its current status.
    #[error("Unexpected event '{event_type}' in status '{status}'")]
    UnexpectedEvent { event_type: String, status: String },

    /// Dispatching a command over the command bus failed.
    #[error("Command dispatch failed: {0}")]
    CommandDispatch(String),

    /// Saga store error.
    #[error("Saga store error: {0}")]
    Store(#[from] StoreError),

    /// Serialization error at the opaque-data boundary.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
