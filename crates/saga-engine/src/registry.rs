//! Saga type registry.

use std::collections::HashMap;
use std::sync::Arc;

use common::SagaId;

use crate::error::{Result, SagaError};
use crate::saga::Saga;

/// Constructor producing a fresh saga instance seeded with its saga ID.
pub type SagaConstructor = Arc<dyn Fn(SagaId) -> Box<dyn Saga> + Send + Sync>;

/// Maps string type tags to saga constructors.
///
/// Dispatch is tagged by name, not by host type: the tag travels with every
/// event and selects which variant gets constructed (or hydrated). Each
/// manager owns its own registry; there is no process-wide registration.
#[derive(Clone, Default)]
pub struct SagaTypeRegistry {
    constructors: HashMap<String, SagaConstructor>,
}

impl SagaTypeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a constructor for a type tag.
    ///
    /// Re-registering an existing tag silently replaces the previous
    /// constructor (last-write-wins).
    pub fn register<F>(&mut self, type_tag: impl Into<String>, constructor: F)
    where
        F: Fn(SagaId) -> Box<dyn Saga> + Send + Sync + 'static,
    {
        self.constructors
            .insert(type_tag.into(), Arc::new(constructor));
    }

    /// Resolves a type tag to its constructor.
    ///
    /// An unknown tag is a configuration defect, surfaced as
    /// [`SagaError::TypeNotRegistered`].
    pub fn resolve(&self, type_tag: &str) -> Result<SagaConstructor> {
        self.constructors
            .get(type_tag)
            .cloned()
            .ok_or_else(|| SagaError::TypeNotRegistered(type_tag.to_string()))
    }

    /// Returns true if the tag has a registered constructor.
    pub fn is_registered(&self, type_tag: &str) -> bool {
        self.constructors.contains_key(type_tag)
    }

    /// Returns the registered type tags, sorted.
    pub fn registered_types(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.constructors.keys().cloned().collect();
        tags.sort();
        tags
    }
}

impl std::fmt::Debug for SagaTypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SagaTypeRegistry")
            .field("registered_types", &self.registered_types())
            .finish()
    }
}
