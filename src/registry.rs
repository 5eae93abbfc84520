//! Destination → unit-type bindings.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::unit::{Payload, Schema, UnitSchema};

/// Error type for registry operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistryError {
    /// A unit type is already bound to this destination.
    DuplicateDestination {
        destination: String,
        existing: &'static str,
    },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::DuplicateDestination {
                destination,
                existing,
            } => write!(
                f,
                "destination {} is already bound to unit type {}",
                destination, existing
            ),
        }
    }
}

impl std::error::Error for RegistryError {}

/// The destination → unit-type binding table.
///
/// Populated once during setup and treated as read-only afterward; the
/// inbound adapter refuses registrations once its worker is running.
///
/// ```
/// use stomp_bridge::{TextPayload, UnitRegistry};
///
/// let mut registry = UnitRegistry::new();
/// registry.register_type::<TextPayload>("/topic/t1").unwrap();
///
/// assert!(registry.resolve("/topic/t1").is_some());
/// assert!(registry.resolve("/topic/unknown").is_none());
/// // Binding a second type to the same destination fails fast.
/// assert!(registry.register_type::<TextPayload>("/topic/t1").is_err());
/// ```
#[derive(Clone, Default)]
pub struct UnitRegistry {
    bindings: HashMap<String, Arc<dyn UnitSchema>>,
}

impl UnitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a destination to a unit schema.
    ///
    /// Duplicate bindings fail fast instead of overwriting.
    pub fn register(
        &mut self,
        destination: impl Into<String>,
        schema: Arc<dyn UnitSchema>,
    ) -> Result<(), RegistryError> {
        let destination = destination.into();
        if let Some(existing) = self.bindings.get(&destination) {
            return Err(RegistryError::DuplicateDestination {
                destination,
                existing: existing.kind(),
            });
        }
        self.bindings.insert(destination, schema);
        Ok(())
    }

    /// Bind a destination to a payload type.
    pub fn register_type<P: Payload>(
        &mut self,
        destination: impl Into<String>,
    ) -> Result<(), RegistryError> {
        self.register(destination, Schema::<P>::shared())
    }

    /// Look up the schema expected from a destination.
    pub fn resolve(&self, destination: &str) -> Option<&Arc<dyn UnitSchema>> {
        self.bindings.get(destination)
    }

    pub fn destinations(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
