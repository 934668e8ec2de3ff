//! Accessor type → handle factory table
//!
//! Built once at startup and shared behind an `Arc`; there is no way to
//! register a factory after [`AccessorRegistryBuilder::build`].

use std::collections::HashMap;
use std::sync::Arc;

use super::{AccessType, AccessorFactory, AccessorHandle, HandleArguments};
use crate::error::{WorkerError, WorkerResult};

/// Factory plus the static relative cost for one access type.
#[derive(Clone)]
pub struct StaticAccessor {
    pub access_type: AccessType,
    pub factory: Arc<dyn AccessorFactory>,
    pub relative_cost: u32,
}

/// Immutable table of the accessor types this worker can handle.
pub struct AccessorRegistry {
    entries: HashMap<AccessType, StaticAccessor>,
}

impl AccessorRegistry {
    pub fn builder() -> AccessorRegistryBuilder {
        AccessorRegistryBuilder::default()
    }

    /// A registry with no backends; every lookup fails.
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// The registered factory and cost for `access_type`.
    pub fn get_accessor_static_handle(
        &self,
        access_type: AccessType,
    ) -> WorkerResult<&StaticAccessor> {
        self.entries
            .get(&access_type)
            .ok_or(WorkerError::AccessorNotRegistered(access_type))
    }

    pub fn is_registered(&self, access_type: AccessType) -> bool {
        self.entries.contains_key(&access_type)
    }

    /// Registered types, in declaration order.
    pub fn registered_types(&self) -> Vec<AccessType> {
        AccessType::ALL
            .into_iter()
            .filter(|t| self.entries.contains_key(t))
            .collect()
    }

    /// Build a handle for `args.accessor` with the factory registered for its type.
    pub fn create_handle(&self, args: HandleArguments<'_>) -> WorkerResult<Arc<dyn AccessorHandle>> {
        let expected = args.accessor.access_type();
        let entry = self.get_accessor_static_handle(expected)?;
        let handle = entry.factory.create_handle(args)?;
        let actual = handle.access_type();
        if actual != expected {
            return Err(WorkerError::UnexpectedAccessorType { expected, actual });
        }
        Ok(handle)
    }
}

/// Collects factories before freezing them into an [`AccessorRegistry`].
#[derive(Default)]
pub struct AccessorRegistryBuilder {
    entries: HashMap<AccessType, StaticAccessor>,
}

impl AccessorRegistryBuilder {
    /// Register the factory for `access_type`, replacing any earlier one.
    pub fn register(mut self, access_type: AccessType, factory: Arc<dyn AccessorFactory>) -> Self {
        self.entries.insert(
            access_type,
            StaticAccessor {
                access_type,
                factory,
                relative_cost: access_type.relative_cost(),
            },
        );
        self
    }

    pub fn build(self) -> AccessorRegistry {
        AccessorRegistry {
            entries: self.entries,
        }
    }
}
