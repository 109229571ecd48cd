//! Engine context handed to tools at initialization
//!
//! Instead of process-wide singletons for devices and communication links,
//! each Solution gets its own [`EngineContext`]: the buffer pool plus a
//! typed [`ServiceRegistry`] that callers fill with whatever collaborators
//! their tools need (camera handles, PLC links, calibration tables).

use crate::config::EngineConfig;
use crate::memory::BufferPool;
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Type-keyed store of shared services
#[derive(Clone, Default)]
pub struct ServiceRegistry {
    services: Arc<RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service, replacing any previous one of the same type
    pub fn insert<T: Any + Send + Sync>(&self, service: T) {
        let previous = self
            .services
            .write()
            .insert(TypeId::of::<T>(), Arc::new(service));
        if previous.is_some() {
            tracing::debug!("Replaced service {}", std::any::type_name::<T>());
        }
    }

    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let service = self.services.read().get(&TypeId::of::<T>()).cloned()?;
        service.downcast::<T>().ok()
    }

    pub fn contains<T: Any + Send + Sync>(&self) -> bool {
        self.services.read().contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.services.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.read().is_empty()
    }
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.len())
            .finish()
    }
}

/// Shared resources for one engine instance
///
/// Cheap to clone; clones share the same pool and services.
#[derive(Debug, Clone)]
pub struct EngineContext {
    pool: BufferPool,
    services: ServiceRegistry,
}

impl EngineContext {
    pub fn new(pool: BufferPool) -> Self {
        Self {
            pool,
            services: ServiceRegistry::new(),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(BufferPool::from_config(&config.pool))
    }

    pub fn with_services(mut self, services: ServiceRegistry) -> Self {
        self.services = services;
        self
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    pub fn services(&self) -> &ServiceRegistry {
        &self.services
    }
}
