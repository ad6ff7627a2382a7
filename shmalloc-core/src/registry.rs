//! Thread-safe memory resource registry using DashMap.
//!
//! Factories claim resource names by pattern; the registry instantiates a
//! resource the first time its name is requested and hands out the same
//! instance afterwards.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::allocator::SharedMemoryResource;
use crate::config::AllocatorConfig;
use crate::error::{AllocError, AllocResult};
use crate::resource::{MemoryResource, MemoryResourceTraits};

/// Resource names containing this marker are served by shared memory.
pub const SHARED_MEMORY_MARKER: &str = "SHMEM";

/// Creates resources of one kind.
pub trait MemoryResourceFactory: Send + Sync {
    /// Whether this factory serves the resource called `name`.
    fn is_valid_memory_resource_for(&self, name: &str) -> bool;

    fn default_traits(&self) -> MemoryResourceTraits;

    fn create(
        &self,
        name: &str,
        id: u32,
        traits: MemoryResourceTraits,
    ) -> AllocResult<Arc<dyn MemoryResource>>;
}

/// Factory for [`SharedMemoryResource`].
#[derive(Debug, Clone, Default)]
pub struct SharedMemoryResourceFactory {
    config: AllocatorConfig,
}

impl SharedMemoryResourceFactory {
    pub fn new(config: AllocatorConfig) -> Self {
        Self { config }
    }
}

impl MemoryResourceFactory for SharedMemoryResourceFactory {
    fn is_valid_memory_resource_for(&self, name: &str) -> bool {
        name.contains(SHARED_MEMORY_MARKER)
    }

    fn default_traits(&self) -> MemoryResourceTraits {
        MemoryResourceTraits::shared_memory()
    }

    fn create(
        &self,
        name: &str,
        id: u32,
        traits: MemoryResourceTraits,
    ) -> AllocResult<Arc<dyn MemoryResource>> {
        Ok(Arc::new(SharedMemoryResource::new(
            name,
            id,
            traits,
            self.config.clone(),
        )))
    }
}

/// Registry of factories and the resources they created.
pub struct MemoryResourceRegistry {
    factories: RwLock<Vec<Box<dyn MemoryResourceFactory>>>,
    resources: DashMap<String, Arc<dyn MemoryResource>>,
    next_id: AtomicU32,
}

impl MemoryResourceRegistry {
    /// Create an empty registry with no factories.
    pub fn new() -> Self {
        Self {
            factories: RwLock::new(Vec::new()),
            resources: DashMap::new(),
            next_id: AtomicU32::new(0),
        }
    }

    /// Registry with the shared-memory factory already registered.
    pub fn with_shared_memory(config: AllocatorConfig) -> Self {
        let registry = Self::new();
        registry.register_factory(Box::new(SharedMemoryResourceFactory::new(config)));
        registry
    }

    /// Create a registry wrapped in an Arc for sharing across threads.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Add a factory. Earlier factories win when several accept a name.
    pub fn register_factory(&self, factory: Box<dyn MemoryResourceFactory>) {
        self.factories
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(factory);
    }

    /// Return the resource called `name`, creating it on first use.
    pub fn make_resource(&self, name: &str) -> AllocResult<Arc<dyn MemoryResource>> {
        match self.resources.entry(name.to_string()) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let factories = self
                    .factories
                    .read()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                let factory = factories
                    .iter()
                    .find(|factory| factory.is_valid_memory_resource_for(name))
                    .ok_or_else(|| AllocError::UnknownResource {
                        name: name.to_string(),
                    })?;

                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let resource = factory.create(name, id, factory.default_traits())?;

                tracing::debug!(resource = %name, id = id, "Created memory resource");

                entry.insert(Arc::clone(&resource));
                Ok(resource)
            }
        }
    }

    /// Look up an already created resource.
    pub fn get(&self, name: &str) -> Option<Arc<dyn MemoryResource>> {
        self.resources.get(name).map(|r| Arc::clone(r.value()))
    }

    /// Get the number of created resources.
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Check if no resource has been created yet.
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Get a list of all resource names.
    pub fn resource_names(&self) -> Vec<String> {
        self.resources.iter().map(|r| r.key().clone()).collect()
    }
}

impl Default for MemoryResourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
