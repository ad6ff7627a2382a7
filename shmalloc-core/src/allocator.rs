// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Named shared-memory resource.
//!
//! Routes `allocate_named` and `find_pointer_from_name` through the
//! creation/attach protocol and keeps the resulting segments in a
//! per-resource directory. The directory sits behind a mutex, so a resource
//! can be shared between threads; calls are serialized for their whole
//! duration, including the publication wait.

use std::ptr::NonNull;
use std::sync::{Mutex, MutexGuard};

use crate::config::AllocatorConfig;
use crate::error::{AllocError, AllocResult};
use crate::resource::{MemoryResource, MemoryResourceTraits, Platform};
use crate::segment::{BackingObject, SegmentDirectory, SegmentInfo};
use crate::types::{segment_size, SegmentName};

/// Host memory resource backed by named POSIX shared-memory objects.
#[derive(Debug)]
pub struct SharedMemoryResource {
    name: String,
    id: u32,
    traits: MemoryResourceTraits,
    config: AllocatorConfig,
    directory: Mutex<SegmentDirectory>,
}

impl SharedMemoryResource {
    pub fn new(
        name: impl Into<String>,
        id: u32,
        traits: MemoryResourceTraits,
        config: AllocatorConfig,
    ) -> Self {
        Self {
            name: name.into(),
            id,
            traits,
            config,
            directory: Mutex::new(SegmentDirectory::new()),
        }
    }

    /// Resource with shared-memory traits and the default configuration.
    pub fn with_defaults(name: impl Into<String>, id: u32) -> Self {
        Self::new(
            name,
            id,
            MemoryResourceTraits::shared_memory(),
            AllocatorConfig::default(),
        )
    }

    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    // Both indices are updated without calling out, so a poisoned directory
    // is still consistent.
    fn directory(&self) -> MutexGuard<'_, SegmentDirectory> {
        self.directory
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Create the segment `name` with `bytes` bytes, or attach to it if
    /// another process already created it.
    ///
    /// On the attach path the mapping covers the size published by the
    /// creator, which may differ from `bytes`.
    pub fn allocate_named(&self, name: &str, bytes: usize) -> AllocResult<NonNull<u8>> {
        let name = SegmentName::new(name)?;
        let size = segment_size(bytes)?;

        let mut directory = self.directory();
        if directory.contains_name(name.as_str()) {
            return Err(AllocError::AlreadyMapped {
                name: name.to_string(),
            });
        }

        let segment = BackingObject::obtain(&name, size, &self.config)?.map()?;
        let base = directory.register(segment)?.base();

        Ok(base)
    }

    /// Anonymous allocation is not supported: every segment needs a name.
    pub fn allocate(&self, bytes: usize) -> AllocResult<NonNull<u8>> {
        Err(AllocError::NamedAllocationRequired { bytes })
    }

    /// Release the segment mapped at `ptr`.
    ///
    /// Only the owner unlinks the backing object; other processes keep their
    /// mappings either way. Any pointer into the region is dangling after
    /// this returns.
    pub fn deallocate(&self, ptr: NonNull<u8>) -> AllocResult<()> {
        let segment = self.directory().remove(ptr.as_ptr() as usize)?;
        segment.release()
    }

    /// Address of `name` in this process, attaching to an existing backing
    /// object if this process has not mapped it yet. Never creates one.
    pub fn find_pointer_from_name(&self, name: &str) -> AllocResult<NonNull<u8>> {
        let name = SegmentName::new(name)?;

        let mut directory = self.directory();
        if let Some(segment) = directory.lookup_by_name(name.as_str()) {
            return Ok(segment.base());
        }

        let segment = BackingObject::attach(&name, &self.config.publication_wait)?.map()?;
        let base = directory.register(segment)?.base();

        Ok(base)
    }

    pub fn segment(&self, name: &str) -> Option<SegmentInfo> {
        let name = SegmentName::new(name).ok()?;
        self.directory()
            .lookup_by_name(name.as_str())
            .map(|segment| segment.info())
    }

    pub fn segment_at(&self, ptr: NonNull<u8>) -> Option<SegmentInfo> {
        self.directory()
            .lookup_by_address(ptr.as_ptr() as usize)
            .map(|segment| segment.info())
    }

    pub fn segments(&self) -> Vec<SegmentInfo> {
        self.directory().iter().map(|segment| segment.info()).collect()
    }

    pub fn len(&self) -> usize {
        self.directory().len()
    }

    pub fn is_empty(&self) -> bool {
        self.directory().is_empty()
    }
}

impl MemoryResource for SharedMemoryResource {
    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> u32 {
        self.id
    }

    fn traits(&self) -> MemoryResourceTraits {
        self.traits
    }

    fn platform(&self) -> Platform {
        Platform::Host
    }

    fn is_accessible_from(&self, platform: Platform) -> bool {
        platform == Platform::Host
    }

    fn allocate(&self, bytes: usize) -> AllocResult<NonNull<u8>> {
        SharedMemoryResource::allocate(self, bytes)
    }

    fn allocate_named(&self, name: &str, bytes: usize) -> AllocResult<NonNull<u8>> {
        SharedMemoryResource::allocate_named(self, name, bytes)
    }

    fn deallocate(&self, ptr: NonNull<u8>) -> AllocResult<()> {
        SharedMemoryResource::deallocate(self, ptr)
    }

    fn find_pointer_from_name(&self, name: &str) -> AllocResult<NonNull<u8>> {
        SharedMemoryResource::find_pointer_from_name(self, name)
    }
}

impl Drop for SharedMemoryResource {
    fn drop(&mut self) {
        let remaining = self.directory().drain();
        if remaining.is_empty() {
            return;
        }

        tracing::warn!(
            resource = %self.name,
            segments = remaining.len(),
            "Releasing segments still mapped at resource drop"
        );
        for segment in remaining {
            let name = segment.name().to_string();
            if let Err(e) = segment.release() {
                tracing::error!(name = %name, error = %e, "Failed to release segment");
            }
        }
    }
}
