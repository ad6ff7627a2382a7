// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! CLI command modules.

pub mod create;
pub mod read;
pub mod unlink;
pub mod validate;

use shmalloc_core::{
    AllocatorConfig, MemoryResourceFactory, SharedMemoryResource, SharedMemoryResourceFactory,
};

/// Resource name used by the CLI.
pub const RESOURCE_NAME: &str = "SHMEM::0";

/// Shared-memory resource carrying the factory's default traits.
pub fn open_resource(config: AllocatorConfig) -> SharedMemoryResource {
    let traits = SharedMemoryResourceFactory::default().default_traits();
    SharedMemoryResource::new(RESOURCE_NAME, 0, traits, config)
}
