// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Memory resource identity and the allocation interface.
//!
//! The allocation framework talks to every resource kind through
//! [`MemoryResource`]. Shared memory is a host-only resource.

use std::fmt;
use std::ptr::NonNull;

use serde::{Deserialize, Serialize};

use crate::error::AllocResult;

/// Execution platform a resource's memory lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    Undefined,
    Host,
    Cuda,
    Hip,
    Sycl,
    OmpTarget,
}

impl Platform {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Host => "host",
            Self::Cuda => "cuda",
            Self::Hip => "hip",
            Self::Sycl => "sycl",
            Self::OmpTarget => "omp_target",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Vendor {
    Unknown,
    Amd,
    Ibm,
    Intel,
    Nvidia,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemoryKind {
    Unknown,
    Ddr,
    Gddr,
    Hbm,
    Nvme,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizedFor {
    Any,
    Latency,
    Bandwidth,
    Access,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceType {
    Unknown,
    Device,
    DeviceConst,
    File,
    Host,
    Pinned,
    Shared,
    Um,
}

/// How widely a shared resource is visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SharedScope {
    Unknown,
    Node,
    Socket,
}

/// Descriptive properties of a memory resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryResourceTraits {
    pub unified: bool,
    pub size: usize,
    pub vendor: Vendor,
    pub kind: MemoryKind,
    pub used_for: OptimizedFor,
    pub resource: ResourceType,
    pub scope: SharedScope,
}

impl MemoryResourceTraits {
    /// Traits of node-wide named shared memory.
    pub const fn shared_memory() -> Self {
        Self {
            unified: false,
            size: 0,
            vendor: Vendor::Unknown,
            kind: MemoryKind::Unknown,
            used_for: OptimizedFor::Any,
            resource: ResourceType::Shared,
            scope: SharedScope::Node,
        }
    }
}

/// Allocation interface exposed to the surrounding framework.
pub trait MemoryResource: Send + Sync {
    /// Resource name, e.g. `"SHMEM::0"`.
    fn name(&self) -> &str;

    fn id(&self) -> u32;

    fn traits(&self) -> MemoryResourceTraits;

    fn platform(&self) -> Platform;

    fn is_accessible_from(&self, platform: Platform) -> bool;

    /// Anonymous allocation.
    fn allocate(&self, bytes: usize) -> AllocResult<NonNull<u8>>;

    /// Allocation identified by `name`, visible to other users of the name.
    fn allocate_named(&self, name: &str, bytes: usize) -> AllocResult<NonNull<u8>>;

    fn deallocate(&self, ptr: NonNull<u8>) -> AllocResult<()>;

    /// Address of the named allocation in this process.
    fn find_pointer_from_name(&self, name: &str) -> AllocResult<NonNull<u8>>;
}
