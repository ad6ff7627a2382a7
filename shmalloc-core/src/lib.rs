//! shmalloc Core Library
//!
//! Named, cross-process shared-memory segment allocator. One process creates
//! a segment and publishes its size; others attach to it by name. Teardown
//! destroys the backing object exactly once, from the owning process.

pub mod allocator;
pub mod config;
pub mod error;
pub mod registry;
pub mod resource;
pub mod segment;
pub mod types;

// Re-export commonly used types
pub use allocator::SharedMemoryResource;
pub use config::{AllocatorConfig, ConfigLoader};
pub use error::{AllocError, AllocResult, HardValidationError, SegmentKey};
pub use registry::{MemoryResourceFactory, MemoryResourceRegistry, SharedMemoryResourceFactory};
pub use resource::{MemoryResource, MemoryResourceTraits, Platform};
pub use segment::{remove_backing_object, PublicationWait, SegmentInfo};
pub use types::SegmentName;
