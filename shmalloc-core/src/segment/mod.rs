// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Named shared-memory segments.
//!
//! A [`Segment`] is the process-local record of one mapping of a backing
//! object: base address, length, descriptor and ownership flag. Segments are
//! produced by the creation/attach protocol in [`backing`], kept in the
//! [`SegmentDirectory`], and torn down with [`Segment::release`].

mod backing;
mod directory;
mod wait;

use std::num::NonZeroUsize;
use std::os::fd::OwnedFd;
use std::ptr::NonNull;

use nix::sys::mman::{munmap, shm_unlink};
use serde::Serialize;

use crate::error::{AllocError, AllocResult};
use crate::types::SegmentName;

pub(crate) use backing::BackingObject;
pub use backing::remove_backing_object;
pub use directory::SegmentDirectory;
pub use wait::PublicationWait;

/// A mapped shared-memory segment.
///
/// Dropping a segment that was not explicitly released performs the same
/// teardown and logs any failure.
#[derive(Debug)]
pub struct Segment {
    name: SegmentName,
    base: NonNull<u8>,
    size: NonZeroUsize,
    /// `None` once the descriptor has been closed.
    fd: Option<OwnedFd>,
    owner: bool,
    released: bool,
}

// SAFETY: the mapping is MAP_SHARED and not tied to the creating thread.
// Access to the bytes is the caller's responsibility.
unsafe impl Send for Segment {}

impl Segment {
    fn new(
        name: SegmentName,
        base: NonNull<u8>,
        size: NonZeroUsize,
        fd: OwnedFd,
        owner: bool,
    ) -> Self {
        Self {
            name,
            base,
            size,
            fd: Some(fd),
            owner,
            released: false,
        }
    }

    pub fn name(&self) -> &SegmentName {
        &self.name
    }

    /// Base of the mapping in this process.
    pub fn base(&self) -> NonNull<u8> {
        self.base
    }

    /// Base address as an integer, the key of the address index.
    pub fn address(&self) -> usize {
        self.base.as_ptr() as usize
    }

    /// Mapped length in bytes.
    pub fn size(&self) -> usize {
        self.size.get()
    }

    /// Whether this process created the backing object.
    pub fn is_owner(&self) -> bool {
        self.owner
    }

    /// Snapshot of the record for introspection.
    pub fn info(&self) -> SegmentInfo {
        SegmentInfo {
            name: self.name.to_string(),
            size: self.size(),
            owner: self.owner,
            address: self.address(),
        }
    }

    /// Unmap the region, close the descriptor and, for the owner only,
    /// unlink the backing object.
    ///
    /// Every step is attempted; the first failure is returned.
    pub fn release(mut self) -> AllocResult<()> {
        self.teardown()
    }

    fn teardown(&mut self) -> AllocResult<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let mut result = Ok(());

        // SAFETY: base and size describe the mapping created for this record,
        // and `released` guarantees it is unmapped at most once.
        if let Err(source) = unsafe { munmap(self.base.cast(), self.size.get()) } {
            result = Err(AllocError::Teardown {
                name: self.name.to_string(),
                syscall: "munmap",
                source,
            });
        }

        // Closing an OwnedFd cannot report failure.
        drop(self.fd.take());

        if self.owner {
            match shm_unlink(self.name.os_name().as_str()) {
                Ok(()) => {
                    tracing::debug!(name = %self.name, "Unlinked backing object");
                }
                Err(source) => {
                    if result.is_ok() {
                        result = Err(AllocError::Teardown {
                            name: self.name.to_string(),
                            syscall: "shm_unlink",
                            source,
                        });
                    }
                }
            }
        }

        tracing::debug!(
            name = %self.name,
            size = self.size.get(),
            owner = self.owner,
            "Released segment"
        );

        result
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            tracing::error!(name = %self.name, error = %e, "Failed to release segment");
        }
    }
}

/// Serializable view of a segment record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentInfo {
    pub name: String,
    pub size: usize,
    pub owner: bool,
    pub address: usize,
}
