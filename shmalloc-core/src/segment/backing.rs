// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Creation/attach protocol over POSIX shared memory.
//!
//! Exactly one process wins the exclusive `shm_open` for a name. The winner
//! is the owner and publishes the segment size with `ftruncate`. Everyone
//! else opens the existing object and waits until the size is non-zero
//! before mapping it.

use std::num::NonZeroUsize;
use std::os::fd::{AsRawFd, OwnedFd};

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::libc;
use nix::sys::mman::{mmap, shm_open, shm_unlink, MapFlags, ProtFlags};
use nix::sys::stat::{fchmod, fstat, Mode};
use nix::unistd::ftruncate;

use super::{PublicationWait, Segment};
use crate::config::AllocatorConfig;
use crate::error::{AllocError, AllocResult, HardValidationError, SegmentKey};
use crate::types::SegmentName;

/// An opened backing object whose size is known but which is not mapped yet.
#[derive(Debug)]
pub(crate) struct BackingObject {
    name: SegmentName,
    fd: OwnedFd,
    size: NonZeroUsize,
    owner: bool,
}

impl BackingObject {
    /// Create the backing object for `name`, or attach to the existing one.
    ///
    /// `size_hint` is only used when this call creates the object. An
    /// attacher takes whatever size the creator published.
    pub(crate) fn obtain(
        name: &SegmentName,
        size_hint: NonZeroUsize,
        config: &AllocatorConfig,
    ) -> AllocResult<Self> {
        if let Some(created) = Self::create_exclusive(name, size_hint, config.permissions)? {
            return Ok(created);
        }

        // Lost the race, or the object was already there.
        let fd = open_existing(name).map_err(|source| AllocError::BackingObject {
            name: name.to_string(),
            syscall: "shm_open",
            source,
        })?;
        let attached = Self::await_publication(name, fd, &config.publication_wait)?;

        if attached.size != size_hint {
            tracing::warn!(
                name = %name,
                requested = size_hint.get(),
                published = attached.size.get(),
                "Attached segment size differs from requested size"
            );
        }

        Ok(attached)
    }

    /// Attach to an existing backing object without ever creating one.
    pub(crate) fn attach(name: &SegmentName, wait: &PublicationWait) -> AllocResult<Self> {
        let fd = open_existing(name).map_err(|source| match source {
            Errno::ENOENT => AllocError::UnknownSegment(SegmentKey::Name(name.to_string())),
            source => AllocError::BackingObject {
                name: name.to_string(),
                syscall: "shm_open",
                source,
            },
        })?;

        Self::await_publication(name, fd, wait)
    }

    /// Exclusive creation. `Ok(None)` means the object already exists.
    fn create_exclusive(
        name: &SegmentName,
        size: NonZeroUsize,
        permissions: u32,
    ) -> AllocResult<Option<Self>> {
        let len = libc::off_t::try_from(size.get()).map_err(|_| {
            HardValidationError::InvalidSegmentSize {
                size: size.get(),
                reason: "Size does not fit in off_t".to_string(),
            }
        })?;

        let os_name = name.os_name();
        let mode = Mode::from_bits_truncate(permissions as libc::mode_t);
        let fd = match shm_open(
            os_name.as_str(),
            OFlag::O_RDWR | OFlag::O_CREAT | OFlag::O_EXCL,
            mode,
        ) {
            Ok(fd) => fd,
            Err(Errno::EEXIST) => return Ok(None),
            Err(source) => {
                return Err(AllocError::BackingObject {
                    name: name.to_string(),
                    syscall: "shm_open",
                    source,
                })
            }
        };

        // shm_open applies the umask; set the configured bits exactly.
        if let Err(source) = fchmod(fd.as_raw_fd(), mode) {
            let _ = shm_unlink(os_name.as_str());
            return Err(AllocError::BackingObject {
                name: name.to_string(),
                syscall: "fchmod",
                source,
            });
        }

        // Publish the size. Attachers wait for this.
        if let Err(source) = ftruncate(&fd, len) {
            let _ = shm_unlink(os_name.as_str());
            return Err(AllocError::BackingObject {
                name: name.to_string(),
                syscall: "ftruncate",
                source,
            });
        }

        tracing::debug!(name = %name, size = size.get(), "Created backing object");

        Ok(Some(Self {
            name: name.clone(),
            fd,
            size,
            owner: true,
        }))
    }

    fn await_publication(
        name: &SegmentName,
        fd: OwnedFd,
        wait: &PublicationWait,
    ) -> AllocResult<Self> {
        let size = wait.wait(name.as_str(), || {
            let stat = fstat(fd.as_raw_fd())?;
            Ok(usize::try_from(stat.st_size).unwrap_or(0))
        })?;

        tracing::debug!(name = %name, size = size.get(), "Attached to backing object");

        Ok(Self {
            name: name.clone(),
            fd,
            size,
            owner: false,
        })
    }

    /// Map the object read-write and shared for its full size.
    ///
    /// An owner that fails to map removes the object again, so a failed
    /// call leaves nothing behind.
    pub(crate) fn map(self) -> AllocResult<Segment> {
        // SAFETY: a fresh mapping at a kernel-chosen address cannot alias any
        // existing Rust allocation; fd is open and size is the object length.
        let mapped = unsafe {
            mmap(
                None,
                self.size,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
                &self.fd,
                0,
            )
        };

        match mapped {
            Ok(base) => {
                tracing::debug!(
                    name = %self.name,
                    size = self.size.get(),
                    owner = self.owner,
                    "Mapped segment"
                );
                Ok(Segment::new(
                    self.name,
                    base.cast(),
                    self.size,
                    self.fd,
                    self.owner,
                ))
            }
            Err(source) => {
                if self.owner {
                    let _ = shm_unlink(self.name.os_name().as_str());
                }
                Err(AllocError::Mapping {
                    name: self.name.to_string(),
                    size: self.size.get(),
                    source,
                })
            }
        }
    }
}

fn open_existing(name: &SegmentName) -> Result<OwnedFd, Errno> {
    shm_open(name.os_name().as_str(), OFlag::O_RDWR, Mode::empty())
}

/// Remove a backing object from the shared-memory namespace by name.
///
/// Processes that still map it keep their mappings. This is the recovery
/// path for objects left behind by a creator that exited without releasing.
pub fn remove_backing_object(name: &SegmentName) -> AllocResult<()> {
    match shm_unlink(name.os_name().as_str()) {
        Ok(()) => {
            tracing::debug!(name = %name, "Removed backing object");
            Ok(())
        }
        Err(Errno::ENOENT) => Err(AllocError::UnknownSegment(SegmentKey::Name(
            name.to_string(),
        ))),
        Err(source) => Err(AllocError::BackingObject {
            name: name.to_string(),
            syscall: "shm_unlink",
            source,
        }),
    }
}
