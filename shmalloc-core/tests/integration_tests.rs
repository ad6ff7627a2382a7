// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! End-to-end tests against real POSIX shared memory.
//!
//! Two `SharedMemoryResource` instances stand in for two processes: each has
//! its own directory and its own descriptors, and the kernel does not care
//! whether both mappings live in the same address space.

use std::ptr::NonNull;
use std::thread;
use std::time::Duration;

use nix::fcntl::OFlag;
use nix::sys::mman::shm_open;
use nix::sys::stat::Mode;
use nix::unistd::ftruncate;
use shmalloc_core::{
    remove_backing_object, AllocError, AllocatorConfig, ConfigLoader, PublicationWait,
    SegmentName, SharedMemoryResource,
};
use tempfile::TempDir;

fn unique(tag: &str) -> String {
    format!("shmalloc-it-{}-{}", std::process::id(), tag)
}

fn resource(id: u32) -> SharedMemoryResource {
    SharedMemoryResource::with_defaults(format!("SHMEM::{}", id), id)
}

fn write_bytes(ptr: NonNull<u8>, bytes: &[u8]) {
    // SAFETY: callers only write within the mapped length.
    unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.as_ptr(), bytes.len()) };
}

fn read_bytes(ptr: NonNull<u8>, len: usize) -> Vec<u8> {
    // SAFETY: callers only read within the mapped length.
    unsafe { std::slice::from_raw_parts(ptr.as_ptr(), len).to_vec() }
}

/// Creator writes, attacher reads, owner teardown, then the name is reusable.
#[test]
fn test_create_attach_release_recreate() {
    let name = unique("scenario");
    let a = resource(0);
    let b = resource(1);

    let a_ptr = a.allocate_named(&name, 12).unwrap();
    write_bytes(a_ptr, b"HI\n");

    let b_ptr = b.find_pointer_from_name(&name).unwrap();
    assert_eq!(read_bytes(b_ptr, 3), b"HI\n");

    let b_info = b.segment(&name).unwrap();
    assert_eq!(b_info.size, 12);
    assert!(!b_info.owner);

    // Owner destroys the backing object; B still has its mapping.
    a.deallocate(a_ptr).unwrap();
    assert_eq!(read_bytes(b_ptr, 3), b"HI\n");

    // B only unmaps locally.
    b.deallocate(b_ptr).unwrap();
    assert!(b.is_empty());

    // Fresh, empty 20-byte segment under the same name.
    let fresh = a.allocate_named(&name, 20).unwrap();
    let info = a.segment(&name).unwrap();
    assert!(info.owner);
    assert_eq!(info.size, 20);
    assert_eq!(read_bytes(fresh, 20), vec![0u8; 20]);
    a.deallocate(fresh).unwrap();
}

/// A non-owner's deallocate leaves the backing object for everyone else.
#[test]
fn test_non_owner_release_keeps_backing_object() {
    let name = unique("non-owner");
    let a = resource(0);
    let b = resource(1);
    let c = resource(2);

    let a_ptr = a.allocate_named(&name, 64).unwrap();
    write_bytes(a_ptr, b"shared");

    // Attach through allocate_named: B is not the owner.
    let b_ptr = b.allocate_named(&name, 64).unwrap();
    assert!(!b.segment(&name).unwrap().owner);
    b.deallocate(b_ptr).unwrap();

    let c_ptr = c.find_pointer_from_name(&name).unwrap();
    assert_eq!(read_bytes(c_ptr, 6), b"shared");
    c.deallocate(c_ptr).unwrap();

    a.deallocate(a_ptr).unwrap();

    // Now gone for good.
    assert!(matches!(
        c.find_pointer_from_name(&name),
        Err(AllocError::UnknownSegment(_))
    ));
}

/// Attachers map the creator's size, not their own request.
#[test]
fn test_attach_maps_published_size() {
    let name = unique("published-size");
    let a = resource(0);
    let b = resource(1);

    let a_ptr = a.allocate_named(&name, 8192).unwrap();
    let b_ptr = b.allocate_named(&name, 16).unwrap();
    assert_eq!(b.segment(&name).unwrap().size, 8192);

    write_bytes(a_ptr, &[7u8; 8192]);
    assert_eq!(read_bytes(b_ptr, 8192), vec![7u8; 8192]);

    b.deallocate(b_ptr).unwrap();
    a.deallocate(a_ptr).unwrap();
}

/// Attacher blocks until the creator publishes, then maps exactly that size.
#[test]
fn test_attach_waits_for_publication() {
    let name = unique("race");
    let segment_name = SegmentName::new(name.as_str()).unwrap();

    // Creator side: object exists but has length zero.
    let fd = shm_open(
        segment_name.os_name().as_str(),
        OFlag::O_RDWR | OFlag::O_CREAT | OFlag::O_EXCL,
        Mode::from_bits_truncate(0o600),
    )
    .unwrap();

    let attacher = {
        let name = name.clone();
        thread::spawn(move || {
            let b = resource(1);
            let ptr = b.find_pointer_from_name(&name).unwrap();
            let size = b.segment(&name).unwrap().size;
            b.deallocate(ptr).unwrap();
            size
        })
    };

    thread::sleep(Duration::from_millis(50));
    ftruncate(&fd, 4096).unwrap();

    assert_eq!(attacher.join().unwrap(), 4096);

    drop(fd);
    remove_backing_object(&segment_name).unwrap();
}

/// allocate_named loses the exclusive create, waits, and maps the published size.
#[test]
fn test_allocate_named_waits_for_publication() {
    let name = unique("named-race");
    let segment_name = SegmentName::new(name.as_str()).unwrap();

    let fd = shm_open(
        segment_name.os_name().as_str(),
        OFlag::O_RDWR | OFlag::O_CREAT | OFlag::O_EXCL,
        Mode::from_bits_truncate(0o600),
    )
    .unwrap();

    let attacher = {
        let name = name.clone();
        thread::spawn(move || {
            let b = resource(1);
            let ptr = b.allocate_named(&name, 16).unwrap();
            let info = b.segment(&name).unwrap();
            b.deallocate(ptr).unwrap();
            (info.size, info.owner)
        })
    };

    thread::sleep(Duration::from_millis(50));
    ftruncate(&fd, 777).unwrap();

    assert_eq!(attacher.join().unwrap(), (777, false));

    drop(fd);
    remove_backing_object(&segment_name).unwrap();
}

/// A creator whose size cannot be backed leaves no object and no entry.
#[test]
fn test_failed_creation_leaves_nothing() {
    let name = unique("unbackable");
    let a = resource(0);

    let err = a.allocate_named(&name, 1usize << 62).unwrap_err();
    assert!(matches!(
        err,
        AllocError::Mapping { .. } | AllocError::BackingObject { .. }
    ));
    assert!(a.is_empty());

    let segment_name = SegmentName::new(name.as_str()).unwrap();
    assert!(matches!(
        remove_backing_object(&segment_name),
        Err(AllocError::UnknownSegment(_))
    ));
}

/// A creator that never publishes ends in a timeout, not a hang.
#[test]
fn test_unpublished_segment_times_out() {
    let name = unique("timeout");
    let segment_name = SegmentName::new(name.as_str()).unwrap();

    let _fd = shm_open(
        segment_name.os_name().as_str(),
        OFlag::O_RDWR | OFlag::O_CREAT | OFlag::O_EXCL,
        Mode::from_bits_truncate(0o600),
    )
    .unwrap();

    let config = AllocatorConfig {
        publication_wait: PublicationWait::new(
            10,
            2,
            Duration::from_micros(100),
            Duration::from_millis(1),
        ),
        ..AllocatorConfig::default()
    };
    let b = SharedMemoryResource::new(
        "SHMEM::1",
        1,
        shmalloc_core::MemoryResourceTraits::shared_memory(),
        config,
    );

    let err = b.allocate_named(&name, 64).unwrap_err();
    assert!(matches!(
        err,
        AllocError::PublicationTimeout { attempts: 10, .. }
    ));
    assert!(b.is_empty());

    // Recovery: remove the stale object, then creation succeeds.
    remove_backing_object(&segment_name).unwrap();
    let ptr = b.allocate_named(&name, 64).unwrap();
    assert!(b.segment(&name).unwrap().owner);
    b.deallocate(ptr).unwrap();
}

#[test]
fn test_resolve_unknown_name() {
    let b = resource(1);
    let err = b.find_pointer_from_name(&unique("never-created")).unwrap_err();
    assert!(matches!(err, AllocError::UnknownSegment(_)));
    assert!(b.is_empty());
}

/// Deallocating a foreign pointer touches nothing.
#[test]
fn test_deallocate_unregistered_address() {
    let name = unique("foreign-ptr");
    let a = resource(0);
    let b = resource(1);

    let a_ptr = a.allocate_named(&name, 32).unwrap();

    // Registered in A, unknown to B.
    assert!(matches!(
        b.deallocate(a_ptr),
        Err(AllocError::UnknownSegment(_))
    ));

    // Still mapped and still present for attachers.
    write_bytes(a_ptr, b"ok");
    let c = resource(2);
    let c_ptr = c.find_pointer_from_name(&name).unwrap();
    assert_eq!(read_bytes(c_ptr, 2), b"ok");

    c.deallocate(c_ptr).unwrap();
    a.deallocate(a_ptr).unwrap();
}

/// Many threads racing to create the same name: exactly one owner.
#[test]
fn test_concurrent_creation_single_owner() {
    let name = unique("many-creators");

    let handles: Vec<_> = (0..8u32)
        .map(|i| {
            let name = name.clone();
            thread::spawn(move || {
                let r = resource(i);
                // NonNull is not Send; the address travels in the info.
                r.allocate_named(&name, 1024).unwrap();
                let info = r.segment(&name).unwrap();
                (r, info)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let owners = results.iter().filter(|(_, info)| info.owner).count();
    assert_eq!(owners, 1);
    assert!(results.iter().all(|(_, info)| info.size == 1024));

    // Release non-owners first, then the owner.
    let (owners, others): (Vec<_>, Vec<_>) =
        results.into_iter().partition(|(_, info)| info.owner);
    for (r, info) in others.into_iter().chain(owners) {
        let ptr = NonNull::new(info.address as *mut u8).unwrap();
        r.deallocate(ptr).unwrap();
    }

    let segment_name = SegmentName::new(name.as_str()).unwrap();
    assert!(remove_backing_object(&segment_name).is_err());
}

/// Configuration loaded from disk drives the allocator.
#[test]
fn test_config_file_loading() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config_path = temp_dir.path().join("shmalloc.yaml");

    std::fs::write(
        &config_path,
        r#"
allocator:
  permissions: "0600"
  publication_wait:
    max_attempts: 3
    spin_yields: 1
    initial_backoff_us: 10
    max_backoff_ms: 1
"#,
    )
    .expect("Failed to write config");

    let config = ConfigLoader::load_file(&config_path).unwrap();
    assert_eq!(config.permissions, 0o600);
    assert_eq!(config.publication_wait.max_attempts(), 3);

    let r = SharedMemoryResource::new(
        "SHMEM::0",
        0,
        shmalloc_core::MemoryResourceTraits::shared_memory(),
        config,
    );
    let name = unique("configured");
    let ptr = r.allocate_named(&name, 16).unwrap();
    r.deallocate(ptr).unwrap();
}

#[test]
fn test_invalid_config_file_rejected() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config_path = temp_dir.path().join("bad.yaml");

    std::fs::write(
        &config_path,
        r#"
allocator:
  permissions: "0444"
"#,
    )
    .expect("Failed to write config");

    assert!(matches!(
        ConfigLoader::load_file(&config_path),
        Err(AllocError::Validation(_))
    ));
}
