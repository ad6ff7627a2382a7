// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `shmalloc read` command - Attach to a segment and print its contents.
//!
//! The CLI process is never the owner here, so releasing the mapping leaves
//! the backing object in place for its creator.

use shmalloc_core::AllocatorConfig;

use super::open_resource;

pub async fn execute(
    config: AllocatorConfig,
    name: &str,
    len: Option<usize>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(name = %name, "Attaching to segment");

    let resource = open_resource(config);
    let ptr = resource.find_pointer_from_name(name)?;
    let info = resource
        .segment(name)
        .ok_or("segment missing from directory after attach")?;

    // SAFETY: ptr is the base of a live mapping of info.size bytes. Writers
    // in other processes may race with this read; the bytes are a snapshot.
    let contents = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), info.size) };
    let checksum = crc32fast::hash(contents);
    let shown = &contents[..len.unwrap_or(info.size).min(info.size)];

    if json {
        let report = serde_json::json!({
            "segment": info,
            "crc32": format!("{:#010x}", checksum),
            "data": String::from_utf8_lossy(shown),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Segment '{}' ({} bytes, crc32 {:#010x})", info.name, info.size, checksum);
        println!("{}", String::from_utf8_lossy(shown));
    }

    resource.deallocate(ptr)?;
    Ok(())
}
