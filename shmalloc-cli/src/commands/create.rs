// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `shmalloc create` command - Create or attach, write, hold, release.

use std::ptr::NonNull;
use std::time::Duration;

use shmalloc_core::AllocatorConfig;

use super::open_resource;

pub async fn execute(
    config: AllocatorConfig,
    name: &str,
    size: usize,
    data: Option<&str>,
    hold_secs: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let resource = open_resource(config);

    let ptr = resource.allocate_named(name, size)?;
    let info = resource
        .segment(name)
        .ok_or("segment missing from directory after allocation")?;

    if let Some(data) = data {
        if let Err(e) = write_at_start(ptr, info.size, data.as_bytes()) {
            resource.deallocate(ptr)?;
            return Err(e.into());
        }
    }

    println!(
        "✓ Segment '{}' {} at {:#x} ({} bytes)",
        info.name,
        if info.owner { "created" } else { "attached" },
        info.address,
        info.size
    );

    match hold_secs {
        Some(secs) => {
            println!("  Holding for {}s...", secs);
            tokio::time::sleep(Duration::from_secs(secs)).await;
        }
        None => {
            println!("  Holding until Ctrl-C...");
            tokio::signal::ctrl_c().await?;
        }
    }

    resource.deallocate(ptr)?;
    println!("✓ Segment '{}' released", info.name);

    Ok(())
}

fn write_at_start(ptr: NonNull<u8>, mapped: usize, bytes: &[u8]) -> Result<(), String> {
    if bytes.len() > mapped {
        return Err(format!(
            "data is {} bytes but the segment holds only {}",
            bytes.len(),
            mapped
        ));
    }

    tracing::debug!(len = bytes.len(), "Writing data at offset 0");

    // SAFETY: ptr is the base of a live mapping of `mapped` bytes and the
    // write length was checked against it.
    unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.as_ptr(), bytes.len()) };
    Ok(())
}
