//! `shmalloc unlink` command - Remove a stale backing object.

use shmalloc_core::{remove_backing_object, SegmentName};

pub async fn execute(name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let name = SegmentName::new(name)?;
    tracing::info!(name = %name, "Removing backing object");

    remove_backing_object(&name)?;

    println!("✓ Backing object '{}' removed", name);
    Ok(())
}
