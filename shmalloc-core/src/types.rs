// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Newtype wrappers for validated inputs.
//!
//! Segment names and sizes are checked at construction so that the
//! creation/attach protocol never hands a malformed value to the OS.

use std::borrow::Borrow;
use std::fmt;
use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

use crate::error::HardValidationError;

/// Longest name accepted by `shm_open` on Linux (NAME_MAX).
pub const MAX_SEGMENT_NAME_LEN: usize = 255;

/// Validated shared-memory segment name.
///
/// Stored without the leading slash; [`SegmentName::os_name`] adds it back
/// for the POSIX shared-memory namespace.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SegmentName(String);

impl SegmentName {
    /// Create a new SegmentName with validation.
    pub fn new(name: impl Into<String>) -> Result<Self, HardValidationError> {
        let raw = name.into();
        let name = raw.strip_prefix('/').unwrap_or(&raw);

        let reason = if name.is_empty() {
            Some("Segment name cannot be empty".to_string())
        } else if name.len() > MAX_SEGMENT_NAME_LEN {
            Some(format!(
                "Segment name too long: {} bytes (max {})",
                name.len(),
                MAX_SEGMENT_NAME_LEN
            ))
        } else if name.contains('/') {
            Some("Segment name may only contain a leading '/'".to_string())
        } else if name == "." || name == ".." {
            Some("Segment name cannot be '.' or '..'".to_string())
        } else if name.contains('\0') {
            Some("Segment name cannot contain NUL bytes".to_string())
        } else {
            None
        };

        match reason {
            Some(reason) => Err(HardValidationError::InvalidSegmentName { name: raw, reason }),
            None => Ok(Self(name.to_string())),
        }
    }

    /// Get the name as given by callers (no leading slash).
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the backing object in the shared-memory namespace.
    pub fn os_name(&self) -> String {
        format!("/{}", self.0)
    }
}

impl fmt::Display for SegmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Borrow<str> for SegmentName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SegmentName {
    type Error = HardValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for SegmentName {
    type Error = HardValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SegmentName> for String {
    fn from(name: SegmentName) -> Self {
        name.0
    }
}

/// Validate a requested segment size.
///
/// A zero-length backing object is indistinguishable from one whose creator
/// has not published yet, so zero is rejected up front.
pub fn segment_size(bytes: usize) -> Result<NonZeroUsize, HardValidationError> {
    NonZeroUsize::new(bytes).ok_or_else(|| HardValidationError::InvalidSegmentSize {
        size: bytes,
        reason: "Segment size must be non-zero".to_string(),
    })
}
