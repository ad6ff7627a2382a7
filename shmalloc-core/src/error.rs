// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Custom error types for the shared-memory allocator.
//!
//! Every fallible allocator operation returns an explicit variant.
//! No `Box<dyn Error>`, no `anyhow::Result` - all errors are strongly typed.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use nix::errno::Errno;
use thiserror::Error;

/// Top-level error type for the allocator.
#[derive(Debug, Error)]
pub enum AllocError {
    // =========================================================================
    // Backing Object Errors - Surfaced Directly, Never Retried
    // =========================================================================
    #[error("Backing object '{name}' could not be created or opened: {syscall} - {source}")]
    BackingObject {
        name: String,
        syscall: &'static str,
        #[source]
        source: Errno,
    },

    #[error("Failed to map backing object '{name}' ({size} bytes): {source}")]
    Mapping {
        name: String,
        size: usize,
        #[source]
        source: Errno,
    },

    #[error("Backing object '{name}' never published its size after {attempts} attempts ({waited:?})")]
    PublicationTimeout {
        name: String,
        attempts: u32,
        waited: Duration,
    },

    // =========================================================================
    // Directory Errors
    // =========================================================================
    #[error("Unknown segment: {0}")]
    UnknownSegment(SegmentKey),

    #[error("Segment '{name}' is already mapped in this process")]
    AlreadyMapped { name: String },

    #[error("Failed to release segment '{name}': {syscall} - {source}")]
    Teardown {
        name: String,
        syscall: &'static str,
        #[source]
        source: Errno,
    },

    // =========================================================================
    // Caller Errors
    // =========================================================================
    #[error("Anonymous allocation of {bytes} bytes rejected: shared memory segments must be named")]
    NamedAllocationRequired { bytes: usize },

    #[error("No registered factory accepts resource '{name}'")]
    UnknownResource { name: String },

    #[error("Hard validation error: {0}")]
    Validation(#[from] HardValidationError),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Configuration parse error: {message}")]
    ConfigParse { message: String },

    #[error("IO error: {context} - {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Key used to look a segment up in the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentKey {
    Name(String),
    Address(usize),
}

impl fmt::Display for SegmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "name '{}'", name),
            Self::Address(addr) => write!(f, "address {:#x}", addr),
        }
    }
}

/// Rejected input or configuration. Raised before any OS object is touched.
#[derive(Debug, Error)]
pub enum HardValidationError {
    #[error("Invalid field value: {field} = {value} - {reason}")]
    InvalidFieldValue {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Invalid segment name '{name}': {reason}")]
    InvalidSegmentName { name: String, reason: String },

    #[error("Invalid segment size {size}: {reason}")]
    InvalidSegmentSize { size: usize, reason: String },
}

/// Result type alias using AllocError.
pub type AllocResult<T> = Result<T, AllocError>;
