// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! YAML configuration parser with strict schema validation.
//!
//! Any invalid field results in a HardValidationError; a partially valid
//! configuration is never used.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{AllocError, AllocResult, HardValidationError};
use crate::segment::PublicationWait;

/// Owner read and write. Required because every mapping is read-write.
const OWNER_RW: u32 = 0o600;

/// Raw publication wait policy as parsed from YAML (before validation).
#[derive(Debug, Deserialize)]
struct RawPublicationWait {
    #[serde(default = "default_max_attempts")]
    max_attempts: u32,
    #[serde(default = "default_spin_yields")]
    spin_yields: u32,
    #[serde(default = "default_initial_backoff_us")]
    initial_backoff_us: u64,
    #[serde(default = "default_max_backoff_ms")]
    max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    1000
}

fn default_spin_yields() -> u32 {
    64
}

fn default_initial_backoff_us() -> u64 {
    50
}

fn default_max_backoff_ms() -> u64 {
    10
}

impl Default for RawPublicationWait {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            spin_yields: default_spin_yields(),
            initial_backoff_us: default_initial_backoff_us(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Raw allocator configuration.
#[derive(Debug, Deserialize)]
struct RawAllocatorConfig {
    #[serde(default = "default_permissions")]
    permissions: String,
    #[serde(default)]
    publication_wait: RawPublicationWait,
}

fn default_permissions() -> String {
    "0644".to_string()
}

impl Default for RawAllocatorConfig {
    fn default() -> Self {
        Self {
            permissions: default_permissions(),
            publication_wait: RawPublicationWait::default(),
        }
    }
}

/// Raw root configuration file.
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    allocator: RawAllocatorConfig,
}

/// Validated allocator configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocatorConfig {
    /// Permission bits for newly created backing objects, applied exactly
    /// (not masked by the process umask).
    pub permissions: u32,
    /// Bounded wait used while attaching to an unpublished backing object.
    pub publication_wait: PublicationWait,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        // The defaults are valid by construction.
        Self {
            permissions: 0o644,
            publication_wait: PublicationWait::new(
                default_max_attempts(),
                default_spin_yields(),
                Duration::from_micros(default_initial_backoff_us()),
                Duration::from_millis(default_max_backoff_ms()),
            ),
        }
    }
}

/// Configuration loader with strict validation.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate configuration from a YAML file.
    pub fn load_file(path: impl AsRef<Path>) -> AllocResult<AllocatorConfig> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(AllocError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| AllocError::Io {
            context: "reading config file",
            source: e,
        })?;

        Self::load_string(&content)
    }

    /// Load and validate configuration from a YAML string.
    pub fn load_string(content: &str) -> AllocResult<AllocatorConfig> {
        // An empty document deserializes to unit, not to a mapping.
        let raw: RawConfig = if content.trim().is_empty() {
            RawConfig::default()
        } else {
            serde_yaml::from_str(content).map_err(|e| AllocError::ConfigParse {
                message: format!("YAML parse error: {}", e),
            })?
        };

        Ok(Self::validate(raw.allocator)?)
    }

    fn validate(raw: RawAllocatorConfig) -> Result<AllocatorConfig, HardValidationError> {
        let permissions = Self::validate_permissions(&raw.permissions)?;
        let publication_wait = Self::validate_publication_wait(raw.publication_wait)?;

        Ok(AllocatorConfig {
            permissions,
            publication_wait,
        })
    }

    /// Parse an octal permission string such as "0644" or "0o600".
    fn validate_permissions(raw: &str) -> Result<u32, HardValidationError> {
        let digits = raw.trim_start_matches("0o");
        let mode =
            u32::from_str_radix(digits, 8).map_err(|e| HardValidationError::InvalidFieldValue {
                field: "permissions",
                value: raw.to_string(),
                reason: format!("Not an octal number: {}", e),
            })?;

        if mode > 0o777 {
            return Err(HardValidationError::InvalidFieldValue {
                field: "permissions",
                value: raw.to_string(),
                reason: "Only permission bits (at most 0777) are allowed".to_string(),
            });
        }

        if mode & OWNER_RW != OWNER_RW {
            return Err(HardValidationError::InvalidFieldValue {
                field: "permissions",
                value: raw.to_string(),
                reason: "Owner must have read and write permission".to_string(),
            });
        }

        Ok(mode)
    }

    fn validate_publication_wait(
        raw: RawPublicationWait,
    ) -> Result<PublicationWait, HardValidationError> {
        if raw.max_attempts == 0 {
            return Err(HardValidationError::InvalidFieldValue {
                field: "publication_wait.max_attempts",
                value: raw.max_attempts.to_string(),
                reason: "At least one attempt is required".to_string(),
            });
        }

        let initial_backoff = Duration::from_micros(raw.initial_backoff_us);
        let max_backoff = Duration::from_millis(raw.max_backoff_ms);

        if max_backoff < initial_backoff {
            return Err(HardValidationError::InvalidFieldValue {
                field: "publication_wait.max_backoff_ms",
                value: raw.max_backoff_ms.to_string(),
                reason: format!(
                    "Must not be shorter than initial_backoff_us ({}us)",
                    raw.initial_backoff_us
                ),
            });
        }

        Ok(PublicationWait::new(
            raw.max_attempts,
            raw.spin_yields,
            initial_backoff,
            max_backoff,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = ConfigLoader::load_string("").unwrap();
        assert_eq!(config, AllocatorConfig::default());
    }

    #[test]
    fn test_valid_config() {
        let yaml = r#"
allocator:
  permissions: "0600"
  publication_wait:
    max_attempts: 20
    spin_yields: 4
    initial_backoff_us: 100
    max_backoff_ms: 5
"#;
        let config = ConfigLoader::load_string(yaml).unwrap();
        assert_eq!(config.permissions, 0o600);
        assert_eq!(config.publication_wait.max_attempts(), 20);
        assert_eq!(config.publication_wait.spin_yields(), 4);
        assert_eq!(
            config.publication_wait.initial_backoff(),
            Duration::from_micros(100)
        );
        assert_eq!(config.publication_wait.max_backoff(), Duration::from_millis(5));
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let yaml = r#"
allocator:
  publication_wait:
    max_attempts: 3
"#;
        let config = ConfigLoader::load_string(yaml).unwrap();
        assert_eq!(config.permissions, 0o644);
        assert_eq!(config.publication_wait.max_attempts(), 3);
        assert_eq!(config.publication_wait.spin_yields(), 64);
    }

    #[test]
    fn test_permissions_validation() {
        assert_eq!(ConfigLoader::validate_permissions("0o640").unwrap(), 0o640);
        assert!(ConfigLoader::validate_permissions("0400").is_err());
        assert!(ConfigLoader::validate_permissions("1777").is_err());
        assert!(ConfigLoader::validate_permissions("rw-r--r--").is_err());
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let yaml = r#"
allocator:
  publication_wait:
    max_attempts: 0
"#;
        let err = ConfigLoader::load_string(yaml).unwrap_err();
        assert!(matches!(err, AllocError::Validation(_)));
    }

    #[test]
    fn test_backoff_ordering_rejected() {
        let yaml = r#"
allocator:
  publication_wait:
    initial_backoff_us: 20000
    max_backoff_ms: 1
"#;
        assert!(ConfigLoader::load_string(yaml).is_err());
    }

    #[test]
    fn test_malformed_yaml() {
        let err = ConfigLoader::load_string("allocator: [").unwrap_err();
        assert!(matches!(err, AllocError::ConfigParse { .. }));
    }

    #[test]
    fn test_missing_file() {
        let err = ConfigLoader::load_file("/nonexistent/shmalloc.yaml").unwrap_err();
        assert!(matches!(err, AllocError::ConfigNotFound { .. }));
    }
}
