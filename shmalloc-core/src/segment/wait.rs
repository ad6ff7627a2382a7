// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Bounded wait for size publication.
//!
//! Between a creator's exclusive `shm_open` and its `ftruncate`, the backing
//! object exists with length zero. Attachers poll the length until it becomes
//! non-zero: first by yielding the thread, then by sleeping with exponential
//! backoff. The number of polls is capped so that a creator which died before
//! publishing surfaces as `PublicationTimeout` instead of a hung caller.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use nix::errno::Errno;

use crate::error::AllocError;

/// Retry budget and cadence for the publication wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicationWait {
    max_attempts: u32,
    spin_yields: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl PublicationWait {
    /// Build a policy. `max_attempts` is clamped to at least one probe.
    pub fn new(
        max_attempts: u32,
        spin_yields: u32,
        initial_backoff: Duration,
        max_backoff: Duration,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            spin_yields,
            initial_backoff,
            max_backoff: max_backoff.max(initial_backoff),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn spin_yields(&self) -> u32 {
        self.spin_yields
    }

    pub fn initial_backoff(&self) -> Duration {
        self.initial_backoff
    }

    pub fn max_backoff(&self) -> Duration {
        self.max_backoff
    }

    /// Delay before the probe following attempt `attempt` (zero-based).
    ///
    /// `None` means yield the thread instead of sleeping.
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        if attempt < self.spin_yields {
            return None;
        }

        let exponent = (attempt - self.spin_yields).min(31);
        let delay = self
            .initial_backoff
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_backoff);
        Some(delay.min(self.max_backoff))
    }

    /// Poll `probe` until it reports a non-zero size.
    ///
    /// `name` is only used for error reporting. Probe failures are surfaced
    /// immediately as `BackingObject` errors.
    pub fn wait<F>(&self, name: &str, mut probe: F) -> Result<NonZeroUsize, AllocError>
    where
        F: FnMut() -> Result<usize, Errno>,
    {
        let started = Instant::now();

        for attempt in 0..self.max_attempts {
            let size = probe().map_err(|source| AllocError::BackingObject {
                name: name.to_string(),
                syscall: "fstat",
                source,
            })?;

            if let Some(size) = NonZeroUsize::new(size) {
                if attempt > 0 {
                    tracing::debug!(
                        name = %name,
                        size = size.get(),
                        attempts = attempt + 1,
                        "Observed published segment size"
                    );
                }
                return Ok(size);
            }

            // No pause after the final probe.
            if attempt + 1 == self.max_attempts {
                break;
            }

            match self.delay_after(attempt) {
                None => std::thread::yield_now(),
                Some(delay) => std::thread::sleep(delay),
            }
        }

        Err(AllocError::PublicationTimeout {
            name: name.to_string(),
            attempts: self.max_attempts,
            waited: started.elapsed(),
        })
    }
}
