// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Segment directory.
//!
//! One table of [`Segment`] records with two indices over it, by name and by
//! base address. Insertion and removal touch both indices together, so for
//! every live record `by_name(name) -> address` and `by_address(address) ->
//! name` round-trip to the same slot.
//!
//! Pure bookkeeping: no system calls happen here.

use std::collections::HashMap;

use super::Segment;
use crate::error::{AllocError, AllocResult, SegmentKey};

/// Bidirectional table of the segments mapped by this process.
#[derive(Debug, Default)]
pub struct SegmentDirectory {
    slots: Vec<Option<Segment>>,
    free: Vec<usize>,
    by_name: HashMap<String, usize>,
    by_address: HashMap<usize, usize>,
}

impl SegmentDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a freshly mapped segment into both indices.
    ///
    /// Rejects a name or address that is already present. The rejected
    /// segment is dropped, which releases its mapping.
    pub fn register(&mut self, segment: Segment) -> AllocResult<&Segment> {
        let name = segment.name().as_str().to_string();
        let address = segment.address();

        if self.by_name.contains_key(&name) || self.by_address.contains_key(&address) {
            return Err(AllocError::AlreadyMapped { name });
        }

        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(segment);
                slot
            }
            None => {
                self.slots.push(Some(segment));
                self.slots.len() - 1
            }
        };

        self.by_name.insert(name, slot);
        self.by_address.insert(address, slot);

        self.slots[slot]
            .as_ref()
            .ok_or(AllocError::UnknownSegment(SegmentKey::Address(address)))
    }

    pub fn lookup_by_name(&self, name: &str) -> Option<&Segment> {
        self.by_name.get(name).and_then(|&slot| self.slot(slot))
    }

    pub fn lookup_by_address(&self, address: usize) -> Option<&Segment> {
        self.by_address
            .get(&address)
            .and_then(|&slot| self.slot(slot))
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Remove the segment mapped at `address` from both indices.
    ///
    /// The returned record still owns its mapping; the caller releases it.
    pub fn remove(&mut self, address: usize) -> AllocResult<Segment> {
        let slot = self
            .by_address
            .remove(&address)
            .ok_or(AllocError::UnknownSegment(SegmentKey::Address(address)))?;

        let segment = self.slots[slot]
            .take()
            .ok_or(AllocError::UnknownSegment(SegmentKey::Address(address)))?;
        self.by_name.remove(segment.name().as_str());
        self.free.push(slot);

        Ok(segment)
    }

    /// Remove every record, leaving the directory empty.
    pub fn drain(&mut self) -> Vec<Segment> {
        self.by_name.clear();
        self.by_address.clear();
        self.free.clear();
        self.slots.drain(..).flatten().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Segment> {
        self.slots.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.by_address.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_address.is_empty()
    }

    fn slot(&self, slot: usize) -> Option<&Segment> {
        self.slots.get(slot).and_then(Option::as_ref)
    }
}
