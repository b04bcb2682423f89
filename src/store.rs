// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Own the fixed-capacity buffer backing the single memfs file.
// Author: Lukas Bower
#![forbid(unsafe_code)]

//! Bounded read/write over one preallocated, zero-filled buffer.
//!
//! The buffer never grows. Writes that start inside it are clipped at the
//! capacity; writes that start past it are rejected. Reads never fail and
//! return nothing past the occupied length.

use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::time::SystemTime;

use log::{debug, warn};
use serde::Deserialize;

use crate::error::{MemfsError, Result};

/// How the occupied length of the file is derived from the buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LengthPolicy {
    /// Track the furthest byte ever written (lowered only by truncate).
    #[default]
    HighWater,
    /// Treat the buffer as a C string: the length ends at the first zero byte.
    NulTerminated,
}

/// Snapshot of the store's size and modification time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStat {
    /// Occupied length in bytes.
    pub len: usize,
    /// Fixed capacity in bytes.
    pub capacity: usize,
    /// Time of the last write or truncate.
    pub modified: SystemTime,
}

struct Inner {
    data: Vec<u8>,
    high_water: usize,
    modified: SystemTime,
}

impl Inner {
    fn occupied(&self, policy: LengthPolicy) -> usize {
        match policy {
            LengthPolicy::HighWater => self.high_water,
            LengthPolicy::NulTerminated => self
                .data
                .iter()
                .position(|byte| *byte == 0)
                .unwrap_or(self.data.len()),
        }
    }
}

/// Fixed-capacity byte store guarded by a single mutex.
pub struct BufferStore {
    inner: Mutex<Inner>,
    capacity: usize,
    policy: LengthPolicy,
}

impl fmt::Debug for BufferStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferStore")
            .field("capacity", &self.capacity)
            .field("high_water", &self.lock().high_water)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl BufferStore {
    /// Allocate a zero-filled store of `capacity` bytes.
    pub fn new(capacity: usize, policy: LengthPolicy) -> Result<Self> {
        let mut data = Vec::new();
        data.try_reserve_exact(capacity)
            .map_err(|_| MemfsError::Allocation { capacity })?;
        data.resize(capacity, 0);
        debug!("allocated {capacity} byte store ({policy:?})");
        Ok(Self {
            inner: Mutex::new(Inner {
                data,
                high_water: 0,
                modified: SystemTime::now(),
            }),
            capacity,
            policy,
        })
    }

    /// Fixed capacity in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Length policy in force.
    #[must_use]
    pub fn policy(&self) -> LengthPolicy {
        self.policy
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Current occupied length.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().occupied(self.policy)
    }

    /// True when the file holds no content.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size and modification time, read under one lock.
    #[must_use]
    pub fn stat(&self) -> StoreStat {
        let inner = self.lock();
        StoreStat {
            len: inner.occupied(self.policy),
            capacity: self.capacity,
            modified: inner.modified,
        }
    }

    /// Copy up to `len` bytes starting at `offset`.
    ///
    /// Offsets at or past the occupied length yield an empty vector.
    #[must_use]
    pub fn read(&self, offset: u64, len: usize) -> Vec<u8> {
        let inner = self.lock();
        let occupied = inner.occupied(self.policy);
        let start = match usize::try_from(offset) {
            Ok(start) if start < occupied => start,
            _ => return Vec::new(),
        };
        let end = start.saturating_add(len).min(occupied);
        inner.data[start..end].to_vec()
    }

    /// Overwrite bytes at `offset`, clipping at the capacity.
    ///
    /// Returns the number of bytes stored; the tail of `data` that does not
    /// fit is dropped without error.
    pub fn write(&self, offset: u64, data: &[u8]) -> Result<usize> {
        let start = match usize::try_from(offset) {
            Ok(start) if start < self.capacity => start,
            _ => {
                warn!(
                    "rejecting {} byte write at offset {offset}: capacity {}",
                    data.len(),
                    self.capacity
                );
                return Err(MemfsError::CapacityExceeded {
                    offset,
                    capacity: self.capacity,
                });
            }
        };
        let written = data.len().min(self.capacity - start);
        let end = start + written;
        let mut inner = self.lock();
        inner.data[start..end].copy_from_slice(&data[..written]);
        if written > 0 {
            inner.high_water = inner.high_water.max(end);
            inner.modified = SystemTime::now();
        }
        if written < data.len() {
            debug!(
                "clipped write at offset {offset}: {written} of {} bytes stored",
                data.len()
            );
        }
        Ok(written)
    }

    /// Set the occupied length to `size`, zeroing anything cut off.
    ///
    /// Under [`LengthPolicy::NulTerminated`] growing is a no-op because the
    /// bytes past the current length are already zero.
    pub fn truncate(&self, size: u64) -> Result<()> {
        let target = match usize::try_from(size) {
            Ok(target) if target <= self.capacity => target,
            _ => {
                warn!("rejecting truncate to {size}: capacity {}", self.capacity);
                return Err(MemfsError::FileTooLarge {
                    size,
                    capacity: self.capacity,
                });
            }
        };
        let mut inner = self.lock();
        let occupied = inner.occupied(self.policy);
        if target < occupied {
            inner.data[target..occupied].fill(0);
        }
        inner.high_water = target;
        inner.modified = SystemTime::now();
        Ok(())
    }
}
