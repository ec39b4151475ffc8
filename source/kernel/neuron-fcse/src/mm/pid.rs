// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! PID bitmap allocator.
//!
//! PIDs are handed out lowest-first starting at 1. PID 0 is kept back until
//! everything else is taken because best-effort address spaces (larger than
//! one window) run under it without owning it.

use crate::types::{Pid, PidSet};

/// Allocation bitmap for the first `nr_pids` PIDs. Callers serialize access.
pub struct PidAllocator {
    bits: PidSet,
    nr_pids: usize,
}

impl PidAllocator {
    pub const fn new(nr_pids: usize) -> Self {
        Self { bits: PidSet::new(), nr_pids }
    }

    /// Claims the lowest free PID in `1..nr_pids`, else PID 0, else `None`.
    pub fn allocate(&mut self) -> Option<Pid> {
        let pid = match self.bits.find_next_clear(1, self.nr_pids) {
            Some(pid) => pid,
            None if !self.bits.contains(Pid::ZERO) => Pid::ZERO,
            None => return None,
        };
        self.bits.insert(pid);
        Some(pid)
    }

    /// Releases `pid`. Releasing a PID that is not held is a caller bug.
    pub fn free(&mut self, pid: Pid) {
        debug_assert!(pid.index() < self.nr_pids, "fcse: free of {} beyond limit", pid);
        debug_assert!(self.bits.contains(pid), "fcse: double free of {}", pid);
        self.bits.remove(pid);
    }

    pub fn is_allocated(&self, pid: Pid) -> bool {
        self.bits.contains(pid)
    }

    pub fn allocated(&self) -> usize {
        self.bits.len()
    }

    pub const fn limit(&self) -> usize {
        self.nr_pids
    }
}
