// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! VA <-> MVA conversion for relocated windows.

use crate::config::{PID_MASK, PID_SHIFT, WINDOW_SIZE};
use crate::types::Pid;

/// Relocates `va` into `pid`'s window when it lies below 32MB.
#[inline]
pub const fn va_to_mva(pid: Pid, va: usize) -> usize {
    if va < WINDOW_SIZE {
        (pid.index() << PID_SHIFT) | va
    } else {
        va
    }
}

/// Strips the PID from an address inside one of the first `nr_pids` windows.
///
/// The bound is computed in `u64`: 128 windows end exactly at 4GB.
#[inline]
pub const fn mva_to_va(mva: usize, nr_pids: usize) -> usize {
    if (mva as u64) < (nr_pids as u64) << PID_SHIFT {
        mva & PID_MASK
    } else {
        mva
    }
}
