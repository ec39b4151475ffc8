// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: FCSE state attached to an address space, plus the pieces that manage it
//! OWNERS: @kernel-mm-team
//! PUBLIC API: FcseContext, PidAllocator, DirtyTracker, FlushToken, va_to_mva, mva_to_va
//! DEPENDS_ON: types::{Pid, PidSet}
//! INVARIANTS: A context holds at most one PID; best-effort contexts never own PID 0

pub mod dirty;
pub mod pid;
pub mod translate;

pub use dirty::{DirtyTracker, FlushToken};
pub use pid::PidAllocator;
pub use translate::{mva_to_va, va_to_mva};

use crate::config::PID_INVALID;
use crate::types::Pid;

/// The FCSE field of an address-space context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FcseContext {
    pid: Option<Pid>,
    best_effort: bool,
}

impl FcseContext {
    /// Context that has not been given a PID yet.
    pub const UNASSIGNED: Self = Self { pid: None, best_effort: false };

    pub const fn new() -> Self {
        Self::UNASSIGNED
    }

    #[inline]
    pub const fn pid(&self) -> Option<Pid> {
        self.pid
    }

    #[inline]
    pub const fn is_assigned(&self) -> bool {
        self.pid.is_some()
    }

    /// True when the context shares PID 0 without owning it.
    #[inline]
    pub const fn is_best_effort(&self) -> bool {
        self.best_effort
    }

    /// Image written to CP15 c13 when switching to this context.
    #[inline]
    pub const fn register_value(&self) -> u32 {
        match self.pid {
            Some(pid) => pid.register_value(),
            None => PID_INVALID,
        }
    }

    pub(crate) fn assign(&mut self, pid: Pid) {
        debug_assert!(self.pid.is_none(), "fcse: context already holds {:?}", self.pid);
        self.pid = Some(pid);
        self.best_effort = false;
    }

    pub(crate) fn share_zero(&mut self) {
        debug_assert!(self.pid.is_none(), "fcse: context already holds {:?}", self.pid);
        self.pid = Some(Pid::ZERO);
        self.best_effort = true;
    }

    /// Detaches the PID; returns it only if the context owned it.
    pub(crate) fn release(&mut self) -> Option<Pid> {
        let owned = if self.best_effort { None } else { self.pid };
        *self = Self::UNASSIGNED;
        owned
    }
}

impl Default for FcseContext {
    fn default() -> Self {
        Self::UNASSIGNED
    }
}
