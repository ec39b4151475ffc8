// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: FCSE geometry constants and boot-time configuration
//! OWNERS: @kernel-mm-team
//! PUBLIC API: FcseConfig, ReusePolicy, PID_SHIFT, WINDOW_SIZE, PID_MASK, MAX_PIDS, PID_INVALID
//! DEPENDS_ON: static_assertions
//! INVARIANTS: task_size is a whole number of 32MB windows; nr_pids in 1..=MAX_PIDS;
//!             geometry math runs in u64 so a full 4GB task size does not wrap on 32-bit

use static_assertions::const_assert;

use crate::error::ConfigError;

/// Bit position of the PID field in a modified virtual address.
pub const PID_SHIFT: u32 = 25;
/// Size of the relocation window owned by a single PID (32MB).
pub const WINDOW_SIZE: usize = 1 << PID_SHIFT;
/// Mask that strips the PID from a modified virtual address.
pub const PID_MASK: usize = WINDOW_SIZE - 1;
/// The CP15 c13 PID field is 7 bits wide.
pub const MAX_PIDS: usize = 128;
/// Register image carried by a context that has no PID.
pub const PID_INVALID: u32 = !0u32 << PID_SHIFT;

const_assert!((MAX_PIDS as u64) << PID_SHIFT <= 1u64 << 32);
const_assert!(MAX_PIDS % 64 == 0);

/// What a freshly allocated PID inherits from its previous owner.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReusePolicy {
    /// Keep the dirty bit exactly as the previous owner left it. A reused PID
    /// whose window was never flushed starts out dirty; a never-used or
    /// flushed one starts out clean.
    Inherit,
    /// Mark every newly allocated PID dirty, regardless of history.
    AssumeDirty,
}

/// Boot-time knobs for the FCSE manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FcseConfig {
    /// Bytes of user virtual address space covered by PIDs. Kept in `u64`:
    /// 128 windows span exactly 4GB.
    pub task_size: u64,
    /// Dirty-state policy applied on allocation.
    pub reuse: ReusePolicy,
    /// Emit a warning when the PID space is exhausted.
    pub messages: bool,
    /// Select the relocating strategy; `false` degrades to identity.
    pub enabled: bool,
}

impl FcseConfig {
    /// 1GB of user space (32 PIDs), inherited dirty state.
    pub const DEFAULT: Self = Self {
        task_size: 1 << 30,
        reuse: ReusePolicy::Inherit,
        messages: cfg!(feature = "messages"),
        enabled: cfg!(feature = "fcse"),
    };

    /// Configuration with exactly `nr_pids` windows.
    pub const fn with_pids(self, nr_pids: usize) -> Self {
        Self { task_size: (nr_pids as u64).saturating_mul(WINDOW_SIZE as u64), ..self }
    }

    pub const fn with_reuse(self, reuse: ReusePolicy) -> Self {
        Self { reuse, ..self }
    }

    pub const fn with_messages(self, messages: bool) -> Self {
        Self { messages, ..self }
    }

    pub const fn with_enabled(self, enabled: bool) -> Self {
        Self { enabled, ..self }
    }

    /// Number of PIDs the task size provides.
    #[inline]
    pub const fn nr_pids(&self) -> usize {
        let windows = self.task_size >> PID_SHIFT;
        if windows > usize::MAX as u64 {
            usize::MAX
        } else {
            windows as usize
        }
    }

    /// Rejects geometries the hardware cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let requested = self.nr_pids();
        if requested == 0 {
            return Err(ConfigError::ZeroPids);
        }
        if requested > MAX_PIDS {
            return Err(ConfigError::TooManyPids { requested, max: MAX_PIDS });
        }
        if self.task_size & PID_MASK as u64 != 0 {
            return Err(ConfigError::WindowMismatch { task_size: self.task_size });
        }
        Ok(())
    }
}

impl Default for FcseConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
