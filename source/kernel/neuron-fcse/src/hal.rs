// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Hardware abstraction layer traits.

use bitflags::bitflags;

use crate::arch::arm;

bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    /// Cache class reported by cache identification.
    pub struct CacheId: u32 {
        const VIVT = 1 << 0;
        const VIPT_NONALIASING = 1 << 1;
        const VIPT_ALIASING = 1 << 2;
        const ASID_TAGGED = 1 << 3;
        const PIPT = 1 << 5;
    }
}

impl CacheId {
    /// Virtually tagged caches alias across address spaces and need relocation.
    #[inline]
    pub const fn is_vivt(self) -> bool {
        self.contains(CacheId::VIVT)
    }
}

/// Write access to the FCSE process-id register.
pub trait PidRegister {
    /// Programs the register with a shifted PID image.
    fn write(&self, value: u32);
}

impl<R: PidRegister + ?Sized> PidRegister for &R {
    fn write(&self, value: u32) {
        (**self).write(value)
    }
}

/// CP15 c13 on the running core.
#[derive(Clone, Copy, Debug, Default)]
pub struct Cp15PidRegister;

impl PidRegister for Cp15PidRegister {
    #[inline]
    fn write(&self, value: u32) {
        arm::set_fcse_pid(value);
    }
}
