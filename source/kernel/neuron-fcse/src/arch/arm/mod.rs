// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! ARMv4/v5 helpers for the CP15 process-id register and IRQ masking.
//!
//! FCSE-capable cores (ARM920T, ARM926EJ-S) predate `cpsid`, so masking goes
//! through a read-modify-write of the CPSR control byte. Host builds compile
//! the same entry points as stubs so the allocator logic stays testable.

/// CPSR I bit.
#[cfg_attr(not(all(target_arch = "arm", target_os = "none")), allow(dead_code))]
const PSR_I_BIT: usize = 1 << 7;

/// Masks IRQs on the current core and returns the previous CPSR.
#[inline(always)]
pub fn irq_save() -> usize {
    #[cfg(all(target_arch = "arm", target_os = "none"))]
    {
        let flags: usize;
        let _tmp: usize;
        unsafe {
            core::arch::asm!(
                "mrs {flags}, cpsr",
                "orr {tmp}, {flags}, #{irq}",
                "msr cpsr_c, {tmp}",
                flags = out(reg) flags,
                tmp = out(reg) _tmp,
                irq = const PSR_I_BIT,
                options(nostack, preserves_flags),
            );
        }
        flags
    }
    #[cfg(not(all(target_arch = "arm", target_os = "none")))]
    {
        0
    }
}

/// Restores the IRQ state captured by [`irq_save`].
#[inline(always)]
pub fn irq_restore(flags: usize) {
    #[cfg(all(target_arch = "arm", target_os = "none"))]
    unsafe {
        core::arch::asm!("msr cpsr_c, {0}", in(reg) flags, options(nostack, preserves_flags));
    }
    #[cfg(not(all(target_arch = "arm", target_os = "none")))]
    {
        let _ = flags;
    }
}

/// Writes the FCSE process-id register (CP15 c13, opcode 0).
///
/// `value` is the already shifted register image: the PID occupies bits
/// 31:25 and the low bits must be zero.
#[inline(always)]
pub fn set_fcse_pid(value: u32) {
    #[cfg(all(target_arch = "arm", target_os = "none"))]
    unsafe {
        // No `nomem`: later low-VA accesses must not be hoisted above the write.
        core::arch::asm!("mcr p15, 0, {0}, c13, c0, 0", in(reg) value, options(nostack, preserves_flags));
    }
    #[cfg(not(all(target_arch = "arm", target_os = "none")))]
    {
        let _ = value;
    }
}
