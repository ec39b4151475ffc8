// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Spin lock usable from IRQ-disabled context switch paths
//! OWNERS: @kernel-sync-team
//! PUBLIC API: IrqSpinLock::new(), IrqSpinLock::lock()
//! DEPENDS_ON: spin::Mutex, arch::arm IRQ save/restore
//! INVARIANTS: IRQs stay masked for the whole hold; restore happens after unlock

use core::ops::{Deref, DerefMut};

use crate::arch::arm;

/// Spin lock that masks IRQs on the local core while held.
pub struct IrqSpinLock<T> {
    inner: spin::Mutex<T>,
}

impl<T> IrqSpinLock<T> {
    pub const fn new(value: T) -> Self {
        Self { inner: spin::Mutex::new(value) }
    }

    /// Masks IRQs, then spins until the lock is acquired.
    pub fn lock(&self) -> IrqSpinLockGuard<'_, T> {
        let flags = arm::irq_save();
        let guard = self.inner.lock();
        IrqSpinLockGuard { guard: Some(guard), flags }
    }
}

pub struct IrqSpinLockGuard<'a, T> {
    guard: Option<spin::MutexGuard<'a, T>>,
    flags: usize,
}

impl<T> Deref for IrqSpinLockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        match &self.guard {
            Some(guard) => &**guard,
            None => unreachable!("guard taken before drop"),
        }
    }
}

impl<T> DerefMut for IrqSpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.guard {
            Some(guard) => &mut **guard,
            None => unreachable!("guard taken before drop"),
        }
    }
}

impl<T> Drop for IrqSpinLockGuard<'_, T> {
    fn drop(&mut self) {
        drop(self.guard.take());
        arm::irq_restore(self.flags);
    }
}
