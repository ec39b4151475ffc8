// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: FCSE strategies: PID-relocating manager and identity fallback
//! OWNERS: @kernel-mm-team
//! PUBLIC API: FcseOps, ActiveFcse, IdentityFcse, Fcse
//! DEPENDS_ON: mm::{PidAllocator, DirtyTracker}, sync::IrqSpinLock, hal::{PidRegister, CacheId}
//! INVARIANTS: Both bitmaps change only under one IRQ-safe lock; the cache
//!             flush itself runs between begin_flush/end_flush with no lock held;
//!             switch marks dirty before the register write, IRQs masked
//!
//! The active strategy only relocates when the cache is VIVT. On any other
//! cache class every operation degrades to what [`IdentityFcse`] does, so
//! callers never branch on the cache type themselves.

use log::{debug, trace, warn};

use crate::arch::arm;
use crate::config::{FcseConfig, ReusePolicy};
use crate::error::{ConfigError, FcseError};
use crate::hal::{CacheId, PidRegister};
use crate::mm::{self, DirtyTracker, FcseContext, FlushToken, PidAllocator};
use crate::sync::IrqSpinLock;
use crate::types::{Pid, PidSet};

#[cfg(feature = "failpoints")]
use core::sync::atomic::{AtomicBool, Ordering};

const LOG_TARGET: &str = "fcse";

/// Operations the memory-management layer invokes on the FCSE backend.
pub trait FcseOps {
    /// Gives `ctx` a PID of its own.
    fn allocate(&self, ctx: &mut FcseContext) -> Result<(), FcseError>;

    /// Returns the PID held by `ctx`. Its dirty state is left alone.
    fn free(&self, ctx: &mut FcseContext);

    /// Runs `ctx` under the shared PID 0 without owning it.
    fn attach_best_effort(&self, ctx: &mut FcseContext);

    /// Context-switch hook; must complete before `next` touches low addresses.
    fn on_switch(&self, prev: &FcseContext, next: &FcseContext);

    /// Re-marks the window of a context that keeps running without a
    /// switch-in, e.g. after it performed a full flush itself.
    fn mark_running(&self, ctx: &FcseContext);

    /// Modified virtual address used for cache maintenance on `va`.
    fn translate(&self, ctx: &FcseContext, va: usize) -> usize;

    /// Inverse of [`translate`](FcseOps::translate) for addresses inside a PID window.
    fn untranslate(&self, mva: usize) -> usize;

    /// False only when the window of `ctx` provably holds no cache lines.
    fn is_dirty(&self, ctx: &FcseContext) -> bool;

    /// Snapshots the dirty set ahead of a full cache flush.
    fn begin_flush(&self) -> FlushToken;

    /// Clears the PIDs in `dirty_at_start` that the flush covered.
    fn end_flush(&self, token: FlushToken, dirty_at_start: &PidSet);

    /// Full flush: `flush` runs with no lock held.
    ///
    /// Every PID dirty at the start and not switched in since comes back
    /// clean, including the PID of the caller's own context. A caller that
    /// flushes from a user context and then returns to it must use
    /// [`flush_all_from`](FcseOps::flush_all_from) instead, or that window
    /// refills without ever being marked again.
    fn flush_all<F: FnOnce()>(&self, flush: F)
    where
        Self: Sized,
    {
        let token = self.begin_flush();
        flush();
        let dirty_at_start = *token.snapshot();
        self.end_flush(token, &dirty_at_start);
    }

    /// Full flush issued while `current` is the running context; its window
    /// stays dirty afterwards.
    fn flush_all_from<F: FnOnce()>(&self, current: &FcseContext, flush: F)
    where
        Self: Sized,
    {
        self.flush_all(flush);
        self.mark_running(current);
    }

    /// Address-space scoped flush, skipped when `ctx` is clean. Returns
    /// whether `flush` ran.
    fn flush_mm<F: FnOnce()>(&self, ctx: &FcseContext, flush: F) -> bool
    where
        Self: Sized,
    {
        if !self.is_dirty(ctx) {
            trace!(target: LOG_TARGET, "flush_mm skipped for {:?}", ctx.pid());
            return false;
        }
        flush();
        true
    }
}

struct FcseState {
    pids: PidAllocator,
    dirty: DirtyTracker,
}

#[cfg(feature = "failpoints")]
static EXHAUST_NEXT_ALLOC: AtomicBool = AtomicBool::new(false);

#[cfg(feature = "failpoints")]
pub mod failpoints {
    use super::EXHAUST_NEXT_ALLOC;
    use core::sync::atomic::Ordering;

    /// Forces the next relocating `allocate` to report [`FcseError::Exhausted`](crate::FcseError).
    pub fn exhaust_next_alloc() {
        EXHAUST_NEXT_ALLOC.store(true, Ordering::SeqCst);
    }
}

/// PID-relocating FCSE backend.
pub struct ActiveFcse<R> {
    config: FcseConfig,
    cache: CacheId,
    register: R,
    state: IrqSpinLock<FcseState>,
}

impl<R: PidRegister> ActiveFcse<R> {
    pub fn new(config: FcseConfig, cache: CacheId, register: R) -> Result<Self, ConfigError> {
        config.validate()?;
        let state = FcseState { pids: PidAllocator::new(config.nr_pids()), dirty: DirtyTracker::new() };
        Ok(Self { config, cache, register, state: IrqSpinLock::new(state) })
    }

    /// Whether this cache class needs PID relocation at all.
    #[inline]
    pub fn relocates(&self) -> bool {
        self.cache.is_vivt()
    }

    pub fn config(&self) -> &FcseConfig {
        &self.config
    }

    pub fn register(&self) -> &R {
        &self.register
    }

    /// Marks `pid`'s window as possibly holding cache lines.
    pub fn mark_dirty(&self, pid: Pid) {
        debug_assert!(pid.index() < self.config.nr_pids(), "fcse: mark of {} beyond limit", pid);
        self.state.lock().dirty.mark(pid);
    }

    pub fn is_pid_dirty(&self, pid: Pid) -> bool {
        self.state.lock().dirty.is_dirty(pid)
    }

    pub fn allocated_count(&self) -> usize {
        self.state.lock().pids.allocated()
    }

    pub fn dirty_snapshot(&self) -> PidSet {
        self.state.lock().dirty.dirty()
    }

    #[cfg(feature = "failpoints")]
    fn forced_exhaustion() -> bool {
        EXHAUST_NEXT_ALLOC.swap(false, Ordering::SeqCst)
    }

    #[cfg(not(feature = "failpoints"))]
    fn forced_exhaustion() -> bool {
        false
    }
}

impl<R: PidRegister> FcseOps for ActiveFcse<R> {
    fn allocate(&self, ctx: &mut FcseContext) -> Result<(), FcseError> {
        if !self.relocates() {
            return Ok(());
        }
        if let Some(held) = ctx.pid() {
            warn!(target: LOG_TARGET, "allocate on a context already holding {}", held);
            return Ok(());
        }
        let mut state = self.state.lock();
        let pid = if Self::forced_exhaustion() { None } else { state.pids.allocate() };
        let Some(pid) = pid else {
            drop(state);
            let limit = self.config.nr_pids();
            if self.config.messages {
                warn!(target: LOG_TARGET, "address space would exceed the {} pids limit", limit);
            }
            return Err(FcseError::Exhausted { limit });
        };
        if self.config.reuse == ReusePolicy::AssumeDirty {
            state.dirty.mark(pid);
        }
        let dirty = state.dirty.is_dirty(pid);
        drop(state);
        ctx.assign(pid);
        debug!(target: LOG_TARGET, "alloc {} (dirty={})", pid, dirty);
        Ok(())
    }

    fn free(&self, ctx: &mut FcseContext) {
        if let Some(pid) = ctx.release() {
            self.state.lock().pids.free(pid);
            debug!(target: LOG_TARGET, "free {}", pid);
        }
    }

    fn attach_best_effort(&self, ctx: &mut FcseContext) {
        if self.relocates() {
            if let Some(held) = ctx.pid() {
                warn!(target: LOG_TARGET, "best-effort attach on a context already holding {}", held);
                return;
            }
            ctx.share_zero();
            debug!(target: LOG_TARGET, "best-effort attach on {}", Pid::ZERO);
        }
    }

    fn on_switch(&self, prev: &FcseContext, next: &FcseContext) {
        if !self.relocates() {
            return;
        }
        debug_assert!(next.is_assigned(), "fcse: switch to a context without pid");
        let flags = arm::irq_save();
        if let Some(pid) = next.pid() {
            self.state.lock().dirty.mark(pid);
        }
        self.register.write(next.register_value());
        arm::irq_restore(flags);
        trace!(target: LOG_TARGET, "switch {:?} -> {:?}", prev.pid(), next.pid());
    }

    fn mark_running(&self, ctx: &FcseContext) {
        match ctx.pid() {
            Some(pid) if self.relocates() => self.mark_dirty(pid),
            _ => {}
        }
    }

    fn translate(&self, ctx: &FcseContext, va: usize) -> usize {
        match ctx.pid() {
            Some(pid) if self.relocates() => mm::va_to_mva(pid, va),
            _ => va,
        }
    }

    fn untranslate(&self, mva: usize) -> usize {
        if self.relocates() {
            mm::mva_to_va(mva, self.config.nr_pids())
        } else {
            mva
        }
    }

    fn is_dirty(&self, ctx: &FcseContext) -> bool {
        match ctx.pid() {
            Some(pid) if self.relocates() => self.is_pid_dirty(pid),
            _ => true,
        }
    }

    fn begin_flush(&self) -> FlushToken {
        if !self.relocates() {
            return FlushToken::empty();
        }
        let token = self.state.lock().dirty.begin();
        debug!(target: LOG_TARGET, "flush epoch {} start, dirty={:?}", token.epoch(), token.snapshot());
        token
    }

    fn end_flush(&self, token: FlushToken, dirty_at_start: &PidSet) {
        if !self.relocates() {
            return;
        }
        let epoch = token.epoch();
        let cleared = self.state.lock().dirty.end(token, dirty_at_start);
        debug!(target: LOG_TARGET, "flush epoch {} done, cleaned={:?}", epoch, cleared);
    }
}

/// Backend for cores without FCSE: no PIDs, no relocation, nothing is ever
/// known to be clean.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityFcse;

impl FcseOps for IdentityFcse {
    fn allocate(&self, _ctx: &mut FcseContext) -> Result<(), FcseError> {
        Ok(())
    }

    fn free(&self, _ctx: &mut FcseContext) {}

    fn attach_best_effort(&self, _ctx: &mut FcseContext) {}

    fn on_switch(&self, _prev: &FcseContext, _next: &FcseContext) {}

    fn mark_running(&self, _ctx: &FcseContext) {}

    fn translate(&self, _ctx: &FcseContext, va: usize) -> usize {
        va
    }

    fn untranslate(&self, mva: usize) -> usize {
        mva
    }

    fn is_dirty(&self, _ctx: &FcseContext) -> bool {
        true
    }

    fn begin_flush(&self) -> FlushToken {
        FlushToken::empty()
    }

    fn end_flush(&self, _token: FlushToken, _dirty_at_start: &PidSet) {}
}

/// Backend picked from [`FcseConfig::enabled`] at boot.
pub enum Fcse<R> {
    Active(ActiveFcse<R>),
    Identity(IdentityFcse),
}

impl<R: PidRegister> Fcse<R> {
    pub fn new(config: FcseConfig, cache: CacheId, register: R) -> Result<Self, ConfigError> {
        if config.enabled {
            ActiveFcse::new(config, cache, register).map(Fcse::Active)
        } else {
            config.validate()?;
            Ok(Fcse::Identity(IdentityFcse))
        }
    }

    pub fn as_active(&self) -> Option<&ActiveFcse<R>> {
        match self {
            Fcse::Active(active) => Some(active),
            Fcse::Identity(_) => None,
        }
    }
}

macro_rules! dispatch {
    ($self:ident, $inner:ident => $call:expr) => {
        match $self {
            Fcse::Active($inner) => $call,
            Fcse::Identity($inner) => $call,
        }
    };
}

impl<R: PidRegister> FcseOps for Fcse<R> {
    fn allocate(&self, ctx: &mut FcseContext) -> Result<(), FcseError> {
        dispatch!(self, inner => inner.allocate(ctx))
    }

    fn free(&self, ctx: &mut FcseContext) {
        dispatch!(self, inner => inner.free(ctx))
    }

    fn attach_best_effort(&self, ctx: &mut FcseContext) {
        dispatch!(self, inner => inner.attach_best_effort(ctx))
    }

    fn on_switch(&self, prev: &FcseContext, next: &FcseContext) {
        dispatch!(self, inner => inner.on_switch(prev, next))
    }

    fn mark_running(&self, ctx: &FcseContext) {
        dispatch!(self, inner => inner.mark_running(ctx))
    }

    fn translate(&self, ctx: &FcseContext, va: usize) -> usize {
        dispatch!(self, inner => inner.translate(ctx, va))
    }

    fn untranslate(&self, mva: usize) -> usize {
        dispatch!(self, inner => inner.untranslate(mva))
    }

    fn is_dirty(&self, ctx: &FcseContext) -> bool {
        dispatch!(self, inner => inner.is_dirty(ctx))
    }

    fn begin_flush(&self) -> FlushToken {
        dispatch!(self, inner => inner.begin_flush())
    }

    fn end_flush(&self, token: FlushToken, dirty_at_start: &PidSet) {
        dispatch!(self, inner => inner.end_flush(token, dirty_at_start))
    }
}
