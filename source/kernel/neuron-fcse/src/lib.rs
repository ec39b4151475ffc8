// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: ARM Fast Context Switch Extension (FCSE) resource manager
//! OWNERS: @kernel-mm-team
//! PUBLIC API: FcseOps, Fcse, ActiveFcse, IdentityFcse, FcseContext, FcseConfig, global
//! DEPENDS_ON: spin, bitflags, log, thiserror, static_assertions
//! INVARIANTS: A PID is owned by at most one live address space; a PID is only
//!             reported clean after a full flush that started after its last switch-in
//!
//! On VIVT caches every address space below 32MB is relocated by the CP15
//! PID register into its own window, so unrelated processes never alias in
//! the cache. This crate hands out the PIDs, converts addresses to their
//! modified form for cache maintenance, and remembers which windows may
//! still hold lines so scoped flushes can be skipped.

#![cfg_attr(not(test), no_std)]
#![cfg_attr(not(test), forbid(clippy::unwrap_used))]

mod arch;
pub mod config;
pub mod error;
pub mod fcse;
pub mod global;
pub mod hal;
pub mod mm;
pub mod sync;
pub mod types;

#[cfg(test)]
mod tests_prop;

pub use config::{FcseConfig, ReusePolicy, MAX_PIDS, PID_INVALID, PID_MASK, PID_SHIFT, WINDOW_SIZE};
pub use error::{ConfigError, FcseError};
pub use fcse::{ActiveFcse, Fcse, FcseOps, IdentityFcse};
pub use hal::{CacheId, Cp15PidRegister, PidRegister};
pub use mm::{FcseContext, FlushToken};
pub use types::{Pid, PidSet};
