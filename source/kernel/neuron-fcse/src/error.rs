// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Error types reported by the FCSE manager.

use thiserror::Error;

/// Runtime failure of a PID operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum FcseError {
    /// Every PID, including the reserved PID 0, is held by a live address space.
    #[error("fcse: all {limit} pids in use")]
    Exhausted { limit: usize },
}

/// Rejected [`FcseConfig`](crate::FcseConfig).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Task size yields no PID at all.
    #[error("fcse: task size provides no pid")]
    ZeroPids,
    /// Task size needs more PIDs than the register can encode.
    #[error("fcse: {requested} pids requested, hardware supports {max}")]
    TooManyPids { requested: usize, max: usize },
    /// Task size is not a multiple of the 32MB relocation window.
    #[error("fcse: task size {task_size:#x} is not window aligned")]
    WindowMismatch { task_size: u64 },
}
