// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Process-wide FCSE instance for the running core
//! OWNERS: @kernel-mm-team
//! PUBLIC API: install(fcse), get()
//! DEPENDS_ON: spin::Once
//! INVARIANTS: Installed once during boot before the first address space; never torn down

use log::{info, warn};
use spin::Once;

use crate::fcse::Fcse;
use crate::hal::Cp15PidRegister;

/// Backend type driving the hardware PID register.
pub type KernelFcse = Fcse<Cp15PidRegister>;

static FCSE: Once<KernelFcse> = Once::new();

/// Installs the boot-selected backend. A second call keeps the first
/// instance and drops `fcse`.
pub fn install(fcse: KernelFcse) -> &'static KernelFcse {
    let mut fresh = false;
    let installed = FCSE.call_once(|| {
        fresh = true;
        fcse
    });
    if fresh {
        let mode = match installed {
            Fcse::Active(active) if active.relocates() => "relocating",
            Fcse::Active(_) => "non-vivt passthrough",
            Fcse::Identity(_) => "identity",
        };
        info!(target: "fcse", "installed ({})", mode);
    } else {
        warn!(target: "fcse", "install called twice; keeping the first backend");
    }
    installed
}

/// Returns the installed backend, if boot got that far.
pub fn get() -> Option<&'static KernelFcse> {
    FCSE.get()
}
