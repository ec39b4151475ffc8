// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use neuron_fcse::{ActiveFcse, CacheId, FcseConfig, PidRegister, ReusePolicy};

/// PID register mock remembering the last value and the write count.
#[derive(Default)]
pub struct RecordingPidRegister {
    last: AtomicU32,
    writes: AtomicUsize,
}

impl RecordingPidRegister {
    pub fn last(&self) -> u32 {
        self.last.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl PidRegister for RecordingPidRegister {
    fn write(&self, value: u32) {
        self.last.store(value, Ordering::SeqCst);
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn vivt(nr_pids: usize, reuse: ReusePolicy) -> ActiveFcse<RecordingPidRegister> {
    let config = FcseConfig::DEFAULT.with_pids(nr_pids).with_reuse(reuse).with_enabled(true);
    ActiveFcse::new(config, CacheId::VIVT, RecordingPidRegister::default()).expect("valid config")
}
