// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Tracks which PID windows may still hold unflushed cache lines
//! OWNERS: @kernel-mm-team
//! PUBLIC API: DirtyTracker, FlushToken
//! DEPENDS_ON: types::PidSet
//! INVARIANTS: A dirty bit is only cleared by `end` for PIDs dirty at `begin`
//!             and not marked again since; marks stamp the current epoch
//!
//! Every `begin` bumps the epoch and every `mark` records the epoch it ran
//! in. A PID whose stamp is older than the token's epoch has not been
//! touched since the flush started and its lines are gone; a PID stamped at
//! or after the token's epoch was switched in while the flush ran.

use crate::config::MAX_PIDS;
use crate::types::{Pid, PidSet};

/// Proof that a full flush started, carrying the dirty set seen at that point.
#[must_use = "a flush token must be handed back to end_flush"]
#[derive(Debug)]
pub struct FlushToken {
    epoch: u64,
    snapshot: PidSet,
}

impl FlushToken {
    /// PIDs that were dirty when the flush began.
    pub fn snapshot(&self) -> &PidSet {
        &self.snapshot
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Token that clears nothing; used when no tracking is active.
    pub(crate) const fn empty() -> Self {
        Self { epoch: 0, snapshot: PidSet::new() }
    }
}

/// Dirty bitmap plus per-PID mark epochs. Callers serialize access.
pub struct DirtyTracker {
    dirty: PidSet,
    marked_at: [u64; MAX_PIDS],
    epoch: u64,
}

impl DirtyTracker {
    pub const fn new() -> Self {
        Self { dirty: PidSet::new(), marked_at: [0; MAX_PIDS], epoch: 0 }
    }

    #[inline]
    pub fn mark(&mut self, pid: Pid) {
        self.dirty.insert(pid);
        self.marked_at[pid.index()] = self.epoch;
    }

    #[inline]
    pub fn is_dirty(&self, pid: Pid) -> bool {
        self.dirty.contains(pid)
    }

    pub fn dirty(&self) -> PidSet {
        self.dirty
    }

    /// Opens a flush epoch and snapshots the dirty set.
    pub fn begin(&mut self) -> FlushToken {
        self.epoch += 1;
        FlushToken { epoch: self.epoch, snapshot: self.dirty }
    }

    /// Clears the PIDs of `dirty_at_start` that the flush behind `token`
    /// covered and that nobody marked since. Returns the cleared set.
    pub fn end(&mut self, token: FlushToken, dirty_at_start: &PidSet) -> PidSet {
        let mut cleared = PidSet::new();
        for pid in token.snapshot.intersection(dirty_at_start).iter() {
            if self.marked_at[pid.index()] < token.epoch && self.dirty.remove(pid) {
                cleared.insert(pid);
            }
        }
        cleared
    }
}

impl Default for DirtyTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(raw: usize) -> Pid {
        Pid::new(raw).expect("pid in range")
    }

    fn set(raws: &[usize]) -> PidSet {
        raws.iter().map(|raw| pid(*raw)).collect()
    }

    #[test]
    fn flush_without_race_cleans() {
        let mut tracker = DirtyTracker::new();
        tracker.mark(pid(1));
        assert!(tracker.is_dirty(pid(1)));
        let token = tracker.begin();
        let cleared = tracker.end(token, &set(&[1]));
        assert!(!tracker.is_dirty(pid(1)));
        assert_eq!(cleared, set(&[1]));
    }

    #[test]
    fn mark_during_flush_survives() {
        let mut tracker = DirtyTracker::new();
        tracker.mark(pid(1));
        let token = tracker.begin();
        tracker.mark(pid(1));
        let cleared = tracker.end(token, &set(&[1]));
        assert!(tracker.is_dirty(pid(1)));
        assert!(cleared.is_empty());
    }

    #[test]
    fn pid_first_dirtied_during_flush_stays_dirty() {
        let mut tracker = DirtyTracker::new();
        let token = tracker.begin();
        tracker.mark(pid(3));
        tracker.end(token, &set(&[3]));
        assert!(tracker.is_dirty(pid(3)));
    }

    #[test]
    fn only_requested_pids_are_cleared() {
        let mut tracker = DirtyTracker::new();
        tracker.mark(pid(1));
        tracker.mark(pid(2));
        let token = tracker.begin();
        tracker.end(token, &set(&[2]));
        assert!(tracker.is_dirty(pid(1)));
        assert!(!tracker.is_dirty(pid(2)));
    }

    #[test]
    fn overlapping_flushes_reconcile_independently() {
        let mut tracker = DirtyTracker::new();
        tracker.mark(pid(1));
        let outer = tracker.begin();
        tracker.mark(pid(1));
        let inner = tracker.begin();
        let inner_snapshot = *inner.snapshot();
        tracker.end(inner, &inner_snapshot);
        assert!(!tracker.is_dirty(pid(1)));
        tracker.mark(pid(1));
        let outer_snapshot = *outer.snapshot();
        tracker.end(outer, &outer_snapshot);
        assert!(tracker.is_dirty(pid(1)));
    }

    #[test]
    fn empty_token_clears_nothing() {
        let mut tracker = DirtyTracker::new();
        tracker.mark(pid(4));
        tracker.end(FlushToken::empty(), &set(&[4]));
        assert!(tracker.is_dirty(pid(4)));
    }
}
