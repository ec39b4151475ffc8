// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

#![cfg(test)]
//! CONTEXT: Property-based tests for PID allocation, translation and flush reconciliation
//! OWNERS: @kernel-mm-team
//! NOTE: Tests only; no kernel logic.
//!
//! TEST_SCOPE:
//!   - Allocator against a set model (uniqueness, PID 0 last, exhaustion)
//!   - VA/MVA translation inside and outside the relocation window
//!   - Dirty tracker reconciliation with marks racing a flush
//!
//! TEST_SCENARIOS:
//!   - allocator_matches_model(): random alloc/free sequences never double-assign
//!   - translation_roundtrips_in_window(): low VAs relocate and strip back
//!   - flush_clears_exactly_untouched_pids(): marks between begin/end survive

use std::collections::BTreeSet;

use proptest::prelude::*;

use crate::config::{MAX_PIDS, PID_SHIFT, WINDOW_SIZE};
use crate::mm::{mva_to_va, va_to_mva, DirtyTracker, PidAllocator};
use crate::types::{Pid, PidSet};

#[derive(Clone, Debug)]
enum AllocOp {
    Alloc,
    Free(usize),
}

fn arb_alloc_op() -> impl Strategy<Value = AllocOp> {
    prop_oneof![3 => Just(AllocOp::Alloc), 1 => any::<usize>().prop_map(AllocOp::Free)]
}

fn pid_set(raws: &[usize]) -> PidSet {
    raws.iter().filter_map(|raw| Pid::new(*raw)).collect()
}

proptest! {
    #[test]
    fn allocator_matches_model(nr_pids in 1usize..=16, ops in prop::collection::vec(arb_alloc_op(), 0..96)) {
        let mut pids = PidAllocator::new(nr_pids);
        let mut held: BTreeSet<usize> = BTreeSet::new();
        for op in ops {
            match op {
                AllocOp::Alloc => match pids.allocate() {
                    Some(pid) => {
                        let index = pid.index();
                        prop_assert!(index < nr_pids);
                        prop_assert!(held.insert(index), "pid {} handed out twice", index);
                        if index == 0 {
                            prop_assert_eq!(held.len(), nr_pids);
                        } else {
                            let lowest_free = (1..nr_pids).find(|i| *i == index || !held.contains(i));
                            prop_assert_eq!(lowest_free, Some(index));
                        }
                    }
                    None => prop_assert_eq!(held.len(), nr_pids),
                },
                AllocOp::Free(pick) => {
                    if held.is_empty() {
                        continue;
                    }
                    let index = *held.iter().nth(pick % held.len()).expect("non-empty");
                    held.remove(&index);
                    pids.free(Pid::new(index).expect("pid"));
                }
            }
            prop_assert_eq!(pids.allocated(), held.len());
        }
    }

    #[test]
    fn translation_roundtrips_in_window(raw in 0usize..MAX_PIDS, va in any::<u32>()) {
        let pid = Pid::new(raw).expect("pid");
        let va = va as usize;
        let mva = va_to_mva(pid, va);
        if va < WINDOW_SIZE {
            prop_assert_eq!(mva, (raw << PID_SHIFT) | va);
            prop_assert_eq!(mva_to_va(mva, MAX_PIDS), va);
        } else {
            prop_assert_eq!(mva, va);
        }
    }

    #[test]
    fn flush_clears_exactly_untouched_pids(
        before in prop::collection::vec(0usize..8, 0..8),
        during in prop::collection::vec(0usize..8, 0..8),
        requested in prop::collection::vec(0usize..8, 0..8),
    ) {
        let mut tracker = DirtyTracker::new();
        for raw in &before {
            tracker.mark(Pid::new(*raw).expect("pid"));
        }
        let token = tracker.begin();
        prop_assert_eq!(*token.snapshot(), pid_set(&before));
        for raw in &during {
            tracker.mark(Pid::new(*raw).expect("pid"));
        }
        tracker.end(token, &pid_set(&requested));

        for raw in 0..8usize {
            let pid = Pid::new(raw).expect("pid");
            let was_dirty = before.contains(&raw);
            let remarked = during.contains(&raw);
            let cleaned = was_dirty && requested.contains(&raw) && !remarked;
            prop_assert_eq!(tracker.is_dirty(pid), (was_dirty || remarked) && !cleaned);
        }
    }
}
