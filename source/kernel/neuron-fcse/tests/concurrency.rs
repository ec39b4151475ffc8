//! CONTEXT: Multi-threaded allocation and switch-vs-flush races
//! OWNERS: @kernel-mm-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: 2 integration tests
//!
//! TEST_SCENARIOS:
//!   - concurrent_allocations_are_unique(): threads race allocate/free, no pid is shared
//!   - switch_after_flush_start_is_never_lost(): a switch-in that lands after
//!     begin_flush must leave its pid dirty once end_flush completes

mod common;

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use common::vivt;
use neuron_fcse::{FcseContext, FcseOps, ReusePolicy};

#[test]
fn concurrent_allocations_are_unique() {
    const THREADS: usize = 8;
    const ROUNDS: usize = 200;
    let fcse = Arc::new(vivt(32, ReusePolicy::Inherit));
    let live = Arc::new(Mutex::new(BTreeSet::new()));
    let barrier = Arc::new(Barrier::new(THREADS));

    let workers: Vec<_> = (0..THREADS)
        .map(|_| {
            let fcse = Arc::clone(&fcse);
            let live = Arc::clone(&live);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..ROUNDS {
                    let mut ctx = FcseContext::new();
                    fcse.allocate(&mut ctx).expect("32 pids cover 8 threads");
                    let pid = ctx.pid().expect("assigned");
                    assert!(live.lock().expect("lock").insert(pid), "{} shared", pid);
                    fcse.on_switch(&FcseContext::UNASSIGNED, &ctx);
                    assert!(live.lock().expect("lock").remove(&pid));
                    fcse.free(&mut ctx);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().expect("worker");
    }
    assert_eq!(fcse.allocated_count(), 0);
}

#[test]
fn switch_after_flush_start_is_never_lost() {
    const ROUNDS: usize = 500;
    let fcse = Arc::new(vivt(4, ReusePolicy::Inherit));
    let mut ctx = FcseContext::new();
    fcse.allocate(&mut ctx).expect("allocate");
    let ctx = Arc::new(ctx);
    let stop = Arc::new(AtomicBool::new(false));

    let switcher = {
        let fcse = Arc::clone(&fcse);
        let ctx = Arc::clone(&ctx);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            while !stop.load(Ordering::SeqCst) {
                fcse.on_switch(&FcseContext::UNASSIGNED, &ctx);
            }
        })
    };

    for _ in 0..ROUNDS {
        let token = fcse.begin_flush();
        // Once a switch is known to have happened after begin_flush the pid
        // must survive this flush.
        fcse.on_switch(&FcseContext::UNASSIGNED, &ctx);
        let snapshot = *token.snapshot();
        fcse.end_flush(token, &snapshot);
        assert!(fcse.is_dirty(&ctx));
    }

    stop.store(true, Ordering::SeqCst);
    switcher.join().expect("switcher");

    fcse.flush_all(|| {});
    assert!(!fcse.is_dirty(&ctx));
}
