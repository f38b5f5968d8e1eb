//! Weak Extension Table Lifecycle Tests
//!
//! Validates that entries outlive collection cycles while their keys are
//! reachable, are reclaimed after the last strong reference is dropped, and
//! that the table stays consistent under concurrent access.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use flagweave_core::FlagTypeId;
use flagweave_runtime::{
    epoch, sweeper, EntityFlags, FlagExtensions, SweepConfig, WeakExtensionTable,
};
use serial_test::serial;

#[derive(Debug)]
struct Creature {
    id: u32,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("flagweave_runtime=trace")
        .try_init();
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

// ============================================================================
// Forced Collection
// ============================================================================

#[test]
#[serial]
fn reachable_key_survives_collection() {
    init_tracing();
    let table = WeakExtensionTable::<Creature, u32>::new();
    let creature = Arc::new(Creature { id: 1 });
    table.add(&creature, 42).unwrap();

    epoch::collect_now();

    assert_eq!(table.try_get_value(&creature), Some(42));
    assert_eq!(table.len(), 1);
    assert_eq!(creature.id, 1);
}

#[test]
#[serial]
fn released_key_is_reclaimed_by_collection() {
    init_tracing();
    let table = WeakExtensionTable::<Creature, u32>::new();
    let kept = Arc::new(Creature { id: 1 });
    let released = Arc::new(Creature { id: 2 });
    table.add(&kept, 1).unwrap();
    table.add(&released, 2).unwrap();
    let before = table.len();

    let other_handle = Arc::clone(&released);
    drop(released);
    epoch::collect_now();
    assert_eq!(table.len(), before, "a surviving clone keeps the entry alive");

    drop(other_handle);
    let removed = epoch::collect_now();

    assert!(removed >= 1);
    assert!(table.len() < before);
    assert_eq!(table.try_get_value(&kept), Some(1));
}

#[test]
#[serial]
fn extension_values_drop_with_their_key() {
    let ext = FlagExtensions::<Creature>::new();
    let creature = Arc::new(Creature { id: 3 });
    ext.add(&creature, FlagTypeId::new(5));

    let flags = Arc::downgrade(&ext.flags(&creature));
    drop(creature);
    epoch::collect_now();

    assert!(ext.table().is_empty());
    assert!(flags.upgrade().is_none());
}

// ============================================================================
// Background Sweep Thread
// ============================================================================

#[test]
#[serial]
fn background_thread_sweeps_after_epoch_advance() {
    init_tracing();
    sweeper::configure(SweepConfig {
        poll_interval_ms: 10,
        background: true,
    })
    .unwrap();

    let table = WeakExtensionTable::<Creature, u32>::new();
    let creature = Arc::new(Creature { id: 4 });
    table.add(&creature, 4).unwrap();
    drop(creature);

    assert!(sweeper::stats().running);
    epoch::advance();
    assert!(
        wait_until(Duration::from_secs(5), || table.is_empty()),
        "background sweep should reclaim the dead entry"
    );

    sweeper::configure(SweepConfig::default()).unwrap();
}

#[test]
#[serial]
fn background_thread_waits_for_epoch() {
    sweeper::configure(SweepConfig {
        poll_interval_ms: 10,
        background: true,
    })
    .unwrap();

    let table = WeakExtensionTable::<Creature, u32>::new();
    // settle any pending epoch from earlier tests
    epoch::collect_now();
    let creature = Arc::new(Creature { id: 5 });
    table.add(&creature, 5).unwrap();
    drop(creature);

    thread::sleep(Duration::from_millis(100));
    assert_eq!(table.len(), 1, "no sweep without a new collection epoch");

    epoch::collect_now();
    assert!(table.is_empty());

    sweeper::configure(SweepConfig::default()).unwrap();
}

#[test]
#[serial]
fn disabled_background_thread_goes_idle() {
    let table = WeakExtensionTable::<Creature, u32>::new();
    sweeper::configure(SweepConfig {
        poll_interval_ms: 10,
        background: false,
    })
    .unwrap();

    assert!(wait_until(Duration::from_secs(5), || !sweeper::stats().running));

    let creature = Arc::new(Creature { id: 6 });
    table.add(&creature, 6).unwrap();
    drop(creature);
    assert!(epoch::collect_now() >= 1);
    assert!(table.is_empty());

    sweeper::configure(SweepConfig::default()).unwrap();
    assert!(sweeper::stats().running);
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
#[serial]
fn concurrent_access_during_sweeps() {
    let table = WeakExtensionTable::<Creature, EntityFlags>::new();
    let survivors: Vec<_> = (0..16).map(|id| Arc::new(Creature { id })).collect();

    let workers: Vec<_> = (0..4u16)
        .map(|worker| {
            let table = table.clone();
            let survivors = survivors.clone();
            thread::spawn(move || {
                for round in 0..200u16 {
                    let temp = Arc::new(Creature { id: 1000 });
                    table.add(&temp, Arc::default()).unwrap();
                    assert!(table.try_get_value(&temp).is_some());
                    if round % 2 == 0 {
                        assert!(table.remove(&temp));
                    }

                    let survivor = &survivors[usize::from(round % 16)];
                    let flags = table.get_or_create(survivor, Arc::default);
                    flags.lock().add(FlagTypeId::new(worker));
                }
            })
        })
        .collect();

    let sweeping = {
        let table = table.clone();
        thread::spawn(move || {
            for _ in 0..50 {
                table.sweep();
                epoch::collect_now();
            }
        })
    };

    for worker in workers {
        worker.join().unwrap();
    }
    sweeping.join().unwrap();
    epoch::collect_now();

    assert_eq!(table.len(), survivors.len());
    for survivor in &survivors {
        let flags = table.try_get_value(survivor).unwrap();
        assert_eq!(flags.lock().count(), 4);
    }
}
