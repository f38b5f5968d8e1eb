//! Shared background sweep thread
//!
//! One thread serves every live [`WeakExtensionTable`]. It starts on the first
//! table registration, wakes every poll interval, and sweeps all tables only
//! when the [collection epoch](crate::epoch) moved since its last pass. When
//! the last table is dropped the thread exits; the next registration starts a
//! new one. No explicit shutdown is needed.
//!
//! A panic while sweeping one table is caught and logged; the remaining
//! tables are still swept.
//!
//! [`WeakExtensionTable`]: crate::table::WeakExtensionTable

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::thread;

use once_cell::sync::Lazy;
use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::config::{ConfigError, SweepConfig};
use crate::epoch;

/// A table the sweep thread can reclaim dead entries from
pub(crate) trait Sweep: Send + Sync {
    /// Drop entries whose keys are gone; returns how many were removed
    fn sweep(&self) -> usize;

    /// Human-readable table description for logs
    fn describe(&self) -> &'static str;
}

/// Counters exposed for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweeperStats {
    /// Tables still alive at the last registration or pass
    pub live_tables: usize,
    /// Completed sweep passes over all tables
    pub passes: u64,
    /// Entries removed across all passes
    pub entries_removed: u64,
    /// Table sweeps that panicked
    pub failures: u64,
    /// Whether the background thread is currently running
    pub running: bool,
}

struct State {
    tables: Vec<Weak<dyn Sweep>>,
    config: SweepConfig,
    last_epoch: u64,
    stats: SweeperStats,
}

struct Sweeper {
    state: Mutex<State>,
    wake: Condvar,
}

static SWEEPER: Lazy<Sweeper> = Lazy::new(|| Sweeper {
    state: Mutex::new(State {
        tables: Vec::new(),
        config: SweepConfig::default(),
        last_epoch: epoch::current(),
        stats: SweeperStats::default(),
    }),
    wake: Condvar::new(),
});

#[derive(Debug, Default)]
struct SweepOutcome {
    removed: usize,
    failures: u64,
}

// =============================================================================
// Public controls
// =============================================================================

/// Install a new sweep configuration
///
/// A running thread applies the new interval on its next wakeup; disabling
/// the background thread makes it exit at that wakeup.
pub fn configure(config: SweepConfig) -> Result<(), ConfigError> {
    config.validate()?;

    let mut state = SWEEPER.state.lock();
    tracing::debug!(
        poll_interval_ms = config.poll_interval_ms,
        background = config.background,
        "sweep configuration updated"
    );
    state.config = config;
    prune(&mut state);
    ensure_running(&mut state);
    SWEEPER.wake.notify_all();
    Ok(())
}

/// Current sweep configuration
pub fn config() -> SweepConfig {
    SWEEPER.state.lock().config.clone()
}

/// Snapshot of sweep counters
pub fn stats() -> SweeperStats {
    SWEEPER.state.lock().stats
}

// =============================================================================
// Registration and sweeping
// =============================================================================

pub(crate) fn register(table: Weak<dyn Sweep>) {
    let mut state = SWEEPER.state.lock();
    prune(&mut state);
    state.tables.push(table);
    state.stats.live_tables = state.tables.len();
    ensure_running(&mut state);
}

/// Sweep every live table on the calling thread
pub(crate) fn sweep_all(epoch: u64) -> usize {
    let tables = {
        let mut state = SWEEPER.state.lock();
        state.last_epoch = state.last_epoch.max(epoch);
        live_tables(&mut state)
    };

    let outcome = sweep_tables(tables);
    let removed = outcome.removed;
    record(&mut SWEEPER.state.lock(), outcome);
    removed
}

fn prune(state: &mut State) {
    state.tables.retain(|table| table.strong_count() > 0);
    state.stats.live_tables = state.tables.len();
}

fn live_tables(state: &mut State) -> Vec<Arc<dyn Sweep>> {
    prune(state);
    state.tables.iter().filter_map(Weak::upgrade).collect()
}

fn record(state: &mut State, outcome: SweepOutcome) {
    state.stats.passes += 1;
    state.stats.entries_removed += outcome.removed as u64;
    state.stats.failures += outcome.failures;
}

fn ensure_running(state: &mut State) {
    if state.stats.running || !state.config.background || state.tables.is_empty() {
        return;
    }

    match thread::Builder::new()
        .name("flagweave-sweep".to_string())
        .spawn(run)
    {
        Ok(_) => {
            state.stats.running = true;
            tracing::info!("weak table sweep thread started");
        }
        Err(error) => {
            tracing::error!(
                %error,
                "failed to start sweep thread; tables are reclaimed only by collect_now"
            );
        }
    }
}

fn run() {
    let sweeper = &*SWEEPER;
    let mut state = sweeper.state.lock();
    loop {
        let interval = state.config.poll_interval();
        sweeper.wake.wait_for(&mut state, interval);

        prune(&mut state);
        if state.tables.is_empty() || !state.config.background {
            state.stats.running = false;
            tracing::info!("weak table sweep thread idle");
            return;
        }

        let current = epoch::current();
        if current == state.last_epoch {
            continue;
        }
        state.last_epoch = current;

        let tables = live_tables(&mut state);
        let outcome = MutexGuard::unlocked(&mut state, || sweep_tables(tables));
        record(&mut state, outcome);
    }
}

fn sweep_tables(tables: Vec<Arc<dyn Sweep>>) -> SweepOutcome {
    let mut outcome = SweepOutcome::default();
    for table in tables {
        match panic::catch_unwind(AssertUnwindSafe(|| table.sweep())) {
            Ok(0) => {}
            Ok(removed) => {
                tracing::trace!(table = table.describe(), removed, "swept weak extension table");
                outcome.removed += removed;
            }
            Err(payload) => {
                outcome.failures += 1;
                tracing::error!(
                    table = table.describe(),
                    panic = panic_message(payload.as_ref()),
                    "weak extension table sweep panicked"
                );
            }
        }
    }
    outcome
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting(AtomicUsize);

    impl Sweep for Counting {
        fn sweep(&self) -> usize {
            self.0.fetch_add(1, Ordering::SeqCst);
            1
        }

        fn describe(&self) -> &'static str {
            "counting"
        }
    }

    struct Exploding;

    impl Sweep for Exploding {
        fn sweep(&self) -> usize {
            panic!("sweep failure");
        }

        fn describe(&self) -> &'static str {
            "exploding"
        }
    }

    #[test]
    #[serial_test::serial]
    fn panicking_table_does_not_stop_others() {
        let exploding: Arc<dyn Sweep> = Arc::new(Exploding);
        let counting = Arc::new(Counting(AtomicUsize::new(0)));
        let counting_dyn: Arc<dyn Sweep> = counting.clone();
        register(Arc::downgrade(&exploding));
        register(Arc::downgrade(&counting_dyn));

        let failures_before = stats().failures;
        let removed = epoch::collect_now();

        assert!(removed >= 1);
        assert!(counting.0.load(Ordering::SeqCst) >= 1);
        assert!(stats().failures > failures_before);
    }

    #[test]
    fn dropped_tables_are_pruned() {
        let kept: Arc<dyn Sweep> = Arc::new(Counting(AtomicUsize::new(0)));
        let dropped: Arc<dyn Sweep> = Arc::new(Counting(AtomicUsize::new(0)));
        let mut state = State {
            tables: vec![Arc::downgrade(&kept), Arc::downgrade(&dropped)],
            config: SweepConfig::default(),
            last_epoch: 0,
            stats: SweeperStats::default(),
        };
        drop(dropped);

        let live = live_tables(&mut state);
        assert_eq!(live.len(), 1);
        assert_eq!(state.stats.live_tables, 1);
    }

    #[test]
    #[serial_test::serial]
    fn invalid_config_is_rejected() {
        let before = config();
        let result = configure(SweepConfig {
            poll_interval_ms: 0,
            background: true,
        });
        assert_eq!(result, Err(ConfigError::ZeroPollInterval));
        assert_eq!(config(), before);
    }

    #[test]
    fn panic_messages_are_extracted() {
        let payload: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(payload.as_ref()), "static message");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned message"));
        assert_eq!(panic_message(payload.as_ref()), "owned message");
        let payload: Box<dyn Any + Send> = Box::new(7u32);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }
}
