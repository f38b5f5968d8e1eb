//! Collection epoch
//!
//! Rust has no tracing collector to ask "has a full collection happened since
//! I last looked?". Instead the host advances a process-wide counter at points
//! where owned objects are known to have been released (a level unload, the
//! end of a frame, a batch of despawns). The sweep thread compares the counter
//! against the value it saw last and only sweeps tables when it moved.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::sweeper;

static EPOCH: AtomicU64 = AtomicU64::new(0);

/// Number of collection cycles observed so far
pub fn current() -> u64 {
    EPOCH.load(Ordering::Acquire)
}

/// Record that a collection cycle happened; the next sweep wakeup reclaims
/// entries whose keys were dropped. Returns the new epoch.
pub fn advance() -> u64 {
    EPOCH.fetch_add(1, Ordering::AcqRel) + 1
}

/// Advance the epoch and sweep every live table on the calling thread.
/// Returns the number of entries removed.
pub fn collect_now() -> usize {
    let epoch = advance();
    sweeper::sweep_all(epoch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[serial_test::serial]
    fn advance_is_monotonic() {
        let before = current();
        let next = advance();
        assert!(next > before);
        assert!(current() >= next);
    }
}
