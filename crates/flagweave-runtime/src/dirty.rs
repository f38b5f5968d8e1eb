//! Dirty-bit tracking for incremental synchronization
//!
//! Each owner (typically a sync target) has a copy-on-write [`SharedFlagSet`]
//! recording which structural indices changed since its last flush. Readers
//! take cheap snapshots while writers keep marking indices.

use std::collections::HashMap;
use std::hash::Hash;

use flagweave_core::{FlagTypeId, SharedFlagSet};
use parking_lot::RwLock;

/// Per-owner dirty index sets
#[derive(Debug)]
pub struct DirtyTracker<O> {
    owners: RwLock<HashMap<O, SharedFlagSet>>,
}

impl<O> DirtyTracker<O>
where
    O: Eq + Hash + Clone,
{
    /// Create a tracker with no dirty owners
    pub fn new() -> Self {
        Self {
            owners: RwLock::new(HashMap::new()),
        }
    }

    /// Mark `index` as changed for `owner`. Returns true if it was clean.
    pub fn set_dirty(&self, owner: &O, index: FlagTypeId) -> bool {
        let mut owners = self.owners.write();
        match owners.get_mut(owner) {
            Some(dirty) => dirty.add(index),
            None => {
                let mut dirty = SharedFlagSet::new();
                dirty.add(index);
                owners.insert(owner.clone(), dirty);
                true
            }
        }
    }

    /// Drop every dirty index for `owner`
    pub fn clear_dirty(&self, owner: &O) {
        self.owners.write().remove(owner);
    }

    /// Read-and-clear `owner`'s dirty indices in one step
    pub fn take(&self, owner: &O) -> SharedFlagSet {
        self.owners.write().remove(owner).unwrap_or_default()
    }

    /// Merge `dirty` back into `owner`'s set, e.g. after a failed flush
    pub fn restore(&self, owner: &O, dirty: &SharedFlagSet) {
        if dirty.is_empty() {
            return;
        }
        self.owners
            .write()
            .entry(owner.clone())
            .or_default()
            .union_with(dirty.as_bytes());
    }

    /// Snapshot of `owner`'s dirty indices; later marks do not affect it
    pub fn dirty(&self, owner: &O) -> SharedFlagSet {
        self.owners.read().get(owner).cloned().unwrap_or_default()
    }

    /// Whether `owner` has any dirty index
    pub fn is_dirty(&self, owner: &O) -> bool {
        self.owners
            .read()
            .get(owner)
            .is_some_and(|dirty| !dirty.is_empty())
    }

    /// Owners with at least one dirty index
    pub fn owners(&self) -> Vec<O> {
        self.owners.read().keys().cloned().collect()
    }
}

impl<O> Default for DirtyTracker<O>
where
    O: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(index: u16) -> FlagTypeId {
        FlagTypeId::new(index)
    }

    #[test]
    fn set_dirty_accumulates_per_owner() {
        let tracker = DirtyTracker::new();
        assert!(tracker.set_dirty(&1u32, id(4)));
        assert!(!tracker.set_dirty(&1u32, id(4)));
        tracker.set_dirty(&1u32, id(12));
        tracker.set_dirty(&2u32, id(0));

        assert_eq!(tracker.dirty(&1).iter().collect::<Vec<_>>(), vec![id(4), id(12)]);
        assert!(tracker.is_dirty(&2));
        assert!(!tracker.is_dirty(&3));
    }

    #[test]
    fn snapshot_survives_later_marks() {
        let tracker = DirtyTracker::new();
        tracker.set_dirty(&"peer", id(1));
        let before = tracker.dirty(&"peer");

        tracker.set_dirty(&"peer", id(2));
        assert_eq!(before.count(), 1);
        assert_eq!(tracker.dirty(&"peer").count(), 2);
    }

    #[test]
    fn clear_and_take_empty_the_owner() {
        let tracker = DirtyTracker::new();
        tracker.set_dirty(&1u8, id(3));
        tracker.clear_dirty(&1u8);
        assert!(tracker.dirty(&1u8).is_empty());

        tracker.set_dirty(&1u8, id(5));
        let taken = tracker.take(&1u8);
        assert!(taken.has(id(5)));
        assert!(!tracker.is_dirty(&1u8));
        assert!(tracker.owners().is_empty());
    }

    #[test]
    fn restore_merges_with_new_marks() {
        let tracker = DirtyTracker::new();
        tracker.set_dirty(&1u8, id(0));
        let taken = tracker.take(&1u8);
        tracker.set_dirty(&1u8, id(9));

        tracker.restore(&1u8, &taken);
        let dirty = tracker.dirty(&1u8);
        assert!(dirty.has(id(0)));
        assert!(dirty.has(id(9)));
    }
}
