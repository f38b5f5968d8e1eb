//! Weak-keyed extension table
//!
//! Attaches extension values to objects whose type cannot carry them. Entries
//! are keyed by the identity of an `Arc<K>` (its allocation), never by
//! structural equality, and hold only a [`Weak`] to the key, so the table
//! never keeps a key alive.
//!
//! A stored `Weak` pins the key's allocation, so a dead key's address cannot
//! be reused by a new `Arc` before its entry is swept. Dead entries are
//! removed by the shared [sweep thread](crate::sweeper) once the collection
//! epoch advances, or on demand with [`WeakExtensionTable::sweep`].

use std::any::type_name;
use std::collections::{hash_map, HashMap};
use std::fmt;
use std::sync::{Arc, Weak};

use flagweave_core::{FlagError, Result};
use parking_lot::RwLock;

use crate::sweeper::{self, Sweep};

/// Identity of a key: the address of its shared allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct KeyId(usize);

impl KeyId {
    fn of<K: ?Sized>(key: &Arc<K>) -> Self {
        Self(Arc::as_ptr(key).cast::<()>() as usize)
    }
}

struct Entry<K: ?Sized, V> {
    key: Weak<K>,
    value: V,
}

impl<K: ?Sized, V> Entry<K, V> {
    fn is_alive(&self) -> bool {
        self.key.strong_count() > 0
    }
}

struct TableInner<K: ?Sized, V> {
    entries: RwLock<HashMap<KeyId, Entry<K, V>>>,
}

impl<K, V> Sweep for TableInner<K, V>
where
    K: ?Sized + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn sweep(&self) -> usize {
        let removed: Vec<Entry<K, V>> = {
            let mut entries = self.entries.write();
            let dead: Vec<KeyId> = entries
                .iter()
                .filter(|(_, entry)| !entry.is_alive())
                .map(|(id, _)| *id)
                .collect();
            dead.iter().filter_map(|id| entries.remove(id)).collect()
        };
        // values drop outside the lock
        removed.len()
    }

    fn describe(&self) -> &'static str {
        type_name::<Self>()
    }
}

/// Concurrent identity-keyed map from foreign objects to extension values
///
/// Cloning the table yields another handle to the same entries.
pub struct WeakExtensionTable<K: ?Sized, V> {
    inner: Arc<TableInner<K, V>>,
}

impl<K, V> WeakExtensionTable<K, V>
where
    K: ?Sized + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Create an empty table and register it with the shared sweep thread
    pub fn new() -> Self {
        let inner = Arc::new(TableInner {
            entries: RwLock::new(HashMap::new()),
        });
        let weak: Weak<TableInner<K, V>> = Arc::downgrade(&inner);
        let sweepable: Weak<dyn Sweep> = weak;
        sweeper::register(sweepable);
        tracing::debug!(table = type_name::<Self>(), "registered weak extension table");
        Self { inner }
    }

    /// Associate `value` with `key`
    ///
    /// Fails with [`FlagError::DuplicateKey`] if the key already has an entry;
    /// use [`get_or_create`](Self::get_or_create) to tolerate existing entries.
    pub fn add(&self, key: &Arc<K>, value: V) -> Result<()> {
        let mut entries = self.inner.entries.write();
        let id = KeyId::of(key);
        if entries.contains_key(&id) {
            return Err(FlagError::DuplicateKey);
        }
        entries.insert(
            id,
            Entry {
                key: Arc::downgrade(key),
                value,
            },
        );
        Ok(())
    }

    /// Remove the entry for `key`. Returns true if one existed.
    pub fn remove(&self, key: &Arc<K>) -> bool {
        let mut entries = self.inner.entries.write();
        let removed = entries.remove(&KeyId::of(key));
        drop(entries);
        // value drops outside the lock
        removed.is_some()
    }

    /// Whether `key` has an entry
    pub fn contains_key(&self, key: &Arc<K>) -> bool {
        self.inner.entries.read().contains_key(&KeyId::of(key))
    }

    /// Run `f` against the value for `key`, if any, under the read lock
    pub fn with_value<R>(&self, key: &Arc<K>, f: impl FnOnce(&V) -> R) -> Option<R> {
        self.inner
            .entries
            .read()
            .get(&KeyId::of(key))
            .map(|entry| f(&entry.value))
    }

    /// Number of entries, including dead ones not yet swept
    pub fn len(&self) -> usize {
        self.inner.entries.read().len()
    }

    /// True if the table holds no entries
    pub fn is_empty(&self) -> bool {
        self.inner.entries.read().is_empty()
    }

    /// Remove entries whose keys are gone, on the calling thread.
    /// Returns the number removed.
    pub fn sweep(&self) -> usize {
        self.inner.sweep()
    }
}

impl<K, V> WeakExtensionTable<K, V>
where
    K: ?Sized + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Look up the value for `key`
    pub fn try_get_value(&self, key: &Arc<K>) -> Option<V> {
        self.with_value(key, V::clone)
    }

    /// Return the existing value for `key`, or create, store, and return a
    /// new one from `factory`
    ///
    /// `factory` runs without the table lock held, so it may use this table.
    /// If another caller stores a value for `key` first, that value is
    /// returned and the one `factory` built is dropped.
    pub fn get_or_create(&self, key: &Arc<K>, factory: impl FnOnce() -> V) -> V {
        if let Some(value) = self.try_get_value(key) {
            return value;
        }

        let created = factory();
        let mut entries = self.inner.entries.write();
        let (value, lost) = match entries.entry(KeyId::of(key)) {
            hash_map::Entry::Occupied(existing) => (existing.get().value.clone(), Some(created)),
            hash_map::Entry::Vacant(slot) => {
                let entry = slot.insert(Entry {
                    key: Arc::downgrade(key),
                    value: created,
                });
                (entry.value.clone(), None)
            }
        };
        drop(entries);
        drop(lost);
        value
    }

    /// [`get_or_create`](Self::get_or_create) with the value's default
    pub fn get_or_insert_default(&self, key: &Arc<K>) -> V
    where
        V: Default,
    {
        self.get_or_create(key, V::default)
    }
}

impl<K, V> Default for WeakExtensionTable<K, V>
where
    K: ?Sized + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K: ?Sized, V> Clone for WeakExtensionTable<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K: ?Sized, V> fmt::Debug for WeakExtensionTable<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakExtensionTable")
            .field("entries", &self.inner.entries.read().len())
            .finish()
    }
}
