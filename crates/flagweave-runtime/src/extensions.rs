//! Flag sets attached to foreign entities
//!
//! The boundary used by collaborators whose entity type cannot carry a flag
//! set field: each entity gets a lazily created, lock-protected [`FlagSet`]
//! stored in a [`WeakExtensionTable`].

use std::sync::Arc;

use flagweave_core::{CodecError, FlagCodec, FlagSet, FlagTypeId};
use parking_lot::Mutex;

use crate::table::WeakExtensionTable;

/// Shared handle to one entity's flag set
pub type EntityFlags = Arc<Mutex<FlagSet>>;

/// Per-entity flag sets keyed weakly by entity identity
#[derive(Debug)]
pub struct FlagExtensions<K: ?Sized> {
    table: WeakExtensionTable<K, EntityFlags>,
}

impl<K> FlagExtensions<K>
where
    K: ?Sized + Send + Sync + 'static,
{
    /// Create an empty extension store
    pub fn new() -> Self {
        Self {
            table: WeakExtensionTable::new(),
        }
    }

    /// Get or create the flag set for `entity`
    pub fn flags(&self, entity: &Arc<K>) -> EntityFlags {
        self.table.get_or_insert_default(entity)
    }

    /// Whether `entity` has `id` set; entities without a set have no flags
    pub fn has(&self, entity: &Arc<K>, id: FlagTypeId) -> bool {
        self.table
            .with_value(entity, |flags| flags.lock().has(id))
            .unwrap_or(false)
    }

    /// Set `id` on `entity`, creating its flag set on first use
    pub fn add(&self, entity: &Arc<K>, id: FlagTypeId) -> bool {
        self.flags(entity).lock().add(id)
    }

    /// Clear `id` on `entity`; never creates a flag set
    pub fn remove(&self, entity: &Arc<K>, id: FlagTypeId) -> bool {
        self.table
            .with_value(entity, |flags| flags.lock().remove(id))
            .unwrap_or(false)
    }

    /// Copy of the entity's current flags
    pub fn snapshot(&self, entity: &Arc<K>) -> FlagSet {
        self.table
            .with_value(entity, |flags| flags.lock().clone())
            .unwrap_or_default()
    }

    /// Append the entity's encoded flags to `out`
    pub fn encode_into(
        &self,
        entity: &Arc<K>,
        codec: &FlagCodec,
        out: &mut Vec<u8>,
    ) -> Result<(), CodecError> {
        match self.table.try_get_value(entity) {
            Some(flags) => codec.encode_into(flags.lock().as_bytes(), out),
            None => codec.encode_into(&[], out),
        }
    }

    /// Replace the entity's flags with ones decoded from `input`
    pub fn decode_from(
        &self,
        entity: &Arc<K>,
        codec: &FlagCodec,
        input: &mut &[u8],
    ) -> Result<(), CodecError> {
        let decoded = codec.decode(input)?;
        *self.flags(entity).lock() = decoded;
        Ok(())
    }

    /// Underlying weak table
    pub fn table(&self) -> &WeakExtensionTable<K, EntityFlags> {
        &self.table
    }
}

impl<K> Default for FlagExtensions<K>
where
    K: ?Sized + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
