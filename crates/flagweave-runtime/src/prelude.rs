//! Flagweave prelude.
//!
//! Curated re-exports for hosts wiring flags into their entities.

pub use crate::{
    DirtyTracker, EntityFlags, FlagExtensions, SweepConfig, SyncMode, WeakExtensionTable,
};
pub use flagweave_core::{
    FlagCodec, FlagDomain, FlagError, FlagIdAllocator, FlagSet, FlagTypeId, SharedFlagSet, Tier,
};
