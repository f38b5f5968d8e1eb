#![deny(clippy::dbg_macro)]
#![deny(clippy::todo)]
#![forbid(unsafe_code)]
//! # Flagweave Runtime - Extension Tables and Dirty-Bit Sync
//!
//! In-process machinery layered on `flagweave-core`:
//! - Weak-keyed extension tables attaching data to objects whose type cannot
//!   carry it
//! - A shared background thread that reclaims entries for dropped keys
//! - Per-owner dirty tracking and full/incremental update payloads
//!
//! ## Design Principles
//!
//! - **Identity Keys**: entries are keyed by `Arc` allocation, never by value
//! - **No Strong Holds**: tables store `Weak` keys and never extend a key's life
//! - **Epoch-Gated Sweeps**: tables are scanned only after the host reports a
//!   collection cycle, not on every operation
//! - **Cheap Snapshots**: dirty sets are copy-on-write, so readers never block
//!   writers for longer than an `Arc` clone
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use flagweave_core::{FlagCodec, FlagDomain, FlagIdAllocator};
//! use flagweave_runtime::{epoch, FlagExtensions};
//!
//! struct Npc;
//!
//! let domain = FlagDomain::new("teams", 8)?;
//! let mut ids = FlagIdAllocator::new(domain.clone());
//! let allied = ids.reserve()?;
//!
//! let teams = FlagExtensions::<Npc>::new();
//! let npc = Arc::new(Npc);
//! teams.add(&npc, allied);
//! assert!(teams.has(&npc, allied));
//!
//! let mut wire = Vec::new();
//! teams.encode_into(&npc, &FlagCodec::for_domain(&domain), &mut wire)?;
//! assert_eq!(wire, vec![0b1000_0000]);
//!
//! drop(npc);
//! epoch::collect_now();
//! assert!(teams.table().is_empty());
//! # Ok::<(), flagweave_core::FlagError>(())
//! ```

pub mod config;
pub mod delta;
pub mod dirty;
pub mod epoch;
pub mod extensions;
pub mod prelude;
pub mod sweeper;
pub mod table;

pub use config::{ConfigError, SweepConfig};
pub use delta::{read_update, write_update, SyncMode};
pub use dirty::DirtyTracker;
pub use extensions::{EntityFlags, FlagExtensions};
pub use sweeper::SweeperStats;
pub use table::WeakExtensionTable;
