#![deny(clippy::dbg_macro)]
#![deny(clippy::todo)]
#![forbid(unsafe_code)]
//! # Flagweave Core - Flag Sets and Their Wire Codec
//!
//! Leaf crate providing the host-independent pieces of extension flag
//! synchronization:
//! - Flag type id allocation within capacity-bounded domains
//! - Canonical flag sets, mutable and copy-on-write
//! - The tiered binary codec that moves flag sets across a byte channel
//!
//! ## Design Principles
//!
//! - **Canonical Form**: a flag set never ends in a zero byte, so equal sets
//!   have equal bytes and encodings
//! - **Out-of-Band Capacity**: encoder and decoder agree on a domain, never on
//!   a length prefix
//! - **Pure Codec**: encoding and decoding hold no shared state
//!
//! ## Usage
//!
//! ```rust
//! use flagweave_core::{FlagCodec, FlagDomain, FlagIdAllocator, FlagSet};
//!
//! let domain = FlagDomain::new("damage-types", 64)?;
//! let mut ids = FlagIdAllocator::new(domain.clone());
//! let burning = ids.reserve()?;
//!
//! let mut flags = FlagSet::new();
//! flags.add(burning);
//!
//! let codec = FlagCodec::for_domain(&domain);
//! let bytes = codec.encode(&flags)?;
//! assert_eq!(codec.decode(&mut bytes.as_slice())?, flags);
//! # Ok::<(), flagweave_core::FlagError>(())
//! ```

pub mod codec;
pub mod errors;
pub mod flags;
pub mod id;

pub use codec::{FlagCodec, Tier, BLOCK_BYTES, BLOCK_COUNT, MAX_BYTES, MAX_CAPACITY};
pub use errors::{CodecError, FlagError, Result};
pub use flags::{FlagSet, SharedFlagSet, MAX_SET_BYTES};
pub use id::{FlagDomain, FlagIdAllocator, FlagTypeId};
