//! Error types for flag allocation, extension tables, and the wire codec
//!
//! Registration-time failures (`CapacityExceeded`, `InvalidCapacity`) are fatal
//! to the registration attempt. `DuplicateKey` is recoverable. Codec errors only
//! surface on malformed or mismatched-tier input, since the wire format carries
//! no length prefix or checksum.

use crate::codec::Tier;

/// Unified error type for flagweave operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlagError {
    /// A domain has handed out every id it can hold
    #[error("too many registered flag types in domain `{domain}` (capacity {capacity})")]
    CapacityExceeded {
        /// Name of the exhausted domain
        domain: String,
        /// Fixed capacity of the domain
        capacity: u16,
    },

    /// A domain was declared with a capacity the codec cannot carry
    #[error("invalid domain capacity {capacity}: must be between 1 and {max}")]
    InvalidCapacity {
        /// Requested capacity
        capacity: u16,
        /// Largest supported capacity
        max: u16,
    },

    /// Raw bytes hold bits beyond the largest addressable flag id
    #[error("flag set of {len} byte(s) exceeds the {max}-byte limit")]
    SetTooLarge {
        /// Canonical byte length of the rejected input
        len: usize,
        /// Largest canonical length a flag set can have
        max: usize,
    },

    /// An extension entry already exists for this key identity
    #[error("an entry for this key already exists")]
    DuplicateKey,

    /// Encoding or decoding a flag set failed
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Errors raised while encoding or decoding flag sets
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// Input ended before the headers said it would
    #[error("unexpected end of input: needed {needed} more byte(s)")]
    UnexpectedEof {
        /// Bytes still required to complete the read
        needed: usize,
    },

    /// The flag set is wider than the tier it is being encoded for
    #[error("flag set of {len} byte(s) does not fit the {tier:?} tier")]
    ExceedsTier {
        /// Byte length of the offending set
        len: usize,
        /// Tier the caller asked for
        tier: Tier,
    },

    /// The flag set holds an id at or above its domain's capacity
    #[error("flag id {id} is outside domain `{domain}` (capacity {capacity})")]
    OutsideDomain {
        /// Highest id set in the offending flag set
        id: usize,
        /// Name of the domain encoded for
        domain: String,
        /// Capacity of that domain
        capacity: u16,
    },

    /// A block group header carried an unknown tag
    #[error("invalid block group header {byte:#010b}")]
    InvalidGroupHeader {
        /// The raw header byte
        byte: u8,
    },

    /// Block group headers must appear in ascending group order
    #[error("block group {group} appeared after group {previous}")]
    GroupOutOfOrder {
        /// Group that was read
        group: usize,
        /// Group that preceded it
        previous: usize,
    },
}

/// Standard Result type for flagweave operations
pub type Result<T> = std::result::Result<T, FlagError>;
