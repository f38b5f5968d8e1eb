//! Canonical bit-array flag sets
//!
//! Bit `i` lives in byte `i / 8`, at position `i % 8` counted from the most
//! significant bit. Every set is kept canonical: the byte sequence never ends
//! in a zero byte, and an all-false set is the empty sequence.
//!
//! Ids are `u16`, so no set is ever longer than [`MAX_SET_BYTES`]. Raw byte
//! input past that limit is rejected rather than truncated.
//!
//! Two variants share that layout:
//! - [`FlagSet`] is resized and written in place by its single owner.
//! - [`SharedFlagSet`] is copy-on-write. A mutation either leaves the backing
//!   array untouched (no bit changed) or installs a brand-new array, so a
//!   snapshot taken before the call keeps reading the old contents.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::errors::{FlagError, Result};
use crate::id::FlagTypeId;

/// Longest canonical flag set, in bytes: one bit per possible [`FlagTypeId`]
pub const MAX_SET_BYTES: usize = (u16::MAX as usize + 1) / 8;

// =============================================================================
// Slice helpers shared by both variants
// =============================================================================

/// Length of `bytes` once trailing zero bytes are stripped
pub(crate) fn canonical_len(bytes: &[u8]) -> usize {
    bytes.iter().rposition(|&b| b != 0).map_or(0, |last| last + 1)
}

/// Canonical prefix of `bytes`, rejecting bits no id can address
fn checked_canonical(bytes: &[u8]) -> Result<&[u8]> {
    let len = canonical_len(bytes);
    if len > MAX_SET_BYTES {
        return Err(FlagError::SetTooLarge {
            len,
            max: MAX_SET_BYTES,
        });
    }
    Ok(&bytes[..len])
}

/// Canonical prefix of `other` limited to addressable bytes
fn addressable(other: &[u8]) -> &[u8] {
    &other[..canonical_len(other).min(MAX_SET_BYTES)]
}

fn has_bit(bytes: &[u8], id: FlagTypeId) -> bool {
    bytes
        .get(id.byte())
        .is_some_and(|&byte| byte & id.mask() != 0)
}

fn set_bits(bytes: &[u8]) -> impl Iterator<Item = FlagTypeId> + '_ {
    bytes.iter().enumerate().flat_map(|(index, &byte)| {
        (0..8usize)
            .filter(move |&bit| byte & (0x80u8 >> bit) != 0)
            .filter_map(move |bit| u16::try_from(index * 8 + bit).ok())
            .map(FlagTypeId::new)
    })
}

fn popcount(bytes: &[u8]) -> usize {
    bytes.iter().map(|b| b.count_ones() as usize).sum()
}

// =============================================================================
// Mutable flag set
// =============================================================================

/// A growable flag set mutated in place by its owner
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct FlagSet {
    bytes: Vec<u8>,
}

impl FlagSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    /// Build a set from raw bytes, stripping trailing zero bytes
    ///
    /// Fails with [`FlagError::SetTooLarge`] if a nonzero byte lies past
    /// [`MAX_SET_BYTES`].
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let mut bytes = bytes.into();
        let len = checked_canonical(&bytes)?.len();
        bytes.truncate(len);
        Ok(Self { bytes })
    }

    /// Wrap bytes already known to fit, stripping trailing zero bytes
    pub(crate) fn from_bounded(mut bytes: Vec<u8>) -> Self {
        debug_assert!(canonical_len(&bytes) <= MAX_SET_BYTES);
        bytes.truncate(canonical_len(&bytes));
        Self { bytes }
    }

    /// Canonical byte representation
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume the set, returning its canonical bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// True if no flag is set
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Number of bytes in the canonical representation
    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    /// Number of flags set
    pub fn count(&self) -> usize {
        popcount(&self.bytes)
    }

    /// Whether `id` is set; ids beyond the set's length read as false
    pub fn has(&self, id: FlagTypeId) -> bool {
        has_bit(&self.bytes, id)
    }

    /// Set `id`, growing to exactly the byte needed. Returns true if it changed.
    pub fn add(&mut self, id: FlagTypeId) -> bool {
        let index = id.byte();
        if index >= self.bytes.len() {
            self.bytes.reserve_exact(index + 1 - self.bytes.len());
            self.bytes.resize(index + 1, 0);
        }

        let before = self.bytes[index];
        self.bytes[index] |= id.mask();
        before != self.bytes[index]
    }

    /// Clear `id` and trim back to canonical form. Returns true if it changed.
    pub fn remove(&mut self, id: FlagTypeId) -> bool {
        let Some(byte) = self.bytes.get_mut(id.byte()) else {
            return false;
        };
        if *byte & id.mask() == 0 {
            return false;
        }

        *byte &= !id.mask();
        self.trim();
        true
    }

    /// OR every flag of `other` into this set
    ///
    /// Bytes of `other` past [`MAX_SET_BYTES`] address no id and are ignored.
    pub fn union_with(&mut self, other: &[u8]) {
        let other = addressable(other);
        if other.len() > self.bytes.len() {
            self.bytes.reserve_exact(other.len() - self.bytes.len());
            self.bytes.resize(other.len(), 0);
        }
        for (dst, src) in self.bytes.iter_mut().zip(other) {
            *dst |= src;
        }
    }

    /// Clear every flag of `other` from this set. Returns true if anything was cleared.
    pub fn subtract(&mut self, other: &[u8]) -> bool {
        let mut cleared = false;
        for (dst, src) in self.bytes.iter_mut().zip(other) {
            cleared |= *dst & src != 0;
            *dst &= !src;
        }
        if cleared {
            self.trim();
        }
        cleared
    }

    /// Clear every flag
    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    /// Iterate set flags in ascending order
    pub fn iter(&self) -> impl Iterator<Item = FlagTypeId> + '_ {
        set_bits(&self.bytes)
    }

    fn trim(&mut self) {
        self.bytes.truncate(canonical_len(&self.bytes));
    }
}

impl TryFrom<Vec<u8>> for FlagSet {
    type Error = FlagError;

    fn try_from(bytes: Vec<u8>) -> Result<Self> {
        Self::from_bytes(bytes)
    }
}

impl From<FlagSet> for Vec<u8> {
    fn from(set: FlagSet) -> Self {
        set.bytes
    }
}

impl FromIterator<FlagTypeId> for FlagSet {
    fn from_iter<I: IntoIterator<Item = FlagTypeId>>(iter: I) -> Self {
        let mut set = Self::new();
        for id in iter {
            set.add(id);
        }
        set
    }
}

impl fmt::Debug for FlagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter().map(|id| id.index())).finish()
    }
}

// =============================================================================
// Copy-on-write flag set
// =============================================================================

/// A copy-on-write flag set whose backing array is never mutated once published
///
/// Readers may hold a [`snapshot`](Self::snapshot) while a writer mutates; the
/// snapshot never changes. Swapping which array a shared slot points to is the
/// caller's synchronization responsibility.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SharedFlagSet {
    bytes: Arc<[u8]>,
}

impl SharedFlagSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self {
            bytes: Arc::from(Vec::new()),
        }
    }

    /// Build a set from raw bytes, stripping trailing zero bytes
    ///
    /// Fails with [`FlagError::SetTooLarge`] if a nonzero byte lies past
    /// [`MAX_SET_BYTES`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(Self {
            bytes: Arc::from(checked_canonical(bytes)?),
        })
    }

    /// Current backing array; unaffected by later mutations of this set
    pub fn snapshot(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    /// Canonical byte representation
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// True if no flag is set
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Number of bytes in the canonical representation
    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    /// Number of flags set
    pub fn count(&self) -> usize {
        popcount(&self.bytes)
    }

    /// Whether `id` is set; ids beyond the set's length read as false
    pub fn has(&self, id: FlagTypeId) -> bool {
        has_bit(&self.bytes, id)
    }

    /// Set `id`, installing a new array only if the bit was clear
    pub fn add(&mut self, id: FlagTypeId) -> bool {
        let index = id.byte();
        let current = self.bytes.get(index).copied().unwrap_or(0);
        let updated = current | id.mask();
        if updated == current {
            return false;
        }

        let mut next = vec![0u8; self.bytes.len().max(index + 1)];
        next[..self.bytes.len()].copy_from_slice(&self.bytes);
        next[index] = updated;
        self.bytes = Arc::from(next);
        true
    }

    /// Clear `id`, installing a new, trimmed array only if the bit was set
    pub fn remove(&mut self, id: FlagTypeId) -> bool {
        let index = id.byte();
        let Some(&current) = self.bytes.get(index) else {
            return false;
        };
        let updated = current & !id.mask();
        if updated == current {
            return false;
        }

        let mut next = self.bytes.to_vec();
        next[index] = updated;
        next.truncate(canonical_len(&next));
        self.bytes = Arc::from(next);
        true
    }

    /// OR every flag of `other` into this set, copying only if something changes
    ///
    /// Bytes of `other` past [`MAX_SET_BYTES`] address no id and are ignored.
    pub fn union_with(&mut self, other: &[u8]) -> bool {
        let other = addressable(other);
        let grows = other
            .iter()
            .enumerate()
            .any(|(i, &src)| src & !self.bytes.get(i).copied().unwrap_or(0) != 0);
        if !grows {
            return false;
        }

        let mut next = FlagSet::from_bounded(self.bytes.to_vec());
        next.union_with(other);
        self.bytes = Arc::from(next.into_bytes());
        true
    }

    /// Clear every flag of `other`, copying only if something is cleared
    pub fn subtract(&mut self, other: &[u8]) -> bool {
        let overlaps = self.bytes.iter().zip(other).any(|(dst, src)| dst & src != 0);
        if !overlaps {
            return false;
        }

        let mut next = FlagSet::from_bounded(self.bytes.to_vec());
        next.subtract(other);
        self.bytes = Arc::from(next.into_bytes());
        true
    }

    /// Drop to the empty set
    pub fn clear(&mut self) {
        if !self.bytes.is_empty() {
            self.bytes = Arc::from(Vec::new());
        }
    }

    /// Iterate set flags in ascending order
    pub fn iter(&self) -> impl Iterator<Item = FlagTypeId> + '_ {
        set_bits(&self.bytes)
    }

    /// Copy into an owned, in-place mutable set
    pub fn to_flag_set(&self) -> FlagSet {
        FlagSet {
            bytes: self.bytes.to_vec(),
        }
    }
}

impl Default for SharedFlagSet {
    fn default() -> Self {
        Self::new()
    }
}

impl From<FlagSet> for SharedFlagSet {
    fn from(set: FlagSet) -> Self {
        Self {
            bytes: Arc::from(set.bytes),
        }
    }
}

impl fmt::Debug for SharedFlagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter().map(|id| id.index())).finish()
    }
}
